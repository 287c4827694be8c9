//! Host configuration.
//!
//! Every layer has a `Default`-able config struct with `with_*` builders;
//! [`HostConfig`] aggregates them and can be read from `FILTERBRIDGE_*`
//! environment variables.
//!
//! | variable                       | effect                               |
//! |--------------------------------|--------------------------------------|
//! | `FILTERBRIDGE_WORKER_X86`      | bridge worker for x86 modules        |
//! | `FILTERBRIDGE_WORKER_X64`      | bridge worker for x64 modules        |
//! | `FILTERBRIDGE_WORKER_ARM`      | bridge worker for Arm modules        |
//! | `FILTERBRIDGE_WORKER_ARM64`    | bridge worker for Arm64 modules      |
//! | `FILTERBRIDGE_RUNTIME_DIR`     | sockets and shared mappings          |
//! | `FILTERBRIDGE_REGISTRY`        | persistent descriptor registry file  |
//! | `FILTERBRIDGE_BUFFER_LIMIT`    | buffer suite ceiling in bytes        |
//! | `FILTERBRIDGE_SCAN_THREADS`    | concurrent file scans                |
//!
//! Without `FILTERBRIDGE_RUNTIME_DIR`, `$XDG_RUNTIME_DIR/filterbridge` is
//! used when `XDG_RUNTIME_DIR` is set.

use crate::arch::Architecture;
use crate::bridge::BridgeConfig;
use crate::discovery::ScannerConfig;
use crate::suites::SuiteConfig;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {variable}")]
pub struct ConfigError {
    /// Variable name.
    pub variable: &'static str,
    /// Offending value.
    pub value: String,
}

const WORKER_VARS: [(&str, Architecture); 4] = [
    ("FILTERBRIDGE_WORKER_X86", Architecture::X86),
    ("FILTERBRIDGE_WORKER_X64", Architecture::X64),
    ("FILTERBRIDGE_WORKER_ARM", Architecture::Arm),
    ("FILTERBRIDGE_WORKER_ARM64", Architecture::Arm64),
];

/// Configuration of every layer.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// Plugin discovery.
    pub scanner: ScannerConfig,
    /// Suite providers.
    pub suites: SuiteConfig,
    /// Cross-process bridge.
    pub bridge: BridgeConfig,
}

impl HostConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by `lookup(variable)`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (variable, arch) in WORKER_VARS {
            if let Some(path) = lookup(variable).filter(|v| !v.is_empty()) {
                config.bridge = config.bridge.with_worker(arch, path);
            }
        }

        if let Some(dir) = lookup(crate::bridge::RUNTIME_DIR_ENV).filter(|v| !v.is_empty()) {
            config.bridge = config.bridge.with_runtime_dir(dir);
        } else if let Some(xdg) = lookup("XDG_RUNTIME_DIR").filter(|v| !v.is_empty()) {
            config.bridge = config.bridge.with_runtime_dir(PathBuf::from(xdg).join("filterbridge"));
        }

        if let Some(path) = lookup("FILTERBRIDGE_REGISTRY").filter(|v| !v.is_empty()) {
            config.suites = config.suites.with_registry_path(path);
        }
        if let Some(limit) = parse(&lookup, "FILTERBRIDGE_BUFFER_LIMIT")? {
            config.suites = config.suites.with_buffer_limit(limit);
        }
        if let Some(threads) = parse::<usize>(&lookup, "FILTERBRIDGE_SCAN_THREADS")? {
            if threads == 0 {
                return Err(ConfigError {
                    variable: "FILTERBRIDGE_SCAN_THREADS",
                    value: "0".into(),
                });
            }
            config.scanner.threads = threads;
        }

        tracing::debug!(
            "configuration: {} bridge workers, runtime dir {}",
            config.bridge.workers.len(),
            config.bridge.runtime_dir.display()
        );
        Ok(config)
    }

    /// Replace the scanner settings.
    pub fn with_scanner(mut self, scanner: ScannerConfig) -> Self {
        self.scanner = scanner;
        self
    }

    /// Replace the suite settings.
    pub fn with_suites(mut self, suites: SuiteConfig) -> Self {
        self.suites = suites;
        self
    }

    /// Replace the bridge settings.
    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(variable) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { variable, value }),
    }
}
