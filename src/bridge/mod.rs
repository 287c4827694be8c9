//! Cross-process execution bridge.
//!
//! Filters built for an architecture the host process cannot load run in
//! a `filterbridge-worker` of the matching architecture. The host serves
//! the worker's requests over a Unix domain socket and exchanges images
//! through shared mappings in a runtime directory.
//!
//! ```text
//!  host process                                  worker process
//! ┌──────────────────────┐   GetSourceImage    ┌─────────────────────┐
//! │ BridgeHost           │ ◄────────────────── │ BridgeClient        │
//! │  serving thread      │ ──── "fb-…-source" ►│  filterbridge-ui    │
//! │  caller waits child  │                     │  thread runs filter │
//! └──────────┬───────────┘                     └──────────┬──────────┘
//!            └──────── runtime dir: mapped images, cancel event ─────┘
//! ```

mod cancel;
mod client;
mod host;
mod mapping;
pub mod protocol;
mod worker;

pub use cancel::{CancelEvent, POLL_INTERVAL};
pub use client::BridgeClient;
pub use host::{BridgeHost, BridgeOutcome, SharedProgress};
pub use mapping::{HEADER_LEN, ImageMapping, MAX_NAME_LEN, unique_name, validate_name};
pub use protocol::Command;
pub use worker::{EXIT_CANCELLED, EXIT_FAILED, run_worker};

use crate::arch::Architecture;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable carrying the socket path to the worker.
pub const SOCKET_ENV: &str = "FILTERBRIDGE_SOCKET";
/// Environment variable carrying the runtime directory to the worker.
pub const RUNTIME_DIR_ENV: &str = "FILTERBRIDGE_RUNTIME_DIR";
/// Environment variable carrying the cancellation event name to the worker.
pub const CANCEL_ENV: &str = "FILTERBRIDGE_CANCEL";

/// Errors of the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Socket or file I/O failed.
    #[error("bridge I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a command byte outside the protocol.
    #[error("unknown command {0}")]
    UnknownCommand(u8),

    /// A frame exceeded the protocol limit.
    #[error("frame of {0} bytes is too large")]
    FrameTooLarge(usize),

    /// A request or reply was malformed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A mapping name that is not a plain file name.
    #[error("invalid mapping name {0:?}")]
    BadMappingName(String),

    /// A mapping whose header does not describe its contents.
    #[error("invalid mapping: {0}")]
    BadMapping(String),

    /// Creating or mapping shared memory failed.
    #[error("shared memory: {0}")]
    Mapping(String),

    /// A payload could not be serialized or deserialized.
    #[error("serialization: {0}")]
    Serialization(String),

    /// The worker reported an error.
    #[error("{message}")]
    Remote {
        /// Message shown to the user.
        message: String,
        /// Technical detail.
        detail: String,
    },

    /// No worker executable is configured for the architecture.
    #[error("no bridge worker for {0}")]
    NoWorker(Architecture),

    /// The worker could not be started.
    #[error("cannot start worker {path}: {source}")]
    Spawn {
        /// Worker executable.
        path: PathBuf,
        /// Cause.
        source: std::io::Error,
    },

    /// The worker exited unsuccessfully without reporting why.
    #[error("worker exited with {0}")]
    WorkerFailed(std::process::ExitStatus),

    /// The worker ran longer than allowed and was killed.
    #[error("worker timed out after {0:?}")]
    Timeout(Duration),

    /// The worker environment is incomplete.
    #[error("missing worker environment variable {0}")]
    MissingEnvironment(&'static str),
}

impl From<crate::error::Error> for BridgeError {
    fn from(e: crate::error::Error) -> Self {
        Self::Mapping(e.to_string())
    }
}

/// What the worker needs to know beyond the descriptor.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct WorkerSettings {
    /// Native parent window handle for dialogs; 0 for none.
    pub parent_window: i64,
    /// Show the About box and nothing else.
    pub about_only: bool,
    /// Send the Parameters selector so the filter shows its dialog.
    pub show_dialog: bool,
    /// Numeric filter case of the invocation.
    pub filter_case: i16,
    /// Buffer suite ceiling in bytes.
    pub buffer_limit: Option<u64>,
}

impl WorkerSettings {
    /// Serialize for the `GetSettings` reply.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BridgeError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.into_vec())
            .map_err(|e| BridgeError::Serialization(e.to_string()))
    }

    /// Deserialize a `GetSettings` reply.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BridgeError> {
        let mut aligned = rkyv::util::AlignedVec::<8>::new();
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| BridgeError::Serialization(e.to_string()))
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Worker executable for each architecture.
    pub workers: HashMap<Architecture, PathBuf>,
    /// Directory holding sockets, mappings and events.
    pub runtime_dir: PathBuf,
    /// Read and write timeout on each request connection.
    pub io_timeout: Option<Duration>,
    /// Kill the worker after this long.
    pub worker_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workers: HashMap::new(),
            runtime_dir: std::env::temp_dir().join("filterbridge"),
            io_timeout: Some(Duration::from_secs(30)),
            worker_timeout: None,
        }
    }
}

impl BridgeConfig {
    /// Run modules of `arch` with the worker at `path`.
    pub fn with_worker(mut self, arch: Architecture, path: impl Into<PathBuf>) -> Self {
        self.workers.insert(arch, path.into());
        self
    }

    /// Use `dir` for sockets and mappings.
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    /// Set the per-request I/O timeout.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Set the worker run-time limit.
    pub fn with_worker_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// The worker for `arch`.
    pub fn worker_for(&self, arch: Architecture) -> Option<&Path> {
        self.workers.get(&arch).map(PathBuf::as_path)
    }

    /// Create the runtime directory, readable by the owner only.
    pub fn ensure_runtime_dir(&self) -> Result<&Path, BridgeError> {
        std::fs::create_dir_all(&self.runtime_dir)?;
        rustix::fs::chmod(&self.runtime_dir, rustix::fs::Mode::from_raw_mode(0o700))
            .map_err(std::io::Error::from)?;
        Ok(&self.runtime_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip() {
        let settings = WorkerSettings {
            parent_window: 0x1234,
            about_only: false,
            show_dialog: true,
            filter_case: 2,
            buffer_limit: Some(1 << 20),
        };
        let bytes = settings.to_bytes().unwrap();
        assert_eq!(WorkerSettings::from_bytes(&bytes).unwrap(), settings);
        assert!(WorkerSettings::from_bytes(b"nope").is_err());
    }

    #[test]
    fn test_config_builders() {
        let config = BridgeConfig::default()
            .with_worker(Architecture::X86, "/opt/fb/worker-x86")
            .with_runtime_dir("/run/user/1000/fb")
            .with_worker_timeout(Some(Duration::from_secs(60)));
        assert_eq!(config.worker_for(Architecture::X86), Some(Path::new("/opt/fb/worker-x86")));
        assert_eq!(config.worker_for(Architecture::Arm64), None);
        assert_eq!(config.runtime_dir, PathBuf::from("/run/user/1000/fb"));
    }

    #[test]
    fn test_runtime_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::default().with_runtime_dir(dir.path().join("rt"));
        let path = config.ensure_runtime_dir().unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
