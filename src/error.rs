//! Error types for filterbridge.

use thiserror::Error;

/// Result type alias using filterbridge's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for filterbridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Shared memory mapping failed.
    #[error("mapping failed: {0}")]
    MappingFailed(String),

    /// A plugin suite operation failed.
    #[error(transparent)]
    Suite(#[from] crate::suites::SuiteError),

    /// The cross-process bridge failed.
    #[error(transparent)]
    Bridge(#[from] crate::bridge::BridgeError),

    /// A filter module could not be loaded.
    #[error(transparent)]
    Load(#[from] crate::plugin::LoadError),

    /// A configuration value is invalid.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Executing a filter failed.
    #[error(transparent)]
    Execution(#[from] crate::execution::ExecutionError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}
