//! Suite errors and the native error codes they map to.

use thiserror::Error;

/// Native error codes returned across the plugin ABI.
pub mod codes {
    /// `kSPNoError` / `noErr`.
    pub const NO_ERROR: i32 = 0;
    /// `kSPUnimplementedError` (`'!IMP'`).
    pub const UNIMPLEMENTED: i32 = 0x2149_4D50;
    /// `kSPBadParameterError` (`'Parm'`).
    pub const BAD_PARAMETER: i32 = 0x5061_726D;
    /// `kSPOutOfMemoryError` (`memFullErr`).
    pub const OUT_OF_MEMORY: i32 = -108;
    /// `kSPSuiteNotFoundError` (`'S!Fd'`).
    pub const SUITE_NOT_FOUND: i32 = 0x5321_4664;
    /// `nilHandleErr`.
    pub const NIL_HANDLE: i32 = -109;
    /// `userCanceledErr`.
    pub const USER_CANCELED: i32 = -128;
    /// `errPlugInHostInsufficient`.
    pub const HOST_INSUFFICIENT: i32 = -30900;
    /// `errMissingParameter` (`errAEParamMissed`).
    pub const MISSING_PARAMETER: i32 = -1715;
    /// `paramErr`, the `OSErr` used where a four-character code does not fit.
    pub const PARAM_ERR: i16 = -50;
}

/// Errors raised by suite providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuiteError {
    /// The suite exists but not in the requested version.
    #[error("suite {name:?} version {version} is not supported")]
    UnsupportedVersion {
        /// Suite name.
        name: String,
        /// Requested version.
        version: i32,
    },

    /// No suite has this name.
    #[error("suite {0:?} not found")]
    NotFound(String),

    /// A null pointer, unknown token or out-of-range index.
    #[error("bad parameter: {0}")]
    BadParameter(&'static str),

    /// A required key or argument is missing.
    #[error("missing parameter")]
    MissingParameter,

    /// An allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// A handle that was not issued by this session.
    #[error("invalid handle")]
    InvalidHandle,

    /// The host does not provide this entry.
    #[error("not implemented")]
    Unimplemented,

    /// The host cannot do what was asked.
    #[error("host insufficient")]
    HostInsufficient,

    /// A suite entry was called on a thread without an active session.
    #[error("no suite session is active on this thread")]
    NoSession,

    /// Another session is already active on this thread.
    #[error("a suite session is already active on this thread")]
    SessionActive,

    /// Stored registry data could not be read or written.
    #[error("descriptor storage: {0}")]
    Storage(String),
}

impl SuiteError {
    /// The native error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::UnsupportedVersion { .. } | Self::NotFound(_) => codes::SUITE_NOT_FOUND,
            Self::BadParameter(_) | Self::NoSession | Self::SessionActive => codes::BAD_PARAMETER,
            Self::MissingParameter => codes::MISSING_PARAMETER,
            Self::OutOfMemory => codes::OUT_OF_MEMORY,
            Self::InvalidHandle => codes::NIL_HANDLE,
            Self::Unimplemented => codes::UNIMPLEMENTED,
            Self::HostInsufficient => codes::HOST_INSUFFICIENT,
            Self::Storage(_) => codes::BAD_PARAMETER,
        }
    }

    /// The code truncated to an `OSErr`, for procs that return one.
    pub fn os_err(&self) -> i16 {
        i16::try_from(self.code()).unwrap_or(codes::PARAM_ERR)
    }
}
