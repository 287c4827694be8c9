//! Filter execution.
//!
//! [`ExecutionEngine`] decides per descriptor whether a filter runs in this
//! process or in a bridge worker, sets up the suite session, and drives the
//! selectors through a host-supplied [`ParameterBlockFactory`]:
//!
//! ```text
//! About (once per entry point, when asked)
//! Parameters → Prepare → Start → Continue* → Finish
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use filterbridge::execution::{ExecutionEngine, FilterRequest};
//!
//! let mut engine = ExecutionEngine::new(config.suites.clone(), config.bridge.clone());
//! let request = FilterRequest::new(&image).with_progress(|done, total| bar.set(done, total));
//! let output = unsafe { engine.run(&descriptor, &request, &factory) }?;
//! ```

mod block;
mod engine;
mod mode;

pub use block::{AboutContext, BlockContext, FilterOutput, ParameterBlock, ParameterBlockFactory};
pub use engine::{ExecutionEngine, FilterRequest, SharedProgress, check_result};
pub use mode::{ExecutionMode, Selector};

use crate::arch::Architecture;
use thiserror::Error;

/// `userCanceledErr`.
pub const USER_CANCELED: i16 = -128;

/// Errors of a filter invocation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A selector returned a non-zero result.
    #[error("{selector} returned {code}")]
    Plugin {
        /// Selector that failed.
        selector: Selector,
        /// Native result code.
        code: i16,
    },

    /// The user cancelled the filter.
    #[error("cancelled by the user")]
    Cancelled,

    /// The host cannot run modules of this architecture.
    #[error("modules built for {0} are not supported on this host")]
    Unsupported(Architecture),

    /// The module could not be loaded.
    #[error(transparent)]
    Load(#[from] crate::plugin::LoadError),

    /// Setting up the suites failed.
    #[error(transparent)]
    Suite(#[from] crate::suites::SuiteError),

    /// The bridge failed.
    #[error(transparent)]
    Bridge(#[from] crate::bridge::BridgeError),

    /// No parameter block factory is available.
    #[error("no parameter block provider")]
    NoParameterBlocks,

    /// The parameter block could not be built.
    #[error("parameter block: {0}")]
    Block(String),
}
