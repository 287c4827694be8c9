//! # filterbridge
//!
//! Discovery, validation and execution of native Photoshop-compatible
//! filter plugins (`.8bf` modules).
//!
//! ## Features
//!
//! - **Discovery without execution**: PE modules are classified by
//!   architecture and their `PiPL`/`PiMI` resources decoded as plain bytes
//! - **Host suites**: PICA callback suites (buffers, handles, action
//!   descriptors, strings, registry, UI hooks) served from a per-thread
//!   session
//! - **Cross-architecture bridge**: modules the host cannot load run in a
//!   `filterbridge-worker`, with images shared through mapped files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use filterbridge::prelude::*;
//!
//! let config = HostConfig::from_env()?;
//! let scanner = PluginScanner::new(config.scanner.clone());
//! let mut catalog = PluginCatalog::new();
//! for descriptor in scanner.scan_directory("/opt/filters") {
//!     catalog.insert(descriptor);
//! }
//!
//! let mut engine = ExecutionEngine::new(config.suites.clone(), config.bridge.clone());
//! let twirl = catalog.find("Distort", "Twirl").expect("installed");
//! let output = unsafe { engine.run(twirl, &FilterRequest::new(&image), &factory) }?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod arch;
pub mod bridge;
pub mod config;
pub mod discovery;
pub mod error;
pub mod execution;
pub mod fourcc;
pub mod host;
pub mod memory;
pub mod observability;
pub mod pe;
pub mod plugin;
pub mod suites;

#[doc(hidden)]
pub mod testing;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::arch::Architecture;
    pub use crate::config::HostConfig;
    pub use crate::discovery::{PluginScanner, ScannerConfig};
    pub use crate::error::{Error, Result};
    pub use crate::execution::{
        ExecutionEngine, ExecutionMode, FilterOutput, FilterRequest, ParameterBlock,
        ParameterBlockFactory,
    };
    pub use crate::host::{ImageSurface, ImageSurfaceMut, MetadataProvider, OwnedSurface, PixelFormat};
    pub use crate::plugin::{PluginCatalog, PluginDescriptor};
}

pub use error::{Error, Result};
