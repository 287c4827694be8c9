//! Host-side PICA callback suites.
//!
//! Plugins acquire suites by `(name, version)` through `SPBasicSuite` and
//! call them with no context argument. Every entry resolves its state from
//! the [`SuiteSession`] active on the calling thread, returns native error
//! codes and never unwinds across the ABI.
//!
//! ```rust,ignore
//! let session = SuiteSession::new(&SuiteConfig::default()).with_plugin_name("Twirl");
//! let active = session.activate()?;
//! let callbacks = active.callbacks();
//! // place `callbacks` in the parameter block and call the plugin
//! let session = active.finish()?;
//! ```

pub mod action;
mod basic;
mod blocks;
mod buffer;
mod descriptor_registry;
mod error;
mod ffi;
mod handle;
mod registry;
mod session;
mod ui_hooks;
mod zstring;

pub use action::{
    ACTION_DESCRIPTOR_SUITE, ACTION_LIST_SUITE, ACTION_REFERENCE_SUITE, ActionDescriptor,
    ActionList, ActionReference, ActionValue, DescriptorToken, PSActionDescriptorProcs,
    PSActionListProcs, PSActionReferenceProcs, ReferenceForm, ReferenceItem,
};
pub use basic::{BASIC_SUITE, SPBasicSuite};
pub use buffer::{BUFFER_PROCS, BUFFER_SUITE, BufferProcs, PSBufferSuite1};
pub use descriptor_registry::{
    DESCRIPTOR_REGISTRY_SUITE, DescriptorRegistry, PSDescriptorRegistryProcs, RegistryItemRecord,
    RegistryRecord,
};
pub use error::{SuiteError, codes};
pub use handle::{
    HANDLE_PROCS, HANDLE_SUITE_1, HANDLE_SUITE_2, Handle, HandleProcs, HandleSuite, PSHandleSuite1,
    PSHandleSuite2, PsHandle,
};
pub use registry::{
    ACTION_DESCRIPTOR_SUITE_NAME, ACTION_LIST_SUITE_NAME, ACTION_REFERENCE_SUITE_NAME,
    BASIC_SUITE_NAME, BUFFER_SUITE_NAME, DESCRIPTOR_REGISTRY_SUITE_NAME, HANDLE_SUITE_NAME,
    SuiteId, UI_HOOKS_SUITE_NAME, ZSTRING_SUITE_NAME,
};
pub use session::{ActiveSession, SuiteSession};
pub use ui_hooks::{PSUIHooksSuite1, TICK_COUNT, TICKS_PER_SECOND, UI_HOOKS_SUITE, abort_proc, progress_proc};
pub use zstring::{ASZStringSuite, ZSTRING_SUITE, ZString};

use std::path::PathBuf;

/// Suite provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteConfig {
    /// Ceiling on live buffer-suite bytes; `None` for no ceiling.
    pub buffer_limit: Option<usize>,
    /// File persistent registry entries are loaded from and saved to.
    pub registry_path: Option<PathBuf>,
}

impl SuiteConfig {
    /// Limit buffer-suite allocations to `limit` live bytes.
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = Some(limit);
        self
    }

    /// Persist registry entries at `path`.
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    /// The stored registry, or an empty one when no path is configured.
    pub fn load_registry(&self) -> Result<DescriptorRegistry, SuiteError> {
        match &self.registry_path {
            Some(path) => DescriptorRegistry::load(path),
            None => Ok(DescriptorRegistry::new()),
        }
    }

    /// Save the persistent entries of `registry` if a path is configured.
    pub fn save_registry(&self, registry: &DescriptorRegistry) -> Result<(), SuiteError> {
        match &self.registry_path {
            Some(path) => registry.save(path),
            None => Ok(()),
        }
    }
}

/// Callback pointers placed in a filter parameter block.
#[derive(Debug, Clone, Copy)]
pub struct NativeCallbacks {
    /// `sSPBasic`.
    pub basic: *const SPBasicSuite,
    /// `bufferProcs`.
    pub buffer_procs: *const BufferProcs,
    /// `handleProcs`.
    pub handle_procs: *const HandleProcs,
    /// `abortProc`.
    pub abort_proc: unsafe extern "C" fn() -> u8,
    /// `progressProc`.
    pub progress_proc: unsafe extern "C" fn(i32, i32),
}

impl NativeCallbacks {
    pub(crate) fn new() -> Self {
        Self {
            basic: &BASIC_SUITE,
            buffer_procs: &BUFFER_PROCS,
            handle_procs: &HANDLE_PROCS,
            abort_proc,
            progress_proc,
        }
    }
}
