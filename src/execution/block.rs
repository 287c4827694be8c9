//! The filter parameter block collaborator.
//!
//! The native `FilterRecord` layout belongs to the host application; the
//! engine only needs a pointer to pass with each selector, a way to ask
//! whether the filter wants another `Continue`, and the results.

use super::ExecutionError;
use super::mode::Selector;
use crate::host::{ImageSurface, MetadataProvider, OwnedSurface};
use crate::plugin::{FilterCase, PluginDescriptor};
use crate::suites::NativeCallbacks;
use std::ffi::c_void;

/// What a filter produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutput {
    /// Result image; `None` when only the About box was shown.
    pub destination: Option<OwnedSurface>,
    /// Parameters to hand back on the next run.
    pub parameters: Option<Vec<u8>>,
}

/// Inputs for building a parameter block.
#[derive(Clone, Copy)]
pub struct BlockContext<'a> {
    /// Filter being run.
    pub descriptor: &'a PluginDescriptor,
    /// Suite and callback pointers of the active session.
    pub callbacks: NativeCallbacks,
    /// Source image.
    pub source: &'a dyn ImageSurface,
    /// Selection mask.
    pub mask: Option<&'a dyn ImageSurface>,
    /// Backdrop for transparent pixels.
    pub backdrop: Option<&'a dyn ImageSurface>,
    /// Document metadata, fetched at most once per kind.
    pub metadata: &'a dyn MetadataProvider,
    /// Parameters saved by the previous run.
    pub parameters: Option<&'a [u8]>,
    /// Parent window for dialogs.
    pub parent_window: isize,
    /// The case the filter is invoked in.
    pub filter_case: FilterCase,
}

/// Inputs for building an About record.
#[derive(Clone, Copy)]
pub struct AboutContext<'a> {
    /// Filter whose About box is shown.
    pub descriptor: &'a PluginDescriptor,
    /// Suite and callback pointers of the active session.
    pub callbacks: NativeCallbacks,
    /// Parent window for the box.
    pub parent_window: isize,
}

/// A native parameter block for one invocation.
pub trait ParameterBlock {
    /// Update the block for `selector` and return the record pointer.
    fn prepare(&mut self, selector: Selector) -> *mut c_void;

    /// Whether the filter asked for another `Continue`.
    fn wants_continue(&self) -> bool {
        false
    }

    /// Consume the block after `Finish`.
    fn into_output(self: Box<Self>) -> FilterOutput;
}

/// Builds parameter blocks.
pub trait ParameterBlockFactory {
    /// A block for the filter selectors.
    fn create<'a>(&self, ctx: BlockContext<'a>) -> Result<Box<dyn ParameterBlock + 'a>, ExecutionError>;

    /// A block for the About selector.
    fn about<'a>(&self, ctx: AboutContext<'a>) -> Result<Box<dyn ParameterBlock + 'a>, ExecutionError>;
}

impl std::fmt::Debug for BlockContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockContext")
            .field("entry_point", &self.descriptor.entry_point())
            .field("width", &self.source.width())
            .field("height", &self.source.height())
            .field("mask", &self.mask.is_some())
            .field("filter_case", &self.filter_case)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for AboutContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AboutContext")
            .field("entry_point", &self.descriptor.entry_point())
            .field("parent_window", &self.parent_window)
            .finish_non_exhaustive()
    }
}
