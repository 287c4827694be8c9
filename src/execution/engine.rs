//! Runs filters in process or through the bridge.

use super::block::{AboutContext, BlockContext, FilterOutput, ParameterBlock, ParameterBlockFactory};
use super::mode::{ExecutionMode, Selector};
use super::{ExecutionError, USER_CANCELED};
use crate::arch::Architecture;
use crate::bridge::{BridgeConfig, BridgeError, BridgeHost, EXIT_CANCELLED, WorkerSettings};
use crate::host::{CachedMetadata, HostUi, HostWindow, ImageSurface, MetadataProvider, NoMetadata};
use crate::observability::{instrument_invocation, trace_selector};
use crate::plugin::{PluginDescriptor, PluginModule};
use crate::suites::{DescriptorRegistry, NativeCallbacks, SuiteConfig, SuiteSession};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use crate::bridge::SharedProgress;

static NO_METADATA: NoMetadata = NoMetadata;
static NO_UI: HostWindow = HostWindow {
    parent: 0,
    about_only: false,
};

/// Everything the host hands one filter invocation.
pub struct FilterRequest<'a> {
    /// Source image.
    pub source: &'a (dyn ImageSurface + Sync),
    /// Selection mask.
    pub mask: Option<&'a (dyn ImageSurface + Sync)>,
    /// Backdrop for transparent pixels; generated when absent.
    pub backdrop: Option<&'a (dyn ImageSurface + Sync)>,
    /// Whether the layer has transparency.
    pub has_transparency: bool,
    /// Document metadata.
    pub metadata: &'a (dyn MetadataProvider + Sync),
    /// Parent window and About-only flag.
    pub ui: &'a dyn HostUi,
    /// Show the filter's dialog even when parameters are available.
    pub show_dialog: bool,
    /// Parameters saved by the previous run.
    pub parameters: Option<Vec<u8>>,
    /// Progress callback.
    pub progress: Option<SharedProgress>,
    /// Set to ask the filter to stop.
    pub abort: Arc<AtomicBool>,
}

impl<'a> FilterRequest<'a> {
    /// A request to filter `source` with no selection, metadata or UI.
    pub fn new(source: &'a (dyn ImageSurface + Sync)) -> Self {
        Self {
            source,
            mask: None,
            backdrop: None,
            has_transparency: false,
            metadata: &NO_METADATA,
            ui: &NO_UI,
            show_dialog: true,
            parameters: None,
            progress: None,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Restrict the filter to a selection.
    pub fn with_mask(mut self, mask: &'a (dyn ImageSurface + Sync)) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Provide the backdrop for transparent pixels.
    pub fn with_backdrop(mut self, backdrop: &'a (dyn ImageSurface + Sync)) -> Self {
        self.backdrop = Some(backdrop);
        self
    }

    /// Mark the layer as transparent.
    pub fn with_transparency(mut self, has_transparency: bool) -> Self {
        self.has_transparency = has_transparency;
        self
    }

    /// Provide document metadata.
    pub fn with_metadata(mut self, metadata: &'a (dyn MetadataProvider + Sync)) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the UI shell.
    pub fn with_ui(mut self, ui: &'a dyn HostUi) -> Self {
        self.ui = ui;
        self
    }

    /// Re-run with `parameters` from a previous run, without a dialog.
    pub fn with_saved_parameters(mut self, parameters: Vec<u8>) -> Self {
        self.parameters = Some(parameters);
        self.show_dialog = false;
        self
    }

    /// Report progress to `progress`.
    pub fn with_progress(mut self, progress: impl Fn(i32, i32) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Use `abort` as the cancellation flag.
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    fn sends_parameters(&self) -> bool {
        self.show_dialog || self.parameters.is_none()
    }
}

impl std::fmt::Debug for FilterRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRequest")
            .field("width", &self.source.width())
            .field("height", &self.source.height())
            .field("mask", &self.mask.is_some())
            .field("has_transparency", &self.has_transparency)
            .field("show_dialog", &self.show_dialog)
            .field("parameters", &self.parameters.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

/// Routes and runs filter invocations.
///
/// Remembers which About boxes were shown, so each entry point shows its
/// About box at most once per engine.
#[derive(Debug, Default)]
pub struct ExecutionEngine {
    suites: SuiteConfig,
    bridge: BridgeConfig,
    about_shown: HashSet<(PathBuf, String)>,
}

impl ExecutionEngine {
    /// An engine with the given suite and bridge settings.
    pub fn new(suites: SuiteConfig, bridge: BridgeConfig) -> Self {
        Self {
            suites,
            bridge,
            about_shown: HashSet::new(),
        }
    }

    /// Suite settings.
    pub fn suites(&self) -> &SuiteConfig {
        &self.suites
    }

    /// Bridge settings.
    pub fn bridge(&self) -> &BridgeConfig {
        &self.bridge
    }

    /// Decide where `descriptor` runs.
    pub fn route(&self, descriptor: &PluginDescriptor) -> Result<ExecutionMode, ExecutionError> {
        let arch = descriptor.architecture();
        if arch.runs_in_process() {
            Ok(ExecutionMode::InProcess)
        } else if Architecture::host().accepts(arch) {
            Ok(ExecutionMode::Bridged(arch))
        } else {
            Err(ExecutionError::Unsupported(arch))
        }
    }

    /// Whether the About box of `descriptor` was already shown.
    pub fn about_shown(&self, descriptor: &PluginDescriptor) -> bool {
        self.about_shown.contains(&about_key(descriptor))
    }

    fn mark_about_shown(&mut self, descriptor: &PluginDescriptor) {
        for entry in about_entry_points(descriptor) {
            self.about_shown
                .insert((descriptor.path().to_path_buf(), entry.to_string()));
        }
    }

    /// Run `descriptor` on `request`.
    ///
    /// # Safety
    ///
    /// In-process execution loads the module and calls into it; the module
    /// must be trusted to follow the filter ABI.
    pub unsafe fn run(
        &mut self,
        descriptor: &PluginDescriptor,
        request: &FilterRequest<'_>,
        factory: &dyn ParameterBlockFactory,
    ) -> Result<FilterOutput, ExecutionError> {
        match self.route(descriptor)? {
            ExecutionMode::InProcess => {
                // SAFETY: forwarded from the caller.
                let module = unsafe { PluginModule::load(descriptor) }?;
                // SAFETY: as above.
                unsafe { self.run_module(&module, descriptor, request, factory) }
            }
            ExecutionMode::Bridged(arch) => self.run_bridged(arch, descriptor, request),
        }
    }

    /// Run `descriptor` from an already loaded `module`, loading and saving
    /// the configured descriptor registry around it.
    ///
    /// # Safety
    ///
    /// The module's entry points must follow the filter ABI for the blocks
    /// `factory` builds.
    pub unsafe fn run_module(
        &mut self,
        module: &PluginModule,
        descriptor: &PluginDescriptor,
        request: &FilterRequest<'_>,
        factory: &dyn ParameterBlockFactory,
    ) -> Result<FilterOutput, ExecutionError> {
        let registry = self.suites.load_registry()?;
        // SAFETY: forwarded from the caller.
        let (output, registry) =
            unsafe { self.run_module_with_registry(module, descriptor, request, factory, registry) }?;
        self.suites.save_registry(&registry)?;
        Ok(output)
    }

    /// Run `descriptor` from `module` with `registry` visible to the
    /// registry suite, returning the registry as the filter left it.
    ///
    /// # Safety
    ///
    /// See [`run_module`](Self::run_module).
    pub unsafe fn run_module_with_registry(
        &mut self,
        module: &PluginModule,
        descriptor: &PluginDescriptor,
        request: &FilterRequest<'_>,
        factory: &dyn ParameterBlockFactory,
        registry: DescriptorRegistry,
    ) -> Result<(FilterOutput, DescriptorRegistry), ExecutionError> {
        let about_only = request.ui.about_only();
        if about_only && self.about_shown(descriptor) {
            tracing::debug!("About box of {} already shown", descriptor.title());
            return Ok((FilterOutput::default(), registry));
        }
        let _span = instrument_invocation(
            descriptor.title(),
            descriptor.entry_point(),
            ExecutionMode::InProcess.label(),
        );

        let mut session = SuiteSession::new(&self.suites)
            .with_plugin_name(descriptor.title())
            .with_terminology(descriptor.aete().cloned())
            .with_parent_window(request.ui.parent_window())
            .with_abort_flag(Arc::clone(&request.abort))
            .with_registry(registry);
        if let Some(progress) = &request.progress {
            let progress = Arc::clone(progress);
            session = session.with_progress(move |done, total| progress(done, total));
        }

        let active = session.activate()?;
        let callbacks = active.callbacks();
        let invocation = Invocation {
            module,
            descriptor,
            callbacks,
            data: 0,
        };
        let result = if about_only {
            let pending: Vec<&str> = about_entry_points(descriptor)
                .filter(|entry| !self.about_shown.contains(&(descriptor.path().to_path_buf(), entry.to_string())))
                .collect();
            // SAFETY: forwarded from the caller; the session is active.
            unsafe { invocation.about(&pending, request, factory) }
        } else {
            // SAFETY: as above.
            unsafe { invocation.filter(request, factory) }
        };
        let session = active.finish()?;
        let output = result?;

        if about_only {
            self.mark_about_shown(descriptor);
        }
        Ok((output, session.into_registry()))
    }

    /// Run `descriptor` in the bridge worker for `arch`.
    pub fn run_bridged(
        &mut self,
        arch: Architecture,
        descriptor: &PluginDescriptor,
        request: &FilterRequest<'_>,
    ) -> Result<FilterOutput, ExecutionError> {
        let about_only = request.ui.about_only();
        if about_only && self.about_shown(descriptor) {
            tracing::debug!("About box of {} already shown", descriptor.title());
            return Ok(FilterOutput::default());
        }
        let worker = self.bridge.worker_for(arch).ok_or(BridgeError::NoWorker(arch))?;
        let runtime_dir = self.bridge.ensure_runtime_dir()?;
        let _span = instrument_invocation(
            descriptor.title(),
            descriptor.entry_point(),
            ExecutionMode::Bridged(arch).label(),
        );

        let filter_case = descriptor.filter_case_for(request.mask.is_some(), request.has_transparency);
        let settings = WorkerSettings {
            parent_window: request.ui.parent_window() as i64,
            about_only,
            show_dialog: request.sends_parameters(),
            filter_case: filter_case as i16,
            buffer_limit: self.suites.buffer_limit.map(|limit| limit as u64),
        };
        let registry = self.suites.load_registry()?;

        let host = BridgeHost::new(runtime_dir, descriptor, &settings, request.source)?
            .with_mask(request.mask)
            .with_backdrop(request.backdrop)
            .with_metadata(request.metadata)
            .with_progress(request.progress.clone())
            .with_parameters(request.parameters.clone())
            .with_registry(&registry)?;

        let outcome = match host.run(worker, &self.bridge, &request.abort) {
            Ok(outcome) => outcome,
            Err(BridgeError::WorkerFailed(status)) if status.code() == Some(EXIT_CANCELLED) => {
                return Err(ExecutionError::Cancelled);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(registry) = &outcome.registry {
            self.suites.save_registry(registry)?;
        }
        if about_only {
            self.mark_about_shown(descriptor);
        } else if outcome.destination.is_none() {
            return Err(BridgeError::Protocol("worker returned no destination image".into()).into());
        }
        Ok(FilterOutput {
            destination: outcome.destination,
            parameters: outcome.parameters,
        })
    }
}

fn about_key(descriptor: &PluginDescriptor) -> (PathBuf, String) {
    (descriptor.path().to_path_buf(), descriptor.entry_point().to_string())
}

/// The descriptor's own entry point, then the rest of its module's.
///
/// The About box of a multi-filter module covers the whole module, so every
/// entry point gets the About selector once.
fn about_entry_points(descriptor: &PluginDescriptor) -> impl Iterator<Item = &str> {
    let own = descriptor.entry_point();
    std::iter::once(own).chain(
        descriptor
            .module_entry_points()
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
            .filter(move |entry| *entry != own),
    )
}

/// Map a selector result to an error.
pub fn check_result(selector: Selector, result: i16) -> Result<(), ExecutionError> {
    match result {
        0 => Ok(()),
        USER_CANCELED => Err(ExecutionError::Cancelled),
        code => Err(ExecutionError::Plugin { selector, code }),
    }
}

/// One entry point called through one active session.
struct Invocation<'m> {
    module: &'m PluginModule,
    descriptor: &'m PluginDescriptor,
    callbacks: NativeCallbacks,
    data: isize,
}

impl Invocation<'_> {
    /// # Safety
    ///
    /// A session must be active and the block must match the entry point.
    unsafe fn call(&mut self, block: &mut dyn ParameterBlock, selector: Selector) -> Result<(), ExecutionError> {
        let descriptor = self.descriptor;
        // SAFETY: forwarded from the caller.
        unsafe { self.call_entry(descriptor.entry_point(), block, selector) }
    }

    /// # Safety
    ///
    /// See [`call`](Self::call).
    unsafe fn call_entry(
        &mut self,
        entry: &str,
        block: &mut dyn ParameterBlock,
        selector: Selector,
    ) -> Result<(), ExecutionError> {
        let record = block.prepare(selector);
        // SAFETY: forwarded from the caller.
        let result = unsafe { self.module.call(entry, selector.code(), record, &mut self.data) }?;
        trace_selector(entry, selector.code(), result);
        check_result(selector, result)
    }

    /// Send the About selector to each of `entries`, stopping at the first
    /// failure.
    unsafe fn about(
        mut self,
        entries: &[&str],
        request: &FilterRequest<'_>,
        factory: &dyn ParameterBlockFactory,
    ) -> Result<FilterOutput, ExecutionError> {
        let mut block = factory.about(AboutContext {
            descriptor: self.descriptor,
            callbacks: self.callbacks,
            parent_window: request.ui.parent_window(),
        })?;
        for entry in entries {
            // SAFETY: forwarded from the caller.
            unsafe { self.call_entry(entry, block.as_mut(), Selector::About) }?;
        }
        Ok(FilterOutput::default())
    }

    unsafe fn filter(
        mut self,
        request: &FilterRequest<'_>,
        factory: &dyn ParameterBlockFactory,
    ) -> Result<FilterOutput, ExecutionError> {
        let metadata = CachedMetadata::new(request.metadata);
        let filter_case = self
            .descriptor
            .filter_case_for(request.mask.is_some(), request.has_transparency);
        let mut block = factory.create(BlockContext {
            descriptor: self.descriptor,
            callbacks: self.callbacks,
            source: request.source,
            mask: request.mask.map(|m| m as &dyn ImageSurface),
            backdrop: request.backdrop.map(|b| b as &dyn ImageSurface),
            metadata: &metadata,
            parameters: request.parameters.as_deref(),
            parent_window: request.ui.parent_window(),
            filter_case,
        })?;

        // SAFETY (all calls below): forwarded from the caller.
        if request.sends_parameters() {
            unsafe { self.call(block.as_mut(), Selector::Parameters) }?;
        }
        unsafe { self.call(block.as_mut(), Selector::Prepare) }?;
        unsafe { self.call(block.as_mut(), Selector::Start) }?;
        while block.wants_continue() {
            if request.abort.load(Ordering::Acquire) {
                return Err(ExecutionError::Cancelled);
            }
            unsafe { self.call(block.as_mut(), Selector::Continue) }?;
        }
        unsafe { self.call(block.as_mut(), Selector::Finish) }?;
        Ok(block.into_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ImageSurfaceMut, OwnedSurface, PixelFormat};
    use crate::plugin::PluginEntryFn;
    use std::ffi::c_void;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[repr(C)]
    struct TestRecord {
        selectors: [i16; 16],
        count: usize,
        rows_done: u32,
        height: u32,
        row: *mut u8,
        row_len: usize,
        parameter: u8,
        progress: unsafe extern "C" fn(i32, i32),
        test_abort: unsafe extern "C" fn() -> u8,
    }

    struct TestBlock {
        record: TestRecord,
        destination: OwnedSurface,
    }

    impl ParameterBlock for TestBlock {
        fn prepare(&mut self, _selector: Selector) -> *mut c_void {
            if self.record.rows_done < self.record.height {
                let row = self.destination.row_mut(self.record.rows_done);
                self.record.row = row.as_mut_ptr();
                self.record.row_len = row.len();
            }
            (&mut self.record as *mut TestRecord).cast()
        }

        fn wants_continue(&self) -> bool {
            self.record.rows_done < self.record.height
        }

        fn into_output(self: Box<Self>) -> FilterOutput {
            FilterOutput {
                destination: Some(self.destination),
                parameters: Some(vec![self.record.parameter]),
            }
        }
    }

    struct AboutBlock(TestRecord);

    impl ParameterBlock for AboutBlock {
        fn prepare(&mut self, _selector: Selector) -> *mut c_void {
            (&mut self.0 as *mut TestRecord).cast()
        }

        fn into_output(self: Box<Self>) -> FilterOutput {
            FilterOutput::default()
        }
    }

    struct TestFactory;

    fn record(callbacks: &NativeCallbacks, height: u32, parameter: u8) -> TestRecord {
        TestRecord {
            selectors: [-1; 16],
            count: 0,
            rows_done: 0,
            height,
            row: std::ptr::null_mut(),
            row_len: 0,
            parameter,
            progress: callbacks.progress_proc,
            test_abort: callbacks.abort_proc,
        }
    }

    impl ParameterBlockFactory for TestFactory {
        fn create<'a>(&self, ctx: BlockContext<'a>) -> Result<Box<dyn ParameterBlock + 'a>, ExecutionError> {
            let parameter = ctx.parameters.and_then(|p| p.first().copied()).unwrap_or(0);
            Ok(Box::new(TestBlock {
                record: record(&ctx.callbacks, ctx.source.height(), parameter),
                destination: OwnedSurface::from_surface(ctx.source),
            }))
        }

        fn about<'a>(&self, ctx: AboutContext<'a>) -> Result<Box<dyn ParameterBlock + 'a>, ExecutionError> {
            Ok(Box::new(AboutBlock(record(&ctx.callbacks, 0, 0))))
        }
    }

    static ABOUT_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn fill(selector: i16, record: *mut c_void, data: *mut isize, result: *mut i16) {
        unsafe {
            let record = &mut *record.cast::<TestRecord>();
            record.selectors[record.count] = selector;
            record.count += 1;
            *data += 1;
            *result = 0;
            match selector {
                0 => {
                    ABOUT_CALLS.fetch_add(1, Ordering::SeqCst);
                }
                1 => record.parameter = 42,
                4 => {
                    if (record.test_abort)() != 0 {
                        *result = USER_CANCELED;
                        return;
                    }
                    std::slice::from_raw_parts_mut(record.row, record.row_len).fill(record.parameter);
                    record.rows_done += 1;
                    (record.progress)(record.rows_done as i32, record.height as i32);
                }
                _ => {}
            }
        }
    }

    unsafe extern "C" fn failing(selector: i16, _record: *mut c_void, _data: *mut isize, result: *mut i16) {
        unsafe { *result = if selector == 3 { -108 } else { 0 } };
    }

    fn module() -> PluginModule {
        PluginModule::from_entry_points(
            "/mem/fill.8bf",
            [
                ("Fill".to_string(), fill as PluginEntryFn),
                ("Failing".to_string(), failing as PluginEntryFn),
            ],
        )
    }

    fn descriptor(entry_point: &str) -> PluginDescriptor {
        PluginDescriptor::builder("/mem/fill.8bf", entry_point, Architecture::host())
            .category("Tests")
            .title(entry_point)
            .build()
            .unwrap()
    }

    #[test]
    fn test_route() {
        let engine = ExecutionEngine::default();
        assert_eq!(engine.route(&descriptor("Fill")).unwrap(), ExecutionMode::InProcess);

        let unknown = PluginDescriptor::builder("/p.8bf", "Main", Architecture::Unknown)
            .category("c")
            .title("t")
            .build()
            .unwrap();
        assert!(matches!(engine.route(&unknown), Err(ExecutionError::Unsupported(Architecture::Unknown))));

        if Architecture::host() == Architecture::X64 {
            let x86 = PluginDescriptor::builder("/p.8bf", "Main", Architecture::X86)
                .category("c")
                .title("t")
                .build()
                .unwrap();
            assert_eq!(engine.route(&x86).unwrap(), ExecutionMode::Bridged(Architecture::X86));
        }
    }

    #[test]
    fn test_selector_sequence_and_output() {
        let source = OwnedSurface::new(2, 3, PixelFormat::Gray8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let request = FilterRequest::new(&source).with_progress(move |d, t| sink.lock().unwrap().push((d, t)));

        let mut engine = ExecutionEngine::default();
        let output = unsafe { engine.run_module(&module(), &descriptor("Fill"), &request, &TestFactory) }.unwrap();

        let destination = output.destination.unwrap();
        for y in 0..3 {
            assert_eq!(destination.row(y), &[42, 42]);
        }
        assert_eq!(output.parameters, Some(vec![42]));
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_saved_parameters_skip_dialog() {
        let source = OwnedSurface::new(1, 1, PixelFormat::Gray8);
        let request = FilterRequest::new(&source).with_saved_parameters(vec![7]);
        let mut engine = ExecutionEngine::default();
        let output = unsafe { engine.run_module(&module(), &descriptor("Fill"), &request, &TestFactory) }.unwrap();
        assert_eq!(output.destination.unwrap().row(0), &[7]);
        assert_eq!(output.parameters, Some(vec![7]));
    }

    #[test]
    fn test_plugin_error_code() {
        let source = OwnedSurface::new(1, 1, PixelFormat::Gray8);
        let request = FilterRequest::new(&source);
        let mut engine = ExecutionEngine::default();
        let err = unsafe { engine.run_module(&module(), &descriptor("Failing"), &request, &TestFactory) }.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Plugin {
                selector: Selector::Start,
                code: -108
            }
        ));
    }

    #[test]
    fn test_abort_cancels() {
        let source = OwnedSurface::new(1, 4, PixelFormat::Gray8);
        let request = FilterRequest::new(&source).with_abort_flag(Arc::new(AtomicBool::new(true)));
        let mut engine = ExecutionEngine::default();
        let err = unsafe { engine.run_module(&module(), &descriptor("Fill"), &request, &TestFactory) }.unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled));
        assert_eq!(check_result(Selector::Continue, USER_CANCELED).unwrap_err().to_string(), "cancelled by the user");
    }

    #[test]
    fn test_about_shown_once() {
        let source = OwnedSurface::new(1, 1, PixelFormat::Gray8);
        let ui = HostWindow {
            parent: 7,
            about_only: true,
        };
        let request = FilterRequest::new(&source).with_ui(&ui);
        let descriptor = descriptor("Fill");
        let mut engine = ExecutionEngine::default();

        let before = ABOUT_CALLS.load(Ordering::SeqCst);
        let first = unsafe { engine.run_module(&module(), &descriptor, &request, &TestFactory) }.unwrap();
        assert_eq!(first, FilterOutput::default());
        assert!(engine.about_shown(&descriptor));
        unsafe { engine.run_module(&module(), &descriptor, &request, &TestFactory) }.unwrap();
        assert_eq!(ABOUT_CALLS.load(Ordering::SeqCst), before + 1);
    }

    static FIRST_ABOUTS: AtomicUsize = AtomicUsize::new(0);
    static SECOND_ABOUTS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn first(selector: i16, _record: *mut c_void, _data: *mut isize, result: *mut i16) {
        if selector == 0 {
            FIRST_ABOUTS.fetch_add(1, Ordering::SeqCst);
        }
        unsafe { *result = 0 };
    }

    unsafe extern "C" fn second(selector: i16, _record: *mut c_void, _data: *mut isize, result: *mut i16) {
        if selector == 0 {
            SECOND_ABOUTS.fetch_add(1, Ordering::SeqCst);
        }
        unsafe { *result = 0 };
    }

    #[test]
    fn test_about_reaches_every_module_entry_point() {
        let module = PluginModule::from_entry_points(
            "/mem/pack.8bf",
            [
                ("First".to_string(), first as PluginEntryFn),
                ("Second".to_string(), second as PluginEntryFn),
            ],
        );
        let entries = vec!["First".to_string(), "Second".to_string()];
        let build = |entry: &str| {
            PluginDescriptor::builder("/mem/pack.8bf", entry, Architecture::host())
                .category("Tests")
                .title(entry)
                .build()
                .unwrap()
                .with_module_entry_points(entries.clone())
        };
        let (first_filter, second_filter) = (build("First"), build("Second"));

        let source = OwnedSurface::new(1, 1, PixelFormat::Gray8);
        let ui = HostWindow {
            parent: 0,
            about_only: true,
        };
        let request = FilterRequest::new(&source).with_ui(&ui);
        let mut engine = ExecutionEngine::default();

        unsafe { engine.run_module(&module, &first_filter, &request, &TestFactory) }.unwrap();
        assert_eq!(FIRST_ABOUTS.load(Ordering::SeqCst), 1);
        assert_eq!(SECOND_ABOUTS.load(Ordering::SeqCst), 1);
        assert!(engine.about_shown(&second_filter));

        unsafe { engine.run_module(&module, &second_filter, &request, &TestFactory) }.unwrap();
        assert_eq!(FIRST_ABOUTS.load(Ordering::SeqCst), 1);
        assert_eq!(SECOND_ABOUTS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_saved_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.bin");
        let mut engine = ExecutionEngine::new(
            SuiteConfig::default().with_registry_path(&path),
            BridgeConfig::default(),
        );
        let source = OwnedSurface::new(1, 1, PixelFormat::Gray8);
        unsafe { engine.run_module(&module(), &descriptor("Fill"), &FilterRequest::new(&source), &TestFactory) }
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_bridged_without_worker() {
        let source = OwnedSurface::new(1, 1, PixelFormat::Gray8);
        let mut engine = ExecutionEngine::default();
        let err = engine
            .run_bridged(Architecture::X86, &descriptor("Fill"), &FilterRequest::new(&source))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Bridge(BridgeError::NoWorker(Architecture::X86))));
    }
}
