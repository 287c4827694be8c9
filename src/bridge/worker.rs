//! The worker loop run by `filterbridge-worker`.

use super::cancel::CancelEvent;
use super::client::BridgeClient;
use super::{BridgeConfig, BridgeError};
use crate::execution::{ExecutionEngine, ExecutionError, FilterRequest, ParameterBlockFactory};
use crate::host::{HostWindow, OwnedSurface, PixelFormat};
use crate::observability::instrument_invocation;
use crate::plugin::{FilterCase, PluginModule};
use crate::suites::SuiteConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit code after a failure reported with `SetErrorInfo`.
pub const EXIT_FAILED: i32 = 1;
/// Exit code when the filter was cancelled.
pub const EXIT_CANCELLED: i32 = 3;

/// Run the invocation the host describes and return the process exit code.
///
/// The filter runs on a dedicated `filterbridge-ui` thread, which owns the
/// native window context for the duration of the call. Failures are
/// reported to the host before returning.
pub fn run_worker(
    client: &BridgeClient,
    cancel: Option<CancelEvent>,
    factory: Option<&(dyn ParameterBlockFactory + Sync)>,
) -> i32 {
    let abort = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(AtomicBool::new(false));
    let watcher = cancel.and_then(|event| {
        Arc::new(event)
            .spawn_watcher(Arc::clone(&abort), Arc::clone(&stop))
            .inspect_err(|e| tracing::warn!("cannot watch for cancellation: {}", e))
            .ok()
    });

    let result = std::thread::scope(|scope| -> Result<(), ExecutionError> {
        let ui = std::thread::Builder::new()
            .name("filterbridge-ui".into())
            .spawn_scoped(scope, || invoke(client, factory, &abort))
            .map_err(BridgeError::from)?;
        ui.join()
            .unwrap_or_else(|_| Err(BridgeError::Protocol("filter thread panicked".into()).into()))
    });

    stop.store(true, Ordering::Release);
    if let Some(watcher) = watcher {
        let _ = watcher.join();
    }

    match result {
        Ok(()) => 0,
        Err(ExecutionError::Cancelled) => {
            tracing::debug!("filter cancelled");
            EXIT_CANCELLED
        }
        Err(e) => {
            tracing::error!("filter failed: {}", e);
            if let Err(report) = client.set_error_info(&e.to_string(), &format!("{e:?}")) {
                tracing::error!("cannot report error to host: {}", report);
            }
            EXIT_FAILED
        }
    }
}

fn invoke(
    client: &BridgeClient,
    factory: Option<&(dyn ParameterBlockFactory + Sync)>,
    abort: &Arc<AtomicBool>,
) -> Result<(), ExecutionError> {
    let descriptor = client.plugin_data()?;
    let settings = client.settings()?;
    let _span = instrument_invocation(descriptor.title(), descriptor.entry_point(), "worker");
    let factory = factory.ok_or(ExecutionError::NoParameterBlocks)?;

    let ui = HostWindow {
        parent: settings.parent_window as isize,
        about_only: settings.about_only,
    };
    let suites = SuiteConfig {
        buffer_limit: settings.buffer_limit.map(|limit| limit as usize),
        registry_path: None,
    };
    let mut engine = ExecutionEngine::new(suites, BridgeConfig::default());
    // SAFETY: the host routed this module here after discovery accepted it.
    let module = unsafe { PluginModule::load(&descriptor) }?;
    let registry = client.registry()?.unwrap_or_default();

    if settings.about_only {
        let nothing = OwnedSurface::new(0, 0, PixelFormat::Gray8);
        let request = FilterRequest::new(&nothing).with_ui(&ui);
        // SAFETY: as above.
        unsafe { engine.run_module_with_registry(&module, &descriptor, &request, factory, registry) }?;
        return Ok(());
    }

    let case = FilterCase::from_i16(settings.filter_case).unwrap_or(FilterCase::FlatImageNoSelection);
    let source = client.source_image()?;
    let mask = client.selection_mask()?;
    let backdrop = if case.has_transparency() {
        Some(client.checkerboard()?)
    } else {
        None
    };

    let progress = client.clone();
    let mut request = FilterRequest::new(&source)
        .with_ui(&ui)
        .with_metadata(client)
        .with_transparency(case.has_transparency())
        .with_abort_flag(Arc::clone(abort))
        .with_progress(move |done, total| {
            if let Err(e) = progress.update_progress(done, total) {
                tracing::debug!("progress not delivered: {}", e);
            }
        });
    if let Some(mask) = &mask {
        request = request.with_mask(mask);
    }
    if let Some(backdrop) = &backdrop {
        request = request.with_backdrop(backdrop);
    }
    request.parameters = client.filter_parameters()?;
    request.show_dialog = settings.show_dialog;

    // SAFETY: as above.
    let (output, registry) =
        unsafe { engine.run_module_with_registry(&module, &descriptor, &request, factory, registry) }?;

    if let Some(destination) = &output.destination {
        client.set_destination(destination)?;
    }
    if let Some(parameters) = &output.parameters {
        client.set_filter_parameters(parameters)?;
    }
    client.set_registry(&registry)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_host_fails() {
        let dir = tempfile::tempdir().unwrap();
        let client = BridgeClient::new(dir.path().join("absent.sock"), dir.path());
        assert_eq!(run_worker(&client, None, None), EXIT_FAILED);
    }
}
