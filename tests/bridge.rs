//! A host and a worker client talking over a real socket.

use filterbridge::arch::Architecture;
use filterbridge::bridge::{BridgeClient, BridgeError, BridgeHost, EXIT_FAILED, WorkerSettings, run_worker};
use filterbridge::fourcc::fourcc;
use filterbridge::host::{
    ImageSurface, ImageSurfaceMut, MetadataProvider, OwnedSurface, PixelFormat, checkerboard,
};
use filterbridge::plugin::PluginDescriptor;
use filterbridge::suites::{ActionDescriptor, ActionValue, DescriptorRegistry};
use filterbridge::testing::gradient_surface;
use std::os::unix::net::{UnixListener, UnixStream};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Document;

impl MetadataProvider for Document {
    fn exif(&self) -> Option<Vec<u8>> {
        Some(b"Exif\0\0MM".to_vec())
    }

    fn xmp(&self) -> Option<Vec<u8>> {
        None
    }

    fn icc_profile(&self) -> Option<Vec<u8>> {
        Some(vec![0; 128])
    }
}

fn descriptor() -> PluginDescriptor {
    PluginDescriptor::builder("/plugins/x86/ripple.8bf", "RippleMain", Architecture::X86)
        .category("Distort")
        .title("Ripple")
        .build()
        .unwrap()
}

fn registry(amount: i32) -> DescriptorRegistry {
    let mut settings = ActionDescriptor::new();
    settings.put(fourcc(b"Amnt"), ActionValue::Integer(amount));
    let mut registry = DescriptorRegistry::new();
    registry.register("com.example.ripple", settings, true);
    registry
}

/// Serve `host` on `socket` while `worker` runs on this thread.
fn serve_while<R>(host: &mut BridgeHost<'_>, socket: &Path, worker: impl FnOnce() -> R) -> R {
    let listener = UnixListener::bind(socket).unwrap();
    let stop = AtomicBool::new(false);
    std::thread::scope(|scope| {
        let server = scope.spawn(|| host.serve(&listener, &stop, Some(Duration::from_secs(5))));
        let result = worker();
        stop.store(true, Ordering::Release);
        let _ = UnixStream::connect(socket);
        server.join().unwrap();
        result
    })
}

#[test]
fn test_full_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("host.sock");
    let source = gradient_surface(8, 4);
    let mut mask = OwnedSurface::new(8, 4, PixelFormat::Gray8);
    mask.row_mut(2).fill(0xFF);
    let settings = WorkerSettings {
        show_dialog: true,
        filter_case: 2,
        ..WorkerSettings::default()
    };

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut host = BridgeHost::new(dir.path(), &descriptor(), &settings, &source)
        .unwrap()
        .with_mask(Some(&mask))
        .with_metadata(&Document)
        .with_parameters(Some(b"saved".to_vec()))
        .with_progress(Some(Arc::new(move |done: i32, total: i32| sink.lock().unwrap().push((done, total)))))
        .with_registry(&registry(10))
        .unwrap();

    let mut result = OwnedSurface::from_surface(&source);
    for y in 0..result.height() {
        for byte in result.row_mut(y) {
            *byte = !*byte;
        }
    }

    serve_while(&mut host, &socket, || {
        let client = BridgeClient::new(&socket, dir.path());
        assert_eq!(client.plugin_data().unwrap(), descriptor());
        assert_eq!(client.settings().unwrap(), settings);

        assert_eq!(client.source_image().unwrap(), source);
        assert_eq!(client.selection_mask().unwrap(), Some(mask.clone()));
        assert_eq!(client.checkerboard().unwrap(), checkerboard(8, 4));

        assert_eq!(client.exif().unwrap().as_deref(), Some(&b"Exif\0\0MM"[..]));
        assert_eq!(client.xmp().unwrap(), None);
        assert_eq!(client.icc_profile().unwrap().map(|p| p.len()), Some(128));
        assert_eq!(client.filter_parameters().unwrap().as_deref(), Some(&b"saved"[..]));
        assert_eq!(client.registry().unwrap(), Some(registry(10)));

        client.update_progress(1, 4).unwrap();
        client.update_progress(4, 4).unwrap();
        client.set_destination(&result).unwrap();
        client.set_filter_parameters(b"updated").unwrap();
        client.set_registry(&registry(25)).unwrap();
    });

    assert_eq!(host.live_mappings(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![(1, 4), (4, 4)]);

    let outcome = host.finish(ExitStatus::from_raw(0)).unwrap();
    assert_eq!(outcome.destination, Some(result));
    assert_eq!(outcome.parameters.as_deref(), Some(&b"updated"[..]));
    assert_eq!(outcome.registry, Some(registry(25)));
}

#[test]
fn test_worker_without_parameter_blocks_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("host.sock");
    let source = gradient_surface(2, 2);
    let mut host = BridgeHost::new(dir.path(), &descriptor(), &WorkerSettings::default(), &source).unwrap();

    let code = serve_while(&mut host, &socket, || {
        run_worker(&BridgeClient::new(&socket, dir.path()), None, None)
    });
    assert_eq!(code, EXIT_FAILED);

    match host.finish(ExitStatus::from_raw(EXIT_FAILED << 8)) {
        Err(BridgeError::Remote { message, .. }) => assert_eq!(message, "no parameter block provider"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_silent_failure_reports_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let source = gradient_surface(1, 1);
    let host = BridgeHost::new(dir.path(), &descriptor(), &WorkerSettings::default(), &source).unwrap();
    assert!(matches!(
        host.finish(ExitStatus::from_raw(3 << 8)),
        Err(BridgeError::WorkerFailed(status)) if status.code() == Some(3)
    ));
}
