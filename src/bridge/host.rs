//! Host side of the bridge: spawns the worker and serves its requests.

use super::cancel::{CancelEvent, POLL_INTERVAL};
use super::mapping::{ImageMapping, unique_name};
use super::protocol::{self, Command};
use super::{BridgeConfig, BridgeError, CANCEL_ENV, RUNTIME_DIR_ENV, SOCKET_ENV, WorkerSettings};
use crate::host::{CachedMetadata, ImageSurface, MetadataProvider, NoMetadata, OwnedSurface, checkerboard};
use crate::observability::{span_bridge_request, trace_progress};
use crate::plugin::PluginDescriptor;
use crate::suites::DescriptorRegistry;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static NO_METADATA: NoMetadata = NoMetadata;

/// Progress callback shared with the serving thread.
pub type SharedProgress = Arc<dyn Fn(i32, i32) + Send + Sync>;

/// What a finished worker handed back.
#[derive(Debug, Default)]
pub struct BridgeOutcome {
    /// Result image, absent for About-only runs.
    pub destination: Option<OwnedSurface>,
    /// Parameters the filter saved.
    pub parameters: Option<Vec<u8>>,
    /// Registry after the run.
    pub registry: Option<DescriptorRegistry>,
}

/// State served to one worker invocation.
pub struct BridgeHost<'a> {
    runtime_dir: PathBuf,
    descriptor: Vec<u8>,
    settings: Vec<u8>,
    source: &'a (dyn ImageSurface + Sync),
    mask: Option<&'a (dyn ImageSurface + Sync)>,
    backdrop: Option<&'a (dyn ImageSurface + Sync)>,
    metadata: CachedMetadata<&'a (dyn MetadataProvider + Sync)>,
    progress: Option<SharedProgress>,
    parameters: Option<Vec<u8>>,
    registry: Option<Vec<u8>>,
    mappings: HashMap<String, ImageMapping>,
    outcome: BridgeOutcome,
    remote_error: Option<(String, String)>,
    protocol_error: Option<BridgeError>,
}

impl<'a> BridgeHost<'a> {
    /// Serve `descriptor` and `source` to a worker using `runtime_dir`.
    pub fn new(
        runtime_dir: impl Into<PathBuf>,
        descriptor: &PluginDescriptor,
        settings: &WorkerSettings,
        source: &'a (dyn ImageSurface + Sync),
    ) -> Result<Self, BridgeError> {
        let descriptor = descriptor
            .to_bytes()
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;
        Ok(Self {
            runtime_dir: runtime_dir.into(),
            descriptor,
            settings: settings.to_bytes()?,
            source,
            mask: None,
            backdrop: None,
            metadata: CachedMetadata::new(&NO_METADATA as &(dyn MetadataProvider + Sync)),
            progress: None,
            parameters: None,
            registry: None,
            mappings: HashMap::new(),
            outcome: BridgeOutcome::default(),
            remote_error: None,
            protocol_error: None,
        })
    }

    /// Serve a selection mask.
    pub fn with_mask(mut self, mask: Option<&'a (dyn ImageSurface + Sync)>) -> Self {
        self.mask = mask;
        self
    }

    /// Serve `backdrop` instead of a generated checkerboard.
    pub fn with_backdrop(mut self, backdrop: Option<&'a (dyn ImageSurface + Sync)>) -> Self {
        self.backdrop = backdrop;
        self
    }

    /// Serve document metadata.
    pub fn with_metadata(mut self, provider: &'a (dyn MetadataProvider + Sync)) -> Self {
        self.metadata = CachedMetadata::new(provider);
        self
    }

    /// Forward worker progress.
    pub fn with_progress(mut self, progress: Option<SharedProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Serve parameters saved by a previous run.
    pub fn with_parameters(mut self, parameters: Option<Vec<u8>>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Serve the descriptor registry.
    pub fn with_registry(mut self, registry: &DescriptorRegistry) -> Result<Self, BridgeError> {
        self.registry = if registry.is_empty() {
            None
        } else {
            Some(registry.to_bytes().map_err(|e| BridgeError::Serialization(e.to_string()))?)
        };
        Ok(self)
    }

    /// Run `worker` to completion while serving its requests.
    ///
    /// Setting `abort` signals the worker's cancellation event.
    pub fn run(mut self, worker: &Path, config: &BridgeConfig, abort: &AtomicBool) -> Result<BridgeOutcome, BridgeError> {
        let socket_path = self.runtime_dir.join(unique_name("pipe"));
        let listener = UnixListener::bind(&socket_path)?;
        let _socket = RemoveOnDrop(socket_path.clone());
        let cancel = CancelEvent::create(&self.runtime_dir, &unique_name("cancel"))?;

        let mut command = std::process::Command::new(worker);
        command
            .env(SOCKET_ENV, &socket_path)
            .env(RUNTIME_DIR_ENV, &self.runtime_dir)
            .env(CANCEL_ENV, cancel.name())
            .stdin(Stdio::null());
        let mut child = command.spawn().map_err(|source| BridgeError::Spawn {
            path: worker.to_path_buf(),
            source,
        })?;
        tracing::debug!("started worker {} (pid {})", worker.display(), child.id());

        let stop = AtomicBool::new(false);
        let io_timeout = config.io_timeout;
        let host = &mut self;
        let status = std::thread::scope(|scope| {
            let server = std::thread::Builder::new()
                .name("filterbridge-host".into())
                .spawn_scoped(scope, || host.serve(&listener, &stop, io_timeout));

            let status = match &server {
                Ok(_) => wait_worker(&mut child, abort, &cancel, config.worker_timeout),
                Err(_) => {
                    let _ = child.kill();
                    child.wait().map_err(BridgeError::from)
                }
            };

            stop.store(true, Ordering::Release);
            // Wake the accept loop.
            let _ = UnixStream::connect(&socket_path);
            match server {
                Ok(handle) => {
                    if handle.join().is_err() {
                        return Err(BridgeError::Protocol("serving thread panicked".into()));
                    }
                }
                Err(e) => return Err(BridgeError::Io(e)),
            }
            status
        })?;

        self.finish(status)
    }

    /// What the worker handed back, given how it exited.
    ///
    /// A reported error takes precedence over a protocol failure, which
    /// takes precedence over the exit status.
    pub fn finish(mut self, status: ExitStatus) -> Result<BridgeOutcome, BridgeError> {
        self.mappings.clear();
        if let Some((message, detail)) = self.remote_error {
            return Err(BridgeError::Remote { message, detail });
        }
        if let Some(e) = self.protocol_error {
            return Err(e);
        }
        if !status.success() {
            return Err(BridgeError::WorkerFailed(status));
        }
        Ok(self.outcome)
    }

    /// Accept request connections until `stop` is set.
    pub fn serve(&mut self, listener: &UnixListener, stop: &AtomicBool, io_timeout: Option<Duration>) {
        for stream in listener.incoming() {
            if stop.load(Ordering::Acquire) {
                break;
            }
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("bridge accept failed: {}", e);
                    continue;
                }
            };
            let _ = stream.set_read_timeout(io_timeout);
            let _ = stream.set_write_timeout(io_timeout);
            if let Err(e) = self.handle(&mut stream) {
                tracing::warn!("bridge request failed: {}", e);
                self.protocol_error.get_or_insert(e);
            }
        }
    }

    /// Read one request from `stream` and write its reply.
    pub fn handle(&mut self, stream: &mut (impl Read + Write)) -> Result<(), BridgeError> {
        let command = Command::read_from(stream)?;
        let _span = span_bridge_request(command.name()).entered();

        let reply: Option<Vec<u8>> = match command {
            Command::GetPluginData => Some(self.descriptor.clone()),
            Command::GetSettings => Some(self.settings.clone()),
            Command::SetErrorInfo => {
                let message = protocol::read_string(stream)?;
                let detail = protocol::read_string(stream)?;
                tracing::debug!("worker reported: {} ({})", message, detail);
                self.remote_error = Some((message, detail));
                None
            }
            Command::UpdateProgress => {
                let done = protocol::read_i32(stream)?;
                let total = protocol::read_i32(stream)?;
                trace_progress(done, total);
                if let Some(progress) = &self.progress {
                    progress(done, total);
                }
                None
            }
            Command::GetSourceImage => {
                let source = self.source;
                Some(self.share("source", source)?)
            }
            Command::GetSelectionMask => match self.mask {
                Some(mask) => Some(self.share("mask", mask)?),
                None => None,
            },
            Command::GetCheckerboardImage => match self.backdrop {
                Some(backdrop) => Some(self.share("backdrop", backdrop)?),
                None => {
                    let generated = checkerboard(self.source.width(), self.source.height());
                    Some(self.share("backdrop", &generated)?)
                }
            },
            Command::SetDestinationImage => {
                let name = protocol::read_string(stream)?;
                self.accept_destination(&name)?;
                None
            }
            Command::ReleaseMapping => {
                let name = protocol::read_string(stream)?;
                if self.mappings.remove(&name).is_none() {
                    tracing::warn!("release of unknown mapping {:?}", name);
                }
                None
            }
            Command::GetExifMetadata => self.metadata.exif().map(<[u8]>::to_vec),
            Command::GetXmpMetadata => self.metadata.xmp().map(<[u8]>::to_vec),
            Command::GetIccProfile => self.metadata.icc_profile().map(<[u8]>::to_vec),
            Command::GetFilterParameters => self.parameters.clone(),
            Command::SetFilterParameters => {
                let data = protocol::read_bytes(stream)?;
                self.outcome.parameters = if data.is_empty() { None } else { Some(data) };
                None
            }
            Command::GetDescriptorRegistry => self.registry.clone(),
            Command::SetDescriptorRegistry => {
                let data = protocol::read_bytes(stream)?;
                let registry = if data.is_empty() {
                    DescriptorRegistry::new()
                } else {
                    DescriptorRegistry::from_bytes(&data)
                        .map_err(|e| BridgeError::Serialization(e.to_string()))?
                };
                self.outcome.registry = Some(registry);
                None
            }
        };

        protocol::write_reply(stream, reply.as_deref())?;
        stream.flush()?;
        Ok(())
    }

    /// Copy `surface` into a new mapping and return its name.
    fn share(&mut self, kind: &str, surface: &dyn ImageSurface) -> Result<Vec<u8>, BridgeError> {
        let mapping = ImageMapping::from_surface(&self.runtime_dir, &unique_name(kind), surface)?;
        let name = mapping.name().to_string();
        self.mappings.insert(name.clone(), mapping);
        Ok(name.into_bytes())
    }

    fn accept_destination(&mut self, name: &str) -> Result<(), BridgeError> {
        let mapping = ImageMapping::open(&self.runtime_dir, name)?;
        if mapping.width() != self.source.width() || mapping.height() != self.source.height() {
            return Err(BridgeError::BadMapping(format!(
                "{}: destination is {}x{}, source is {}x{}",
                name,
                mapping.width(),
                mapping.height(),
                self.source.width(),
                self.source.height()
            )));
        }
        self.outcome.destination = Some(mapping.to_surface());
        Ok(())
    }

    /// Number of host mappings the worker has not released.
    pub fn live_mappings(&self) -> usize {
        self.mappings.len()
    }
}

impl std::fmt::Debug for BridgeHost<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHost")
            .field("runtime_dir", &self.runtime_dir)
            .field("mappings", &self.mappings.len())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

fn wait_worker(
    child: &mut Child,
    abort: &AtomicBool,
    cancel: &CancelEvent,
    timeout: Option<Duration>,
) -> Result<ExitStatus, BridgeError> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            tracing::debug!("worker exited with {}", status);
            return Ok(status);
        }
        if abort.load(Ordering::Acquire) && !cancel.is_set() {
            tracing::debug!("forwarding cancellation to worker");
            cancel.set();
        }
        if let Some(limit) = timeout {
            if started.elapsed() > limit {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BridgeError::Timeout(limit));
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Architecture;
    use crate::host::{ImageSurfaceMut, PixelFormat};
    use std::io::Cursor;

    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn request(host: &mut BridgeHost<'_>, command: Command, payload: &[u8]) -> Option<Vec<u8>> {
        let mut input = vec![command as u8];
        input.extend_from_slice(payload);
        let mut duplex = Duplex {
            input: Cursor::new(input),
            output: Vec::new(),
        };
        host.handle(&mut duplex).unwrap();
        protocol::read_reply(&mut Cursor::new(duplex.output)).unwrap()
    }

    fn string_payload(s: &str) -> Vec<u8> {
        let mut payload = Vec::new();
        protocol::write_string(&mut payload, s).unwrap();
        payload
    }

    fn descriptor() -> PluginDescriptor {
        PluginDescriptor::builder("/plugins/twirl.8bf", "Twirl", Architecture::X86)
            .category("Distort")
            .title("Twirl")
            .build()
            .unwrap()
    }

    #[test]
    fn test_serves_descriptor_and_images() {
        let dir = tempfile::tempdir().unwrap();
        let source = OwnedSurface::new(4, 2, PixelFormat::Bgra32);
        let settings = WorkerSettings {
            show_dialog: true,
            filter_case: 1,
            ..WorkerSettings::default()
        };
        let mut host = BridgeHost::new(dir.path(), &descriptor(), &settings, &source).unwrap();

        let bytes = request(&mut host, Command::GetPluginData, &[]).unwrap();
        assert_eq!(PluginDescriptor::from_bytes(&bytes).unwrap(), descriptor());
        let bytes = request(&mut host, Command::GetSettings, &[]).unwrap();
        assert_eq!(WorkerSettings::from_bytes(&bytes).unwrap(), settings);

        assert_eq!(request(&mut host, Command::GetSelectionMask, &[]), None);
        assert_eq!(request(&mut host, Command::GetExifMetadata, &[]), None);
        assert_eq!(request(&mut host, Command::GetFilterParameters, &[]), None);
        assert_eq!(request(&mut host, Command::GetDescriptorRegistry, &[]), None);

        let name = String::from_utf8(request(&mut host, Command::GetSourceImage, &[]).unwrap()).unwrap();
        let shared = ImageMapping::open(dir.path(), &name).unwrap();
        assert_eq!(shared.to_surface(), source);
        assert_eq!(host.live_mappings(), 1);
        assert_eq!(request(&mut host, Command::ReleaseMapping, &string_payload(&name)), None);
        assert_eq!(host.live_mappings(), 0);

        let name = String::from_utf8(request(&mut host, Command::GetCheckerboardImage, &[]).unwrap()).unwrap();
        let backdrop = ImageMapping::open(dir.path(), &name).unwrap();
        assert_eq!(backdrop.to_surface(), checkerboard(4, 2));
    }

    #[test]
    fn test_collects_worker_results() {
        let dir = tempfile::tempdir().unwrap();
        let source = OwnedSurface::new(2, 2, PixelFormat::Bgra32);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut host = BridgeHost::new(dir.path(), &descriptor(), &WorkerSettings::default(), &source)
            .unwrap()
            .with_progress(Some(Arc::new(move |d: i32, t: i32| sink.lock().unwrap().push((d, t)))));

        let mut progress = Vec::new();
        protocol::write_i32(&mut progress, 5).unwrap();
        protocol::write_i32(&mut progress, 10).unwrap();
        request(&mut host, Command::UpdateProgress, &progress);
        assert_eq!(*seen.lock().unwrap(), vec![(5, 10)]);

        let mut result = OwnedSurface::new(2, 2, PixelFormat::Bgra32);
        result.row_mut(1).fill(0x7F);
        let produced = ImageMapping::from_surface(dir.path(), "fb-test-dest", &result).unwrap();
        request(&mut host, Command::SetDestinationImage, &string_payload(produced.name()));
        drop(produced);

        let mut params = Vec::new();
        protocol::write_bytes(&mut params, b"\x01\x02").unwrap();
        request(&mut host, Command::SetFilterParameters, &params);

        let outcome = host.finish(success()).unwrap();
        assert_eq!(outcome.destination, Some(result));
        assert_eq!(outcome.parameters, Some(vec![1, 2]));
    }

    #[test]
    fn test_remote_error_wins() {
        let dir = tempfile::tempdir().unwrap();
        let source = OwnedSurface::new(1, 1, PixelFormat::Gray8);
        let mut host = BridgeHost::new(dir.path(), &descriptor(), &WorkerSettings::default(), &source).unwrap();
        let mut payload = string_payload("Not enough memory");
        payload.extend_from_slice(&string_payload("selector 3 returned -108"));
        request(&mut host, Command::SetErrorInfo, &payload);

        match host.finish(success()) {
            Err(BridgeError::Remote { message, detail }) => {
                assert_eq!(message, "Not enough memory");
                assert_eq!(detail, "selector 3 returned -108");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_mismatched_destination() {
        let dir = tempfile::tempdir().unwrap();
        let source = OwnedSurface::new(2, 2, PixelFormat::Bgra32);
        let mut host = BridgeHost::new(dir.path(), &descriptor(), &WorkerSettings::default(), &source).unwrap();
        let wrong = ImageMapping::create(dir.path(), "fb-test-wrong", 3, 2, PixelFormat::Bgra32).unwrap();
        assert!(host.accept_destination(wrong.name()).is_err());
    }

    fn success() -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(0)
    }
}
