//! Worker side of the bridge: one connection per request.

use super::mapping::{ImageMapping, unique_name};
use super::protocol::{self, Command};
use super::{BridgeError, RUNTIME_DIR_ENV, SOCKET_ENV, WorkerSettings};
use crate::host::{ImageSurface, MetadataProvider, OwnedSurface};
use crate::plugin::PluginDescriptor;
use crate::suites::DescriptorRegistry;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Talks to a [`BridgeHost`](super::BridgeHost).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeClient {
    socket: PathBuf,
    runtime_dir: PathBuf,
    timeout: Option<Duration>,
}

impl BridgeClient {
    /// A client for the host listening on `socket`.
    pub fn new(socket: impl Into<PathBuf>, runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            runtime_dir: runtime_dir.into(),
            timeout: Some(Duration::from_secs(30)),
        }
    }

    /// A client configured from the environment the host spawned us with.
    pub fn from_env() -> Result<Self, BridgeError> {
        let socket = std::env::var_os(SOCKET_ENV).ok_or(BridgeError::MissingEnvironment(SOCKET_ENV))?;
        let dir = std::env::var_os(RUNTIME_DIR_ENV).ok_or(BridgeError::MissingEnvironment(RUNTIME_DIR_ENV))?;
        Ok(Self::new(socket, dir))
    }

    /// Set the per-request I/O timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory holding the shared mappings.
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Send `command` with an already encoded `payload` and read the reply.
    pub fn request(&self, command: Command, payload: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
        let mut stream = UnixStream::connect(&self.socket)?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;

        let mut frame = Vec::with_capacity(1 + payload.len());
        command.write_to(&mut frame)?;
        frame.extend_from_slice(payload);
        stream.write_all(&frame)?;
        stream.flush()?;

        let reply = protocol::read_reply(&mut stream);
        tracing::trace!(command = command.name(), ok = reply.is_ok(), "bridge request");
        reply
    }

    fn required(&self, command: Command) -> Result<Vec<u8>, BridgeError> {
        self.request(command, &[])?
            .ok_or_else(|| BridgeError::Protocol(format!("{command} returned no data")))
    }

    /// Descriptor of the filter to run.
    pub fn plugin_data(&self) -> Result<PluginDescriptor, BridgeError> {
        let bytes = self.required(Command::GetPluginData)?;
        PluginDescriptor::from_bytes(&bytes).map_err(|e| BridgeError::Serialization(e.to_string()))
    }

    /// Settings of this invocation.
    pub fn settings(&self) -> Result<WorkerSettings, BridgeError> {
        WorkerSettings::from_bytes(&self.required(Command::GetSettings)?)
    }

    /// Report a failure to the host.
    pub fn set_error_info(&self, message: &str, detail: &str) -> Result<(), BridgeError> {
        let mut payload = Vec::new();
        protocol::write_string(&mut payload, message)?;
        protocol::write_string(&mut payload, detail)?;
        self.request(Command::SetErrorInfo, &payload).map(drop)
    }

    /// Report progress to the host.
    pub fn update_progress(&self, done: i32, total: i32) -> Result<(), BridgeError> {
        let mut payload = Vec::with_capacity(8);
        protocol::write_i32(&mut payload, done)?;
        protocol::write_i32(&mut payload, total)?;
        self.request(Command::UpdateProgress, &payload).map(drop)
    }

    fn image(&self, command: Command) -> Result<Option<OwnedSurface>, BridgeError> {
        let Some(name) = self.request(command, &[])? else {
            return Ok(None);
        };
        let name = String::from_utf8(name)
            .map_err(|_| BridgeError::Protocol(format!("{command}: mapping name is not UTF-8")))?;
        let surface = ImageMapping::open(&self.runtime_dir, &name)?.to_surface();

        let mut payload = Vec::new();
        protocol::write_string(&mut payload, &name)?;
        self.request(Command::ReleaseMapping, &payload)?;
        Ok(Some(surface))
    }

    /// The source image.
    pub fn source_image(&self) -> Result<OwnedSurface, BridgeError> {
        self.image(Command::GetSourceImage)?
            .ok_or_else(|| BridgeError::Protocol("no source image".into()))
    }

    /// The selection mask, if the document has a selection.
    pub fn selection_mask(&self) -> Result<Option<OwnedSurface>, BridgeError> {
        self.image(Command::GetSelectionMask)
    }

    /// Backdrop for transparent pixels.
    pub fn checkerboard(&self) -> Result<OwnedSurface, BridgeError> {
        self.image(Command::GetCheckerboardImage)?
            .ok_or_else(|| BridgeError::Protocol("no checkerboard image".into()))
    }

    /// Hand the result image to the host.
    pub fn set_destination(&self, surface: &dyn ImageSurface) -> Result<(), BridgeError> {
        let mapping = ImageMapping::from_surface(&self.runtime_dir, &unique_name("dest"), surface)?;
        let mut payload = Vec::new();
        protocol::write_string(&mut payload, mapping.name())?;
        self.request(Command::SetDestinationImage, &payload)?;
        // The host has copied the rows.
        drop(mapping);
        Ok(())
    }

    /// EXIF block.
    pub fn exif(&self) -> Result<Option<Vec<u8>>, BridgeError> {
        self.request(Command::GetExifMetadata, &[])
    }

    /// XMP packet.
    pub fn xmp(&self) -> Result<Option<Vec<u8>>, BridgeError> {
        self.request(Command::GetXmpMetadata, &[])
    }

    /// ICC profile.
    pub fn icc_profile(&self) -> Result<Option<Vec<u8>>, BridgeError> {
        self.request(Command::GetIccProfile, &[])
    }

    /// Parameters saved by the previous run.
    pub fn filter_parameters(&self) -> Result<Option<Vec<u8>>, BridgeError> {
        self.request(Command::GetFilterParameters, &[])
    }

    /// Save parameters for the next run.
    pub fn set_filter_parameters(&self, data: &[u8]) -> Result<(), BridgeError> {
        let mut payload = Vec::with_capacity(4 + data.len());
        protocol::write_bytes(&mut payload, data)?;
        self.request(Command::SetFilterParameters, &payload).map(drop)
    }

    /// The host's descriptor registry; `None` when it is empty.
    pub fn registry(&self) -> Result<Option<DescriptorRegistry>, BridgeError> {
        self.request(Command::GetDescriptorRegistry, &[])?
            .map(|bytes| DescriptorRegistry::from_bytes(&bytes))
            .transpose()
            .map_err(|e| BridgeError::Serialization(e.to_string()))
    }

    /// Replace the host's descriptor registry.
    pub fn set_registry(&self, registry: &DescriptorRegistry) -> Result<(), BridgeError> {
        let bytes = if registry.is_empty() {
            Vec::new()
        } else {
            registry
                .to_bytes()
                .map_err(|e| BridgeError::Serialization(e.to_string()))?
        };
        let mut payload = Vec::with_capacity(4 + bytes.len());
        protocol::write_bytes(&mut payload, &bytes)?;
        self.request(Command::SetDescriptorRegistry, &payload).map(drop)
    }
}

/// Metadata fetched from the host; failures read as absent.
impl MetadataProvider for BridgeClient {
    fn exif(&self) -> Option<Vec<u8>> {
        BridgeClient::exif(self)
            .inspect_err(|e| tracing::warn!("cannot fetch EXIF: {}", e))
            .ok()
            .flatten()
    }

    fn xmp(&self) -> Option<Vec<u8>> {
        BridgeClient::xmp(self)
            .inspect_err(|e| tracing::warn!("cannot fetch XMP: {}", e))
            .ok()
            .flatten()
    }

    fn icc_profile(&self) -> Option<Vec<u8>> {
        BridgeClient::icc_profile(self)
            .inspect_err(|e| tracing::warn!("cannot fetch ICC profile: {}", e))
            .ok()
            .flatten()
    }
}
