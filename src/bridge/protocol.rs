//! Wire protocol between the bridge host and its worker.
//!
//! Each request is one connection: the worker writes a command byte and
//! its payload, the host answers with a `u32` little-endian length and that
//! many bytes, and both sides close. A zero length means "no data".

use super::BridgeError;
use std::io::{Read, Write};

/// Upper bound on any length read from the socket.
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// A request the worker sends to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Serialized descriptor of the filter to run.
    GetPluginData = 0,
    /// Serialized [`WorkerSettings`](super::WorkerSettings).
    GetSettings = 1,
    /// Report a failure: message and detail strings.
    SetErrorInfo = 2,
    /// Report progress: `done` and `total`.
    UpdateProgress = 3,
    /// Name of a mapping holding the source image.
    GetSourceImage = 4,
    /// Name of a mapping holding the selection mask, if any.
    GetSelectionMask = 5,
    /// Name of a mapping holding the transparency backdrop.
    GetCheckerboardImage = 6,
    /// The worker's result image is in the named mapping.
    SetDestinationImage = 7,
    /// The worker is done with a host mapping.
    ReleaseMapping = 8,
    /// EXIF block.
    GetExifMetadata = 9,
    /// XMP packet.
    GetXmpMetadata = 10,
    /// ICC profile.
    GetIccProfile = 11,
    /// Parameters saved by the previous run of the filter.
    GetFilterParameters = 12,
    /// Parameters to save for the next run.
    SetFilterParameters = 13,
    /// Serialized descriptor registry.
    GetDescriptorRegistry = 14,
    /// Registry to keep after the run.
    SetDescriptorRegistry = 15,
}

impl Command {
    /// Decode a command byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::GetPluginData,
            1 => Self::GetSettings,
            2 => Self::SetErrorInfo,
            3 => Self::UpdateProgress,
            4 => Self::GetSourceImage,
            5 => Self::GetSelectionMask,
            6 => Self::GetCheckerboardImage,
            7 => Self::SetDestinationImage,
            8 => Self::ReleaseMapping,
            9 => Self::GetExifMetadata,
            10 => Self::GetXmpMetadata,
            11 => Self::GetIccProfile,
            12 => Self::GetFilterParameters,
            13 => Self::SetFilterParameters,
            14 => Self::GetDescriptorRegistry,
            15 => Self::SetDescriptorRegistry,
            _ => return None,
        })
    }

    /// Name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::GetPluginData => "GetPluginData",
            Self::GetSettings => "GetSettings",
            Self::SetErrorInfo => "SetErrorInfo",
            Self::UpdateProgress => "UpdateProgress",
            Self::GetSourceImage => "GetSourceImage",
            Self::GetSelectionMask => "GetSelectionMask",
            Self::GetCheckerboardImage => "GetCheckerboardImage",
            Self::SetDestinationImage => "SetDestinationImage",
            Self::ReleaseMapping => "ReleaseMapping",
            Self::GetExifMetadata => "GetExifMetadata",
            Self::GetXmpMetadata => "GetXmpMetadata",
            Self::GetIccProfile => "GetIccProfile",
            Self::GetFilterParameters => "GetFilterParameters",
            Self::SetFilterParameters => "SetFilterParameters",
            Self::GetDescriptorRegistry => "GetDescriptorRegistry",
            Self::SetDescriptorRegistry => "SetDescriptorRegistry",
        }
    }

    /// Write the command byte.
    pub fn write_to(self, w: &mut impl Write) -> Result<(), BridgeError> {
        w.write_all(&[self as u8])?;
        Ok(())
    }

    /// Read a command byte.
    pub fn read_from(r: &mut impl Read) -> Result<Self, BridgeError> {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        Self::from_u8(byte[0]).ok_or(BridgeError::UnknownCommand(byte[0]))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Write a reply. `None` and empty data are both sent as length 0.
pub fn write_reply(w: &mut impl Write, data: Option<&[u8]>) -> Result<(), BridgeError> {
    write_bytes(w, data.unwrap_or_default())
}

/// Read a reply; length 0 is `None`.
pub fn read_reply(r: &mut impl Read) -> Result<Option<Vec<u8>>, BridgeError> {
    let data = read_bytes(r)?;
    Ok(if data.is_empty() { None } else { Some(data) })
}

/// Write `u32` length then the bytes.
pub fn write_bytes(w: &mut impl Write, data: &[u8]) -> Result<(), BridgeError> {
    let len = u32::try_from(data.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or(BridgeError::FrameTooLarge(data.len()))?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(data)?;
    Ok(())
}

/// Read `u32` length then that many bytes.
pub fn read_bytes(r: &mut impl Read) -> Result<Vec<u8>, BridgeError> {
    let len = read_u32(r)?;
    if len > MAX_FRAME_LEN {
        return Err(BridgeError::FrameTooLarge(len as usize));
    }
    let mut data = vec![0u8; len as usize];
    r.read_exact(&mut data)?;
    Ok(data)
}

/// Write a length-prefixed UTF-8 string.
pub fn write_string(w: &mut impl Write, s: &str) -> Result<(), BridgeError> {
    write_bytes(w, s.as_bytes())
}

/// Read a length-prefixed UTF-8 string.
pub fn read_string(r: &mut impl Read) -> Result<String, BridgeError> {
    String::from_utf8(read_bytes(r)?).map_err(|_| BridgeError::Protocol("string is not UTF-8".into()))
}

/// Write a little-endian `i32`.
pub fn write_i32(w: &mut impl Write, value: i32) -> Result<(), BridgeError> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Read a little-endian `i32`.
pub fn read_i32(r: &mut impl Read) -> Result<i32, BridgeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> Result<u32, BridgeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
