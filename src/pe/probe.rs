//! Architecture probing from the minimal PE header fields.

use crate::arch::Architecture;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// `MZ`.
pub const DOS_SIGNATURE: u16 = 0x5A4D;
/// `PE\0\0`.
pub const NT_SIGNATURE: u32 = 0x0000_4550;
/// Offset of `e_lfanew` in the DOS header.
pub const LFANEW_OFFSET: u64 = 0x3C;

/// The few header fields the prober touches fit in one small buffer.
const PROBE_BUFFER_SIZE: usize = 256;

/// Classify the target architecture of a native library.
///
/// Never fails: any I/O, parse or permission problem yields
/// [`Architecture::Unknown`].
pub fn probe_architecture(path: impl AsRef<Path>) -> Architecture {
    let path = path.as_ref();
    match read_machine(path) {
        Ok(Some(machine)) => Architecture::from_machine(machine),
        Ok(None) => Architecture::Unknown,
        Err(e) => {
            tracing::debug!("cannot probe {}: {}", path.display(), e);
            Architecture::Unknown
        }
    }
}

fn read_machine(path: &Path) -> io::Result<Option<u16>> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(PROBE_BUFFER_SIZE, file);

    if read_u16(&mut reader)? != DOS_SIGNATURE {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(LFANEW_OFFSET))?;
    let nt_offset = read_u32(&mut reader)?;

    reader.seek(SeekFrom::Start(u64::from(nt_offset)))?;
    if read_u32(&mut reader)? != NT_SIGNATURE {
        return Ok(None);
    }

    read_u16(&mut reader).map(Some)
}

fn read_u16(reader: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
