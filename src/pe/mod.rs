//! Portable Executable (PE/COFF) reading.
//!
//! Only what discovery needs: the machine type and the resource tree.

mod cursor;
mod image;
mod probe;

pub use cursor::{ByteCursor, CursorError, decode_ansi};
pub use image::{PeError, PeImage, Resource, ResourceId};
pub use probe::{DOS_SIGNATURE, NT_SIGNATURE, probe_architecture};
