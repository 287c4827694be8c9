//! Shared memory for the cross-process bridge.
//!
//! Mappings are files in a runtime directory mapped `MAP_SHARED` into both
//! processes; the file name is what crosses the pipe.

mod mapped_file;

pub use mapped_file::MappedFile;
