//! Append-only flash file system (RCFS)
//!
//! A minimal file system over a reserved window of the flash region: files
//! are appended by a bump allocator, indexed by a fixed-capacity table of
//! contents (VTOC), and never deleted. Re-adding "the same" file always
//! consumes new space; the region only grows until it is exhausted.

pub mod fs;
pub mod header;
pub mod vtoc;

// Re-export commonly used types
pub use fs::{FlashFile, FsError, Rcfs, RcfsConfig};
pub use header::{FileHeader, FileName, HeaderFormat, FILE_TYPE_DATA, NAME_LEN};
pub use vtoc::{VtocEntry, VTOC_ENTRY_SIZE, VTOC_FREE};
