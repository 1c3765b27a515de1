//! On-disk file header
//!
//! Every stored file begins with a fixed-layout header:
//!
//! ```text
//! ┌─────────────────────────────┐
//! │ name: [u8; 16]              │  NUL-padded, not necessarily terminated
//! ├─────────────────────────────┤
//! │ type: u8                    │  file type tag
//! ├─────────────────────────────┤
//! │ time: [u8; 4]               │  creation timestamp
//! ├─────────────────────────────┤
//! │ flags: u8                   │  reserved
//! ├─────────────────────────────┤
//! │ pad: [u8; 2]                │  padded layout only
//! └─────────────────────────────┘
//! ```
//!
//! Two on-disk sizes exist historically: a legacy 22-byte compact layout
//! and a later 24-byte padded layout. The effective size is fixed at
//! construction time via [`RcfsConfig`](super::RcfsConfig) and never
//! auto-detected; mixing layouts against one flash image corrupts every
//! offset computed from it.

use core::fmt;
use core::fmt::Write as _;
use core::str;

/// Fixed width of the on-disk name field
pub const NAME_LEN: usize = 16;

/// Default type tag for plain data files
pub const FILE_TYPE_DATA: u8 = 0;

/// Default creation timestamp written when the caller supplies none
const DEFAULT_TIME: [u8; 4] = [0x38, 0x64, 0x09, 0x00];

/// Basename used when a file is added without an explicit name
const BASENAME: &str = "debug";

/// On-disk header layout version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    /// Legacy 22-byte layout, no pad bytes
    Compact,
    /// 24-byte layout with two trailing pad bytes
    Padded,
}

impl HeaderFormat {
    /// On-disk header size in bytes
    pub const fn size(self) -> usize {
        match self {
            HeaderFormat::Compact => 22,
            HeaderFormat::Padded => 24,
        }
    }
}

/// Fixed-width, NUL-padded file name
///
/// Compares by exact byte equality over the full 16-byte field, which for
/// names this engine writes (always NUL-padded) matches C-string equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileName([u8; NAME_LEN]);

impl FileName {
    /// The all-NUL empty name
    pub const fn empty() -> Self {
        Self([0; NAME_LEN])
    }

    /// Build a name from a string, truncated to 15 bytes and NUL-padded.
    ///
    /// The 16th byte always stays NUL for names created this way; only
    /// foreign images carry unterminated 16-byte names.
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; NAME_LEN];
        let src = name.as_bytes();
        let n = src.len().min(NAME_LEN - 1);
        bytes[..n].copy_from_slice(&src[..n]);
        Self(bytes)
    }

    /// Wrap a raw on-disk name field
    pub const fn from_bytes(bytes: [u8; NAME_LEN]) -> Self {
        Self(bytes)
    }

    /// Synthesize the default name for table slot `slot`: the fixed
    /// basename plus a zero-padded slot number, e.g. `debug003`.
    ///
    /// The number is the count of entries at creation time. That is only a
    /// stable identity because files are never deleted.
    pub fn synthesized(slot: usize) -> Self {
        let mut s = heapless::String::<NAME_LEN>::new();
        // basename + 3 digits always fits in 15 bytes
        let _ = write!(s, "{}{:03}", BASENAME, slot);
        Self::new(&s)
    }

    /// The raw 16-byte field
    pub const fn as_bytes(&self) -> &[u8; NAME_LEN] {
        &self.0
    }

    /// View as a string, up to the first NUL. Returns an empty string for
    /// names that are not valid UTF-8.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl Default for FileName {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for FileName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub name: FileName,
    pub file_type: u8,
    pub time: [u8; 4],
    pub flags: u8,
}

impl FileHeader {
    /// Header with the given name and default metadata
    pub fn new(name: FileName) -> Self {
        Self {
            name,
            file_type: FILE_TYPE_DATA,
            time: DEFAULT_TIME,
            flags: 0,
        }
    }

    /// Serialize into the on-disk layout.
    ///
    /// Fills `out` and returns the number of bytes that belong on disk for
    /// `format` (22 or 24; pad bytes are zero).
    pub fn encode(&self, format: HeaderFormat, out: &mut [u8; 24]) -> usize {
        out[..NAME_LEN].copy_from_slice(self.name.as_bytes());
        out[16] = self.file_type;
        out[17..21].copy_from_slice(&self.time);
        out[21] = self.flags;
        out[22] = 0;
        out[23] = 0;
        format.size()
    }

    /// Parse the 22-byte common prefix of an on-disk header. Pad bytes are
    /// never interpreted, so both formats decode identically.
    pub fn decode(raw: &[u8; 22]) -> Self {
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&raw[..NAME_LEN]);
        let mut time = [0u8; 4];
        time.copy_from_slice(&raw[17..21]);
        Self {
            name: FileName::from_bytes(name),
            file_type: raw[16],
            time,
            flags: raw[21],
        }
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new(FileName::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_nul_padded_and_truncated() {
        let n = FileName::new("log");
        assert_eq!(&n.as_bytes()[..4], b"log\0");
        assert_eq!(n.as_str(), "log");

        // 15-byte cap leaves the final byte NUL
        let long = FileName::new("0123456789abcdefXYZ");
        assert_eq!(long.as_str(), "0123456789abcde");
        assert_eq!(long.as_bytes()[15], 0);
    }

    #[test]
    fn name_equality_is_fixed_width() {
        assert_eq!(FileName::new("debug000"), FileName::from("debug000"));
        assert_ne!(FileName::new("debug000"), FileName::new("debug00"));
    }

    #[test]
    fn synthesized_names_are_zero_padded() {
        assert_eq!(FileName::synthesized(0).as_str(), "debug000");
        assert_eq!(FileName::synthesized(7).as_str(), "debug007");
        assert_eq!(FileName::synthesized(123).as_str(), "debug123");
    }

    #[test]
    fn header_formats_have_fixed_sizes() {
        assert_eq!(HeaderFormat::Compact.size(), 22);
        assert_eq!(HeaderFormat::Padded.size(), 24);
    }

    #[test]
    fn header_encode_decode_round_trip() {
        let mut h = FileHeader::new(FileName::new("trace001"));
        h.file_type = 0x42;
        h.time = [1, 2, 3, 4];
        h.flags = 0x80;

        for format in [HeaderFormat::Compact, HeaderFormat::Padded] {
            let mut raw = [0u8; 24];
            let n = h.encode(format, &mut raw);
            assert_eq!(n, format.size());

            let mut prefix = [0u8; 22];
            prefix.copy_from_slice(&raw[..22]);
            assert_eq!(FileHeader::decode(&prefix), h);
        }
    }
}
