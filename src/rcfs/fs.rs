//! File system engine
//!
//! The engine owns no state beyond its configuration and the flash
//! controller it drives; everything else lives on disk in the VTOC.
//! Traversal state lives in the caller-supplied [`FlashFile`] cursor.
//!
//! # Region layout
//!
//! ```text
//! base ┌──────────────────────────────┐
//!      │ reserved (historical)        │
//!      │   VTOC at base + vtoc_offset │
//!      ├──────────────────────────────┤ base + file_floor
//!      │ file storage (bump allocated)│
//!      ├──────────────────────────────┤ base + file_ceiling
//!      │ reserved for parameter store │
//!      └──────────────────────────────┘
//! ```
//!
//! There is no delete, update or compaction path. Adding a file always
//! consumes fresh space; when the region or the table is exhausted that is
//! permanent until the whole region is erased out of band.

use super::header::{FileHeader, FileName, HeaderFormat};
use super::vtoc::{VtocEntry, VTOC_ENTRY_SIZE};
use crate::platform::error::FlashError;
use crate::platform::traits::FlashController;
use core::fmt;

/// Payload half-words programmed between progress checkpoints
const CHECKPOINT_INTERVAL: usize = 128;

/// Deployment layout of the file system region.
///
/// All values are fixed configuration, never computed or auto-detected.
/// The defaults describe the VEX Cortex deployment. A given flash image
/// must always be opened with the configuration it was written with;
/// mixing header formats in particular corrupts all offset math.
#[derive(Debug, Clone, Copy)]
pub struct RcfsConfig {
    /// Absolute address the region (and all VTOC offsets) are relative to
    pub base: u32,
    /// Offset of the VTOC from `base`
    pub vtoc_offset: u32,
    /// VTOC capacity; the hard maximum file count
    pub max_files: usize,
    /// Lowest offset the allocator will place a file at
    pub file_floor: u32,
    /// Offset ceiling; the space above is reserved for the parameter store
    pub file_ceiling: u32,
    /// Largest single payload accepted by [`Rcfs::add_file`]
    pub max_file_size: usize,
    /// On-disk header layout
    pub header: HeaderFormat,
}

impl Default for RcfsConfig {
    fn default() -> Self {
        Self {
            base: 0x0800_0000,
            vtoc_offset: 160,
            max_files: 16,
            file_floor: 0x0001_8000,
            file_ceiling: 0x0004_7000,
            max_file_size: 8192,
            header: HeaderFormat::Padded,
        }
    }
}

/// File system errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsError {
    /// Payload length was zero or above the configured maximum
    InvalidLength,
    /// Region or table exhausted
    NoSpace,
    /// No file with the requested name
    NotFound,
    /// Traversal reached the sentinel; not a true failure
    EndOfTable,
    /// The programming primitive reported an error
    Flash(FlashError),
}

impl From<FlashError> for FsError {
    fn from(e: FlashError) -> Self {
        FsError::Flash(e)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::InvalidLength => write!(f, "invalid file length"),
            FsError::NoSpace => write!(f, "file region or table full"),
            FsError::NotFound => write!(f, "file not found"),
            FsError::EndOfTable => write!(f, "end of table"),
            FsError::Flash(e) => write!(f, "flash error: {}", e),
        }
    }
}

/// Runtime view of one stored file.
///
/// Derived from a VTOC entry and the on-disk header, never persisted. Also
/// serves as the traversal cursor for [`Rcfs::find_next_file`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashFile {
    /// Parsed on-disk header
    pub header: FileHeader,
    /// Absolute address of the header
    pub addr: u32,
    /// Absolute address of the payload
    pub data_addr: u32,
    /// Payload length in bytes (stored size minus header size)
    pub data_len: usize,
}

impl FlashFile {
    pub fn name(&self) -> FileName {
        self.header.name
    }
}

/// Append-only file system engine
pub struct Rcfs<C> {
    flash: C,
    cfg: RcfsConfig,
}

impl<C: FlashController> Rcfs<C> {
    /// Engine over `flash` with the default Cortex layout
    pub fn new(flash: C) -> Self {
        Self::with_config(flash, RcfsConfig::default())
    }

    pub fn with_config(flash: C, cfg: RcfsConfig) -> Self {
        Self { flash, cfg }
    }

    pub fn config(&self) -> &RcfsConfig {
        &self.cfg
    }

    /// Hand the controller back, e.g. to lend it to the parameter store
    pub fn into_inner(self) -> C {
        self.flash
    }

    fn vtoc_addr(&self, slot: usize) -> u32 {
        self.cfg.base + self.cfg.vtoc_offset + slot as u32 * VTOC_ENTRY_SIZE
    }

    fn read_entry(&self, slot: usize) -> VtocEntry {
        let addr = self.vtoc_addr(slot);
        VtocEntry {
            offset: self.flash.read_word(addr),
            size: self.flash.read_word(addr + 4),
        }
    }

    fn read_header_at(&self, addr: u32) -> FileHeader {
        // Only the 22-byte common prefix carries data; pad bytes are never
        // interpreted.
        let mut raw = [0u8; 22];
        self.flash.read(addr, &mut raw);
        FileHeader::decode(&raw)
    }

    /// Resolve a VTOC entry to its runtime view
    fn file_at(&self, entry: VtocEntry) -> FlashFile {
        let addr = self.cfg.base + entry.offset;
        let header_size = self.cfg.header.size();
        FlashFile {
            header: self.read_header_at(addr),
            addr,
            data_addr: addr + header_size as u32,
            data_len: (entry.size as usize).saturating_sub(header_size),
        }
    }

    /// Number of stored files, which is also the index of the first free
    /// VTOC slot. `NoSpace` when the sentinel is missing (table full).
    pub fn file_count(&self) -> Result<usize, FsError> {
        for slot in 0..self.cfg.max_files {
            if self.read_entry(slot).is_free() {
                return Ok(slot);
            }
        }
        Err(FsError::NoSpace)
    }

    /// Load the first file into `f`, returning its slot index
    pub fn find_first_file(&self, f: &mut FlashFile) -> Result<usize, FsError> {
        let entry = self.read_entry(0);
        if entry.is_free() {
            return Err(FsError::EndOfTable);
        }
        *f = self.file_at(entry);
        Ok(0)
    }

    /// Advance `f` to the entry after the one it currently points at.
    ///
    /// Table order equals address order equals insertion order, because
    /// allocation is strictly append-only.
    pub fn find_next_file(&self, f: &mut FlashFile) -> Result<usize, FsError> {
        for slot in 0..self.cfg.max_files {
            let entry = self.read_entry(slot);
            if entry.is_free() {
                return Err(FsError::EndOfTable);
            }
            if self.cfg.base + entry.offset != f.addr {
                continue;
            }

            // found the cursor position, step to the following entry
            let next_slot = slot + 1;
            if next_slot >= self.cfg.max_files {
                return Err(FsError::EndOfTable);
            }
            let next = self.read_entry(next_slot);
            if next.is_free() {
                return Err(FsError::EndOfTable);
            }
            *f = self.file_at(next);
            return Ok(next_slot);
        }

        // cursor does not match any live entry
        Err(FsError::NotFound)
    }

    /// Iterator over all stored files in insertion order
    pub fn files(&self) -> Files<'_, C> {
        Files {
            fs: self,
            cursor: FlashFile::default(),
            started: false,
        }
    }

    /// Append a file.
    ///
    /// With `name == None` the name is synthesized from the fixed basename
    /// and the current file count (`debug000`, `debug001`, ...); use
    /// [`last_filename`](Rcfs::last_filename) to learn it afterwards.
    ///
    /// # Errors
    ///
    /// - `InvalidLength` for an empty or oversized payload (no flash touched)
    /// - `NoSpace` when the payload will not fit below the ceiling, or the
    ///   table has no free slot
    /// - `Flash` when the primitive reports a program failure; the header
    ///   or payload may be partially written, and the VTOC entry already
    ///   points at it (there is no rollback)
    pub fn add_file(&mut self, data: &[u8], name: Option<&str>) -> Result<(), FsError> {
        self.add_file_with(data, name, |_| {})
    }

    /// [`add_file`](Rcfs::add_file) with a progress checkpoint.
    ///
    /// `progress` is called with the payload byte count programmed so far,
    /// every 128 half-words. On a cooperative scheduler this is the place
    /// to yield so a long write does not starve other tasks.
    pub fn add_file_with(
        &mut self,
        data: &[u8],
        name: Option<&str>,
        mut progress: impl FnMut(usize),
    ) -> Result<(), FsError> {
        if data.is_empty() || data.len() > self.cfg.max_file_size {
            return Err(FsError::InvalidLength);
        }

        let header_size = self.cfg.header.size() as u32;
        let mut max_offset: u32 = 0;
        let mut next_offset: u32 = 0;

        for slot in 0..self.cfg.max_files {
            let entry = self.read_entry(slot);
            if !entry.is_free() {
                // track the highest-placed file; the new one goes after it
                if entry.offset > max_offset {
                    max_offset = entry.offset;
                    next_offset = entry.end();
                }
                continue;
            }

            // half-word programming needs an even start address
            if next_offset & 1 != 0 {
                next_offset += 1;
            }
            if next_offset < self.cfg.file_floor {
                next_offset = self.cfg.file_floor;
            }
            if next_offset + data.len() as u32 > self.cfg.file_ceiling {
                return Err(FsError::NoSpace);
            }

            let name = match name {
                Some(n) => FileName::new(n),
                None => FileName::synthesized(slot),
            };
            let header = FileHeader::new(name);

            crate::log_debug!(
                "add file slot {} offset {:08x} len {}",
                slot,
                next_offset,
                data.len()
            );

            self.flash.unlock();
            self.flash.clear_pending_flags();

            // table entry first, then the file body behind it
            let entry_addr = self.vtoc_addr(slot);
            self.flash.program_word(entry_addr, next_offset)?;
            self.flash
                .program_word(entry_addr + 4, data.len() as u32 + header_size)?;

            let addr = self.cfg.base + next_offset;
            return self.write_file(addr, &header, data, &mut progress);
        }

        // sentinel never found: the table itself is full
        Err(FsError::NoSpace)
    }

    /// Program header and payload half-word by half-word
    fn write_file(
        &mut self,
        addr: u32,
        header: &FileHeader,
        data: &[u8],
        progress: &mut impl FnMut(usize),
    ) -> Result<(), FsError> {
        let mut raw = [0u8; 24];
        let header_len = header.encode(self.cfg.header, &mut raw);

        let mut p = addr;
        for pair in raw[..header_len].chunks_exact(2) {
            self.flash
                .program_half_word(p, u16::from_le_bytes([pair[0], pair[1]]))?;
            p += 2;
        }

        let mut halves = data.chunks_exact(2);
        for (i, pair) in (&mut halves).enumerate() {
            self.flash
                .program_half_word(p, u16::from_le_bytes([pair[0], pair[1]]))?;
            p += 2;

            if i % CHECKPOINT_INTERVAL == 0 {
                progress((i + 1) * 2);
            }
        }

        // odd trailing byte: pad the high half with the erased pattern
        if let [last] = halves.remainder() {
            self.flash
                .program_half_word(p, u16::from_le_bytes([*last, 0xFF]))?;
        }

        Ok(())
    }

    /// Locate a file by name (exact fixed-width byte equality)
    pub fn find_file(&self, name: &str) -> Result<FlashFile, FsError> {
        let want = FileName::new(name);
        for f in self.files() {
            if f.header.name == want {
                return Ok(f);
            }
        }
        Err(FsError::NotFound)
    }

    /// Copy a file's payload into `buf`, returning the number of bytes
    /// copied (at most `buf.len()`).
    pub fn get_file(&self, name: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        let f = self.find_file(name)?;
        let n = f.data_len.min(buf.len());
        self.flash.read(f.data_addr, &mut buf[..n]);
        Ok(n)
    }

    /// Name of the last stored file.
    ///
    /// Use after a nameless [`add_file`](Rcfs::add_file) to learn the
    /// synthesized name. `EndOfTable` when no files exist.
    pub fn last_filename(&self) -> Result<FileName, FsError> {
        let mut last = None;
        for f in self.files() {
            last = Some(f.header.name);
        }
        last.ok_or(FsError::EndOfTable)
    }

    /// Log every live VTOC entry through the crate log macros
    pub fn dump_vtoc(&self) {
        for f in self.files() {
            crate::log_info!(
                "{} addr {:08x} data {:08x} size {} type {:02x}",
                f.header.name.as_str(),
                f.addr,
                f.data_addr,
                f.data_len,
                f.header.file_type
            );
        }
    }
}

/// Iterator returned by [`Rcfs::files`]
pub struct Files<'a, C> {
    fs: &'a Rcfs<C>,
    cursor: FlashFile,
    started: bool,
}

impl<C: FlashController> Iterator for Files<'_, C> {
    type Item = FlashFile;

    fn next(&mut self) -> Option<FlashFile> {
        let step = if self.started {
            self.fs.find_next_file(&mut self.cursor)
        } else {
            self.started = true;
            self.fs.find_first_file(&mut self.cursor)
        };
        step.ok().map(|_| self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockFlash;

    fn small_cfg() -> RcfsConfig {
        RcfsConfig {
            max_files: 4,
            file_floor: 0x1000,
            file_ceiling: 0x3000,
            max_file_size: 1024,
            ..RcfsConfig::default()
        }
    }

    fn engine() -> Rcfs<MockFlash> {
        Rcfs::with_config(MockFlash::new(), small_cfg())
    }

    #[test]
    fn add_and_get_round_trip() {
        let mut fs = engine();
        let data = [0x11, 0x22, 0x33, 0x44, 0x55]; // odd length on purpose

        fs.add_file(&data, Some("boot")).unwrap();

        let mut buf = [0u8; 64];
        let n = fs.get_file("boot", &mut buf).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(&buf[..n], &data);
    }

    #[test]
    fn invalid_length_touches_no_flash() {
        let mut flash = MockFlash::new();
        {
            let mut fs = Rcfs::with_config(&mut flash, small_cfg());
            assert_eq!(fs.add_file(&[], Some("x")), Err(FsError::InvalidLength));

            let big = [0u8; 1025];
            assert_eq!(fs.add_file(&big, Some("x")), Err(FsError::InvalidLength));
        }
        assert!(flash.ops().is_empty());
    }

    #[test]
    fn nameless_files_get_sequential_names() {
        let mut fs = engine();

        for i in 0..3 {
            fs.add_file(&[i as u8; 8], None).unwrap();
            assert_eq!(fs.last_filename().unwrap(), FileName::synthesized(i));
            assert_eq!(fs.file_count().unwrap(), i + 1);
        }

        let mut buf = [0u8; 8];
        assert_eq!(fs.get_file("debug001", &mut buf).unwrap(), 8);
        assert_eq!(buf, [1u8; 8]);
    }

    #[test]
    fn traversal_visits_files_in_insertion_order() {
        let mut fs = engine();
        for name in ["one", "two", "three"] {
            fs.add_file(name.as_bytes(), Some(name)).unwrap();
        }

        let names: std::vec::Vec<_> = fs.files().map(|f| f.header.name).collect();
        assert_eq!(
            names,
            [
                FileName::new("one"),
                FileName::new("two"),
                FileName::new("three"),
            ]
        );

        // the explicit cursor walk ends in EndOfTable
        let mut f = FlashFile::default();
        let mut visited = 0;
        let mut slot = fs.find_first_file(&mut f);
        while slot.is_ok() {
            visited += 1;
            slot = fs.find_next_file(&mut f);
        }
        assert_eq!(visited, 3);
        assert_eq!(slot, Err(FsError::EndOfTable));
    }

    #[test]
    fn traversal_of_empty_table() {
        let fs = engine();
        let mut f = FlashFile::default();
        assert_eq!(fs.find_first_file(&mut f), Err(FsError::EndOfTable));
        assert_eq!(fs.files().count(), 0);
        assert_eq!(fs.last_filename(), Err(FsError::EndOfTable));
    }

    #[test]
    fn files_are_packed_on_even_boundaries() {
        let mut fs = engine();
        fs.add_file(&[0xAA; 5], Some("odd")).unwrap();
        fs.add_file(&[0xBB; 4], Some("next")).unwrap();

        let first = fs.find_file("odd").unwrap();
        let second = fs.find_file("next").unwrap();

        assert_eq!(first.addr, fs.config().base + 0x1000);
        // 24-byte header + 5 bytes payload = 29, rounded up to 30
        assert_eq!(second.addr, first.addr + 30);
        assert_eq!(second.addr % 2, 0);
    }

    #[test]
    fn odd_payload_is_padded_with_erased_pattern() {
        let mut fs = engine();
        fs.add_file(&[1, 2, 3], Some("odd")).unwrap();

        let f = fs.find_file("odd").unwrap();
        assert_eq!(f.data_len, 3);

        let flash = fs.into_inner();
        assert_eq!(flash.contents(f.data_addr, 4), [1, 2, 3, 0xFF]);
    }

    #[test]
    fn no_space_when_region_exhausted() {
        let cfg = RcfsConfig {
            file_ceiling: 0x1100, // 256 bytes of file space
            ..small_cfg()
        };
        let mut fs = Rcfs::with_config(MockFlash::new(), cfg);

        fs.add_file(&[0u8; 200], Some("first")).unwrap();
        assert_eq!(
            fs.add_file(&[0u8; 200], Some("second")),
            Err(FsError::NoSpace)
        );
    }

    #[test]
    fn no_space_when_table_full() {
        let cfg = RcfsConfig {
            max_files: 2,
            ..small_cfg()
        };
        let mut fs = Rcfs::with_config(MockFlash::new(), cfg);

        fs.add_file(&[1; 4], None).unwrap();
        fs.add_file(&[2; 4], None).unwrap();
        assert_eq!(fs.add_file(&[3; 4], None), Err(FsError::NoSpace));
    }

    #[test]
    fn get_file_miss_is_not_found() {
        let mut fs = engine();
        fs.add_file(&[1; 4], Some("present")).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(
            fs.get_file("missing", &mut buf),
            Err(FsError::NotFound)
        );
    }

    #[test]
    fn program_failure_propagates() {
        let mut flash = MockFlash::new();
        flash.force_status(FlashError::ProgramError);

        let mut fs = Rcfs::with_config(flash, small_cfg());
        assert_eq!(
            fs.add_file(&[1; 4], Some("x")),
            Err(FsError::Flash(FlashError::ProgramError))
        );
    }

    #[test]
    fn compact_header_format_shifts_payload() {
        let cfg = RcfsConfig {
            header: HeaderFormat::Compact,
            ..small_cfg()
        };
        let mut fs = Rcfs::with_config(MockFlash::new(), cfg);

        fs.add_file(&[9; 6], Some("legacy")).unwrap();
        let f = fs.find_file("legacy").unwrap();
        assert_eq!(f.data_addr, f.addr + 22);
        assert_eq!(f.data_len, 6);

        let mut buf = [0u8; 6];
        fs.get_file("legacy", &mut buf).unwrap();
        assert_eq!(buf, [9; 6]);
    }

    #[test]
    fn progress_checkpoints_fire_for_long_writes() {
        let mut fs = engine();
        let data = [0x5A; 600]; // 300 half-words: checkpoints at 0, 128, 256

        let mut calls = std::vec::Vec::new();
        fs.add_file_with(&data, Some("long"), |done| calls.push(done))
            .unwrap();

        assert_eq!(calls, [2, 258, 514]);
    }
}
