//! Parameter store engine
//!
//! # Page layout
//!
//! ```text
//! page ┌───────────────────────────────┐
//!      │ index: 64 half-word pairs     │  256 bytes
//!      │   erased pair  = slot free    │
//!      │   anything else = slot used   │
//!      ├───────────────────────────────┤
//!      │ slot 0: 8 words               │
//!      │ slot 1: 8 words               │
//!      │ ...                           │
//!      │ slot 55: 8 words              │
//!      └───────────────────────────────┘
//! ```
//!
//! Used markers are appended from index slot 0 upward within one page
//! generation; a marker is only cleared by erasing the whole page. The
//! marker for a slot is programmed strictly **after** the slot's data, so a
//! power loss between the two leaves a fully written but uncounted slot:
//! the next scan simply never sees it. The data is orphaned, never
//! misread.

use super::block::{ParamBlock, PARAM_WORDS};
use crate::platform::traits::FlashController;
use core::fmt;

/// Words in the index region at the head of the page
pub const INDEX_WORDS: u32 = 64;

/// Size of the parameter page in words
pub const PAGE_WORDS: u32 = 512;

const WORD: u32 = 4;

/// Parameter slots available per page generation
pub const SLOT_CAPACITY: i32 = ((PAGE_WORDS - INDEX_WORDS) / PARAM_WORDS as u32) as i32;

/// Deployment configuration for the parameter store.
///
/// The page layout itself ([`INDEX_WORDS`], [`PAGE_WORDS`],
/// [`PARAM_WORDS`]) is fixed by the on-disk format and not configurable.
#[derive(Debug, Clone, Copy)]
pub struct ParamConfig {
    /// Absolute address of the dedicated flash page, disjoint from the
    /// file system region
    pub page_addr: u32,
    /// Writes permitted per process lifetime; bounds erase-cycle wear from
    /// a runaway caller
    pub write_limit: u16,
}

impl Default for ParamConfig {
    fn default() -> Self {
        Self {
            page_addr: 0x0805_F000,
            write_limit: 32,
        }
    }
}

/// Parameter store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamError {
    /// A program operation did not complete; the slot may be partially
    /// written (and will stay uncounted, since its marker is never set)
    WriteError,
    /// The per-session write throttle is exhausted; flash was not touched
    WriteLimitExceeded,
    /// The page erase on wrap-around or init did not complete
    EraseError,
    /// `init` was called more than once this session
    EraseLimitExceeded,
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::WriteError => write!(f, "parameter write failed"),
            ParamError::WriteLimitExceeded => write!(f, "parameter write limit exceeded"),
            ParamError::EraseError => write!(f, "parameter page erase failed"),
            ParamError::EraseLimitExceeded => write!(f, "parameter page already initialized"),
        }
    }
}

/// Log-structured parameter store over one dedicated page.
///
/// The write throttle and the init-once flag are per-process-lifetime
/// state owned by this struct; they reset only when the process restarts,
/// never through any call.
pub struct ParamStore<C> {
    flash: C,
    cfg: ParamConfig,
    writes_used: u16,
    init_done: bool,
}

impl<C: FlashController> ParamStore<C> {
    /// Store over `flash` with the default Cortex page
    pub fn new(flash: C) -> Self {
        Self::with_config(flash, ParamConfig::default())
    }

    pub fn with_config(flash: C, cfg: ParamConfig) -> Self {
        Self {
            flash,
            cfg,
            writes_used: 0,
            init_done: false,
        }
    }

    pub fn config(&self) -> &ParamConfig {
        &self.cfg
    }

    /// Writes consumed from the per-session budget so far
    pub fn writes_used(&self) -> u16 {
        self.writes_used
    }

    /// Hand the controller back
    pub fn into_inner(self) -> C {
        self.flash
    }

    /// Index of the last used slot this page generation, or -1 when the
    /// page holds no parameters.
    ///
    /// Scans the index from slot 0, counting consecutive used markers; the
    /// first erased pair ends the scan.
    pub fn current_offset(&self) -> i32 {
        let mut offset = -1;

        for i in 0..INDEX_WORDS {
            let addr = self.cfg.page_addr + i * WORD;
            // compare the halves separately; an interrupted marker write
            // still counts as used
            let upper = self.flash.read_half_word(addr);
            let lower = self.flash.read_half_word(addr + 2);
            if upper != 0xFFFF || lower != 0xFFFF {
                offset += 1;
            } else {
                break;
            }
        }

        offset
    }

    fn slot_addr(&self, offset: i32) -> u32 {
        self.cfg.page_addr + (INDEX_WORDS + offset as u32 * PARAM_WORDS as u32) * WORD
    }

    /// Read the current parameter block.
    ///
    /// Returns the all-ones pattern (and `offset == -1`, `addr == None`)
    /// when no parameters were ever written this page generation.
    pub fn read(&self) -> ParamBlock {
        let offset = self.current_offset();
        if offset < 0 {
            return ParamBlock::erased();
        }

        let addr = self.slot_addr(offset);
        let mut block = ParamBlock::new();
        for (i, word) in block.words.iter_mut().enumerate() {
            *word = self.flash.read_word(addr + i as u32 * WORD);
        }
        block.offset = offset;
        block.addr = Some(addr);
        block
    }

    /// Append the block to the next free slot, erasing and restarting the
    /// page when the slots are exhausted.
    ///
    /// On success the block's `offset`/`addr` record where it landed.
    ///
    /// # Errors
    ///
    /// - `WriteLimitExceeded` once the session budget is spent; flash is
    ///   left untouched
    /// - `EraseError` when the wrap-around page erase fails
    /// - `WriteError` when programming fails; the slot may hold a partial
    ///   block but is never marked used
    pub fn write(&mut self, block: &mut ParamBlock) -> Result<(), ParamError> {
        if self.writes_used >= self.cfg.write_limit {
            return Err(ParamError::WriteLimitExceeded);
        }
        self.writes_used += 1;

        self.flash.unlock();
        self.flash.clear_pending_flags();

        let mut offset = self.current_offset() + 1;

        if offset >= SLOT_CAPACITY {
            crate::log_debug!("parameter page full at offset {}, erasing", offset);
            if self.flash.erase_page(self.cfg.page_addr).is_err() {
                return Err(ParamError::EraseError);
            }
            offset = 0;
        }

        let addr = self.slot_addr(offset);
        block.offset = offset;
        block.addr = Some(addr);

        for (i, word) in block.words.iter().enumerate() {
            if self.flash.program_word(addr + i as u32 * WORD, *word).is_err() {
                return Err(ParamError::WriteError);
            }
        }

        // Mark the slot used only now that every data word is on flash. A
        // crash before this point orphans the slot; the scan never counts
        // it and the previous block stays current.
        if self
            .flash
            .program_word(self.cfg.page_addr + offset as u32 * WORD, 0)
            .is_err()
        {
            return Err(ParamError::WriteError);
        }

        Ok(())
    }

    /// One-time factory reset: erase the parameter page.
    ///
    /// Allowed once per process lifetime; a second call fails with
    /// `EraseLimitExceeded` without issuing an erase.
    pub fn init(&mut self) -> Result<(), ParamError> {
        if self.init_done {
            return Err(ParamError::EraseLimitExceeded);
        }
        self.init_done = true;

        self.flash.unlock();
        if self.flash.erase_page(self.cfg.page_addr).is_err() {
            return Err(ParamError::EraseError);
        }

        Ok(())
    }

    /// Hex-dump the parameter page through the crate log macros, four
    /// words per line
    pub fn dump_page(&self) {
        for line in 0..PAGE_WORDS / 4 {
            let addr = self.cfg.page_addr + line * 4 * WORD;
            crate::log_debug!(
                "{:08x}: {:08x} {:08x} {:08x} {:08x}",
                addr,
                self.flash.read_word(addr),
                self.flash.read_word(addr + 4),
                self.flash.read_word(addr + 8),
                self.flash.read_word(addr + 12)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::error::FlashError;
    use crate::platform::mock::{FlashOp, MockFlash};

    fn store() -> ParamStore<MockFlash> {
        ParamStore::new(MockFlash::new())
    }

    /// Config with the throttle opened up so page-wrap tests can run
    fn unthrottled() -> ParamConfig {
        ParamConfig {
            write_limit: 1000,
            ..ParamConfig::default()
        }
    }

    fn block_of(words: [u32; PARAM_WORDS]) -> ParamBlock {
        ParamBlock {
            words,
            ..ParamBlock::new()
        }
    }

    #[test]
    fn fresh_page_has_no_parameters() {
        let ps = store();
        assert_eq!(ps.current_offset(), -1);

        let block = ps.read();
        assert!(block.is_erased());
        assert_eq!(block.offset, -1);
        assert_eq!(block.addr, None);
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut ps = store();
        let mut block = block_of([1, 2, 3, 4, 5, 6, 7, 8]);

        ps.write(&mut block).unwrap();
        assert_eq!(block.offset, 0);

        let back = ps.read();
        assert_eq!(back.words, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(back.offset, 0);
        assert_eq!(back.addr, block.addr);
    }

    #[test]
    fn writes_advance_through_slots() {
        let mut ps = store();

        for i in 0..4u32 {
            let mut block = block_of([i; PARAM_WORDS]);
            ps.write(&mut block).unwrap();
            assert_eq!(block.offset, i as i32);
            assert_eq!(ps.current_offset(), i as i32);
            assert_eq!(ps.read().words, [i; PARAM_WORDS]);
        }
    }

    #[test]
    fn slot_addresses_skip_the_index_region() {
        let mut ps = store();
        let mut block = block_of([7; PARAM_WORDS]);
        ps.write(&mut block).unwrap();

        let page = ps.config().page_addr;
        assert_eq!(block.addr, Some(page + INDEX_WORDS * 4));

        // the index marker for slot 0 went to the first index word
        let flash = ps.into_inner();
        assert_eq!(flash.read_word(page), 0);
        assert_eq!(flash.read_word(page + 4), 0xFFFF_FFFF);
    }

    #[test]
    fn page_wraps_after_capacity_writes() {
        let mut ps = ParamStore::with_config(MockFlash::new(), unthrottled());

        for i in 0..SLOT_CAPACITY as u32 {
            ps.write(&mut block_of([i; PARAM_WORDS])).unwrap();
        }
        assert_eq!(ps.current_offset(), SLOT_CAPACITY - 1);

        // the next write erases the page and restarts at slot 0
        let mut block = block_of([0xAB; PARAM_WORDS]);
        ps.write(&mut block).unwrap();
        assert_eq!(block.offset, 0);

        let back = ps.read();
        assert_eq!(back.offset, 0);
        assert_eq!(back.words, [0xAB; PARAM_WORDS]);

        let flash = ps.into_inner();
        assert_eq!(flash.erase_count(ParamConfig::default().page_addr), 1);
    }

    #[test]
    fn write_limit_throttles_without_touching_flash() {
        let mut flash = MockFlash::new();
        {
            let mut ps = ParamStore::new(&mut flash);
            for i in 0..32u32 {
                ps.write(&mut block_of([i; PARAM_WORDS])).unwrap();
            }

            let before = ps.read();
            assert_eq!(
                ps.write(&mut block_of([0xEE; PARAM_WORDS])),
                Err(ParamError::WriteLimitExceeded)
            );
            assert_eq!(ps.read(), before);
            assert_eq!(ps.writes_used(), 32);
        }

        // the rejected write recorded no controller operation; the final op
        // is still the 32nd write's index marker
        assert_eq!(
            flash.ops().last(),
            Some(&FlashOp::ProgramHalfWord(0x0805_F000 + 31 * 4 + 2))
        );
    }

    #[test]
    fn failed_data_write_leaves_slot_unmarked() {
        let mut ps = ParamStore::new(MockFlash::new());
        ps.write(&mut block_of([1; PARAM_WORDS])).unwrap();

        // let the 16 data half-words of the next slot land, then cut power
        // before the index marker
        let mut block = block_of([2; PARAM_WORDS]);
        ps.flash.fail_after(16);
        assert_eq!(ps.write(&mut block), Err(ParamError::WriteError));

        // the fully written slot is orphaned: the scan still sees slot 0
        assert_eq!(ps.current_offset(), 0);
        assert_eq!(ps.read().words, [1; PARAM_WORDS]);
    }

    #[test]
    fn failed_program_reports_write_error() {
        let mut ps = store();
        let mut block = block_of([1; PARAM_WORDS]);

        ps.flash.force_status(FlashError::ProgramError);
        assert_eq!(ps.write(&mut block), Err(ParamError::WriteError));
    }

    #[test]
    fn wrap_erase_failure_reports_erase_error() {
        let mut ps = ParamStore::with_config(MockFlash::new(), unthrottled());
        for i in 0..SLOT_CAPACITY as u32 {
            ps.write(&mut block_of([i; PARAM_WORDS])).unwrap();
        }

        ps.flash.force_status(FlashError::Timeout);
        assert_eq!(
            ps.write(&mut block_of([9; PARAM_WORDS])),
            Err(ParamError::EraseError)
        );
    }

    #[test]
    fn init_is_one_shot() {
        let mut ps = store();
        ps.write(&mut block_of([5; PARAM_WORDS])).unwrap();
        assert_eq!(ps.current_offset(), 0);

        ps.init().unwrap();
        assert_eq!(ps.current_offset(), -1);
        assert!(ps.read().is_erased());

        assert_eq!(ps.init(), Err(ParamError::EraseLimitExceeded));

        // exactly one erase reached the controller
        let flash = ps.into_inner();
        let erases = flash
            .ops()
            .iter()
            .filter(|op| matches!(op, FlashOp::ErasePage(_)))
            .count();
        assert_eq!(erases, 1);
    }

    #[test]
    fn engines_can_share_one_controller() {
        use crate::rcfs::Rcfs;

        let mut flash = MockFlash::new();

        {
            let mut fs = Rcfs::new(&mut flash);
            fs.add_file(b"shared", Some("cfg")).unwrap();
        }

        {
            let mut ps = ParamStore::new(&mut flash);
            let mut block = block_of([0xC0FFEE; PARAM_WORDS]);
            ps.write(&mut block).unwrap();
            assert_eq!(ps.read().words, [0xC0FFEE; PARAM_WORDS]);
        }

        let fs = Rcfs::new(&mut flash);
        let mut buf = [0u8; 8];
        assert_eq!(fs.get_file("cfg", &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"shared");
    }
}
