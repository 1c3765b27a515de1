//! Flash controller trait
//!
//! This module defines the flash programming interface the storage engines
//! are written against.
//!
//! # Flash Characteristics
//!
//! - The medium is NOR flash: an erase sets every bit of a page to 1, and
//!   programming can only clear bits from 1 to 0. Rewriting a cell requires
//!   a whole-page erase.
//! - The controller accepts half-word (16-bit) programs only. A word write
//!   is two sequential half-word programs and is **not atomic**: power loss
//!   between the halves leaves the low half programmed and the high half
//!   erased. Callers that treat a word as a marker must design for this.
//! - Program and erase block until the controller goes idle or a bounded
//!   spin expires. Reads are memory-mapped and always succeed.
//!
//! # Safety Invariants
//!
//! - Only one owner drives the controller at a time. The engines take the
//!   controller by value (or `&mut`), so the borrow checker enforces
//!   exclusive access; see the blanket impl below for sharing one controller
//!   between engines sequentially.
//! - `unlock()` must have been called before any program or erase.

use crate::platform::error::Result;

/// Flash programming interface.
///
/// Implemented by the register-level STM32F1 backend and by the in-memory
/// mock. All addresses are absolute (the STM32F1 maps flash at
/// 0x0800_0000); the engines translate their logical offsets before calling
/// down.
pub trait FlashController {
    /// Authorize the program/erase controller.
    ///
    /// On STM32F1 hardware this is the two-key FPEC unlock sequence.
    /// Idempotent; calling it on an unlocked controller is harmless.
    fn unlock(&mut self);

    /// Clear end-of-operation and error flags left over from a previous
    /// operation. Call before starting a new program or erase sequence.
    fn clear_pending_flags(&mut self);

    /// Erase the page containing `page_addr`, resetting it to all-ones.
    ///
    /// Blocks until the controller goes idle or the bounded wait expires.
    ///
    /// # Errors
    ///
    /// `Timeout` if the busy-wait counter ran out; `WriteProtectError` if
    /// the page is protected. Neither is retried here.
    fn erase_page(&mut self, page_addr: u32) -> Result<()>;

    /// Program a 16-bit half-word at `addr` (must be 2-byte aligned).
    ///
    /// # Errors
    ///
    /// `ProgramError` if the target was not erased, `WriteProtectError` if
    /// the controller is locked or the address protected, `Timeout` if the
    /// completion wait expired.
    fn program_half_word(&mut self, addr: u32, value: u16) -> Result<()>;

    /// Program a 32-bit word as two half-word programs, low half first.
    ///
    /// Not atomic: a power loss between the two halves leaves the word
    /// half-programmed. The first failing half aborts the sequence.
    fn program_word(&mut self, addr: u32, value: u32) -> Result<()> {
        self.program_half_word(addr, (value & 0xFFFF) as u16)?;
        self.program_half_word(addr + 2, (value >> 16) as u16)
    }

    /// Copy bytes out of the memory-mapped flash region.
    fn read(&self, addr: u32, buf: &mut [u8]);

    /// Read a little-endian half-word.
    fn read_half_word(&self, addr: u32) -> u16 {
        let mut b = [0u8; 2];
        self.read(addr, &mut b);
        u16::from_le_bytes(b)
    }

    /// Read a little-endian word.
    fn read_word(&self, addr: u32) -> u32 {
        let mut b = [0u8; 4];
        self.read(addr, &mut b);
        u32::from_le_bytes(b)
    }
}

// Lets the file system and the parameter store share one controller
// sequentially: each engine borrows it for the duration of a call.
impl<C: FlashController + ?Sized> FlashController for &mut C {
    fn unlock(&mut self) {
        (**self).unlock()
    }

    fn clear_pending_flags(&mut self) {
        (**self).clear_pending_flags()
    }

    fn erase_page(&mut self, page_addr: u32) -> Result<()> {
        (**self).erase_page(page_addr)
    }

    fn program_half_word(&mut self, addr: u32, value: u16) -> Result<()> {
        (**self).program_half_word(addr, value)
    }

    fn program_word(&mut self, addr: u32, value: u32) -> Result<()> {
        (**self).program_word(addr, value)
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        (**self).read(addr, buf)
    }
}
