//! STM32F1 flash implementation
//!
//! Register-level driver for the STM32F10x flash program/erase controller
//! (FPEC). The VEX Cortex carries a high-density STM32F103 with 2 KB pages
//! mapped at 0x0800_0000.
//!
//! # Safety
//!
//! Flash operations poke the FPEC registers directly and must:
//! - Run with interrupts disabled (an interrupt handler fetching from flash
//!   mid-program would stall the bus)
//! - Never program a half-word that is not in the erased state
//! - Complete or time out; there is no way to abort an issued operation
//!
//! Completion is a busy-wait on the SR busy flag bounded by a decrementing
//! iteration counter, not a wall-clock timer. A `Timeout` therefore means
//! the counter ran out with the controller still busy; the caller must treat
//! it as a hard failure.

use crate::platform::error::{FlashError, Result};
use crate::platform::traits::FlashController;
use bitflags::bitflags;
use core::ptr;

/// Flash register block base address (AHB peripheral space)
const FLASH_R_BASE: u32 = 0x4002_2000;

/// Register offsets within the FPEC block
const KEYR: u32 = 0x04;
const SR: u32 = 0x0C;
const CR: u32 = 0x10;
const AR: u32 = 0x14;

/// FPEC unlock key sequence
const FLASH_KEY1: u32 = 0x4567_0123;
const FLASH_KEY2: u32 = 0xCDEF_89AB;

/// Busy-wait iteration budgets (loop counts, not wall-clock durations)
const ERASE_TIMEOUT: u32 = 0x000B_0000;
const PROGRAM_TIMEOUT: u32 = 0x0000_2000;

bitflags! {
    /// FLASH_SR status bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// Operation in progress
        const BSY = 1 << 0;
        /// Programming error (target was not erased)
        const PGERR = 1 << 2;
        /// Write protection error
        const WRPRTERR = 1 << 4;
        /// End of operation
        const EOP = 1 << 5;
    }
}

bitflags! {
    /// FLASH_CR control bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Control: u32 {
        /// Half-word programming
        const PG = 1 << 0;
        /// Page erase
        const PER = 1 << 1;
        /// Start erase
        const STRT = 1 << 6;
    }
}

/// STM32F1 flash controller
///
/// Zero-sized handle over the memory-mapped FPEC registers. Construct one
/// per firmware image and hand it (or a `&mut` borrow) to the storage
/// engines.
pub struct Stm32f1Flash {
    _private: (),
}

impl Stm32f1Flash {
    /// Create a new STM32F1 flash controller handle
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn reg(offset: u32) -> *mut u32 {
        (FLASH_R_BASE + offset) as *mut u32
    }

    /// Translate the current SR flags into a status result.
    fn bank_status(&self) -> Result<()> {
        // SAFETY: SR is a valid, always-readable FPEC register.
        let sr = Status::from_bits_truncate(unsafe { ptr::read_volatile(Self::reg(SR)) });

        if sr.contains(Status::BSY) {
            Err(FlashError::Busy)
        } else if sr.contains(Status::PGERR) {
            Err(FlashError::ProgramError)
        } else if sr.contains(Status::WRPRTERR) {
            Err(FlashError::WriteProtectError)
        } else {
            Ok(())
        }
    }

    /// Wait for the in-flight operation to complete or the budget to expire.
    ///
    /// `Busy` resolving naturally during the spin is the only recoverable
    /// condition; any error status is returned as-is.
    fn wait_for_last_operation(&self, mut budget: u32) -> Result<()> {
        let mut status = self.bank_status();

        while status == Err(FlashError::Busy) && budget != 0 {
            status = self.bank_status();
            budget -= 1;
        }

        if budget == 0 {
            return Err(FlashError::Timeout);
        }

        status
    }

    fn modify_cr(set: Control, clear: Control) {
        // SAFETY: read-modify-write of the control register; callers hold a
        // critical section so the sequence cannot be interleaved.
        unsafe {
            let cr = ptr::read_volatile(Self::reg(CR));
            ptr::write_volatile(Self::reg(CR), (cr & !clear.bits()) | set.bits());
        }
    }
}

impl Default for Stm32f1Flash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashController for Stm32f1Flash {
    fn unlock(&mut self) {
        // SAFETY: the two-key sequence authorizes the FPEC; writing the keys
        // to an already-unlocked controller is ignored by the hardware.
        unsafe {
            ptr::write_volatile(Self::reg(KEYR), FLASH_KEY1);
            ptr::write_volatile(Self::reg(KEYR), FLASH_KEY2);
        }
    }

    fn clear_pending_flags(&mut self) {
        // SAFETY: SR flags are write-one-to-clear.
        unsafe {
            ptr::write_volatile(
                Self::reg(SR),
                (Status::EOP | Status::PGERR | Status::WRPRTERR).bits(),
            );
        }
    }

    fn erase_page(&mut self, page_addr: u32) -> Result<()> {
        cortex_m::interrupt::free(|_cs| {
            self.wait_for_last_operation(ERASE_TIMEOUT)?;

            // SAFETY: PER selects page erase, AR takes the page address,
            // STRT kicks off the operation.
            Self::modify_cr(Control::PER, Control::empty());
            unsafe {
                ptr::write_volatile(Self::reg(AR), page_addr);
            }
            Self::modify_cr(Control::STRT, Control::empty());

            let status = self.wait_for_last_operation(ERASE_TIMEOUT);

            Self::modify_cr(Control::empty(), Control::PER);

            status
        })
    }

    fn program_half_word(&mut self, addr: u32, value: u16) -> Result<()> {
        cortex_m::interrupt::free(|_cs| {
            self.wait_for_last_operation(PROGRAM_TIMEOUT)?;

            Self::modify_cr(Control::PG, Control::empty());

            // SAFETY: with PG set, a 16-bit store to the target address
            // starts the program operation. Address validity is the
            // caller's responsibility (engines only write inside their
            // configured regions).
            unsafe {
                ptr::write_volatile(addr as *mut u16, value);
            }

            let status = self.wait_for_last_operation(PROGRAM_TIMEOUT);

            Self::modify_cr(Control::empty(), Control::PG);

            if status.is_err() {
                crate::log_error!("flash program failed at {:08x}", addr);
            }

            status
        })
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        // Flash is memory mapped; a plain copy needs no controller
        // interaction and cannot fail.
        // SAFETY: the engines only read inside their configured regions.
        unsafe {
            ptr::copy_nonoverlapping(addr as *const u8, buf.as_mut_ptr(), buf.len());
        }
    }
}
