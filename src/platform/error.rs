//! Platform error types

use core::fmt;

/// Result type for flash programming operations
pub type Result<T> = core::result::Result<T, FlashError>;

/// Errors reported by the flash programming controller.
///
/// These map one-to-one onto the FPEC status conditions. `Busy` is the only
/// condition that resolves naturally (the wait loop spins it away); the
/// others are terminal for the operation that raised them and are never
/// retried inside the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// An operation is still in progress
    Busy,
    /// Programming failed; the target half-word was not in the erased state
    ProgramError,
    /// The target address is write protected (or the controller is locked)
    WriteProtectError,
    /// The busy-wait counter expired before the controller went idle.
    /// Terminal: a stuck controller will not recover by retrying.
    Timeout,
    /// Address outside the flash region
    InvalidAddress,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::Busy => write!(f, "flash controller busy"),
            FlashError::ProgramError => write!(f, "flash programming error"),
            FlashError::WriteProtectError => write!(f, "flash write protect error"),
            FlashError::Timeout => write!(f, "flash operation timed out"),
            FlashError::InvalidAddress => write!(f, "address outside flash region"),
        }
    }
}
