//! Platform abstraction layer
//!
//! This module isolates everything hardware-proximate: the flash programming
//! trait, the status/error types surfaced by the controller, the
//! register-level STM32F1 backend, and the in-memory mock used by tests.

pub mod error;
pub mod traits;

// Platform implementations (feature-gated)
#[cfg(feature = "stm32f1")]
pub mod stm32f1;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export commonly used types
pub use error::{FlashError, Result};
pub use traits::FlashController;
