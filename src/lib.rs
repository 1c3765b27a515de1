#![cfg_attr(not(test), no_std)]

//! cortex-nvs - non-volatile storage for VEX Cortex class (STM32F103) targets
//!
//! This library turns a raw NOR-flash region into two small persistent stores
//! built on one register-level programming primitive:
//!
//! - [`rcfs`] - a minimal append-only file system with a table of contents.
//!   Files are written once and never deleted; lookup is a linear scan of a
//!   fixed-capacity table.
//! - [`params`] - a log-structured slot store for one fixed-size parameter
//!   block. Each write consumes a fresh slot; the page is erased and the log
//!   restarts when the slots run out.
//!
//! Both engines drive the flash through the [`platform::FlashController`]
//! trait, so they run unchanged against the register-level STM32F1 backend
//! (`stm32f1` feature) or the in-memory mock (`mock` feature / tests).

// The mock flash backend keeps its storage in a Vec and is host-only.
#[cfg(any(test, feature = "mock"))]
extern crate std;

// Platform abstraction layer (flash programming primitive)
pub mod platform;

// Append-only file system engine
pub mod rcfs;

// Log-structured parameter store
pub mod params;

// Logging macros (defmt on embedded targets, println in host tests)
pub mod logging;

// Re-export commonly used types
pub use params::{ParamBlock, ParamConfig, ParamError, ParamStore, PARAM_WORDS};
pub use platform::{FlashController, FlashError};
pub use rcfs::{FileHeader, FileName, FlashFile, FsError, HeaderFormat, Rcfs, RcfsConfig};
