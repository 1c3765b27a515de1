//! Mock platform implementation for testing

pub mod flash;

pub use flash::{FlashOp, MockFlash};
