//! Platform abstraction traits

pub mod flash;

// Re-export trait interfaces
pub use flash::FlashController;
