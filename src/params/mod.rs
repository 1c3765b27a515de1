//! Log-structured parameter store
//!
//! Persists one fixed-size parameter block in a dedicated flash page.
//! Flash cells only move from erased (all-ones) to programmed without a
//! full page erase, so updates append to fresh slots instead of rewriting
//! in place: page erases (expensive, wear-limited) are traded for storage
//! slots (consumed monotonically, reclaimed in bulk when the page wraps).

pub mod block;
pub mod store;

// Re-export commonly used types
pub use block::{ParamBlock, PARAM_WORDS};
pub use store::{ParamConfig, ParamError, ParamStore, INDEX_WORDS, PAGE_WORDS, SLOT_CAPACITY};
