//! Shared utilities.

pub mod cache;

pub use cache::{CacheStats, WeakCache};
