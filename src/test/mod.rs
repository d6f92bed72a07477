//! Shared fixtures for unit tests.
//!
//! The factories build small live domains by hand, the way a host would mirror its runtime into
//! the live model, so every component can be exercised without a running execution engine.

pub mod factories;
pub mod encoder;
