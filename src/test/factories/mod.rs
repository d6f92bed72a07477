//! Factory methods for test data.

pub mod live;
