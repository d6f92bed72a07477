//! Raw byte access for CIL instruction streams, signature blobs and on-disk images.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser`] - Bounds-checked cursor with the ECMA-335 compressed integer reads
//! - [`crate::file::io`] - Low-level little-endian primitive reads
//! - [`crate::file::physical::Physical`] - Memory-mapped view of an assembly on disk, used by the
//!   decoder's raw token lookup fallback

pub mod io;
pub mod parser;
pub mod physical;
