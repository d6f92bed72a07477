//! ECMA-335 metadata primitives shared by both metadata views.
//!
//! # Key Components
//!
//! - [`crate::metadata::token`] - Metadata tokens and their tables
//! - [`crate::metadata::signatures`] - Signature blob decoding
//! - [`crate::metadata::typesystem`] - Element type constants and the primitive table
//! - [`crate::metadata::flags`] - Type, method, field, parameter and exception handler flags

pub mod flags;
pub mod signatures;
pub mod token;
pub mod typesystem;
