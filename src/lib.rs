// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # cilgraft
//!
//! Method transplantation and metadata relinking for .NET CIL.
//!
//! `cilgraft` takes a method as a running execution engine exposes it (the *live view*) and
//! rebuilds it inside an editable, in-memory metadata document (the *document view*): its
//! signature, its local variables, its instruction stream and its exception regions. Every
//! type, method and field the method mentions is imported as a value-like reference, so the
//! body can be rewritten and re-emitted without touching the original assembly. The reverse
//! direction is covered too: references inside a document can be resolved back to the live
//! entities they denote.
//!
//! ## Features
//!
//! - **🔁 Transplanting** - Decode a live method body into an editable document method
//! - **🔗 Cross-view importing** - Turn live types and members into document references
//! - **🧩 Relinking** - Retarget every reference of a document graph through a resolver
//! - **🔍 Reflective resolution** - Map document references back to live entities
//! - **🛡️ Memory safe** - Malformed input is reported, never trusted
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilgraft::prelude::*;
//!
//! # fn demo(method: &LiveMethodRc) -> cilgraft::Result<()> {
//! let transplanted = transplant(method)?;
//! let body = &transplanted.definition()?.body;
//! println!("{} instructions", body.instructions.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`live`] - The live metadata view a host mirrors its runtime into
//! - [`document`] - The editable document model: modules, definitions, references, bodies
//! - [`metadata`] - Tokens, flags, element types and the signature decoder
//! - [`matcher`] - Identity comparison of a document reference and a live entity
//! - [`import`] - Import of live entities as document references
//! - [`disassembler`] - Decoding of live instruction streams and exception clauses
//! - [`transplant`] - The method transplanter
//! - [`relink`] - Generic rewriting of reference graphs
//! - [`reflect`] - Resolution of document references to live entities
//! - [`generics`] - Generic parameter scopes used while relinking
//! - [`config`] - Decoder, transplanter and resolver settings
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust,no_run
//! use cilgraft::{transplant, Error};
//!
//! # fn demo(method: &cilgraft::live::LiveMethodRc) {
//! match transplant(method) {
//!     Ok(document) => println!("transplanted into {}", document.module().name),
//!     Err(Error::BodyLess(name)) => println!("{name} has no IL body"),
//!     Err(Error::Malformed { message, .. }) => println!("malformed body: {message}"),
//!     Err(e) => println!("error: {e}"),
//! }
//! # }
//! ```
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench --bench decode
//! cargo +nightly fuzz run instructions --release
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use cilgraft::prelude::*;
///
/// let domain = LiveDomain::new();
/// let assembly = domain.add_assembly("Calculator", "Calculator", None);
/// assert_eq!(assembly.modules().count(), 0);
/// ```
pub mod prelude;

pub mod config;
pub mod disassembler;
pub mod document;
pub mod generics;
pub mod import;
pub mod live;
pub mod matcher;
pub mod metadata;
pub mod reflect;
pub mod relink;
pub mod transplant;
pub mod utils;

/// `cilgraft` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilgraft` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use cilgraft::Error;
///
/// let error = Error::BodyLess("Demo.Calculator::Abs".into());
/// assert!(error.to_string().contains("Abs"));
/// ```
pub use error::Error;

/// Bounds-checked reader for instruction streams and signature blobs.
///
/// # Example
///
/// ```rust
/// use cilgraft::Parser;
/// let data = [0x81, 0x80];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_compressed_uint()?, 0x180);
/// # Ok::<(), cilgraft::Error>(())
/// ```
pub use file::parser::Parser;

pub use metadata::token::Token;
pub use reflect::LiveResolver;
pub use relink::{relink, Relink, RelinkResolver};
pub use transplant::{transplant, transplant_with, DocumentMethod, MethodTransplanter};
