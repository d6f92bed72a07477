//! CIL instruction stream decoding.
//!
//! Turns the raw instruction bytes of a live method into the editable
//! [`crate::document::MethodBody`] of the document model. Decoding runs in three passes:
//!
//! 1. A linear walk over the stream using the opcode tables of [`crate::document::opcodes`].
//!    Token operands are resolved through the live module and imported with a
//!    [`crate::import::ReferenceImporter`]; branch operands are kept as absolute offsets.
//! 2. Branch offsets are resolved to instruction ids with [`resolve_offset`].
//! 3. Flat exception clauses become [`crate::document::ExceptionRegion`]s with
//!    [`decode_regions`].
//!
//! Tokens the live view cannot resolve can be looked up in the module's image on disk through
//! an [`ImageTokenResolver`], if [`crate::config::DecoderConfig::disk_fallback`] is enabled.
//!
//! # Example
//! ```rust,no_run
//! use cilgraft::config::DecoderConfig;
//! use cilgraft::disassembler::decode_body;
//! use cilgraft::document::{DocumentModule, MethodBody};
//! use cilgraft::import::{ImportContext, ReferenceImporter};
//! # fn demo(module: &cilgraft::live::LiveModuleRc) -> cilgraft::Result<()> {
//! let mut document = DocumentModule::new("Patch.dll", "Patch");
//! let mut importer = ReferenceImporter::new(&mut document)?;
//! let mut body = MethodBody::default();
//!
//! // nop, ret
//! decode_body(&[0x00, 0x2A], module, &mut body, &mut importer, &ImportContext::new(), &DecoderConfig::default())?;
//! assert_eq!(body.instructions.len(), 2);
//! # Ok(())
//! # }
//! ```

mod decoder;
mod fallback;
mod regions;

pub use decoder::{decode_body, resolve_offset, BodyDecoder};
pub use fallback::ImageTokenResolver;
pub use regions::decode_regions;
