//! # cilgraft Prelude
//!
//! The types most hosts need to transplant a method, inspect the result and resolve its
//! references back to live entities. Import with `use cilgraft::prelude::*;`.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilgraft operations
pub use crate::Error;

/// The result type used throughout cilgraft
pub use crate::Result;

/// Metadata token
pub use crate::metadata::token::{Token, TokenKind};

// ================================================================================================
// Configuration
// ================================================================================================

/// Decoder, transplanter and resolver settings
pub use crate::config::{DecoderConfig, ResolverConfig, TransplantConfig};

// ================================================================================================
// Live View
// ================================================================================================

/// Loaded assemblies and their members
pub use crate::live::{
    AssemblyLoader, LiveAssembly, LiveAssemblyRc, LiveDomain, LiveDomainRc, LiveField,
    LiveFieldRc, LiveMember, LiveMethod, LiveMethodRc, LiveModule, LiveModuleRc, LiveType,
    LiveTypeRc,
};

// ================================================================================================
// Document View
// ================================================================================================

/// Editable definitions
pub use crate::document::{
    DocumentModule, MethodBody, MethodDefinition, ParameterDefinition, TypeDefinition,
};

/// Instructions and exception regions
pub use crate::document::{ExceptionRegion, ExceptionRegionKind, Instruction, InstructionId, Operand};

/// References
pub use crate::document::{
    AssemblyNameReference, CallSite, DocumentMember, FieldReference, MemberReference,
    MethodReference, ResolutionScope, TypeReference,
};

// ================================================================================================
// Operations
// ================================================================================================

/// Transplanting
pub use crate::transplant::{transplant, transplant_with, DocumentMethod, MethodTransplanter};

/// Importing live entities
pub use crate::import::{ImportContext, ImportKind, ReferenceImporter};

/// Relinking reference graphs
pub use crate::relink::{relink, relink_body, Relink, RelinkResolver, TypeResolverFn};

/// Generic contexts
pub use crate::generics::{EmptyContext, GenericContext, GenericScope};

/// Live resolution of document references
pub use crate::reflect::LiveResolver;
