//! The mutable document model.
//!
//! A [`DocumentModule`] owns every document-side object reachable from it: type and method
//! definitions, their bodies and the assembly references their imported types point at. One
//! module is created per transplantation unit and released once the host has emitted it, or on
//! error. Dropping or disposing a module evicts every import cache entry that was keyed on it.
//!
//! # Key Components
//!
//! - [`crate::document::DocumentModule`] - Owner of a transplantation unit
//! - [`crate::document::TypeReference`], [`crate::document::MethodReference`],
//!   [`crate::document::FieldReference`] - Value-like references
//! - [`crate::document::MethodBody`] - Instructions, locals and exception regions
//! - [`crate::document::opcodes`] - The one and two byte opcode tables

mod body;
mod definitions;
pub mod opcodes;
mod references;

pub use body::*;
pub use definitions::*;
pub use references::*;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{import::ImportCache, Error, Result};

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// An editable module holding transplanted definitions.
#[derive(Debug)]
pub struct DocumentModule {
    id: u64,
    /// Module name
    pub name: String,
    /// Name of the assembly the module will be emitted into
    pub assembly_name: String,
    /// Assemblies referenced by imported types
    pub assembly_references: Vec<AssemblyNameReference>,
    /// Types defined in this module
    pub types: Vec<TypeDefinition>,
    disposed: bool,
}

impl DocumentModule {
    /// Create an empty module.
    pub fn new(name: impl Into<String>, assembly_name: impl Into<String>) -> Self {
        DocumentModule {
            id: NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            assembly_name: assembly_name.into(),
            assembly_references: Vec::new(),
            types: Vec::new(),
            disposed: false,
        }
    }

    /// Process-unique id, part of every import cache key.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether [`DocumentModule::dispose`] was called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Fails with [`Error::Disposed`] once the module was released.
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] after [`DocumentModule::dispose`].
    pub fn ensure_alive(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    /// Add a type and return its index.
    pub fn add_type(&mut self, definition: TypeDefinition) -> usize {
        self.types.push(definition);
        self.types.len() - 1
    }

    /// Register an assembly reference, returning the existing entry for a known assembly.
    ///
    /// Two references denote the same assembly when their full names and identity hashes agree.
    pub fn add_assembly_reference(&mut self, reference: AssemblyNameReference) -> &AssemblyNameReference {
        let index = match self.assembly_references.iter().position(|existing| {
            existing.full_name == reference.full_name
                && existing.identity_hash == reference.identity_hash
        }) {
            Some(index) => index,
            None => {
                self.assembly_references.push(reference);
                self.assembly_references.len() - 1
            }
        };
        &self.assembly_references[index]
    }

    /// Find a defined type by namespace and name.
    #[must_use]
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<&TypeDefinition> {
        self.types
            .iter()
            .find(|ty| ty.namespace == namespace && ty.name == name)
    }

    /// Release all definitions and evict this module's import cache entries.
    ///
    /// References into the module are invalid afterwards and importers refuse to use it.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.types.clear();
        self.assembly_references.clear();
        ImportCache::global().evict_module(self.id);
        log::debug!("disposed document module {} ({})", self.name, self.id);
    }
}

impl Drop for DocumentModule {
    fn drop(&mut self) {
        if !self.disposed {
            ImportCache::global().evict_module(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::flags::TypeAttributes;

    #[test]
    fn module_ids_are_unique() {
        let first = DocumentModule::new("a", "a");
        let second = DocumentModule::new("b", "b");
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn assembly_references_are_deduplicated() {
        let mut module = DocumentModule::new("m", "m");
        let mut corlib = AssemblyNameReference::new("System.Private.CoreLib");
        corlib.identity_hash = Some(7);

        module.add_assembly_reference(corlib.clone());
        module.add_assembly_reference(corlib.clone());
        corlib.identity_hash = Some(8);
        module.add_assembly_reference(corlib);

        assert_eq!(module.assembly_references.len(), 2);
    }

    #[test]
    fn dispose_releases_definitions() {
        let mut module = DocumentModule::new("m", "m");
        module.add_type(TypeDefinition::new("Ns", "Holder", TypeAttributes::PUBLIC));
        assert!(module.find_type("Ns", "Holder").is_some());

        module.dispose();
        assert!(module.is_disposed());
        assert!(module.types.is_empty());
        assert!(matches!(module.ensure_alive(), Err(Error::Disposed)));
    }
}
