use std::{path::PathBuf, sync::Arc};

use crate::live::{LiveModule, LiveModuleRc, LiveTypeRc};

/// Shared handle to a [`LiveAssembly`]
pub type LiveAssemblyRc = Arc<LiveAssembly>;

/// Simple names of the assemblies that define the built-in types.
pub const CORE_LIBRARY_NAMES: &[&str] = &[
    "System.Private.CoreLib",
    "mscorlib",
    "netstandard",
    "System.Runtime",
];

/// A loaded assembly.
pub struct LiveAssembly {
    /// Simple name
    pub name: String,
    /// Display name including version, culture and public key token
    pub full_name: String,
    /// Runtime-assigned identity, distinct for every load even if names collide
    pub identity_hash: u64,
    /// Backing file, `None` for assemblies generated in memory
    pub location: Option<PathBuf>,
    /// Whether this assembly defines the built-in types
    pub is_core_library: bool,
    modules: boxcar::Vec<LiveModuleRc>,
}

impl LiveAssembly {
    pub(crate) fn new(
        name: String,
        full_name: String,
        identity_hash: u64,
        location: Option<PathBuf>,
    ) -> LiveAssembly {
        let is_core_library = CORE_LIBRARY_NAMES.contains(&name.as_str());
        LiveAssembly {
            name,
            full_name,
            identity_hash,
            location,
            is_core_library,
            modules: boxcar::Vec::new(),
        }
    }

    /// Add a module. The module starts out with its `<Module>` type.
    pub fn add_module(self: &Arc<Self>, name: impl Into<String>) -> LiveModuleRc {
        let module = LiveModule::new(name.into(), self);
        self.modules.push(module.clone());
        module
    }

    /// Modules in load order.
    pub fn modules(&self) -> impl Iterator<Item = &LiveModuleRc> {
        self.modules.iter().map(|(_, module)| module)
    }

    /// The module holding the assembly manifest.
    #[must_use]
    pub fn manifest_module(&self) -> Option<LiveModuleRc> {
        self.modules().next().cloned()
    }

    /// Find a top-level type in any module.
    #[must_use]
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<LiveTypeRc> {
        self.modules()
            .find_map(|module| module.find_type(namespace, name))
    }
}

impl std::fmt::Debug for LiveAssembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveAssembly")
            .field("name", &self.full_name)
            .field("identity_hash", &self.identity_hash)
            .finish_non_exhaustive()
    }
}
