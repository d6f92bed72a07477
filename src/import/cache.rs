use std::sync::{Arc, OnceLock};

use crate::{
    document::{FieldReference, MethodReference, TypeReference},
    live::{LiveField, LiveMethod, LiveType},
    utils::{CacheStats, WeakCache},
};

/// How a live type is used at the import site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// Used as a value inside generic code. A generic definition becomes the generic instance
    /// over its own parameters.
    Open,
    /// Used as a definition, e.g. in a base type, a declaring type or `ldtoken`. A generic
    /// definition stays uninstantiated.
    Definition,
}

/// Cache key: the live entity by address, the document module and the import kind.
///
/// The slot holds a `Weak` of the entity, so the address cannot be reused while the slot is
/// considered live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImportKey {
    entity: usize,
    module: u64,
    kind: ImportKind,
}

impl ImportKey {
    /// Key for `entity` imported into the document module `module`.
    pub fn new<T>(entity: &Arc<T>, module: u64, kind: ImportKind) -> Self {
        ImportKey {
            entity: Arc::as_ptr(entity) as *const () as usize,
            module,
            kind,
        }
    }

    /// Id of the document module the entry belongs to.
    #[must_use]
    pub fn module(&self) -> u64 {
        self.module
    }
}

/// Process-wide cache of imported references.
///
/// Entries die with the live entity they were imported from and are evicted when their
/// document module is disposed. Generic instances are never stored.
#[derive(Default)]
pub struct ImportCache {
    pub(crate) types: WeakCache<ImportKey, LiveType, TypeReference>,
    pub(crate) methods: WeakCache<ImportKey, LiveMethod, MethodReference>,
    pub(crate) fields: WeakCache<ImportKey, LiveField, FieldReference>,
}

static IMPORT_CACHE: OnceLock<ImportCache> = OnceLock::new();

impl ImportCache {
    /// The process-wide instance.
    pub fn global() -> &'static ImportCache {
        IMPORT_CACHE.get_or_init(ImportCache::default)
    }

    /// Drop every entry that belongs to the document module `module`.
    pub fn evict_module(&self, module: u64) {
        self.types.retain(|key| key.module() != module);
        self.methods.retain(|key| key.module() != module);
        self.fields.retain(|key| key.module() != module);
    }

    /// Drop every entry.
    pub fn purge(&self) {
        self.types.purge();
        self.methods.purge();
        self.fields.purge();
        log::debug!("import cache purged");
    }

    /// Counters of the type, method and field caches.
    #[must_use]
    pub fn stats(&self) -> [CacheStats; 3] {
        [self.types.stats(), self.methods.stats(), self.fields.stats()]
    }
}
