//! The Live Metadata View.
//!
//! These handles model what a running execution engine exposes about its loaded assemblies:
//! types, methods with their raw bodies, fields, properties and events. They are owned by a
//! [`LiveDomain`] and are read-only once populated. Definitions are compared by pointer, types
//! constructed at runtime (arrays, pointers, by-refs, generic instances) structurally.
//!
//! A host that embeds `cilgraft` mirrors its runtime into this model. The model is also what the
//! test factories build to exercise the transplanter without a runtime.
//!
//! # Key Components
//!
//! - [`crate::live::LiveDomain`] - The set of loaded assemblies plus dynamic methods
//! - [`crate::live::LiveModule`] - Token scope used to resolve instruction operands
//! - [`crate::live::LiveType`] - Type definitions and constructed types
//! - [`crate::live::LiveMethod`] - Methods with signature and body
//!
//! # Examples
//!
//! ```rust
//! use cilgraft::live::LiveDomain;
//! use cilgraft::metadata::flags::TypeAttributes;
//!
//! let domain = LiveDomain::new();
//! let assembly = domain.add_assembly("Calculator", "Calculator, Version=1.0.0.0", None);
//! let module = assembly.add_module("Calculator.dll");
//! let ty = module.define_type("Demo", "Calculator", TypeAttributes::PUBLIC);
//!
//! assert_eq!(ty.full_name(), "Demo.Calculator");
//! assert!(module.module_type().is_some());
//! ```

mod assembly;
mod members;
mod method;
mod module;
mod types;

pub use assembly::{LiveAssembly, LiveAssemblyRc, CORE_LIBRARY_NAMES};
pub use members::{LiveEvent, LiveEventRc, LiveField, LiveFieldRc, LiveProperty, LivePropertyRc};
pub use method::{
    LiveExceptionClause, LiveLocal, LiveMethod, LiveMethodBody, LiveMethodRc, LiveMethodSignature,
    LiveParameter,
};
pub use module::{LiveModule, LiveModuleRc};
pub use types::{substitute, GenericOwner, LiveType, LiveTypeRc, LiveTypeShape};

pub(crate) use types::Declaring;

use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use crate::metadata::{flags::MethodAttributes, token::Token};

/// Shared handle to a [`LiveDomain`]
pub type LiveDomainRc = Arc<LiveDomain>;

/// Token reported for methods generated at runtime
const DYNAMIC_METHOD_TOKEN: Token = Token(0x0600_0000);

/// Any live entity.
#[derive(Debug, Clone)]
pub enum LiveMember {
    /// A type
    Type(LiveTypeRc),
    /// A method or constructor
    Method(LiveMethodRc),
    /// A field
    Field(LiveFieldRc),
    /// A property
    Property(LivePropertyRc),
    /// An event
    Event(LiveEventRc),
}

impl LiveMember {
    /// Human readable kind, used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            LiveMember::Type(_) => "type",
            LiveMember::Method(_) => "method",
            LiveMember::Field(_) => "field",
            LiveMember::Property(_) => "property",
            LiveMember::Event(_) => "event",
        }
    }

    /// Metadata token of the entity.
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            LiveMember::Type(ty) => ty.token,
            LiveMember::Method(method) => method.token,
            LiveMember::Field(field) => field.token,
            LiveMember::Property(property) => property.token,
            LiveMember::Event(event) => event.token,
        }
    }

    /// Whether both handles denote the same live entity.
    #[must_use]
    pub fn is_same(&self, other: &LiveMember) -> bool {
        match (self, other) {
            (LiveMember::Type(a), LiveMember::Type(b)) => LiveType::is_same(a, b),
            (LiveMember::Method(a), LiveMember::Method(b)) => Arc::ptr_eq(a, b),
            (LiveMember::Field(a), LiveMember::Field(b)) => Arc::ptr_eq(a, b),
            (LiveMember::Property(a), LiveMember::Property(b)) => Arc::ptr_eq(a, b),
            (LiveMember::Event(a), LiveMember::Event(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for LiveMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveMember::Type(ty) => write!(f, "{ty}"),
            LiveMember::Method(method) => write!(f, "{method}"),
            LiveMember::Field(field) => write!(f, "{field}"),
            LiveMember::Property(property) => write!(
                f,
                "{}::{}",
                property
                    .declaring_type()
                    .map(|ty| ty.to_string())
                    .unwrap_or_default(),
                property.name
            ),
            LiveMember::Event(event) => write!(
                f,
                "{}::{}",
                event
                    .declaring_type()
                    .map(|ty| ty.to_string())
                    .unwrap_or_default(),
                event.name
            ),
        }
    }
}

/// Host hook to load an assembly that is not yet part of the domain.
///
/// Implementations register the loaded assembly through [`LiveDomain::add_assembly`] and return
/// it.
pub trait AssemblyLoader: Send + Sync {
    /// Load the assembly with the given simple or display name.
    fn load(&self, domain: &LiveDomain, name: &str) -> Option<LiveAssemblyRc>;
}

/// The set of assemblies loaded into a running execution engine.
pub struct LiveDomain {
    assemblies: RwLock<Vec<LiveAssemblyRc>>,
    dynamic_methods: boxcar::Vec<LiveMethodRc>,
    loader: Option<Box<dyn AssemblyLoader>>,
    next_identity: AtomicU64,
}

impl LiveDomain {
    /// An empty domain without an assembly loader.
    #[must_use]
    pub fn new() -> Self {
        LiveDomain {
            assemblies: RwLock::new(Vec::new()),
            dynamic_methods: boxcar::Vec::new(),
            loader: None,
            next_identity: AtomicU64::new(1),
        }
    }

    /// An empty domain that loads missing assemblies through `loader`.
    #[must_use]
    pub fn with_loader(loader: Box<dyn AssemblyLoader>) -> Self {
        LiveDomain {
            loader: Some(loader),
            ..LiveDomain::new()
        }
    }

    /// Register a newly loaded assembly and assign its identity hash.
    pub fn add_assembly(
        &self,
        name: impl Into<String>,
        full_name: impl Into<String>,
        location: Option<PathBuf>,
    ) -> LiveAssemblyRc {
        let identity = self.next_identity.fetch_add(1, Ordering::Relaxed);
        let assembly = Arc::new(LiveAssembly::new(
            name.into(),
            full_name.into(),
            identity.wrapping_mul(0x9E37_79B9_7F4A_7C15),
            location,
        ));
        write_lock!(self.assemblies).push(assembly.clone());
        log::trace!(
            "loaded assembly {} ({:#x})",
            assembly.full_name,
            assembly.identity_hash
        );
        assembly
    }

    /// Remove an assembly from the domain. Handles held elsewhere stay valid until dropped.
    pub fn unload_assembly(&self, assembly: &LiveAssemblyRc) {
        write_lock!(self.assemblies).retain(|loaded| !Arc::ptr_eq(loaded, assembly));
    }

    /// Snapshot of the loaded assemblies.
    #[must_use]
    pub fn assemblies(&self) -> Vec<LiveAssemblyRc> {
        read_lock!(self.assemblies).clone()
    }

    /// The first loaded core library.
    #[must_use]
    pub fn core_library(&self) -> Option<LiveAssemblyRc> {
        read_lock!(self.assemblies)
            .iter()
            .find(|assembly| assembly.is_core_library)
            .cloned()
    }

    /// Ask the host to load an assembly by name. `None` without a loader or on failure.
    #[must_use]
    pub fn load_assembly(&self, name: &str) -> Option<LiveAssemblyRc> {
        let loader = self.loader.as_ref()?;
        let loaded = loader.load(self, name);
        if loaded.is_none() {
            log::debug!("assembly loader could not provide {name}");
        }
        loaded
    }

    /// Create a method generated at runtime. Its tokens resolve through `module`.
    pub fn define_dynamic_method(
        &self,
        name: impl Into<String>,
        module: &LiveModuleRc,
        attributes: MethodAttributes,
    ) -> LiveMethodRc {
        let method = Arc::new(LiveMethod::new(
            DYNAMIC_METHOD_TOKEN,
            name.into(),
            attributes,
            Declaring::None,
            Arc::downgrade(module),
            true,
        ));
        self.dynamic_methods.push(method.clone());
        method
    }

    /// Find a dynamic method by its runtime id.
    #[must_use]
    pub fn find_dynamic_method(&self, id: u64) -> Option<LiveMethodRc> {
        self.dynamic_methods
            .iter()
            .map(|(_, method)| method)
            .find(|method| method.id() == id)
            .cloned()
    }
}

impl Default for LiveDomain {
    fn default() -> Self {
        LiveDomain::new()
    }
}

impl fmt::Debug for LiveDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveDomain")
            .field("assemblies", &read_lock!(self.assemblies).len())
            .field("dynamic_methods", &self.dynamic_methods.count())
            .finish_non_exhaustive()
    }
}
