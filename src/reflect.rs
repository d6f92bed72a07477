//! Resolution of document references back to live entities.
//!
//! Once a transplanted document has been emitted and loaded, tooling often needs the live
//! counterpart of a reference inside it. [`LiveResolver`] walks a reference, finds the defining
//! assembly in a snapshot of the [`LiveDomain`], and applies the identity matcher to the
//! candidates. Generic instances are closed over their resolved arguments through
//! [`crate::live::LiveType::make_generic_type`] and
//! [`crate::live::LiveMethod::make_generic_method`].
//!
//! A miss refreshes the snapshot and retries once, since the reference may name an assembly
//! that was loaded after the resolver was created. A second miss is reported as `Ok(None)`.

use std::sync::{Arc, RwLock};

use crate::{
    config::ResolverConfig,
    document::{
        ArrayShape, AssemblyNameReference, DocumentMember, FieldReference, MethodReference,
        NamedType, ResolutionScope, TypeReference,
    },
    live::{
        LiveAssemblyRc, LiveDomain, LiveField, LiveFieldRc, LiveMember, LiveMethod, LiveMethodRc,
        LiveModuleRc, LiveType, LiveTypeRc,
    },
    matcher,
    utils::{CacheStats, WeakCache},
    Error, Result,
};

/// Maps document references to live entities of one domain.
pub struct LiveResolver {
    domain: Arc<LiveDomain>,
    config: ResolverConfig,
    assemblies: RwLock<Vec<LiveAssemblyRc>>,
    types: WeakCache<String, LiveType, ()>,
    methods: WeakCache<String, LiveMethod, ()>,
    fields: WeakCache<String, LiveField, ()>,
}

impl LiveResolver {
    /// Resolver over the assemblies currently loaded into `domain`.
    #[must_use]
    pub fn new(domain: Arc<LiveDomain>, config: ResolverConfig) -> Self {
        let assemblies = domain.assemblies();
        LiveResolver {
            domain,
            config,
            assemblies: RwLock::new(assemblies),
            types: WeakCache::new(),
            methods: WeakCache::new(),
            fields: WeakCache::new(),
        }
    }

    /// Re-enumerate the domain's assemblies.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the snapshot lock is poisoned.
    pub fn refresh(&self) -> Result<()> {
        let assemblies = self.domain.assemblies();
        log::debug!("resolver refreshed, {} assemblies loaded", assemblies.len());
        *self.assemblies.write().map_err(|_| Error::LockError)? = assemblies;
        Ok(())
    }

    /// The live entity `member` denotes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for references without a resolution scope and for
    /// free generic parameters, [`crate::Error::NotSupported`] for function pointers and
    /// [`Error::LockError`] if the snapshot lock is poisoned.
    pub fn resolve(&self, member: DocumentMember<'_>) -> Result<Option<LiveMember>> {
        self.with_retry(|resolver| resolver.resolve_once(member))
    }

    /// The live type `ty` denotes.
    ///
    /// # Errors
    /// See [`LiveResolver::resolve`].
    pub fn resolve_type(&self, ty: &TypeReference) -> Result<Option<LiveTypeRc>> {
        self.with_retry(|resolver| resolver.find_type(ty))
    }

    /// The live method `method` denotes.
    ///
    /// # Errors
    /// See [`LiveResolver::resolve`].
    pub fn resolve_method(&self, method: &MethodReference) -> Result<Option<LiveMethodRc>> {
        self.with_retry(|resolver| resolver.find_method(method))
    }

    /// The live field `field` denotes.
    ///
    /// # Errors
    /// See [`LiveResolver::resolve`].
    pub fn resolve_field(&self, field: &FieldReference) -> Result<Option<LiveFieldRc>> {
        self.with_retry(|resolver| resolver.find_field(field))
    }

    /// Counters of the type, method and field caches.
    #[must_use]
    pub fn cache_stats(&self) -> [CacheStats; 3] {
        [self.types.stats(), self.methods.stats(), self.fields.stats()]
    }

    /// Drop every cached resolution.
    pub fn purge(&self) {
        self.types.purge();
        self.methods.purge();
        self.fields.purge();
    }

    fn with_retry<T>(&self, mut lookup: impl FnMut(&Self) -> Result<Option<T>>) -> Result<Option<T>> {
        if let Some(found) = lookup(self)? {
            return Ok(Some(found));
        }
        if !self.config.retry_on_miss {
            return Ok(None);
        }
        log::debug!("resolver miss, retrying after refresh");
        self.refresh()?;
        lookup(self)
    }

    fn resolve_once(&self, member: DocumentMember<'_>) -> Result<Option<LiveMember>> {
        Ok(match member {
            DocumentMember::Type(ty) => self.find_type(ty)?.map(LiveMember::Type),
            DocumentMember::Method(method) => self.find_method(method)?.map(LiveMember::Method),
            DocumentMember::Field(field) => self.find_field(field)?.map(LiveMember::Field),
            DocumentMember::Property(property) => match self.find_type(&property.declaring_type)? {
                Some(declaring) => {
                    matcher::find_property(&declaring, property)?.map(LiveMember::Property)
                }
                None => None,
            },
            DocumentMember::Event(event) => match self.find_type(&event.declaring_type)? {
                Some(declaring) => matcher::find_event(&declaring, event)?.map(LiveMember::Event),
                None => None,
            },
        })
    }

    fn find_type(&self, ty: &TypeReference) -> Result<Option<LiveTypeRc>> {
        match ty {
            TypeReference::Primitive(kind) => Ok(self
                .core_library()?
                .and_then(|core| core.find_type(kind.namespace(), kind.name()))),
            TypeReference::Named(named) => self.find_named(named),
            TypeReference::Array(element, ArrayShape::Vector) => {
                Ok(self.find_type(element)?.map(|element| element.make_sz_array()))
            }
            TypeReference::Array(element, shape) => Ok(self
                .find_type(element)?
                .map(|element| element.make_array(shape.rank()))),
            TypeReference::Pointer(element) => {
                Ok(self.find_type(element)?.map(|element| element.make_pointer()))
            }
            TypeReference::ByRef(element) => {
                Ok(self.find_type(element)?.map(|element| element.make_by_ref()))
            }
            TypeReference::Pinned(element)
            | TypeReference::Sentinel(element)
            | TypeReference::Modified { element, .. } => self.find_type(element),
            TypeReference::GenericInstance { element, arguments } => {
                let Some(definition) = self.find_type(element)? else {
                    return Ok(None);
                };
                let mut resolved = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    match self.find_type(argument)? {
                        Some(argument) => resolved.push(argument),
                        None => return Ok(None),
                    }
                }
                definition.make_generic_type(resolved).map(Some)
            }
            TypeReference::FunctionPointer(_) => {
                Err(not_supported_error!("Cannot resolve function pointer {}", ty))
            }
            TypeReference::GenericParameter(parameter) => Err(malformed_error!(
                "Free generic parameter {} has no live counterpart",
                parameter
            )),
        }
    }

    fn find_named(&self, named: &NamedType) -> Result<Option<LiveTypeRc>> {
        let key = format!("{}, {}", named.full_name(), scope_suffix(&named.scope));
        if let Some((cached, ())) = self.types.get(&key) {
            return Ok(Some(cached));
        }

        let found = if let Some(declaring) = &named.declaring_type {
            self.find_type(declaring)?.and_then(|declaring| {
                declaring
                    .nested_types()
                    .find(|nested| nested.name == named.name)
                    .cloned()
            })
        } else {
            match &named.scope {
                ResolutionScope::Assembly(reference) => self
                    .find_assembly(reference)?
                    .and_then(|assembly| assembly.find_type(&named.namespace, &named.name)),
                ResolutionScope::Module(module) => self.find_module(module)?.and_then(|module| {
                    if named.is_module_type() {
                        module.module_type()
                    } else {
                        module.find_type(&named.namespace, &named.name)
                    }
                }),
                ResolutionScope::Document => {
                    return Err(malformed_error!(
                        "Type {} is scoped to an unloaded document",
                        named.full_name()
                    ))
                }
            }
        };

        Ok(found.map(|ty| {
            self.types.insert_if_absent(key, &ty, ());
            ty
        }))
    }

    fn find_method(&self, method: &MethodReference) -> Result<Option<LiveMethodRc>> {
        match method {
            MethodReference::Dynamic(dynamic) => Ok(self.domain.find_dynamic_method(dynamic.id)),
            MethodReference::Instance { element, arguments } => {
                let Some(definition) = self.find_method(element)? else {
                    return Ok(None);
                };
                let mut resolved = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    match self.find_type(argument)? {
                        Some(argument) => resolved.push(argument),
                        None => return Ok(None),
                    }
                }
                definition.make_generic_method(resolved).map(Some)
            }
            MethodReference::Member(member) => {
                let key = format!("{}, {}", method, type_suffix(&member.declaring_type));
                if let Some((cached, ())) = self.methods.get(&key) {
                    return Ok(Some(cached));
                }
                let Some(declaring) = self.find_type(&member.declaring_type)? else {
                    return Ok(None);
                };
                Ok(matcher::find_method(&declaring, method)?.map(|found| {
                    self.methods.insert_if_absent(key, &found, ());
                    found
                }))
            }
        }
    }

    fn find_field(&self, field: &FieldReference) -> Result<Option<LiveFieldRc>> {
        let key = format!("{}, {}", field, type_suffix(&field.declaring_type));
        if let Some((cached, ())) = self.fields.get(&key) {
            return Ok(Some(cached));
        }
        let Some(declaring) = self.find_type(&field.declaring_type)? else {
            return Ok(None);
        };
        Ok(matcher::find_field(&declaring, field)?.map(|found| {
            self.fields.insert_if_absent(key, &found, ());
            found
        }))
    }

    fn snapshot(&self) -> Result<Vec<LiveAssemblyRc>> {
        Ok(self.assemblies.read().map_err(|_| Error::LockError)?.clone())
    }

    fn core_library(&self) -> Result<Option<LiveAssemblyRc>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .find(|assembly| assembly.is_core_library)
            .or_else(|| self.domain.core_library()))
    }

    /// Exact name and identity, then display name, then simple name, then the host loader.
    fn find_assembly(&self, reference: &AssemblyNameReference) -> Result<Option<LiveAssemblyRc>> {
        let snapshot = self.snapshot()?;

        let by_identity = reference.identity_hash.and_then(|hash| {
            snapshot
                .iter()
                .find(|assembly| assembly.name == reference.name && assembly.identity_hash == hash)
        });
        let found = by_identity
            .or_else(|| {
                snapshot
                    .iter()
                    .find(|assembly| assembly.full_name == reference.full_name)
            })
            .or_else(|| snapshot.iter().find(|assembly| assembly.name == reference.name))
            .cloned();
        if found.is_some() || !self.config.load_missing_assemblies {
            return Ok(found);
        }

        let Some(loaded) = self.domain.load_assembly(&reference.full_name) else {
            return Ok(None);
        };
        self.assemblies
            .write()
            .map_err(|_| Error::LockError)?
            .push(loaded.clone());
        Ok(Some(loaded))
    }

    fn find_module(&self, name: &str) -> Result<Option<LiveModuleRc>> {
        Ok(self
            .snapshot()?
            .iter()
            .flat_map(|assembly| assembly.modules().cloned().collect::<Vec<_>>())
            .find(|module| module.name == name))
    }
}

impl std::fmt::Debug for LiveResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveResolver")
            .field("config", &self.config)
            .field("assemblies", &self.assemblies.read().map(|loaded| loaded.len()).ok())
            .finish_non_exhaustive()
    }
}

fn scope_suffix(scope: &ResolutionScope) -> String {
    match scope {
        ResolutionScope::Assembly(assembly) => {
            format!("{}#{:x}", assembly.name, assembly.identity_hash.unwrap_or_default())
        }
        ResolutionScope::Module(module) => format!("[{module}]"),
        ResolutionScope::Document => String::new(),
    }
}

/// Assembly-qualifying suffix of the outermost named type inside `ty`.
fn type_suffix(ty: &TypeReference) -> String {
    match ty {
        TypeReference::Named(named) => scope_suffix(&named.scope),
        TypeReference::Primitive(_) => "corelib".to_string(),
        other => other.element().map(type_suffix).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::DocumentModule,
        import::{ImportContext, ImportKind, ReferenceImporter},
        live::{AssemblyLoader, LiveType as Live},
        metadata::{
            flags::{MethodAttributes, TypeAttributes},
            typesystem::PrimitiveKind,
        },
        test::factories::live::{CalculatorFixture, CoreLibrary, GenericFixture},
        Error,
    };

    fn scope(name: &str) -> ResolutionScope {
        ResolutionScope::Assembly(AssemblyNameReference::new(name))
    }

    #[test]
    fn imported_references_resolve_to_their_source() {
        let fixture = CalculatorFixture::new();
        let resolver = LiveResolver::new(fixture.core.domain.clone(), ResolverConfig::default());

        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();
        let context = ImportContext::new();

        let ty = importer
            .import_type(&fixture.calculator, ImportKind::Definition, &context)
            .unwrap();
        let method = importer.import_method(&fixture.add, &context).unwrap();
        let field = importer.import_field(&fixture.value_field, &context).unwrap();
        let helper = importer.import_method(&fixture.helper, &context).unwrap();

        let found = resolver.resolve_type(&ty).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &fixture.calculator));
        let found = resolver.resolve_method(&method).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &fixture.add));
        let found = resolver.resolve_field(&field).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &fixture.value_field));
        let found = resolver.resolve_method(&helper).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &fixture.helper));

        match resolver.resolve(DocumentMember::Method(&method)).unwrap() {
            Some(LiveMember::Method(found)) => assert!(Arc::ptr_eq(&found, &fixture.add)),
            other => panic!("unexpected {other:?}"),
        }

        resolver.resolve_method(&method).unwrap();
        assert!(resolver.cache_stats()[1].hits >= 1);
    }

    #[test]
    fn primitives_and_composites() {
        let core = CoreLibrary::new();
        let resolver = LiveResolver::new(core.domain.clone(), ResolverConfig::default());

        let int = TypeReference::Primitive(PrimitiveKind::I4);
        let found = resolver.resolve_type(&int).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &core.int32));

        let array = TypeReference::by_ref(TypeReference::sz_array(int));
        let found = resolver.resolve_type(&array).unwrap().unwrap();
        assert!(Live::is_same(&found, &core.int32.make_sz_array().make_by_ref()));
    }

    #[test]
    fn generic_instances_are_closed() {
        let fixture = GenericFixture::new();
        let resolver = LiveResolver::new(fixture.core.domain.clone(), ResolverConfig::default());

        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();
        let instance = fixture
            .boxed
            .make_generic_type(vec![fixture.core.int32.clone()])
            .unwrap();
        let reference = importer
            .import_type(&instance, ImportKind::Definition, &ImportContext::new())
            .unwrap();

        let found = resolver.resolve_type(&reference).unwrap().unwrap();
        assert!(Live::is_same(&found, &instance));

        let bound_get = instance.method_by_token(fixture.get.token).unwrap();
        let method = importer
            .import_method(&bound_get, &ImportContext::new())
            .unwrap();
        let found = resolver.resolve_method(&method).unwrap().unwrap();
        assert_eq!(found.token, fixture.get.token);
        assert!(Live::is_same(
            &found.declaring_type().unwrap(),
            &instance
        ));
    }

    #[test]
    fn identity_hash_disambiguates() {
        let core = CoreLibrary::new();
        let first = core.domain.add_assembly("Plugin", "Plugin, Version=1.0.0.0", None);
        first.add_module("Plugin.dll").define_type("Demo", "Plugin", TypeAttributes::PUBLIC);
        let second = core.domain.add_assembly("Plugin", "Plugin, Version=1.0.0.0", None);
        let expected = second
            .add_module("Plugin.dll")
            .define_type("Demo", "Plugin", TypeAttributes::PUBLIC);

        let resolver = LiveResolver::new(core.domain.clone(), ResolverConfig::offline());
        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();
        let reference = importer
            .import_type(&expected, ImportKind::Definition, &ImportContext::new())
            .unwrap();

        let found = resolver.resolve_type(&reference).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &expected));
    }

    #[test]
    fn refresh_finds_late_assemblies() {
        let core = CoreLibrary::new();
        let resolver = LiveResolver::new(core.domain.clone(), ResolverConfig::offline());
        let no_retry = LiveResolver::new(
            core.domain.clone(),
            ResolverConfig {
                retry_on_miss: false,
                load_missing_assemblies: false,
            },
        );

        let late = core.domain.add_assembly("Late", "Late", None);
        let ty = late.add_module("Late.dll").define_type("Demo", "Late", TypeAttributes::PUBLIC);
        let reference = TypeReference::named(scope("Late"), "Demo", "Late");

        assert!(no_retry.resolve_type(&reference).unwrap().is_none());
        let found = resolver.resolve_type(&reference).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &ty));

        let missing = TypeReference::named(scope("Late"), "Demo", "Missing");
        assert!(resolver.resolve_type(&missing).unwrap().is_none());
    }

    #[test]
    fn poisoned_snapshot_is_an_error() {
        let core = CoreLibrary::new();
        let resolver = LiveResolver::new(core.domain.clone(), ResolverConfig::default());

        std::thread::scope(|scope| {
            let poisoner = scope.spawn(|| {
                let _guard = resolver.assemblies.write().unwrap();
                panic!("poison the snapshot");
            });
            assert!(poisoner.join().is_err());
        });

        let int = TypeReference::Primitive(PrimitiveKind::I4);
        assert!(matches!(resolver.resolve_type(&int), Err(Error::LockError)));
        assert!(matches!(resolver.refresh(), Err(Error::LockError)));
    }

    struct PluginLoader;

    impl AssemblyLoader for PluginLoader {
        fn load(&self, domain: &LiveDomain, name: &str) -> Option<LiveAssemblyRc> {
            if name != "OnDemand" {
                return None;
            }
            let assembly = domain.add_assembly("OnDemand", "OnDemand", None);
            assembly
                .add_module("OnDemand.dll")
                .define_type("Demo", "Lazy", TypeAttributes::PUBLIC);
            Some(assembly)
        }
    }

    #[test]
    fn loader_provides_missing_assemblies() {
        let domain = Arc::new(LiveDomain::with_loader(Box::new(PluginLoader)));
        let reference = TypeReference::named(scope("OnDemand"), "Demo", "Lazy");

        let offline = LiveResolver::new(domain.clone(), ResolverConfig::offline());
        assert!(offline.resolve_type(&reference).unwrap().is_none());

        let resolver = LiveResolver::new(domain.clone(), ResolverConfig::default());
        let found = resolver.resolve_type(&reference).unwrap().unwrap();
        assert_eq!(found.full_name(), "Demo.Lazy");
    }

    #[test]
    fn unresolvable_shapes() {
        let fixture = CalculatorFixture::new();
        let resolver = LiveResolver::new(fixture.core.domain.clone(), ResolverConfig::default());

        let unscoped = TypeReference::named(ResolutionScope::Document, "Demo", "Calculator");
        assert!(matches!(
            resolver.resolve_type(&unscoped),
            Err(Error::Malformed { .. })
        ));

        let parameter = TypeReference::generic_parameter(
            crate::document::GenericParameterKind::Type,
            0,
            "T",
        );
        assert!(matches!(
            resolver.resolve_type(&parameter),
            Err(Error::Malformed { .. })
        ));

        let pointer = TypeReference::FunctionPointer(Box::new(crate::document::CallSite {
            has_this: false,
            explicit_this: false,
            convention: crate::metadata::signatures::CallingConvention::Default,
            return_type: TypeReference::Primitive(PrimitiveKind::Void),
            parameters: vec![],
        }));
        assert!(matches!(
            resolver.resolve_type(&pointer),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn dynamic_methods_by_id() {
        let fixture = CalculatorFixture::new();
        let dynamic = fixture.core.domain.define_dynamic_method(
            "lambda",
            &fixture.module,
            MethodAttributes::STATIC,
        );
        let resolver = LiveResolver::new(fixture.core.domain.clone(), ResolverConfig::default());
        let reference = MethodReference::Dynamic(crate::document::DynamicMethodRef {
            name: "lambda".into(),
            id: dynamic.id(),
        });
        let found = resolver.resolve_method(&reference).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &dynamic));
    }
}
