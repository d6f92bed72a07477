//! Cross-view resolution: live entities to document references.
//!
//! A [`ReferenceImporter`] turns live types, methods, fields and assemblies into references that
//! are valid inside one [`DocumentModule`]. Results for definitions are cached process-wide per
//! (live entity, document module, [`ImportKind`]); generic instances are rebuilt on every call
//! over cached definitions because their arguments depend on the import site.
//!
//! # Open and Definition imports
//!
//! The [`ImportKind`] decides what a generic type definition turns into. Used as a definition
//! (base type, declaring type of a member, `ldtoken`) it stays the bare generic type. Used as a
//! value inside its own generic code, for example as the type of a static field holding the
//! current instance, it becomes the generic instance over its own parameters. Confusing the two
//! silently produces wrong generic signatures.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilgraft::document::DocumentModule;
//! use cilgraft::import::{ImportContext, ImportKind, ReferenceImporter};
//! # fn demo(ty: &cilgraft::live::LiveTypeRc) -> cilgraft::Result<()> {
//! let mut module = DocumentModule::new("Patch.dll", "Patch");
//! let mut importer = ReferenceImporter::new(&mut module)?;
//! let reference = importer.import_type(ty, ImportKind::Definition, &ImportContext::new())?;
//! println!("{reference}");
//! # Ok(())
//! # }
//! ```

mod cache;
mod context;

pub use cache::{ImportCache, ImportKey, ImportKind};
pub use context::ImportContext;

use crate::{
    document::{
        ArrayShape, AssemblyNameReference, CallSite, DocumentModule, DynamicMethodRef,
        EventReference, FieldReference, GenericParameterKind, MemberReference, MethodMember,
        MethodReference, NamedType, PropertyReference, ResolutionScope, TypeReference,
    },
    live::{
        GenericOwner, LiveAssemblyRc, LiveEventRc, LiveFieldRc, LiveMember, LiveMethodRc,
        LivePropertyRc, LiveTypeRc, LiveTypeShape,
    },
    metadata::{
        signatures::{MethodSignature, SignatureType},
        typesystem::PrimitiveKind,
    },
    Error, Result,
};

/// Imports live entities into one document module.
pub struct ReferenceImporter<'m> {
    module: &'m mut DocumentModule,
}

impl<'m> ReferenceImporter<'m> {
    /// Importer targeting `module`.
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] if the module was already released.
    pub fn new(module: &'m mut DocumentModule) -> Result<Self> {
        module.ensure_alive()?;
        Ok(ReferenceImporter { module })
    }

    /// The target document module.
    pub fn module(&mut self) -> &mut DocumentModule {
        self.module
    }

    /// Reference to a live assembly, registered on the document module.
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] if the module was released.
    pub fn import_assembly(&mut self, assembly: &LiveAssemblyRc) -> Result<AssemblyNameReference> {
        self.module.ensure_alive()?;
        let reference = AssemblyNameReference {
            name: assembly.name.clone(),
            full_name: assembly.full_name.clone(),
            identity_hash: Some(assembly.identity_hash),
        };
        Ok(self.module.add_assembly_reference(reference).clone())
    }

    /// Reference to a live type.
    ///
    /// # Errors
    /// Returns [`Error::RelinkTargetNotFound`] for a generic parameter whose owner is not part
    /// of `context`, and [`Error::Disposed`] if the module was released.
    pub fn import_type(
        &mut self,
        ty: &LiveTypeRc,
        kind: ImportKind,
        context: &ImportContext,
    ) -> Result<TypeReference> {
        self.module.ensure_alive()?;

        if let Some(primitive) = ty.primitive_kind() {
            return Ok(TypeReference::Primitive(primitive));
        }

        match &ty.shape {
            LiveTypeShape::GenericParameter { position, owner } => {
                if !context.owns(owner) {
                    return Err(Error::relink_target(
                        format!("generic parameter {} (#{position})", ty.name),
                        context.describe(),
                    ));
                }
                let kind = match owner {
                    GenericOwner::Type(_) => GenericParameterKind::Type,
                    GenericOwner::Method(_) => GenericParameterKind::Method,
                };
                Ok(TypeReference::generic_parameter(kind, *position, ty.name.clone()))
            }
            LiveTypeShape::SzArray(element) => Ok(TypeReference::sz_array(self.import_type(
                element,
                ImportKind::Open,
                context,
            )?)),
            LiveTypeShape::Array { element, rank } => Ok(TypeReference::Array(
                Box::new(self.import_type(element, ImportKind::Open, context)?),
                ArrayShape::Rank {
                    rank: *rank,
                    sizes: Vec::new(),
                    lower_bounds: Vec::new(),
                },
            )),
            LiveTypeShape::Pointer(element) => Ok(TypeReference::Pointer(Box::new(
                self.import_type(element, ImportKind::Open, context)?,
            ))),
            LiveTypeShape::ByRef(element) => Ok(TypeReference::by_ref(self.import_type(
                element,
                ImportKind::Open,
                context,
            )?)),
            LiveTypeShape::GenericInstance {
                definition,
                arguments,
            } => {
                let element = self.import_type(definition, ImportKind::Definition, context)?;
                let mut imported = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    imported.push(self.import_type(argument, ImportKind::Open, context)?);
                }
                Ok(TypeReference::GenericInstance {
                    element: Box::new(element),
                    arguments: imported,
                })
            }
            LiveTypeShape::Definition => {
                if kind == ImportKind::Open && ty.is_generic_definition() {
                    let element = self.import_type(ty, ImportKind::Definition, context)?;
                    let arguments = ty
                        .generic_parameters()
                        .enumerate()
                        .map(|(position, parameter)| {
                            #[allow(clippy::cast_possible_truncation)]
                            let position = position as u32;
                            TypeReference::generic_parameter(
                                GenericParameterKind::Type,
                                position,
                                parameter.name.clone(),
                            )
                        })
                        .collect();
                    return Ok(TypeReference::GenericInstance {
                        element: Box::new(element),
                        arguments,
                    });
                }
                self.import_definition(ty, kind, context)
            }
        }
    }

    fn import_definition(
        &mut self,
        ty: &LiveTypeRc,
        kind: ImportKind,
        context: &ImportContext,
    ) -> Result<TypeReference> {
        let key = ImportKey::new(ty, self.module.id(), kind);
        let cache = ImportCache::global();
        if let Some((_, cached)) = cache.types.get(&key) {
            return Ok(cached);
        }

        let module = ty
            .module()
            .ok_or_else(|| malformed_error!("Type {} has no live module", ty.full_name()))?;
        let assembly = module
            .assembly()
            .ok_or_else(|| malformed_error!("Module {} has no live assembly", module.name))?;
        let scope = ResolutionScope::Assembly(self.import_assembly(&assembly)?);

        let (namespace, declaring_type) = match ty.declaring_type() {
            Some(declaring) => (
                String::new(),
                Some(Box::new(self.import_type(
                    &declaring,
                    ImportKind::Definition,
                    context,
                )?)),
            ),
            None => (ty.namespace.clone(), None),
        };

        let reference = TypeReference::Named(Box::new(NamedType {
            scope,
            namespace,
            name: ty.name.clone(),
            declaring_type,
            is_value_type: ty.is_value_type(),
            generic_parameters: ty
                .generic_parameters()
                .map(|parameter| parameter.name.clone())
                .collect(),
        }));

        Ok(cache.types.insert_if_absent(key, ty, reference))
    }

    /// Reference to a live method.
    ///
    /// Dynamic methods become [`MethodReference::Dynamic`] markers. Methods of a generic
    /// instance are re-fetched from the generic definition by token so their signature keeps
    /// its generic parameters.
    ///
    /// # Errors
    /// Returns [`Error::RelinkTargetNotFound`] for unbound generic parameters,
    /// [`Error::MemberMissing`] if the definition lacks the method's token and
    /// [`Error::Malformed`] if the method has no signature.
    pub fn import_method(
        &mut self,
        method: &LiveMethodRc,
        context: &ImportContext,
    ) -> Result<MethodReference> {
        self.module.ensure_alive()?;

        if method.is_dynamic {
            return Ok(MethodReference::Dynamic(DynamicMethodRef {
                name: method.name.clone(),
                id: method.id(),
            }));
        }

        if let Some(definition) = method.generic_definition() {
            let element = self.import_method(definition, context)?;
            let mut arguments = Vec::with_capacity(method.generic_arguments().len());
            for argument in method.generic_arguments() {
                arguments.push(self.import_type(argument, ImportKind::Open, context)?);
            }
            return Ok(MethodReference::Instance {
                element: Box::new(element),
                arguments,
            });
        }

        let key = ImportKey::new(method, self.module.id(), ImportKind::Definition);
        let cache = ImportCache::global();
        if let Some((_, cached)) = cache.methods.get(&key) {
            return Ok(cached);
        }

        let declaring = method.declaring_type();
        let source = match declaring.as_ref().and_then(|ty| ty.generic_definition()) {
            Some(definition) => definition
                .method_by_token(method.token)
                .ok_or(Error::MemberMissing(method.token))?,
            None => method.clone(),
        };
        let declaring_type = match &declaring {
            Some(declaring) => self.import_type(declaring, ImportKind::Open, context)?,
            None => self.module_placeholder(method)?,
        };

        let signature = source
            .signature()
            .ok_or_else(|| malformed_error!("Method {} has no signature", source))?;
        let mut inner = context.clone().with_method(&source);
        if let Some(declaring) = &declaring {
            inner = inner.with_type(declaring);
        }

        let return_type = self.import_type(&signature.return_type, ImportKind::Open, &inner)?;
        let mut parameters = Vec::with_capacity(signature.params.len());
        for parameter in &signature.params {
            parameters.push(self.import_type(&parameter.ty, ImportKind::Open, &inner)?);
        }

        let reference = MethodReference::Member(Box::new(MethodMember {
            name: source.name.clone(),
            declaring_type,
            has_this: source.has_this(),
            explicit_this: signature.explicit_this,
            convention: signature.convention,
            return_type,
            parameters,
            generic_parameters: source
                .generic_parameters()
                .map(|parameter| parameter.name.clone())
                .collect(),
        }));

        Ok(cache.methods.insert_if_absent(key, method, reference))
    }

    fn module_placeholder(&mut self, method: &LiveMethodRc) -> Result<TypeReference> {
        let module = method
            .module()
            .ok_or_else(|| malformed_error!("Method {} has no live module", method))?;
        Ok(TypeReference::named(
            ResolutionScope::Module(module.name.clone()),
            "",
            "<Module>",
        ))
    }

    /// Reference to a live field.
    ///
    /// Fields of a generic instance are re-fetched from the generic definition by token.
    ///
    /// # Errors
    /// Returns [`Error::RelinkTargetNotFound`] for unbound generic parameters,
    /// [`Error::MemberMissing`] if the definition lacks the field's token and
    /// [`Error::Malformed`] for fields without a declaring type.
    pub fn import_field(
        &mut self,
        field: &LiveFieldRc,
        context: &ImportContext,
    ) -> Result<FieldReference> {
        self.module.ensure_alive()?;

        let key = ImportKey::new(field, self.module.id(), ImportKind::Definition);
        let cache = ImportCache::global();
        if let Some((_, cached)) = cache.fields.get(&key) {
            return Ok(cached);
        }

        let declaring = field
            .declaring_type()
            .ok_or_else(|| malformed_error!("Field {} has no declaring type", field.name))?;
        let source = match declaring.generic_definition() {
            Some(definition) => definition
                .field_by_token(field.token)
                .ok_or(Error::MemberMissing(field.token))?,
            None => field.clone(),
        };

        let declaring_type = self.import_type(&declaring, ImportKind::Open, context)?;
        let inner = context.clone().with_type(&declaring);
        let field_type = self.import_type(&source.field_type, ImportKind::Open, &inner)?;

        let reference = FieldReference {
            name: source.name.clone(),
            declaring_type,
            field_type,
        };
        Ok(cache.fields.insert_if_absent(key, field, reference))
    }

    fn import_property(
        &mut self,
        property: &LivePropertyRc,
        context: &ImportContext,
    ) -> Result<PropertyReference> {
        let declaring = property
            .declaring_type()
            .ok_or_else(|| malformed_error!("Property {} has no declaring type", property.name))?;
        let declaring_type = self.import_type(&declaring, ImportKind::Open, context)?;
        let inner = context.clone().with_type(&declaring);

        let property_type = self.import_type(&property.property_type, ImportKind::Open, &inner)?;
        let mut parameters = Vec::with_capacity(property.parameters.len());
        for parameter in &property.parameters {
            parameters.push(self.import_type(parameter, ImportKind::Open, &inner)?);
        }
        Ok(PropertyReference {
            name: property.name.clone(),
            declaring_type,
            property_type,
            parameters,
        })
    }

    fn import_event(&mut self, event: &LiveEventRc, context: &ImportContext) -> Result<EventReference> {
        let declaring = event
            .declaring_type()
            .ok_or_else(|| malformed_error!("Event {} has no declaring type", event.name))?;
        let declaring_type = self.import_type(&declaring, ImportKind::Open, context)?;
        let inner = context.clone().with_type(&declaring);
        Ok(EventReference {
            name: event.name.clone(),
            declaring_type,
            event_type: self.import_type(&event.event_type, ImportKind::Open, &inner)?,
        })
    }

    /// Reference to any live entity, as used by `ldtoken`.
    ///
    /// # Errors
    /// See [`ReferenceImporter::import_type`], [`ReferenceImporter::import_method`] and
    /// [`ReferenceImporter::import_field`].
    pub fn import_member(
        &mut self,
        member: &LiveMember,
        context: &ImportContext,
    ) -> Result<MemberReference> {
        Ok(match member {
            LiveMember::Type(ty) => {
                MemberReference::Type(self.import_type(ty, ImportKind::Definition, context)?)
            }
            LiveMember::Method(method) => {
                MemberReference::Method(self.import_method(method, context)?)
            }
            LiveMember::Field(field) => MemberReference::Field(self.import_field(field, context)?),
            LiveMember::Property(property) => {
                MemberReference::Property(self.import_property(property, context)?)
            }
            LiveMember::Event(event) => MemberReference::Event(self.import_event(event, context)?),
        })
    }

    /// Stand-alone call site from a decoded method signature.
    ///
    /// # Errors
    /// See [`ReferenceImporter::import_type`].
    pub fn import_call_site(
        &mut self,
        signature: &MethodSignature<LiveTypeRc>,
        context: &ImportContext,
    ) -> Result<CallSite> {
        let return_type = self.import_signature_type(&signature.return_type, context)?;
        let mut parameters = Vec::with_capacity(signature.params.len());
        for parameter in &signature.params {
            parameters.push(self.import_signature_type(parameter, context)?);
        }
        Ok(CallSite {
            has_this: signature.has_this,
            explicit_this: signature.explicit_this,
            convention: signature.convention,
            return_type,
            parameters,
        })
    }

    /// Reference for a decoded signature type.
    ///
    /// # Errors
    /// See [`ReferenceImporter::import_type`].
    pub fn import_signature_type(
        &mut self,
        ty: &SignatureType<LiveTypeRc>,
        context: &ImportContext,
    ) -> Result<TypeReference> {
        Ok(match ty {
            SignatureType::Void => TypeReference::Primitive(PrimitiveKind::Void),
            SignatureType::Primitive(kind) => TypeReference::Primitive(*kind),
            SignatureType::Class(live) | SignatureType::ValueType(live) => {
                self.import_type(live, ImportKind::Open, context)?
            }
            SignatureType::Pointer(element) => {
                TypeReference::Pointer(Box::new(self.import_signature_type(element, context)?))
            }
            SignatureType::ByRef(element) => {
                TypeReference::ByRef(Box::new(self.import_signature_type(element, context)?))
            }
            SignatureType::Pinned(element) => {
                TypeReference::Pinned(Box::new(self.import_signature_type(element, context)?))
            }
            SignatureType::Sentinel(element) => {
                TypeReference::Sentinel(Box::new(self.import_signature_type(element, context)?))
            }
            SignatureType::SzArray(element) => {
                TypeReference::sz_array(self.import_signature_type(element, context)?)
            }
            SignatureType::Array(array) => TypeReference::Array(
                Box::new(self.import_signature_type(&array.element, context)?),
                ArrayShape::Rank {
                    rank: array.rank,
                    sizes: array.sizes.clone(),
                    lower_bounds: array.lower_bounds.clone(),
                },
            ),
            SignatureType::Modified {
                required,
                modifier,
                element,
            } => TypeReference::Modified {
                required: *required,
                modifier: Box::new(self.import_type(modifier, ImportKind::Definition, context)?),
                element: Box::new(self.import_signature_type(element, context)?),
            },
            SignatureType::FnPtr(signature) => {
                TypeReference::FunctionPointer(Box::new(self.import_call_site(signature, context)?))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        matcher::{field_matches, method_matches, type_matches},
        metadata::{
            flags::{FieldAttributes, MethodAttributes},
            signatures::CallingConvention,
        },
        test::factories::live::{CalculatorFixture, GenericFixture},
    };

    #[test]
    fn import_is_idempotent() {
        let fixture = CalculatorFixture::new();
        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();
        let context = ImportContext::new();

        let first = importer
            .import_type(&fixture.calculator, ImportKind::Definition, &context)
            .unwrap();
        let second = importer
            .import_type(&fixture.calculator, ImportKind::Definition, &context)
            .unwrap();
        assert_eq!(first, second);
        assert!(type_matches(&first, &fixture.calculator).unwrap());
        assert!(type_matches(&second, &fixture.calculator).unwrap());

        let method = importer.import_method(&fixture.add, &context).unwrap();
        assert_eq!(method, importer.import_method(&fixture.add, &context).unwrap());
        assert!(method_matches(&method, &fixture.add).unwrap());

        assert_eq!(module.assembly_references.len(), 1);
        assert_eq!(
            module.assembly_references[0].identity_hash,
            Some(fixture.assembly.identity_hash)
        );
    }

    #[test]
    fn open_and_definition_differ_for_generic_definitions() {
        let fixture = GenericFixture::new();
        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();
        let context = ImportContext::new().with_type(&fixture.boxed);

        let definition = importer
            .import_type(&fixture.boxed, ImportKind::Definition, &context)
            .unwrap();
        let open = importer
            .import_type(&fixture.boxed, ImportKind::Open, &context)
            .unwrap();

        assert_ne!(definition, open);
        assert!(definition.as_named().is_some());
        match &open {
            TypeReference::GenericInstance { element, arguments } => {
                assert_eq!(**element, definition);
                assert_eq!(arguments.len(), 1);
                assert_eq!(arguments[0].to_string(), "!0");
            }
            other => panic!("expected a generic instance, got {other}"),
        }
        assert!(type_matches(&open, &fixture.boxed).unwrap());
    }

    #[test]
    fn generic_parameters_need_their_owner_in_context() {
        let fixture = GenericFixture::new();
        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();

        let result = importer.import_type(&fixture.t, ImportKind::Open, &ImportContext::new());
        assert!(matches!(result, Err(Error::RelinkTargetNotFound { .. })));

        let context = ImportContext::new().with_type(&fixture.boxed);
        let parameter = importer
            .import_type(&fixture.t, ImportKind::Open, &context)
            .unwrap();
        assert_eq!(
            parameter,
            TypeReference::generic_parameter(GenericParameterKind::Type, 0, "T")
        );
    }

    #[test]
    fn members_of_instances_keep_generic_shape() {
        let fixture = GenericFixture::new();
        let instance = fixture
            .boxed
            .make_generic_type(vec![fixture.core.int32.clone()])
            .unwrap();
        let bound_field = instance.field_by_token(fixture.value_field.token).unwrap();
        let bound_get = instance.method_by_token(fixture.get.token).unwrap();

        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();
        let context = ImportContext::new();

        let field = importer.import_field(&bound_field, &context).unwrap();
        assert_eq!(field.field_type.to_string(), "!0");
        assert_eq!(field.declaring_type.to_string(), "Ns.Box`1<System.Int32>");
        assert!(field_matches(&field, &bound_field).unwrap());

        let method = importer.import_method(&bound_get, &context).unwrap();
        let member = method.member().unwrap();
        assert_eq!(member.return_type.to_string(), "!0");
        assert!(method_matches(&method, &bound_get).unwrap());
    }

    #[test]
    fn dynamic_methods_become_markers() {
        let fixture = CalculatorFixture::new();
        let dynamic = fixture.core.domain.define_dynamic_method(
            "lambda",
            &fixture.module,
            MethodAttributes::STATIC,
        );
        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();

        let reference = importer
            .import_method(&dynamic, &ImportContext::new())
            .unwrap();
        assert_eq!(
            reference,
            MethodReference::Dynamic(DynamicMethodRef {
                name: "lambda".into(),
                id: dynamic.id(),
            })
        );
    }

    #[test]
    fn nested_types_carry_their_declaring_type() {
        let fixture = CalculatorFixture::new();
        let nested = fixture.module.define_nested_type(
            &fixture.calculator,
            "Memory",
            crate::metadata::flags::TypeAttributes::NESTED_PUBLIC,
        );
        fixture.module.define_field(
            &nested,
            "slot",
            fixture.core.int32.clone(),
            FieldAttributes::PUBLIC,
        );

        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();
        let reference = importer
            .import_type(&nested, ImportKind::Definition, &ImportContext::new())
            .unwrap();
        assert_eq!(reference.to_string(), "Demo.Calculator/Memory");
        assert!(type_matches(&reference, &nested).unwrap());
    }

    #[test]
    fn call_sites_and_disposed_modules() {
        let fixture = CalculatorFixture::new();
        let mut module = DocumentModule::new("Patch.dll", "Patch");
        {
            let mut importer = ReferenceImporter::new(&mut module).unwrap();
            let signature = MethodSignature {
                convention: CallingConvention::StdCall,
                has_this: false,
                explicit_this: false,
                generic_param_count: 0,
                return_type: SignatureType::Void,
                params: vec![
                    SignatureType::Class(fixture.calculator.clone()),
                    SignatureType::Pointer(Box::new(SignatureType::Primitive(PrimitiveKind::U1))),
                ],
            };
            let site = importer
                .import_call_site(&signature, &ImportContext::new())
                .unwrap();
            assert_eq!(site.convention, CallingConvention::StdCall);
            assert_eq!(site.to_string(), "System.Void *(Demo.Calculator,System.Byte*)");
        }

        module.dispose();
        assert!(matches!(
            ReferenceImporter::new(&mut module),
            Err(Error::Disposed)
        ));
    }
}
