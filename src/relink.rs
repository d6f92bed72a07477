//! Reference graph relinking.
//!
//! [`Relink`] rebuilds a document-side reference graph for another context. Wrappers (arrays,
//! pointers, by-refs, modifiers, generic instances) are reconstructed around their relinked
//! elements, plain types and members pass through a caller-supplied [`RelinkResolver`], and
//! generic parameters are replaced by whatever the [`GenericContext`] binds them to.
//!
//! Member signatures are stated in terms of the declaring definition's own generic parameters.
//! They are therefore relinked in the open scope of the relinked declaring type, never in the
//! caller's context.
//!
//! With [`IdentityResolver`] and a context that binds every parameter to itself, relinking
//! returns a reference equal to its input.
//!
//! # Examples
//!
//! ```rust
//! use cilgraft::document::{ResolutionScope, TypeReference};
//! use cilgraft::generics::EmptyContext;
//! use cilgraft::relink::{Relink, TypeResolverFn};
//!
//! let old = TypeReference::named(ResolutionScope::Module("Old.dll".into()), "Demo", "Calculator");
//! let array = TypeReference::sz_array(old);
//!
//! let mut retarget = TypeResolverFn(|ty: TypeReference| {
//!     Ok(match ty.as_named() {
//!         Some(named) if named.name == "Calculator" => {
//!             TypeReference::named(ResolutionScope::Document, "Demo", "Calculator")
//!         }
//!         _ => ty,
//!     })
//! });
//! let relinked = array.relink(&mut retarget, &EmptyContext)?;
//! assert_eq!(relinked.to_string(), "Demo.Calculator[]");
//! # Ok::<(), cilgraft::Error>(())
//! ```

use crate::{
    document::{
        AttributeArgument, AttributeValue, CallSite, CustomAttribute, EventReference,
        ExceptionRegion, FieldReference, GenericParameter, Instruction, MemberReference,
        MethodBody, MethodMember, MethodReference, NamedArgument, NamedType, Operand,
        ParameterDefinition, PropertyReference, TypeReference, VariableDefinition,
    },
    generics::{GenericContext, GenericScope},
    Error, Result,
};

/// Maps plain references to their counterparts in the target context.
///
/// Every method defaults to the identity.
pub trait RelinkResolver {
    /// Map a named type. Wrappers and generic parameters never reach the resolver.
    ///
    /// # Errors
    /// Any error aborts the relink.
    fn relink_type(&mut self, ty: TypeReference) -> Result<TypeReference> {
        Ok(ty)
    }

    /// Map a method member or dynamic method marker, after its declaring type and signature
    /// were relinked.
    ///
    /// # Errors
    /// Any error aborts the relink.
    fn relink_method(&mut self, method: MethodReference) -> Result<MethodReference> {
        Ok(method)
    }

    /// Map a field, after its declaring type and field type were relinked.
    ///
    /// # Errors
    /// Any error aborts the relink.
    fn relink_field(&mut self, field: FieldReference) -> Result<FieldReference> {
        Ok(field)
    }
}

/// Leaves every reference unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl RelinkResolver for IdentityResolver {}

/// Resolves named types through a closure, members unchanged.
pub struct TypeResolverFn<F>(pub F)
where
    F: FnMut(TypeReference) -> Result<TypeReference>;

impl<F> RelinkResolver for TypeResolverFn<F>
where
    F: FnMut(TypeReference) -> Result<TypeReference>,
{
    fn relink_type(&mut self, ty: TypeReference) -> Result<TypeReference> {
        (self.0)(ty)
    }
}

/// A reference that can be rebuilt for another context.
pub trait Relink: Sized {
    /// The structurally equivalent reference in the target context.
    ///
    /// # Errors
    /// Returns [`Error::RelinkTargetNotFound`] for generic parameters `context` does not bind
    /// and propagates resolver errors.
    fn relink(&self, resolver: &mut dyn RelinkResolver, context: &dyn GenericContext)
        -> Result<Self>;
}

/// Relink `reference`, see [`Relink::relink`].
///
/// # Errors
/// See [`Relink::relink`].
pub fn relink<T: Relink>(
    reference: &T,
    resolver: &mut dyn RelinkResolver,
    context: &dyn GenericContext,
) -> Result<T> {
    reference.relink(resolver, context)
}

fn relink_all<T: Relink>(
    items: &[T],
    resolver: &mut dyn RelinkResolver,
    context: &dyn GenericContext,
) -> Result<Vec<T>> {
    items
        .iter()
        .map(|item| item.relink(resolver, context))
        .collect()
}

fn boxed(
    ty: &TypeReference,
    resolver: &mut dyn RelinkResolver,
    context: &dyn GenericContext,
) -> Result<Box<TypeReference>> {
    Ok(Box::new(ty.relink(resolver, context)?))
}

/// Scope in which the signature of a member declared on `declaring` is stated.
fn open_scope(declaring: &TypeReference, method_parameters: &[String]) -> GenericScope {
    GenericScope::open(declaring.generic_parameter_names(), method_parameters)
}

impl Relink for TypeReference {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        Ok(match self {
            TypeReference::Primitive(kind) => TypeReference::Primitive(*kind),
            TypeReference::Named(named) => {
                let declaring_type = match &named.declaring_type {
                    Some(declaring) => Some(boxed(declaring, resolver, context)?),
                    None => None,
                };
                resolver.relink_type(TypeReference::Named(Box::new(NamedType {
                    declaring_type,
                    ..(**named).clone()
                })))?
            }
            TypeReference::Array(element, shape) => {
                TypeReference::Array(boxed(element, resolver, context)?, shape.clone())
            }
            TypeReference::Pointer(element) => {
                TypeReference::Pointer(boxed(element, resolver, context)?)
            }
            TypeReference::ByRef(element) => TypeReference::ByRef(boxed(element, resolver, context)?),
            TypeReference::Pinned(element) => {
                TypeReference::Pinned(boxed(element, resolver, context)?)
            }
            TypeReference::Sentinel(element) => {
                TypeReference::Sentinel(boxed(element, resolver, context)?)
            }
            TypeReference::Modified {
                required,
                modifier,
                element,
            } => TypeReference::Modified {
                required: *required,
                modifier: boxed(modifier, resolver, context)?,
                element: boxed(element, resolver, context)?,
            },
            TypeReference::GenericInstance { element, arguments } => {
                TypeReference::GenericInstance {
                    element: boxed(element, resolver, context)?,
                    arguments: relink_all(arguments, resolver, context)?,
                }
            }
            TypeReference::FunctionPointer(site) => {
                TypeReference::FunctionPointer(Box::new(site.relink(resolver, context)?))
            }
            TypeReference::GenericParameter(parameter) => context
                .resolve(parameter)
                .ok_or_else(|| Error::relink_target(parameter, context.describe()))?,
        })
    }
}

impl Relink for CallSite {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        Ok(CallSite {
            has_this: self.has_this,
            explicit_this: self.explicit_this,
            convention: self.convention,
            return_type: self.return_type.relink(resolver, context)?,
            parameters: relink_all(&self.parameters, resolver, context)?,
        })
    }
}

impl Relink for MethodReference {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        match self {
            MethodReference::Instance { element, arguments } => Ok(MethodReference::Instance {
                element: Box::new(element.relink(resolver, context)?),
                arguments: relink_all(arguments, resolver, context)?,
            }),
            MethodReference::Member(member) => {
                let declaring_type = member.declaring_type.relink(resolver, context)?;
                let scope = open_scope(&declaring_type, &member.generic_parameters);
                let relinked = MethodMember {
                    name: member.name.clone(),
                    has_this: member.has_this,
                    explicit_this: member.explicit_this,
                    convention: member.convention,
                    return_type: member.return_type.relink(resolver, &scope)?,
                    parameters: relink_all(&member.parameters, resolver, &scope)?,
                    generic_parameters: member.generic_parameters.clone(),
                    declaring_type,
                };
                resolver.relink_method(MethodReference::Member(Box::new(relinked)))
            }
            MethodReference::Dynamic(_) => resolver.relink_method(self.clone()),
        }
    }
}

impl Relink for FieldReference {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        let declaring_type = self.declaring_type.relink(resolver, context)?;
        let scope = open_scope(&declaring_type, &[]);
        let field_type = self.field_type.relink(resolver, &scope)?;
        resolver.relink_field(FieldReference {
            name: self.name.clone(),
            declaring_type,
            field_type,
        })
    }
}

impl Relink for PropertyReference {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        let declaring_type = self.declaring_type.relink(resolver, context)?;
        let scope = open_scope(&declaring_type, &[]);
        Ok(PropertyReference {
            name: self.name.clone(),
            property_type: self.property_type.relink(resolver, &scope)?,
            parameters: relink_all(&self.parameters, resolver, &scope)?,
            declaring_type,
        })
    }
}

impl Relink for EventReference {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        let declaring_type = self.declaring_type.relink(resolver, context)?;
        let scope = open_scope(&declaring_type, &[]);
        Ok(EventReference {
            name: self.name.clone(),
            event_type: self.event_type.relink(resolver, &scope)?,
            declaring_type,
        })
    }
}

impl Relink for MemberReference {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        Ok(match self {
            MemberReference::Type(ty) => MemberReference::Type(ty.relink(resolver, context)?),
            MemberReference::Method(method) => {
                MemberReference::Method(method.relink(resolver, context)?)
            }
            MemberReference::Field(field) => MemberReference::Field(field.relink(resolver, context)?),
            MemberReference::Property(property) => {
                MemberReference::Property(property.relink(resolver, context)?)
            }
            MemberReference::Event(event) => MemberReference::Event(event.relink(resolver, context)?),
        })
    }
}

impl Relink for GenericParameter {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        Ok(GenericParameter {
            constraints: relink_all(&self.constraints, resolver, context)?,
            ..self.clone()
        })
    }
}

impl Relink for AttributeArgument {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        let value = match &self.value {
            AttributeValue::Array(items) => {
                AttributeValue::Array(relink_all(items, resolver, context)?)
            }
            other => other.clone(),
        };
        Ok(AttributeArgument {
            argument_type: self.argument_type.relink(resolver, context)?,
            value,
        })
    }
}

impl Relink for NamedArgument {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        Ok(NamedArgument {
            name: self.name.clone(),
            argument: self.argument.relink(resolver, context)?,
        })
    }
}

impl Relink for CustomAttribute {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        Ok(CustomAttribute {
            constructor: self.constructor.relink(resolver, context)?,
            arguments: relink_all(&self.arguments, resolver, context)?,
            fields: relink_all(&self.fields, resolver, context)?,
            properties: relink_all(&self.properties, resolver, context)?,
        })
    }
}

impl Relink for ParameterDefinition {
    fn relink(
        &self,
        resolver: &mut dyn RelinkResolver,
        context: &dyn GenericContext,
    ) -> Result<Self> {
        Ok(ParameterDefinition {
            name: self.name.clone(),
            sequence: self.sequence,
            attributes: self.attributes,
            parameter_type: self.parameter_type.relink(resolver, context)?,
            custom_attributes: relink_all(&self.custom_attributes, resolver, context)?,
        })
    }
}

fn relink_operand(
    operand: &Operand,
    resolver: &mut dyn RelinkResolver,
    context: &dyn GenericContext,
) -> Result<Operand> {
    Ok(match operand {
        Operand::Type(ty) => Operand::Type(ty.relink(resolver, context)?),
        Operand::Method(method) => Operand::Method(method.relink(resolver, context)?),
        Operand::Field(field) => Operand::Field(field.relink(resolver, context)?),
        Operand::Token(member) => Operand::Token(member.relink(resolver, context)?),
        Operand::CallSite(site) => Operand::CallSite(site.relink(resolver, context)?),
        other => other.clone(),
    })
}

/// Retarget a whole method body: locals, instruction operands and catch types.
///
/// Instruction ids are positions and stay valid, so branches and exception regions carry over
/// unchanged.
///
/// # Errors
/// See [`Relink::relink`].
pub fn relink_body(
    body: &MethodBody,
    resolver: &mut dyn RelinkResolver,
    context: &dyn GenericContext,
) -> Result<MethodBody> {
    let mut variables = Vec::with_capacity(body.variables.len());
    for variable in &body.variables {
        variables.push(VariableDefinition {
            variable_type: variable.variable_type.relink(resolver, context)?,
        });
    }

    let mut instructions = Vec::with_capacity(body.instructions.len());
    for instruction in &body.instructions {
        instructions.push(Instruction::new(
            instruction.offset,
            instruction.opcode,
            relink_operand(&instruction.operand, resolver, context)?,
        ));
    }

    let mut exception_regions = Vec::with_capacity(body.exception_regions.len());
    for region in &body.exception_regions {
        let catch_type = match &region.catch_type {
            Some(ty) => Some(ty.relink(resolver, context)?),
            None => None,
        };
        exception_regions.push(ExceptionRegion {
            catch_type,
            ..region.clone()
        });
    }

    Ok(MethodBody {
        instructions,
        variables,
        exception_regions,
        max_stack: body.max_stack,
        init_locals: body.init_locals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::{
            opcodes::INSTRUCTIONS, AssemblyNameReference, ArrayShape, GenericParameterKind,
            GenericParameterRef, ResolutionScope,
        },
        generics::EmptyContext,
        metadata::{signatures::CallingConvention, typesystem::PrimitiveKind},
    };

    fn old_scope() -> ResolutionScope {
        ResolutionScope::Assembly(AssemblyNameReference::new("Old"))
    }

    fn generic_box() -> TypeReference {
        TypeReference::Named(Box::new(NamedType {
            scope: old_scope(),
            namespace: "Ns".into(),
            name: "Box`1".into(),
            declaring_type: None,
            is_value_type: false,
            generic_parameters: vec!["T".into()],
        }))
    }

    fn t() -> TypeReference {
        TypeReference::generic_parameter(GenericParameterKind::Type, 0, "T")
    }

    fn u() -> TypeReference {
        TypeReference::generic_parameter(GenericParameterKind::Method, 0, "U")
    }

    /// Moves every named type from `Old` into the document.
    struct Retarget {
        types: usize,
        methods: usize,
    }

    impl RelinkResolver for Retarget {
        fn relink_type(&mut self, ty: TypeReference) -> Result<TypeReference> {
            self.types += 1;
            Ok(match ty {
                TypeReference::Named(mut named) if named.scope == old_scope() => {
                    named.scope = ResolutionScope::Document;
                    TypeReference::Named(named)
                }
                other => other,
            })
        }

        fn relink_method(&mut self, method: MethodReference) -> Result<MethodReference> {
            self.methods += 1;
            Ok(method)
        }
    }

    fn convert_all() -> MethodReference {
        let open_box = TypeReference::GenericInstance {
            element: Box::new(generic_box()),
            arguments: vec![t()],
        };
        MethodReference::Member(Box::new(MethodMember {
            name: "Convert".into(),
            declaring_type: open_box.clone(),
            has_this: true,
            explicit_this: false,
            convention: CallingConvention::Default,
            return_type: TypeReference::sz_array(u()),
            parameters: vec![t(), open_box],
            generic_parameters: vec!["U".into()],
        }))
    }

    #[test]
    fn identity_law() {
        let scope = GenericScope::open(&["T".to_string()], &["U".to_string()]);
        let method = convert_all();
        assert_eq!(method.relink(&mut IdentityResolver, &scope).unwrap(), method);

        let instance = MethodReference::Instance {
            element: Box::new(method),
            arguments: vec![u()],
        };
        assert_eq!(instance.relink(&mut IdentityResolver, &scope).unwrap(), instance);

        let modified = TypeReference::Modified {
            required: true,
            modifier: Box::new(generic_box()),
            element: Box::new(TypeReference::Pointer(Box::new(t()))),
        };
        assert_eq!(modified.relink(&mut IdentityResolver, &scope).unwrap(), modified);
    }

    #[test]
    fn unbound_parameter_fails() {
        let result = t().relink(&mut IdentityResolver, &EmptyContext);
        match result {
            Err(Error::RelinkTargetNotFound { reference, context }) => {
                assert_eq!(reference, "!0");
                assert_eq!(context, "empty context");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrappers_rebuilt_around_resolved_types() {
        let mut resolver = Retarget {
            types: 0,
            methods: 0,
        };
        let scope = GenericScope::new().bind_type("T", TypeReference::Primitive(PrimitiveKind::I4));
        let array = TypeReference::Array(
            Box::new(TypeReference::GenericInstance {
                element: Box::new(generic_box()),
                arguments: vec![t()],
            }),
            ArrayShape::Rank {
                rank: 2,
                sizes: vec![],
                lower_bounds: vec![],
            },
        );

        let relinked = array.relink(&mut resolver, &scope).unwrap();
        assert_eq!(relinked.to_string(), "Ns.Box`1<System.Int32>[,]");
        let element = relinked.element().and_then(TypeReference::element).unwrap();
        assert_eq!(element.as_named().unwrap().scope, ResolutionScope::Document);
        assert_eq!(resolver.types, 1);
    }

    #[test]
    fn member_signature_stays_open() {
        let mut resolver = Retarget {
            types: 0,
            methods: 0,
        };
        let scope = GenericScope::new().bind_type("T", TypeReference::Primitive(PrimitiveKind::String));
        let relinked = convert_all().relink(&mut resolver, &scope).unwrap();

        let member = relinked.member().unwrap();
        assert_eq!(member.declaring_type.to_string(), "Ns.Box`1<System.String>");
        assert_eq!(member.parameters[0], t());
        assert_eq!(member.return_type, TypeReference::sz_array(u()));
        assert_eq!(resolver.methods, 1);
    }

    #[test]
    fn fields_and_attributes() {
        let mut resolver = Retarget {
            types: 0,
            methods: 0,
        };
        let field = FieldReference {
            name: "value".into(),
            declaring_type: generic_box(),
            field_type: t(),
        };
        let relinked = field.relink(&mut resolver, &EmptyContext).unwrap();
        assert_eq!(relinked.field_type, t());
        assert_eq!(
            relinked.declaring_type.as_named().unwrap().scope,
            ResolutionScope::Document
        );

        let attribute = CustomAttribute {
            constructor: MethodReference::Member(Box::new(MethodMember {
                name: ".ctor".into(),
                declaring_type: TypeReference::named(old_scope(), "Ns", "MarkerAttribute"),
                has_this: true,
                explicit_this: false,
                convention: CallingConvention::Default,
                return_type: TypeReference::Primitive(PrimitiveKind::Void),
                parameters: vec![TypeReference::named(old_scope(), "Ns", "Mode")],
                generic_parameters: vec![],
            })),
            arguments: vec![AttributeArgument {
                argument_type: TypeReference::named(old_scope(), "Ns", "Mode"),
                value: AttributeValue::Int(2),
            }],
            fields: vec![],
            properties: vec![NamedArgument {
                name: "Tags".into(),
                argument: AttributeArgument {
                    argument_type: TypeReference::sz_array(TypeReference::Primitive(
                        PrimitiveKind::String,
                    )),
                    value: AttributeValue::Array(vec![AttributeArgument {
                        argument_type: TypeReference::Primitive(PrimitiveKind::String),
                        value: AttributeValue::String("fast".into()),
                    }]),
                },
            }],
        };
        let relinked = attribute.relink(&mut resolver, &EmptyContext).unwrap();
        assert_eq!(relinked.arguments[0].value, AttributeValue::Int(2));
        assert_eq!(
            relinked.arguments[0].argument_type.as_named().unwrap().scope,
            ResolutionScope::Document
        );
        assert_eq!(relinked.properties, attribute.properties);
    }

    #[test]
    fn body_operands_are_retargeted() {
        let mut resolver = Retarget {
            types: 0,
            methods: 0,
        };
        let body = MethodBody {
            instructions: vec![
                Instruction::new(
                    0,
                    &INSTRUCTIONS[0x8D],
                    Operand::Type(TypeReference::named(old_scope(), "Ns", "Item")),
                ),
                Instruction::new(5, &INSTRUCTIONS[0x2A], Operand::None),
            ],
            variables: vec![VariableDefinition {
                variable_type: TypeReference::Pinned(Box::new(TypeReference::named(
                    old_scope(),
                    "Ns",
                    "Item",
                ))),
            }],
            max_stack: 1,
            ..MethodBody::default()
        };

        let relinked = relink_body(&body, &mut resolver, &EmptyContext).unwrap();
        match &relinked.instructions[0].operand {
            Operand::Type(ty) => assert_eq!(ty.as_named().unwrap().scope, ResolutionScope::Document),
            other => panic!("unexpected operand {other:?}"),
        }
        assert!(matches!(
            relinked.variables[0].variable_type,
            TypeReference::Pinned(_)
        ));
        assert_eq!(relinked.max_stack, 1);
        assert_eq!(relinked.instructions[1], body.instructions[1]);

        let parameter = GenericParameterRef {
            kind: GenericParameterKind::Type,
            position: 0,
            name: "T".into(),
        };
        let open = MethodBody {
            variables: vec![VariableDefinition {
                variable_type: TypeReference::GenericParameter(parameter),
            }],
            ..MethodBody::default()
        };
        assert!(relink_body(&open, &mut resolver, &EmptyContext).is_err());
    }
}
