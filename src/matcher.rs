//! Structural identity between document references and live entities.
//!
//! The two views describe the same program through unrelated object graphs, so "the same
//! member" has to be decided structurally. [`matches`] applies these rules in order and the
//! first mismatch yields `false`:
//!
//! 1. A document generic parameter matches a live generic parameter of the same owner kind and
//!    position, or a concrete live type that the document side binds the parameter to through
//!    its declaring generic instance.
//! 2. If the live entity has a declaring type, the document reference must have one that
//!    matches. The document `<Module>` placeholder only matches global live members.
//! 3. Names are compared exactly. Type specifications have no name and are compared by shape.
//! 4. Kinds must agree: type, method (constructors included), field, property, event.
//! 5. Composite types recurse: generic instances argument by argument, arrays by rank and
//!    element, pointers and by-refs by element. Modifiers, pinned and sentinel wrappers exist
//!    only on the document side and are unwrapped. Function pointers are not supported.
//! 6. Methods compare parameter count, parameter types, return type and generic arity.
//!
//! Lookups across the views ([`find_method`], [`find_field`], [`find_type`]) are linear scans
//! over the candidates applying the predicate.

use crate::{
    document::{
        ArrayShape, DocumentMember, EventReference, FieldReference, GenericParameterKind,
        MethodReference, NamedType, PropertyReference, ResolutionScope, TypeReference,
    },
    generics::{EmptyContext, GenericContext, GenericScope},
    live::{
        GenericOwner, LiveEventRc, LiveFieldRc, LiveMember, LiveMethodRc, LiveModuleRc,
        LivePropertyRc, LiveTypeRc, LiveTypeShape,
    },
    Result,
};

/// Whether `document` denotes the live entity `live`.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] if either side uses a shape the matcher does not
/// model, such as a function pointer.
pub fn matches(document: DocumentMember<'_>, live: &LiveMember) -> Result<bool> {
    match (document, live) {
        (DocumentMember::Type(doc), LiveMember::Type(ty)) => type_matches(doc, ty),
        (DocumentMember::Method(doc), LiveMember::Method(method)) => method_matches(doc, method),
        (DocumentMember::Field(doc), LiveMember::Field(field)) => field_matches(doc, field),
        (DocumentMember::Property(doc), LiveMember::Property(property)) => {
            property_matches(doc, property)
        }
        (DocumentMember::Event(doc), LiveMember::Event(event)) => event_matches(doc, event),
        _ => Ok(false),
    }
}

/// [`matches`] with the arguments in the other order.
///
/// # Errors
/// See [`matches`].
pub fn matches_live(live: &LiveMember, document: DocumentMember<'_>) -> Result<bool> {
    matches(document, live)
}

/// Whether `doc` denotes the live type `live`.
///
/// # Errors
/// See [`matches`].
pub fn type_matches(doc: &TypeReference, live: &LiveTypeRc) -> Result<bool> {
    match_type(doc, live, &EmptyContext)
}

fn match_type(doc: &TypeReference, live: &LiveTypeRc, scope: &dyn GenericContext) -> Result<bool> {
    if let TypeReference::GenericParameter(parameter) = doc {
        if let LiveTypeShape::GenericParameter { position, owner } = &live.shape {
            let same_kind = matches!(
                (parameter.kind, owner),
                (GenericParameterKind::Type, GenericOwner::Type(_))
                    | (GenericParameterKind::Method, GenericOwner::Method(_))
            );
            return Ok(same_kind && parameter.position == *position);
        }
        return match scope.resolve(parameter) {
            Some(TypeReference::GenericParameter(_)) | None => Ok(false),
            Some(bound) => match_type(&bound, live, &EmptyContext),
        };
    }

    match doc {
        TypeReference::Modified { element, .. }
        | TypeReference::Pinned(element)
        | TypeReference::Sentinel(element) => match_type(element, live, scope),
        TypeReference::FunctionPointer(site) => Err(not_supported_error!(
            "Matching function pointer types ({})",
            site
        )),
        TypeReference::Primitive(kind) => Ok(live.primitive_kind() == Some(*kind)),
        TypeReference::Named(named) => match_named(named, live),
        TypeReference::Array(element, shape) => match (shape, &live.shape) {
            (ArrayShape::Vector, LiveTypeShape::SzArray(live_element)) => {
                match_type(element, live_element, scope)
            }
            (
                ArrayShape::Rank { rank, .. },
                LiveTypeShape::Array {
                    element: live_element,
                    rank: live_rank,
                },
            ) if rank == live_rank => match_type(element, live_element, scope),
            _ => Ok(false),
        },
        TypeReference::Pointer(element) => match &live.shape {
            LiveTypeShape::Pointer(live_element) => match_type(element, live_element, scope),
            _ => Ok(false),
        },
        TypeReference::ByRef(element) => match &live.shape {
            LiveTypeShape::ByRef(live_element) => match_type(element, live_element, scope),
            _ => Ok(false),
        },
        TypeReference::GenericInstance { element, arguments } => match &live.shape {
            LiveTypeShape::GenericInstance {
                definition,
                arguments: live_arguments,
            } => {
                if arguments.len() != live_arguments.len() || !match_type(element, definition, scope)? {
                    return Ok(false);
                }
                for (argument, live_argument) in arguments.iter().zip(live_arguments) {
                    if !match_type(argument, live_argument, scope)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            // A definition used as a value inside its own body is the instance over its own
            // parameters.
            LiveTypeShape::Definition if live.is_generic_definition() => {
                if arguments.len() != live.generic_parameter_count()
                    || !match_type(element, live, scope)?
                {
                    return Ok(false);
                }
                Ok(arguments.iter().enumerate().all(|(index, argument)| {
                    matches!(
                        argument,
                        TypeReference::GenericParameter(parameter)
                            if parameter.kind == GenericParameterKind::Type
                                && parameter.position as usize == index
                    )
                }))
            }
            _ => Ok(false),
        },
        TypeReference::GenericParameter(_) => Ok(false),
    }
}

fn match_named(named: &NamedType, live: &LiveTypeRc) -> Result<bool> {
    if !live.is_definition() {
        return Ok(false);
    }

    match (live.declaring_type(), &named.declaring_type) {
        (Some(live_declaring), Some(declaring)) => {
            if !match_type(declaring, &live_declaring, &EmptyContext)? {
                return Ok(false);
            }
        }
        (None, None) => {}
        _ => return Ok(false),
    }

    if named.is_module_type() != live.is_module_type()
        || named.name != live.name
        || named.namespace != live.namespace
    {
        return Ok(false);
    }

    if !named.generic_parameters.is_empty()
        && named.generic_parameters.len() != live.generic_parameter_count()
    {
        return Ok(false);
    }

    let Some(module) = live.module() else {
        return Ok(false);
    };
    Ok(match &named.scope {
        ResolutionScope::Assembly(assembly) => module
            .assembly()
            .is_some_and(|live_assembly| live_assembly.name == assembly.name),
        ResolutionScope::Module(name) => module.name == *name,
        ResolutionScope::Document => true,
    })
}

/// Declaring type of a live member, with members of `<Module>` treated as global.
fn live_declaring(declaring: Option<LiveTypeRc>) -> Option<LiveTypeRc> {
    declaring.filter(|ty| !ty.is_module_type())
}

fn is_module_placeholder(doc: &TypeReference) -> bool {
    doc.as_named().is_some_and(NamedType::is_module_type)
}

fn match_declaring(doc: &TypeReference, live: Option<LiveTypeRc>) -> Result<bool> {
    match live_declaring(live) {
        Some(live_declaring) => {
            if is_module_placeholder(doc) {
                return Ok(false);
            }
            match_type(doc, &live_declaring, &EmptyContext)
        }
        None => Ok(is_module_placeholder(doc)),
    }
}

/// Whether `doc` denotes the live method `live`.
///
/// # Errors
/// See [`matches`].
pub fn method_matches(doc: &MethodReference, live: &LiveMethodRc) -> Result<bool> {
    match doc {
        MethodReference::Dynamic(dynamic) => Ok(live.is_dynamic && live.id() == dynamic.id),
        MethodReference::Instance { element, arguments } => {
            let Some(definition) = live.generic_definition() else {
                return Ok(false);
            };
            let live_arguments = live.generic_arguments();
            if arguments.len() != live_arguments.len() || !method_matches(element, definition)? {
                return Ok(false);
            }
            let scope = GenericScope::for_method(doc);
            for (argument, live_argument) in arguments.iter().zip(live_arguments) {
                if !match_type(argument, live_argument, &scope)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        MethodReference::Member(member) => {
            if live.is_dynamic || live.is_generic_instance() || member.name != live.name {
                return Ok(false);
            }
            if member.has_this != live.has_this()
                || member.generic_parameters.len() != live.generic_parameter_count()
            {
                return Ok(false);
            }
            if !match_declaring(&member.declaring_type, live.declaring_type())? {
                return Ok(false);
            }

            let Some(signature) = live.signature() else {
                return Ok(false);
            };
            if member.parameters.len() != signature.params.len() {
                return Ok(false);
            }

            let scope = GenericScope::for_method(doc);
            for (parameter, live_parameter) in member.parameters.iter().zip(&signature.params) {
                if !match_type(parameter, &live_parameter.ty, &scope)? {
                    return Ok(false);
                }
            }
            match_type(&member.return_type, &signature.return_type, &scope)
        }
    }
}

/// Whether `doc` denotes the live field `live`.
///
/// # Errors
/// See [`matches`].
pub fn field_matches(doc: &FieldReference, live: &LiveFieldRc) -> Result<bool> {
    if doc.name != live.name || !match_declaring(&doc.declaring_type, live.declaring_type())? {
        return Ok(false);
    }
    let scope = GenericScope::for_type(&doc.declaring_type);
    match_type(&doc.field_type, &live.field_type, &scope)
}

fn property_matches(doc: &PropertyReference, live: &LivePropertyRc) -> Result<bool> {
    if doc.name != live.name
        || doc.parameters.len() != live.parameters.len()
        || !match_declaring(&doc.declaring_type, live.declaring_type())?
    {
        return Ok(false);
    }
    let scope = GenericScope::for_type(&doc.declaring_type);
    for (parameter, live_parameter) in doc.parameters.iter().zip(&live.parameters) {
        if !match_type(parameter, live_parameter, &scope)? {
            return Ok(false);
        }
    }
    match_type(&doc.property_type, &live.property_type, &scope)
}

fn event_matches(doc: &EventReference, live: &LiveEventRc) -> Result<bool> {
    if doc.name != live.name || !match_declaring(&doc.declaring_type, live.declaring_type())? {
        return Ok(false);
    }
    let scope = GenericScope::for_type(&doc.declaring_type);
    match_type(&doc.event_type, &live.event_type, &scope)
}

/// Find the method of `ty` that `doc` denotes.
///
/// # Errors
/// See [`matches`].
pub fn find_method(ty: &LiveTypeRc, doc: &MethodReference) -> Result<Option<LiveMethodRc>> {
    for method in ty.methods() {
        if method_matches(doc, method)? {
            return Ok(Some(method.clone()));
        }
    }
    Ok(None)
}

/// Find the field of `ty` that `doc` denotes.
///
/// # Errors
/// See [`matches`].
pub fn find_field(ty: &LiveTypeRc, doc: &FieldReference) -> Result<Option<LiveFieldRc>> {
    for field in ty.fields() {
        if field_matches(doc, field)? {
            return Ok(Some(field.clone()));
        }
    }
    Ok(None)
}

/// Find the property of `ty` that `doc` denotes.
///
/// # Errors
/// See [`matches`].
pub fn find_property(ty: &LiveTypeRc, doc: &PropertyReference) -> Result<Option<LivePropertyRc>> {
    for property in ty.properties() {
        if property_matches(doc, property)? {
            return Ok(Some(property.clone()));
        }
    }
    Ok(None)
}

/// Find the event of `ty` that `doc` denotes.
///
/// # Errors
/// See [`matches`].
pub fn find_event(ty: &LiveTypeRc, doc: &EventReference) -> Result<Option<LiveEventRc>> {
    for event in ty.events() {
        if event_matches(doc, event)? {
            return Ok(Some(event.clone()));
        }
    }
    Ok(None)
}

/// Find the type definition of `module` that `doc` denotes.
///
/// # Errors
/// See [`matches`].
pub fn find_type(module: &LiveModuleRc, doc: &TypeReference) -> Result<Option<LiveTypeRc>> {
    for ty in module.types() {
        if type_matches(doc, ty)? {
            return Ok(Some(ty.clone()));
        }
    }
    Ok(None)
}
