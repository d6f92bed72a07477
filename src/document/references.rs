//! Value-like references used throughout the document model.
//!
//! A reference is a non-owning description of a type, method, field, property or event. It
//! names its target by scope, namespace and name (plus a signature for members) instead of
//! pointing at a live entity, so references can be cloned, compared structurally and rewritten
//! by [`crate::relink`] without touching any metadata view.

use std::fmt;

use crate::metadata::{signatures::CallingConvention, typesystem::PrimitiveKind};

/// An assembly named by a document-side reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyNameReference {
    /// Simple name, e.g. `System.Private.CoreLib`
    pub name: String,
    /// Display name including version, culture and public key token
    pub full_name: String,
    /// Runtime-assigned identity of the live assembly the reference was imported from.
    /// Distinguishes independently loaded assemblies that share a name.
    pub identity_hash: Option<u64>,
}

impl AssemblyNameReference {
    /// A reference by simple name only.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        AssemblyNameReference {
            full_name: name.clone(),
            name,
            identity_hash: None,
        }
    }
}

impl fmt::Display for AssemblyNameReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// Where a named type is defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolutionScope {
    /// Defined in another assembly
    Assembly(AssemblyNameReference),
    /// Defined in another module of the same assembly
    Module(String),
    /// Defined in the document module holding the reference
    Document,
}

/// A named, non-composite type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedType {
    /// Defining scope. Nested types repeat the scope of their outermost type.
    pub scope: ResolutionScope,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name including any arity suffix, e.g. ``List`1``
    pub name: String,
    /// Enclosing type of a nested type
    pub declaring_type: Option<Box<TypeReference>>,
    /// Whether the type is a value type
    pub is_value_type: bool,
    /// Names of the type's own generic parameters
    pub generic_parameters: Vec<String>,
}

impl NamedType {
    /// The namespace-qualified name, with `/` separating nested types.
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.declaring_type {
            Some(declaring) => format!("{declaring}/{}", self.name),
            None if self.namespace.is_empty() => self.name.clone(),
            None => format!("{}.{}", self.namespace, self.name),
        }
    }

    /// The pseudo type holding a module's global members.
    #[must_use]
    pub fn is_module_type(&self) -> bool {
        self.name == "<Module>" && self.namespace.is_empty() && self.declaring_type.is_none()
    }
}

/// Shape of an array type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayShape {
    /// Single dimensional, zero based (`T[]`)
    Vector,
    /// General array (`T[,]`, `T[*]`, ...)
    Rank {
        /// Number of dimensions
        rank: u32,
        /// Sizes of the leading dimensions that declare one
        sizes: Vec<u32>,
        /// Lower bounds of the leading dimensions that declare one
        lower_bounds: Vec<i32>,
    },
}

impl ArrayShape {
    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> u32 {
        match self {
            ArrayShape::Vector => 1,
            ArrayShape::Rank { rank, .. } => *rank,
        }
    }
}

/// Owner kind of a generic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericParameterKind {
    /// Declared by a type (`!n`)
    Type,
    /// Declared by a method (`!!n`)
    Method,
}

/// A use of a generic parameter inside a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericParameterRef {
    /// Owner kind
    pub kind: GenericParameterKind,
    /// Zero based position in the owner's parameter list
    pub position: u32,
    /// Declared name, empty if unknown
    pub name: String,
}

impl fmt::Display for GenericParameterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name.is_empty() {
            return f.write_str(&self.name);
        }
        match self.kind {
            GenericParameterKind::Type => write!(f, "!{}", self.position),
            GenericParameterKind::Method => write!(f, "!!{}", self.position),
        }
    }
}

/// Reference to a type.
///
/// Every variant other than [`TypeReference::Primitive`], [`TypeReference::Named`] and
/// [`TypeReference::GenericParameter`] is a type-specification wrapper around one or more
/// element references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeReference {
    /// Built-in type with a dedicated element type
    Primitive(PrimitiveKind),
    /// Named class, value type or interface
    Named(Box<NamedType>),
    /// Array of the element type
    Array(Box<TypeReference>, ArrayShape),
    /// Unmanaged pointer
    Pointer(Box<TypeReference>),
    /// Managed reference
    ByRef(Box<TypeReference>),
    /// Pinned local variable type
    Pinned(Box<TypeReference>),
    /// First variable argument of a vararg call site
    Sentinel(Box<TypeReference>),
    /// `modreq`/`modopt` annotated type
    Modified {
        /// `modreq` if true
        required: bool,
        /// The modifier type
        modifier: Box<TypeReference>,
        /// The annotated type
        element: Box<TypeReference>,
    },
    /// Generic type instantiated with arguments
    GenericInstance {
        /// The generic type definition
        element: Box<TypeReference>,
        /// One argument per generic parameter
        arguments: Vec<TypeReference>,
    },
    /// Function pointer
    FunctionPointer(Box<CallSite>),
    /// Generic parameter of the enclosing type or method
    GenericParameter(GenericParameterRef),
}

impl TypeReference {
    /// A named type in an assembly.
    pub fn named(
        scope: ResolutionScope,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> TypeReference {
        TypeReference::Named(Box::new(NamedType {
            scope,
            namespace: namespace.into(),
            name: name.into(),
            declaring_type: None,
            is_value_type: false,
            generic_parameters: Vec::new(),
        }))
    }

    /// Generic parameter shorthand.
    pub fn generic_parameter(
        kind: GenericParameterKind,
        position: u32,
        name: impl Into<String>,
    ) -> TypeReference {
        TypeReference::GenericParameter(GenericParameterRef {
            kind,
            position,
            name: name.into(),
        })
    }

    /// `T[]`
    #[must_use]
    pub fn sz_array(element: TypeReference) -> TypeReference {
        TypeReference::Array(Box::new(element), ArrayShape::Vector)
    }

    /// `T&`
    #[must_use]
    pub fn by_ref(element: TypeReference) -> TypeReference {
        TypeReference::ByRef(Box::new(element))
    }

    /// The named type, if this is one.
    #[must_use]
    pub fn as_named(&self) -> Option<&NamedType> {
        match self {
            TypeReference::Named(named) => Some(named),
            _ => None,
        }
    }

    /// Wrapped element of a single-element type specification.
    #[must_use]
    pub fn element(&self) -> Option<&TypeReference> {
        match self {
            TypeReference::Array(element, _)
            | TypeReference::Pointer(element)
            | TypeReference::ByRef(element)
            | TypeReference::Pinned(element)
            | TypeReference::Sentinel(element)
            | TypeReference::Modified { element, .. }
            | TypeReference::GenericInstance { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Whether this reference is a type-specification wrapper.
    #[must_use]
    pub fn is_type_specification(&self) -> bool {
        !matches!(
            self,
            TypeReference::Primitive(_)
                | TypeReference::Named(_)
                | TypeReference::GenericParameter(_)
        )
    }

    /// Names of the generic parameters declared by this type or by the generic definition it
    /// instantiates.
    #[must_use]
    pub fn generic_parameter_names(&self) -> &[String] {
        match self {
            TypeReference::Named(named) => &named.generic_parameters,
            TypeReference::GenericInstance { element, .. } => element.generic_parameter_names(),
            _ => &[],
        }
    }

    /// Whether the runtime treats the type as a value type, as far as the reference knows.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            TypeReference::Primitive(kind) => kind.is_value_type(),
            TypeReference::Named(named) => named.is_value_type,
            TypeReference::GenericInstance { element, .. }
            | TypeReference::Modified { element, .. } => element.is_value_type(),
            _ => false,
        }
    }

    /// Whether the reference mentions a generic parameter anywhere.
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        match self {
            TypeReference::GenericParameter(_) => true,
            TypeReference::Primitive(_) => false,
            TypeReference::Named(named) => named
                .declaring_type
                .as_ref()
                .is_some_and(|declaring| declaring.contains_generic_parameter()),
            TypeReference::GenericInstance { element, arguments } => {
                element.contains_generic_parameter()
                    || arguments.iter().any(TypeReference::contains_generic_parameter)
            }
            TypeReference::Modified {
                modifier, element, ..
            } => modifier.contains_generic_parameter() || element.contains_generic_parameter(),
            TypeReference::FunctionPointer(site) => {
                site.return_type.contains_generic_parameter()
                    || site
                        .parameters
                        .iter()
                        .any(TypeReference::contains_generic_parameter)
            }
            TypeReference::Array(element, _)
            | TypeReference::Pointer(element)
            | TypeReference::ByRef(element)
            | TypeReference::Pinned(element)
            | TypeReference::Sentinel(element) => element.contains_generic_parameter(),
        }
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeReference::Primitive(kind) => write!(f, "{kind}"),
            TypeReference::Named(named) => f.write_str(&named.full_name()),
            TypeReference::Array(element, ArrayShape::Vector) => write!(f, "{element}[]"),
            TypeReference::Array(element, ArrayShape::Rank { rank, .. }) => {
                if *rank == 1 {
                    write!(f, "{element}[*]")
                } else {
                    let commas = ",".repeat(rank.saturating_sub(1) as usize);
                    write!(f, "{element}[{commas}]")
                }
            }
            TypeReference::Pointer(element) => write!(f, "{element}*"),
            TypeReference::ByRef(element) => write!(f, "{element}&"),
            TypeReference::Pinned(element) => write!(f, "{element} pinned"),
            TypeReference::Sentinel(element) => write!(f, "...,{element}"),
            TypeReference::Modified {
                required,
                modifier,
                element,
            } => {
                let keyword = if *required { "modreq" } else { "modopt" };
                write!(f, "{element} {keyword}({modifier})")
            }
            TypeReference::GenericInstance { element, arguments } => {
                write!(f, "{element}<")?;
                write_list(f, arguments)?;
                write!(f, ">")
            }
            TypeReference::FunctionPointer(site) => write!(f, "method {site}"),
            TypeReference::GenericParameter(parameter) => write!(f, "{parameter}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeReference]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// A stand-alone method signature, used by `calli` and function pointers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// Instance call
    pub has_this: bool,
    /// `this` is the first entry of `parameters`
    pub explicit_this: bool,
    /// Calling convention kind
    pub convention: CallingConvention,
    /// Return type
    pub return_type: TypeReference,
    /// Parameter types, variable arguments start at the [`TypeReference::Sentinel`]
    pub parameters: Vec<TypeReference>,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} *(", self.return_type)?;
        write_list(f, &self.parameters)?;
        write!(f, ")")
    }
}

/// A method named by declaring type, name and signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodMember {
    /// Method name
    pub name: String,
    /// Declaring type. For methods of a generic type this is the instantiation the method is
    /// called on; the signature stays in terms of the definition's parameters.
    pub declaring_type: TypeReference,
    /// Instance method
    pub has_this: bool,
    /// `this` is passed explicitly
    pub explicit_this: bool,
    /// Calling convention kind
    pub convention: CallingConvention,
    /// Return type
    pub return_type: TypeReference,
    /// Parameter types
    pub parameters: Vec<TypeReference>,
    /// Names of the method's own generic parameters
    pub generic_parameters: Vec<String>,
}

/// An opaque reference to a method that was generated at runtime and has no metadata
/// identity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicMethodRef {
    /// Name the method was created with
    pub name: String,
    /// Runtime identity of the live method
    pub id: u64,
}

/// Reference to a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodReference {
    /// A declared method
    Member(Box<MethodMember>),
    /// A generic method instantiated with arguments
    Instance {
        /// The generic method definition
        element: Box<MethodReference>,
        /// One argument per generic method parameter
        arguments: Vec<TypeReference>,
    },
    /// A runtime generated method
    Dynamic(DynamicMethodRef),
}

impl MethodReference {
    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            MethodReference::Member(member) => &member.name,
            MethodReference::Instance { element, .. } => element.name(),
            MethodReference::Dynamic(dynamic) => &dynamic.name,
        }
    }

    /// The underlying declared method, unwrapping instantiations.
    #[must_use]
    pub fn member(&self) -> Option<&MethodMember> {
        match self {
            MethodReference::Member(member) => Some(member),
            MethodReference::Instance { element, .. } => element.member(),
            MethodReference::Dynamic(_) => None,
        }
    }

    /// Declaring type of the underlying declared method.
    #[must_use]
    pub fn declaring_type(&self) -> Option<&TypeReference> {
        self.member().map(|member| &member.declaring_type)
    }
}

impl fmt::Display for MethodReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodReference::Member(member) => {
                write!(
                    f,
                    "{} {}::{}",
                    member.return_type, member.declaring_type, member.name
                )?;
                if !member.generic_parameters.is_empty() {
                    write!(f, "<{}>", member.generic_parameters.join(","))?;
                }
                write!(f, "(")?;
                write_list(f, &member.parameters)?;
                write!(f, ")")
            }
            MethodReference::Instance { element, arguments } => {
                write!(f, "{element}<")?;
                write_list(f, arguments)?;
                write!(f, ">")
            }
            MethodReference::Dynamic(dynamic) => {
                write!(f, "dynamic {}#{}", dynamic.name, dynamic.id)
            }
        }
    }
}

/// Reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    /// Field name
    pub name: String,
    /// Declaring type
    pub declaring_type: TypeReference,
    /// Field type in terms of the declaring type's generic definition
    pub field_type: TypeReference,
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}::{}",
            self.field_type, self.declaring_type, self.name
        )
    }
}

/// Reference to a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyReference {
    /// Property name
    pub name: String,
    /// Declaring type
    pub declaring_type: TypeReference,
    /// Property type
    pub property_type: TypeReference,
    /// Indexer parameter types
    pub parameters: Vec<TypeReference>,
}

impl fmt::Display for PropertyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}::{}",
            self.property_type, self.declaring_type, self.name
        )
    }
}

/// Reference to an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventReference {
    /// Event name
    pub name: String,
    /// Declaring type
    pub declaring_type: TypeReference,
    /// Delegate type of the event
    pub event_type: TypeReference,
}

impl fmt::Display for EventReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.event_type, self.declaring_type, self.name)
    }
}

/// An owned reference to any member, the operand of `ldtoken`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberReference {
    /// Type
    Type(TypeReference),
    /// Method
    Method(MethodReference),
    /// Field
    Field(FieldReference),
    /// Property
    Property(PropertyReference),
    /// Event
    Event(EventReference),
}

impl MemberReference {
    /// Borrow as a [`DocumentMember`].
    #[must_use]
    pub fn as_member(&self) -> DocumentMember<'_> {
        match self {
            MemberReference::Type(ty) => DocumentMember::Type(ty),
            MemberReference::Method(method) => DocumentMember::Method(method),
            MemberReference::Field(field) => DocumentMember::Field(field),
            MemberReference::Property(property) => DocumentMember::Property(property),
            MemberReference::Event(event) => DocumentMember::Event(event),
        }
    }
}

impl fmt::Display for MemberReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_member())
    }
}

/// A borrowed document-side reference of any kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocumentMember<'a> {
    /// Type
    Type(&'a TypeReference),
    /// Method
    Method(&'a MethodReference),
    /// Field
    Field(&'a FieldReference),
    /// Property
    Property(&'a PropertyReference),
    /// Event
    Event(&'a EventReference),
}

impl fmt::Display for DocumentMember<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentMember::Type(ty) => write!(f, "{ty}"),
            DocumentMember::Method(method) => write!(f, "{method}"),
            DocumentMember::Field(field) => write!(f, "{field}"),
            DocumentMember::Property(property) => write!(f, "{property}"),
            DocumentMember::Event(event) => write!(f, "{event}"),
        }
    }
}

impl<'a> From<&'a TypeReference> for DocumentMember<'a> {
    fn from(value: &'a TypeReference) -> Self {
        DocumentMember::Type(value)
    }
}

impl<'a> From<&'a MethodReference> for DocumentMember<'a> {
    fn from(value: &'a MethodReference) -> Self {
        DocumentMember::Method(value)
    }
}

impl<'a> From<&'a FieldReference> for DocumentMember<'a> {
    fn from(value: &'a FieldReference) -> Self {
        DocumentMember::Field(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corlib() -> ResolutionScope {
        ResolutionScope::Assembly(AssemblyNameReference::new("System.Private.CoreLib"))
    }

    #[test]
    fn display_composites() {
        let list = TypeReference::Named(Box::new(NamedType {
            scope: corlib(),
            namespace: "System.Collections.Generic".into(),
            name: "List`1".into(),
            declaring_type: None,
            is_value_type: false,
            generic_parameters: vec!["T".into()],
        }));
        let instance = TypeReference::GenericInstance {
            element: Box::new(list.clone()),
            arguments: vec![TypeReference::Primitive(PrimitiveKind::I4)],
        };

        assert_eq!(
            instance.to_string(),
            "System.Collections.Generic.List`1<System.Int32>"
        );
        assert_eq!(
            TypeReference::by_ref(TypeReference::sz_array(instance.clone())).to_string(),
            "System.Collections.Generic.List`1<System.Int32>[]&"
        );
        assert_eq!(
            TypeReference::Array(
                Box::new(TypeReference::Primitive(PrimitiveKind::R8)),
                ArrayShape::Rank {
                    rank: 3,
                    sizes: vec![],
                    lower_bounds: vec![]
                }
            )
            .to_string(),
            "System.Double[,,]"
        );
        assert_eq!(instance.generic_parameter_names(), &["T".to_string()]);
        assert!(!instance.contains_generic_parameter());
    }

    #[test]
    fn nested_names_and_module_type() {
        let outer = TypeReference::named(corlib(), "Ns", "Outer");
        let inner = NamedType {
            scope: corlib(),
            namespace: String::new(),
            name: "Inner".into(),
            declaring_type: Some(Box::new(outer)),
            is_value_type: true,
            generic_parameters: Vec::new(),
        };
        assert_eq!(inner.full_name(), "Ns.Outer/Inner");
        assert!(!inner.is_module_type());

        let module = TypeReference::named(ResolutionScope::Module("a.dll".into()), "", "<Module>");
        assert!(module.as_named().is_some_and(NamedType::is_module_type));
    }

    #[test]
    fn generic_parameter_display() {
        let named = TypeReference::generic_parameter(GenericParameterKind::Type, 0, "T");
        let anonymous = TypeReference::generic_parameter(GenericParameterKind::Method, 2, "");
        assert_eq!(named.to_string(), "T");
        assert_eq!(anonymous.to_string(), "!!2");
        assert!(anonymous.contains_generic_parameter());
        assert!(TypeReference::by_ref(named).contains_generic_parameter());
    }
}
