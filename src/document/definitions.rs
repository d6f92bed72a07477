use crate::{
    document::{
        body::MethodBody, GenericParameterKind, MethodReference, TypeReference,
    },
    metadata::flags::{
        FieldAttributes, GenericParamAttributes, MethodAttributes, MethodImplAttributes,
        ParamAttributes, TypeAttributes,
    },
};

/// A generic parameter declared by a type or method definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericParameter {
    /// Declared name
    pub name: String,
    /// Zero based position
    pub position: u32,
    /// Owner kind
    pub kind: GenericParameterKind,
    /// Variance and special constraints
    pub attributes: GenericParamAttributes,
    /// Type constraints
    pub constraints: Vec<TypeReference>,
}

/// A parameter of a [`MethodDefinition`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefinition {
    /// Parameter name
    pub name: String,
    /// 1-based sequence number
    pub sequence: u16,
    /// Parameter attributes
    pub attributes: ParamAttributes,
    /// Parameter type
    pub parameter_type: TypeReference,
    /// Attributes applied to the parameter
    pub custom_attributes: Vec<CustomAttribute>,
}

impl ParameterDefinition {
    /// A parameter without attributes.
    pub fn new(name: impl Into<String>, sequence: u16, parameter_type: TypeReference) -> Self {
        ParameterDefinition {
            name: name.into(),
            sequence,
            attributes: ParamAttributes::empty(),
            parameter_type,
            custom_attributes: Vec::new(),
        }
    }
}

/// A constant stored in a custom attribute blob.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// `null` string, type or array
    Null,
    /// `bool`
    Boolean(bool),
    /// `char`
    Char(u16),
    /// Any signed integer or enum value
    Int(i64),
    /// Any unsigned integer
    UInt(u64),
    /// `float32` or `float64`
    Float(f64),
    /// `string`
    String(String),
    /// `System.Type`, stored as its serialized name
    Type(String),
    /// Array of values
    Array(Vec<AttributeArgument>),
}

/// A typed custom attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeArgument {
    /// Declared argument type
    pub argument_type: TypeReference,
    /// Stored value
    pub value: AttributeValue,
}

/// A named field or property argument.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArgument {
    /// Field or property name
    pub name: String,
    /// Typed value
    pub argument: AttributeArgument,
}

/// A custom attribute applied to a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    /// Attribute constructor
    pub constructor: MethodReference,
    /// Positional constructor arguments
    pub arguments: Vec<AttributeArgument>,
    /// Named field arguments
    pub fields: Vec<NamedArgument>,
    /// Named property arguments
    pub properties: Vec<NamedArgument>,
}

/// A method defined in a [`crate::document::DocumentModule`].
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
    /// Method name
    pub name: String,
    /// Method attributes
    pub attributes: MethodAttributes,
    /// Implementation attributes
    pub impl_attributes: MethodImplAttributes,
    /// Return type
    pub return_type: TypeReference,
    /// Parameters in declaration order
    pub parameters: Vec<ParameterDefinition>,
    /// Generic parameters
    pub generic_parameters: Vec<GenericParameter>,
    /// Method body
    pub body: MethodBody,
    /// Attributes applied to the method
    pub custom_attributes: Vec<CustomAttribute>,
}

impl MethodDefinition {
    /// An empty method shell.
    pub fn new(
        name: impl Into<String>,
        attributes: MethodAttributes,
        return_type: TypeReference,
    ) -> Self {
        MethodDefinition {
            name: name.into(),
            attributes,
            impl_attributes: MethodImplAttributes::empty(),
            return_type,
            parameters: Vec::new(),
            generic_parameters: Vec::new(),
            body: MethodBody::default(),
            custom_attributes: Vec::new(),
        }
    }

    /// Whether the method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }
}

/// A field defined in a [`crate::document::DocumentModule`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// Field attributes
    pub attributes: FieldAttributes,
    /// Field type
    pub field_type: TypeReference,
}

/// A type defined in a [`crate::document::DocumentModule`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    /// Namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Type attributes
    pub attributes: TypeAttributes,
    /// Base type, `None` for interfaces and `<Module>`
    pub base_type: Option<TypeReference>,
    /// Generic parameters
    pub generic_parameters: Vec<GenericParameter>,
    /// Fields
    pub fields: Vec<FieldDefinition>,
    /// Methods
    pub methods: Vec<MethodDefinition>,
    /// Attributes applied to the type
    pub custom_attributes: Vec<CustomAttribute>,
}

impl TypeDefinition {
    /// An empty type.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        attributes: TypeAttributes,
    ) -> Self {
        TypeDefinition {
            namespace: namespace.into(),
            name: name.into(),
            attributes,
            base_type: None,
            generic_parameters: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Namespace-qualified name.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}
