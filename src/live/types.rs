use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    live::{
        LiveEvent, LiveEventRc, LiveField, LiveFieldRc, LiveMethod, LiveMethodRc, LiveModule,
        LiveModuleRc, LiveProperty, LivePropertyRc,
    },
    metadata::{flags::TypeAttributes, token::Token, typesystem::PrimitiveKind},
    Result,
};

/// Shared handle to a [`LiveType`]
pub type LiveTypeRc = Arc<LiveType>;

/// Token the runtime reports for constructed types
const CONSTRUCTED_TYPE_TOKEN: Token = Token(0x0200_0000);

/// The definition that declares a generic parameter.
#[derive(Debug, Clone)]
pub enum GenericOwner {
    /// Declared by a type
    Type(Weak<LiveType>),
    /// Declared by a method
    Method(Weak<LiveMethod>),
}

impl GenericOwner {
    /// Same owning definition.
    #[must_use]
    pub fn is_same(&self, other: &GenericOwner) -> bool {
        match (self, other) {
            (GenericOwner::Type(a), GenericOwner::Type(b)) => a.ptr_eq(b),
            (GenericOwner::Method(a), GenericOwner::Method(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Link from a member to its declaring type.
///
/// Members bound on a generic instance keep the definition and arguments so the instance can be
/// rebuilt after the caller dropped it.
#[derive(Debug, Clone)]
pub(crate) enum Declaring {
    None,
    Definition(Weak<LiveType>),
    Instance {
        instance: Weak<LiveType>,
        definition: LiveTypeRc,
        arguments: Vec<LiveTypeRc>,
    },
}

impl Declaring {
    pub(crate) fn of(ty: &LiveTypeRc) -> Declaring {
        match &ty.shape {
            LiveTypeShape::GenericInstance {
                definition,
                arguments,
            } => Declaring::Instance {
                instance: Arc::downgrade(ty),
                definition: definition.clone(),
                arguments: arguments.clone(),
            },
            _ => Declaring::Definition(Arc::downgrade(ty)),
        }
    }

    pub(crate) fn get(&self) -> Option<LiveTypeRc> {
        match self {
            Declaring::None => None,
            Declaring::Definition(ty) => ty.upgrade(),
            Declaring::Instance {
                instance,
                definition,
                arguments,
            } => instance
                .upgrade()
                .or_else(|| Some(LiveType::instantiate(definition, arguments.clone()))),
        }
    }
}

/// What kind of type a [`LiveType`] is.
#[derive(Debug, Clone)]
pub enum LiveTypeShape {
    /// A type defined in metadata, possibly a generic definition
    Definition,
    /// `T[]`
    SzArray(LiveTypeRc),
    /// Multi-dimensional array
    Array {
        /// Element type
        element: LiveTypeRc,
        /// Number of dimensions
        rank: u32,
    },
    /// `T*`
    Pointer(LiveTypeRc),
    /// `T&`
    ByRef(LiveTypeRc),
    /// A generic definition closed over arguments
    GenericInstance {
        /// The generic type definition
        definition: LiveTypeRc,
        /// One argument per generic parameter
        arguments: Vec<LiveTypeRc>,
    },
    /// A generic parameter of a type or method
    GenericParameter {
        /// Zero based position
        position: u32,
        /// Declaring definition
        owner: GenericOwner,
    },
}

/// A type as the running execution engine exposes it.
///
/// Definitions are identified by pointer, constructed types (arrays, pointers, by-refs and
/// generic instances) structurally, see [`LiveType::is_same`].
pub struct LiveType {
    /// Metadata token. Generic instances report the token of their definition.
    pub token: Token,
    /// Namespace, empty for nested and constructed types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Type attributes
    pub flags: TypeAttributes,
    /// Definition or constructed shape
    pub shape: LiveTypeShape,
    module: Weak<LiveModule>,
    declaring_type: Option<Weak<LiveType>>,
    base_type: OnceLock<LiveTypeRc>,
    this: Weak<LiveType>,
    bound: OnceLock<()>,
    pub(crate) generic_parameters: boxcar::Vec<LiveTypeRc>,
    pub(crate) fields: boxcar::Vec<LiveFieldRc>,
    pub(crate) methods: boxcar::Vec<LiveMethodRc>,
    pub(crate) properties: boxcar::Vec<LivePropertyRc>,
    pub(crate) events: boxcar::Vec<LiveEventRc>,
    pub(crate) nested_types: boxcar::Vec<LiveTypeRc>,
}

impl LiveType {
    pub(crate) fn new(
        token: Token,
        namespace: String,
        name: String,
        flags: TypeAttributes,
        shape: LiveTypeShape,
        module: Weak<LiveModule>,
        declaring_type: Option<Weak<LiveType>>,
    ) -> LiveType {
        LiveType {
            token,
            namespace,
            name,
            flags,
            shape,
            module,
            declaring_type,
            base_type: OnceLock::new(),
            this: Weak::new(),
            bound: OnceLock::new(),
            generic_parameters: boxcar::Vec::new(),
            fields: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            properties: boxcar::Vec::new(),
            events: boxcar::Vec::new(),
            nested_types: boxcar::Vec::new(),
        }
    }

    fn constructed(&self, name: String, shape: LiveTypeShape) -> LiveTypeRc {
        Arc::new(LiveType::new(
            CONSTRUCTED_TYPE_TOKEN,
            self.namespace.clone(),
            name,
            TypeAttributes::empty(),
            shape,
            self.module.clone(),
            None,
        ))
    }

    /// The defining module.
    #[must_use]
    pub fn module(&self) -> Option<LiveModuleRc> {
        self.module.upgrade()
    }

    /// Enclosing type of a nested type.
    #[must_use]
    pub fn declaring_type(&self) -> Option<LiveTypeRc> {
        self.declaring_type.as_ref().and_then(Weak::upgrade)
    }

    /// Base type, if one was recorded.
    #[must_use]
    pub fn base_type(&self) -> Option<LiveTypeRc> {
        self.base_type.get().cloned()
    }

    /// Record the base type. Only the first call has an effect.
    pub fn set_base_type(&self, base: LiveTypeRc) {
        let _ = self.base_type.set(base);
    }

    /// Generic parameters declared by this definition.
    pub fn generic_parameters(&self) -> impl Iterator<Item = &LiveTypeRc> {
        self.generic_parameters.iter().map(|(_, ty)| ty)
    }

    /// Number of declared generic parameters.
    #[must_use]
    pub fn generic_parameter_count(&self) -> usize {
        self.generic_parameters.count()
    }

    /// Declared or bound fields.
    pub fn fields(&self) -> impl Iterator<Item = &LiveFieldRc> {
        self.ensure_bound();
        self.fields.iter().map(|(_, field)| field)
    }

    /// Declared or bound methods.
    pub fn methods(&self) -> impl Iterator<Item = &LiveMethodRc> {
        self.ensure_bound();
        self.methods.iter().map(|(_, method)| method)
    }

    /// Declared or bound properties.
    pub fn properties(&self) -> impl Iterator<Item = &LivePropertyRc> {
        self.ensure_bound();
        self.properties.iter().map(|(_, property)| property)
    }

    /// Declared or bound events.
    pub fn events(&self) -> impl Iterator<Item = &LiveEventRc> {
        self.ensure_bound();
        self.events.iter().map(|(_, event)| event)
    }

    /// Nested type definitions.
    pub fn nested_types(&self) -> impl Iterator<Item = &LiveTypeRc> {
        self.nested_types.iter().map(|(_, ty)| ty)
    }

    /// Find a method by metadata token.
    #[must_use]
    pub fn method_by_token(&self, token: Token) -> Option<LiveMethodRc> {
        self.methods().find(|method| method.token == token).cloned()
    }

    /// Find a field by metadata token.
    #[must_use]
    pub fn field_by_token(&self, token: Token) -> Option<LiveFieldRc> {
        self.fields().find(|field| field.token == token).cloned()
    }

    /// Whether this is a type defined in metadata.
    #[must_use]
    pub fn is_definition(&self) -> bool {
        matches!(self.shape, LiveTypeShape::Definition)
    }

    /// Whether this is a generic definition with at least one parameter.
    #[must_use]
    pub fn is_generic_definition(&self) -> bool {
        self.is_definition() && self.generic_parameter_count() > 0
    }

    /// Whether this is a closed or partially closed generic instance.
    #[must_use]
    pub fn is_generic_instance(&self) -> bool {
        matches!(self.shape, LiveTypeShape::GenericInstance { .. })
    }

    /// Whether this type is a generic parameter.
    #[must_use]
    pub fn is_generic_parameter(&self) -> bool {
        matches!(self.shape, LiveTypeShape::GenericParameter { .. })
    }

    /// The definition behind a generic instance.
    #[must_use]
    pub fn generic_definition(&self) -> Option<&LiveTypeRc> {
        match &self.shape {
            LiveTypeShape::GenericInstance { definition, .. } => Some(definition),
            _ => None,
        }
    }

    /// Arguments of a generic instance.
    #[must_use]
    pub fn generic_arguments(&self) -> &[LiveTypeRc] {
        match &self.shape {
            LiveTypeShape::GenericInstance { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// The pseudo type holding a module's global members.
    #[must_use]
    pub fn is_module_type(&self) -> bool {
        self.is_definition() && self.name == "<Module>" && self.namespace.is_empty()
    }

    /// Whether the type is a value type.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match &self.shape {
            LiveTypeShape::Definition => self.flags.contains(TypeAttributes::VALUE_TYPE),
            LiveTypeShape::GenericInstance { definition, .. } => definition.is_value_type(),
            _ => false,
        }
    }

    /// The primitive this type stands for, if it is one of the core library's built-in types.
    #[must_use]
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        if !self.is_definition() || self.declaring_type.is_some() {
            return None;
        }
        let assembly = self.module()?.assembly()?;
        if !assembly.is_core_library {
            return None;
        }
        PrimitiveKind::from_name(&self.namespace, &self.name)
    }

    /// Namespace-qualified name with `/` separating nested types.
    #[must_use]
    pub fn full_name(&self) -> String {
        if let Some(declaring) = self.declaring_type() {
            return format!("{}/{}", declaring.full_name(), self.name);
        }
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Structural identity: definitions by pointer, constructed types by shape and elements.
    #[must_use]
    pub fn is_same(a: &LiveTypeRc, b: &LiveTypeRc) -> bool {
        if Arc::ptr_eq(a, b) {
            return true;
        }

        match (&a.shape, &b.shape) {
            (LiveTypeShape::SzArray(x), LiveTypeShape::SzArray(y))
            | (LiveTypeShape::Pointer(x), LiveTypeShape::Pointer(y))
            | (LiveTypeShape::ByRef(x), LiveTypeShape::ByRef(y)) => LiveType::is_same(x, y),
            (
                LiveTypeShape::Array {
                    element: x,
                    rank: rank_x,
                },
                LiveTypeShape::Array {
                    element: y,
                    rank: rank_y,
                },
            ) => rank_x == rank_y && LiveType::is_same(x, y),
            (
                LiveTypeShape::GenericInstance {
                    definition: def_x,
                    arguments: args_x,
                },
                LiveTypeShape::GenericInstance {
                    definition: def_y,
                    arguments: args_y,
                },
            ) => {
                LiveType::is_same(def_x, def_y)
                    && args_x.len() == args_y.len()
                    && args_x
                        .iter()
                        .zip(args_y)
                        .all(|(x, y)| LiveType::is_same(x, y))
            }
            (
                LiveTypeShape::GenericParameter {
                    position: pos_x,
                    owner: owner_x,
                },
                LiveTypeShape::GenericParameter {
                    position: pos_y,
                    owner: owner_y,
                },
            ) => pos_x == pos_y && owner_x.is_same(owner_y),
            _ => false,
        }
    }

    /// `T[]`
    #[must_use]
    pub fn make_sz_array(self: &Arc<Self>) -> LiveTypeRc {
        self.constructed(
            format!("{}[]", self.name),
            LiveTypeShape::SzArray(self.clone()),
        )
    }

    /// Multi-dimensional array of the given rank.
    #[must_use]
    pub fn make_array(self: &Arc<Self>, rank: u32) -> LiveTypeRc {
        let commas = ",".repeat(rank.saturating_sub(1) as usize);
        let suffix = if rank == 1 { "*".to_string() } else { commas };
        self.constructed(
            format!("{}[{suffix}]", self.name),
            LiveTypeShape::Array {
                element: self.clone(),
                rank,
            },
        )
    }

    /// `T*`
    #[must_use]
    pub fn make_pointer(self: &Arc<Self>) -> LiveTypeRc {
        self.constructed(
            format!("{}*", self.name),
            LiveTypeShape::Pointer(self.clone()),
        )
    }

    /// `T&`
    #[must_use]
    pub fn make_by_ref(self: &Arc<Self>) -> LiveTypeRc {
        self.constructed(
            format!("{}&", self.name),
            LiveTypeShape::ByRef(self.clone()),
        )
    }

    /// Close a generic definition over `arguments`.
    ///
    /// The instance exposes bound copies of the definition's fields, methods, properties and
    /// events. Bound members keep the definition's tokens and have every type generic
    /// parameter substituted. They are created on first access.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if this is not a generic definition or the argument
    /// count does not match its arity.
    pub fn make_generic_type(self: &Arc<Self>, arguments: Vec<LiveTypeRc>) -> Result<LiveTypeRc> {
        if !self.is_generic_definition() {
            return Err(malformed_error!(
                "{} is not a generic type definition",
                self.full_name()
            ));
        }
        if arguments.len() != self.generic_parameter_count() {
            return Err(malformed_error!(
                "{} expects {} generic arguments, got {}",
                self.full_name(),
                self.generic_parameter_count(),
                arguments.len()
            ));
        }

        Ok(LiveType::instantiate(self, arguments))
    }

    pub(crate) fn instantiate(definition: &LiveTypeRc, arguments: Vec<LiveTypeRc>) -> LiveTypeRc {
        Arc::new_cyclic(|this| {
            let mut instance = LiveType::new(
                definition.token,
                definition.namespace.clone(),
                definition.name.clone(),
                definition.flags,
                LiveTypeShape::GenericInstance {
                    definition: definition.clone(),
                    arguments,
                },
                definition.module.clone(),
                definition.declaring_type.clone(),
            );
            instance.this = this.clone();
            instance
        })
    }

    fn ensure_bound(&self) {
        let LiveTypeShape::GenericInstance {
            definition,
            arguments,
        } = &self.shape
        else {
            return;
        };

        self.bound.get_or_init(|| {
            let Some(instance) = self.this.upgrade() else {
                return;
            };

            for field in definition.fields() {
                let field_type = substitute(&field.field_type, arguments, &[]);
                self.fields
                    .push(Arc::new(LiveField::bound(field, &instance, field_type)));
            }
            for method in definition.methods() {
                self.methods
                    .push(LiveMethod::bind(method, &instance, arguments));
            }
            for property in definition.properties() {
                let property_type = substitute(&property.property_type, arguments, &[]);
                self.properties.push(Arc::new(LiveProperty::bound(
                    property,
                    &instance,
                    property_type,
                )));
            }
            for event in definition.events() {
                let event_type = substitute(&event.event_type, arguments, &[]);
                self.events
                    .push(Arc::new(LiveEvent::bound(event, &instance, event_type)));
            }
        });
    }
}

/// Replace generic parameters in `ty` by the given arguments.
///
/// Type parameters are looked up by position in `type_arguments`, method parameters in
/// `method_arguments`. Parameters without a matching argument are kept. If nothing changes, the
/// original handle is returned so definition identity is preserved.
#[must_use]
pub fn substitute(
    ty: &LiveTypeRc,
    type_arguments: &[LiveTypeRc],
    method_arguments: &[LiveTypeRc],
) -> LiveTypeRc {
    let rebuilt = match &ty.shape {
        LiveTypeShape::Definition => None,
        LiveTypeShape::GenericParameter { position, owner } => {
            let arguments = match owner {
                GenericOwner::Type(_) => type_arguments,
                GenericOwner::Method(_) => method_arguments,
            };
            arguments.get(*position as usize).cloned()
        }
        LiveTypeShape::SzArray(element) => {
            let new = substitute(element, type_arguments, method_arguments);
            (!Arc::ptr_eq(&new, element)).then(|| new.make_sz_array())
        }
        LiveTypeShape::Array { element, rank } => {
            let new = substitute(element, type_arguments, method_arguments);
            (!Arc::ptr_eq(&new, element)).then(|| new.make_array(*rank))
        }
        LiveTypeShape::Pointer(element) => {
            let new = substitute(element, type_arguments, method_arguments);
            (!Arc::ptr_eq(&new, element)).then(|| new.make_pointer())
        }
        LiveTypeShape::ByRef(element) => {
            let new = substitute(element, type_arguments, method_arguments);
            (!Arc::ptr_eq(&new, element)).then(|| new.make_by_ref())
        }
        LiveTypeShape::GenericInstance {
            definition,
            arguments,
        } => {
            let new_arguments: Vec<LiveTypeRc> = arguments
                .iter()
                .map(|argument| substitute(argument, type_arguments, method_arguments))
                .collect();
            let changed = new_arguments
                .iter()
                .zip(arguments)
                .any(|(new, old)| !Arc::ptr_eq(new, old));
            changed.then(|| LiveType::instantiate(definition, new_arguments))
        }
    };

    rebuilt.unwrap_or_else(|| ty.clone())
}

impl fmt::Display for LiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            LiveTypeShape::GenericInstance {
                definition,
                arguments,
            } => {
                write!(f, "{definition}<")?;
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{argument}")?;
                }
                f.write_str(">")
            }
            LiveTypeShape::SzArray(element) => write!(f, "{element}[]"),
            LiveTypeShape::Array { element, rank } => {
                let commas = ",".repeat(rank.saturating_sub(1) as usize);
                write!(f, "{element}[{commas}]")
            }
            LiveTypeShape::Pointer(element) => write!(f, "{element}*"),
            LiveTypeShape::ByRef(element) => write!(f, "{element}&"),
            LiveTypeShape::GenericParameter { .. } => f.write_str(&self.name),
            LiveTypeShape::Definition => f.write_str(&self.full_name()),
        }
    }
}

impl fmt::Debug for LiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveType")
            .field("token", &self.token)
            .field("name", &self.to_string())
            .finish_non_exhaustive()
    }
}
