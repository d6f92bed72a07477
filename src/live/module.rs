use std::{
    path::PathBuf,
    sync::{Arc, Weak},
};

use dashmap::DashMap;

use crate::{
    live::{
        Declaring, GenericOwner, LiveAssembly, LiveAssemblyRc, LiveEvent, LiveEventRc, LiveField,
        LiveFieldRc, LiveMember, LiveMethod, LiveMethodRc, LiveProperty, LivePropertyRc, LiveType,
        LiveTypeRc, LiveTypeShape,
    },
    metadata::{
        flags::{FieldAttributes, MethodAttributes, MethodImplAttributes, TypeAttributes},
        token::{Token, TokenKind},
    },
    Error, Result,
};

/// Shared handle to a [`LiveModule`]
pub type LiveModuleRc = Arc<LiveModule>;

/// A loaded module and its token scope.
///
/// Every definition is created through the module so it receives a token in the right table.
/// Tokens of other tables (member references, type and method specifications) are mapped to the
/// live entity they resolve to with [`LiveModule::register_token`].
pub struct LiveModule {
    /// Module file name, e.g. `Calculator.dll`
    pub name: String,
    assembly: Weak<LiveAssembly>,
    this: Weak<LiveModule>,
    types: boxcar::Vec<LiveTypeRc>,
    tokens: DashMap<Token, LiveMember>,
    strings: DashMap<Token, String>,
    signatures: DashMap<Token, Arc<[u8]>>,
    rows: DashMap<TokenKind, u32>,
}

impl LiveModule {
    pub(crate) fn new(name: String, assembly: &LiveAssemblyRc) -> LiveModuleRc {
        let module = Arc::new_cyclic(|this| LiveModule {
            name,
            assembly: Arc::downgrade(assembly),
            this: this.clone(),
            types: boxcar::Vec::new(),
            tokens: DashMap::new(),
            strings: DashMap::new(),
            signatures: DashMap::new(),
            rows: DashMap::new(),
        });
        module.define_type("", "<Module>", TypeAttributes::empty());
        module
    }

    fn next_token(&self, kind: TokenKind) -> Token {
        let mut row = self.rows.entry(kind).or_insert(0);
        *row += 1;
        Token::from_parts(kind, *row)
    }

    /// The owning assembly.
    #[must_use]
    pub fn assembly(&self) -> Option<LiveAssemblyRc> {
        self.assembly.upgrade()
    }

    /// On-disk location of the owning assembly, `None` for in-memory assemblies.
    #[must_use]
    pub fn location(&self) -> Option<PathBuf> {
        self.assembly()?.location.clone()
    }

    /// The `<Module>` type holding global members.
    #[must_use]
    pub fn module_type(&self) -> Option<LiveTypeRc> {
        self.types().find(|ty| ty.is_module_type()).cloned()
    }

    /// Type definitions, including nested ones, in definition order.
    pub fn types(&self) -> impl Iterator<Item = &LiveTypeRc> {
        self.types.iter().map(|(_, ty)| ty)
    }

    /// Find a top-level type by namespace and name.
    #[must_use]
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<LiveTypeRc> {
        self.types()
            .find(|ty| {
                ty.declaring_type().is_none() && ty.namespace == namespace && ty.name == name
            })
            .cloned()
    }

    /// Define a top-level type.
    pub fn define_type(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        flags: TypeAttributes,
    ) -> LiveTypeRc {
        self.add_type(namespace.into(), name.into(), flags, None)
    }

    /// Define a type nested in `declaring`.
    pub fn define_nested_type(
        &self,
        declaring: &LiveTypeRc,
        name: impl Into<String>,
        flags: TypeAttributes,
    ) -> LiveTypeRc {
        let nested = self.add_type(
            String::new(),
            name.into(),
            flags,
            Some(Arc::downgrade(declaring)),
        );
        declaring.nested_types.push(nested.clone());
        nested
    }

    fn add_type(
        &self,
        namespace: String,
        name: String,
        flags: TypeAttributes,
        declaring: Option<Weak<LiveType>>,
    ) -> LiveTypeRc {
        let token = self.next_token(TokenKind::TypeDef);
        let ty = Arc::new(LiveType::new(
            token,
            namespace,
            name,
            flags,
            LiveTypeShape::Definition,
            self.this.clone(),
            declaring,
        ));
        self.types.push(ty.clone());
        self.tokens.insert(token, LiveMember::Type(ty.clone()));
        ty
    }

    /// Declare the next generic parameter of a type definition.
    pub fn define_type_generic_parameter(
        &self,
        owner: &LiveTypeRc,
        name: impl Into<String>,
    ) -> LiveTypeRc {
        let position = owner.generic_parameter_count();
        let parameter = self.generic_parameter(
            name.into(),
            position,
            GenericOwner::Type(Arc::downgrade(owner)),
        );
        owner.generic_parameters.push(parameter.clone());
        parameter
    }

    /// Declare the next generic parameter of a method definition.
    pub fn define_method_generic_parameter(
        &self,
        owner: &LiveMethodRc,
        name: impl Into<String>,
    ) -> LiveTypeRc {
        let position = owner.generic_parameter_count();
        let parameter = self.generic_parameter(
            name.into(),
            position,
            GenericOwner::Method(Arc::downgrade(owner)),
        );
        owner.generic_parameters.push(parameter.clone());
        parameter
    }

    #[allow(clippy::cast_possible_truncation)]
    fn generic_parameter(&self, name: String, position: usize, owner: GenericOwner) -> LiveTypeRc {
        let token = self.next_token(TokenKind::GenericParam);
        Arc::new(LiveType::new(
            token,
            String::new(),
            name,
            TypeAttributes::empty(),
            LiveTypeShape::GenericParameter {
                position: position as u32,
                owner,
            },
            self.this.clone(),
            None,
        ))
    }

    /// Define a method on `declaring`. The signature and body are attached afterwards.
    pub fn define_method(
        &self,
        declaring: &LiveTypeRc,
        name: impl Into<String>,
        attributes: MethodAttributes,
    ) -> LiveMethodRc {
        self.define_method_with_impl(declaring, name, attributes, MethodImplAttributes::empty())
    }

    /// Define a method with implementation attributes, e.g. an internal call.
    pub fn define_method_with_impl(
        &self,
        declaring: &LiveTypeRc,
        name: impl Into<String>,
        attributes: MethodAttributes,
        impl_attributes: MethodImplAttributes,
    ) -> LiveMethodRc {
        let token = self.next_token(TokenKind::MethodDef);
        let mut method = LiveMethod::new(
            token,
            name.into(),
            attributes,
            Declaring::of(declaring),
            self.this.clone(),
            false,
        );
        method.impl_attributes = impl_attributes;
        let method = Arc::new(method);
        declaring.methods.push(method.clone());
        self.tokens.insert(token, LiveMember::Method(method.clone()));
        method
    }

    /// Define a field on `declaring`.
    pub fn define_field(
        &self,
        declaring: &LiveTypeRc,
        name: impl Into<String>,
        field_type: LiveTypeRc,
        attributes: FieldAttributes,
    ) -> LiveFieldRc {
        let token = self.next_token(TokenKind::Field);
        let field = Arc::new(LiveField::new(
            token,
            name.into(),
            field_type,
            attributes,
            Declaring::of(declaring),
        ));
        declaring.fields.push(field.clone());
        self.tokens.insert(token, LiveMember::Field(field.clone()));
        field
    }

    /// Define a property on `declaring`.
    pub fn define_property(
        &self,
        declaring: &LiveTypeRc,
        name: impl Into<String>,
        property_type: LiveTypeRc,
        parameters: Vec<LiveTypeRc>,
    ) -> LivePropertyRc {
        let token = self.next_token(TokenKind::Property);
        let property = Arc::new(LiveProperty::new(
            token,
            name.into(),
            property_type,
            parameters,
            Declaring::of(declaring),
        ));
        declaring.properties.push(property.clone());
        self.tokens
            .insert(token, LiveMember::Property(property.clone()));
        property
    }

    /// Define an event on `declaring`.
    pub fn define_event(
        &self,
        declaring: &LiveTypeRc,
        name: impl Into<String>,
        event_type: LiveTypeRc,
    ) -> LiveEventRc {
        let token = self.next_token(TokenKind::Event);
        let event = Arc::new(LiveEvent::new(
            token,
            name.into(),
            event_type,
            Declaring::of(declaring),
        ));
        declaring.events.push(event.clone());
        self.tokens.insert(token, LiveMember::Event(event.clone()));
        event
    }

    /// Allocate a token of `kind` that resolves to `member`.
    ///
    /// Used for member references into other modules and for type and method specifications.
    pub fn register_token(&self, kind: TokenKind, member: LiveMember) -> Token {
        let token = self.next_token(kind);
        self.tokens.insert(token, member);
        token
    }

    /// Add a user string and return its token.
    pub fn define_string(&self, value: impl Into<String>) -> Token {
        let token = self.next_token(TokenKind::UserString);
        self.strings.insert(token, value.into());
        token
    }

    /// Add a stand-alone signature blob and return its token.
    pub fn define_signature(&self, blob: &[u8]) -> Token {
        let token = self.next_token(TokenKind::StandAloneSig);
        self.signatures.insert(token, Arc::from(blob));
        token
    }

    /// Resolve any member token.
    ///
    /// # Errors
    /// Returns [`Error::MemberMissing`] if the token is unknown to the module.
    pub fn resolve_member(&self, token: Token) -> Result<LiveMember> {
        self.tokens
            .get(&token)
            .map(|entry| entry.value().clone())
            .ok_or(Error::MemberMissing(token))
    }

    /// Resolve a TypeDef, TypeRef or TypeSpec token.
    ///
    /// # Errors
    /// Returns [`Error::MemberMissing`] for unknown tokens and [`Error::Malformed`] if the token
    /// denotes something other than a type.
    pub fn resolve_type(&self, token: Token) -> Result<LiveTypeRc> {
        match self.resolve_member(token)? {
            LiveMember::Type(ty) => Ok(ty),
            other => Err(malformed_error!(
                "Token {} resolves to a {}, expected a type",
                token,
                other.kind_name()
            )),
        }
    }

    /// Resolve a MethodDef, MemberRef or MethodSpec token.
    ///
    /// # Errors
    /// Returns [`Error::MemberMissing`] for unknown tokens and [`Error::Malformed`] if the token
    /// denotes something other than a method.
    pub fn resolve_method(&self, token: Token) -> Result<LiveMethodRc> {
        match self.resolve_member(token)? {
            LiveMember::Method(method) => Ok(method),
            other => Err(malformed_error!(
                "Token {} resolves to a {}, expected a method",
                token,
                other.kind_name()
            )),
        }
    }

    /// Resolve a Field or MemberRef token.
    ///
    /// # Errors
    /// Returns [`Error::MemberMissing`] for unknown tokens and [`Error::Malformed`] if the token
    /// denotes something other than a field.
    pub fn resolve_field(&self, token: Token) -> Result<LiveFieldRc> {
        match self.resolve_member(token)? {
            LiveMember::Field(field) => Ok(field),
            other => Err(malformed_error!(
                "Token {} resolves to a {}, expected a field",
                token,
                other.kind_name()
            )),
        }
    }

    /// Resolve a user string token.
    ///
    /// # Errors
    /// Returns [`Error::MemberMissing`] if the string is unknown.
    pub fn resolve_string(&self, token: Token) -> Result<String> {
        self.strings
            .get(&token)
            .map(|entry| entry.value().clone())
            .ok_or(Error::MemberMissing(token))
    }

    /// Resolve a stand-alone signature token to its blob.
    ///
    /// # Errors
    /// Returns [`Error::MemberMissing`] if the signature is unknown.
    pub fn resolve_signature(&self, token: Token) -> Result<Arc<[u8]>> {
        self.signatures
            .get(&token)
            .map(|entry| entry.value().clone())
            .ok_or(Error::MemberMissing(token))
    }
}

impl std::fmt::Debug for LiveModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveModule")
            .field("name", &self.name)
            .field("types", &self.types.count())
            .finish_non_exhaustive()
    }
}
