use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock, Weak,
    },
};

use crate::{
    live::{substitute, Declaring, LiveModule, LiveModuleRc, LiveTypeRc},
    metadata::{
        flags::{ExceptionHandlerFlags, MethodAttributes, MethodImplAttributes, ParamAttributes},
        signatures::CallingConvention,
        token::Token,
    },
    Result,
};

/// Shared handle to a [`LiveMethod`]
pub type LiveMethodRc = Arc<LiveMethod>;

static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(1);

/// A parameter of a live method.
#[derive(Debug, Clone)]
pub struct LiveParameter {
    /// Declared name
    pub name: String,
    /// Parameter type
    pub ty: LiveTypeRc,
    /// Parameter attributes
    pub attributes: ParamAttributes,
}

impl LiveParameter {
    /// A parameter without attributes.
    pub fn new(name: impl Into<String>, ty: LiveTypeRc) -> Self {
        LiveParameter {
            name: name.into(),
            ty,
            attributes: ParamAttributes::empty(),
        }
    }
}

/// Signature of a live method as reflection reports it.
#[derive(Debug, Clone)]
pub struct LiveMethodSignature {
    /// Calling convention kind
    pub convention: CallingConvention,
    /// `this` is passed explicitly as the first parameter
    pub explicit_this: bool,
    /// Return type
    pub return_type: LiveTypeRc,
    /// Declared parameters, not including `this`
    pub params: Vec<LiveParameter>,
}

impl LiveMethodSignature {
    /// A default convention signature.
    #[must_use]
    pub fn new(return_type: LiveTypeRc, params: Vec<LiveParameter>) -> Self {
        LiveMethodSignature {
            convention: CallingConvention::Default,
            explicit_this: false,
            return_type,
            params,
        }
    }

    fn substituted(&self, type_args: &[LiveTypeRc], method_args: &[LiveTypeRc]) -> Self {
        let params = self
            .params
            .iter()
            .map(|param| LiveParameter {
                name: param.name.clone(),
                ty: substitute(&param.ty, type_args, method_args),
                attributes: param.attributes,
            })
            .collect();

        LiveMethodSignature {
            convention: self.convention,
            explicit_this: self.explicit_this,
            return_type: substitute(&self.return_type, type_args, method_args),
            params,
        }
    }
}

/// A local variable slot of a live method body.
#[derive(Debug, Clone)]
pub struct LiveLocal {
    /// Variable type
    pub ty: LiveTypeRc,
    /// Pinned for the lifetime of the frame
    pub pinned: bool,
}

/// A flat exception handling clause, offsets in bytes.
#[derive(Debug, Clone)]
pub struct LiveExceptionClause {
    /// Handler kind
    pub flags: ExceptionHandlerFlags,
    /// Start of the protected block
    pub try_offset: u32,
    /// Length of the protected block
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Caught type for typed catch clauses
    pub catch_type: Option<LiveTypeRc>,
    /// Start of the filter block for filter clauses
    pub filter_offset: u32,
}

/// The body the runtime exposes for a method.
#[derive(Debug, Clone, Default)]
pub struct LiveMethodBody {
    /// Raw instruction stream
    pub il: Vec<u8>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero initialize locals
    pub init_locals: bool,
    /// Local variables
    pub locals: Vec<LiveLocal>,
    /// Exception clauses in declaration order
    pub clauses: Vec<LiveExceptionClause>,
}

/// A method as the running execution engine exposes it.
pub struct LiveMethod {
    id: u64,
    /// Metadata token, shared by a definition and all its instantiations
    pub token: Token,
    /// Method name
    pub name: String,
    /// Method attributes
    pub attributes: MethodAttributes,
    /// Implementation attributes
    pub impl_attributes: MethodImplAttributes,
    /// Generated at runtime, without a metadata identity
    pub is_dynamic: bool,
    declaring: Declaring,
    module: Weak<LiveModule>,
    signature: OnceLock<LiveMethodSignature>,
    pub(crate) generic_parameters: boxcar::Vec<LiveTypeRc>,
    instantiation: Option<(LiveMethodRc, Vec<LiveTypeRc>)>,
    body: OnceLock<Arc<LiveMethodBody>>,
}

impl LiveMethod {
    pub(crate) fn new(
        token: Token,
        name: String,
        attributes: MethodAttributes,
        declaring: Declaring,
        module: Weak<LiveModule>,
        is_dynamic: bool,
    ) -> LiveMethod {
        LiveMethod {
            id: NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed),
            token,
            name,
            attributes,
            impl_attributes: MethodImplAttributes::empty(),
            is_dynamic,
            declaring,
            module,
            signature: OnceLock::new(),
            generic_parameters: boxcar::Vec::new(),
            instantiation: None,
            body: OnceLock::new(),
        }
    }

    fn derived(
        source: &LiveMethod,
        declaring: Declaring,
        signature: Option<LiveMethodSignature>,
        instantiation: Option<(LiveMethodRc, Vec<LiveTypeRc>)>,
    ) -> LiveMethod {
        let method = LiveMethod {
            id: NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed),
            token: source.token,
            name: source.name.clone(),
            attributes: source.attributes,
            impl_attributes: source.impl_attributes,
            is_dynamic: source.is_dynamic,
            declaring,
            module: source.module.clone(),
            signature: OnceLock::new(),
            generic_parameters: boxcar::Vec::new(),
            instantiation,
            body: OnceLock::new(),
        };
        for parameter in source.generic_parameters() {
            method.generic_parameters.push(parameter.clone());
        }
        if let Some(signature) = signature {
            let _ = method.signature.set(signature);
        }
        if let Some(body) = source.body.get() {
            let _ = method.body.set(body.clone());
        }
        method
    }

    /// Copy of `method` declared on the generic type instance `instance`.
    pub(crate) fn bind(
        method: &LiveMethodRc,
        instance: &LiveTypeRc,
        type_args: &[LiveTypeRc],
    ) -> LiveMethodRc {
        let signature = method
            .signature()
            .map(|signature| signature.substituted(type_args, &[]));
        Arc::new(LiveMethod::derived(
            method,
            Declaring::of(instance),
            signature,
            None,
        ))
    }

    /// Runtime identity, unique per live method object.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The defining module.
    #[must_use]
    pub fn module(&self) -> Option<LiveModuleRc> {
        self.module.upgrade()
    }

    /// The declaring type. Global and dynamic methods have none.
    #[must_use]
    pub fn declaring_type(&self) -> Option<LiveTypeRc> {
        self.declaring.get()
    }

    /// Record the signature. Only the first call has an effect.
    pub fn set_signature(&self, signature: LiveMethodSignature) {
        let _ = self.signature.set(signature);
    }

    /// The signature, if one was recorded.
    #[must_use]
    pub fn signature(&self) -> Option<&LiveMethodSignature> {
        self.signature.get()
    }

    /// Record the body. Only the first call has an effect.
    pub fn set_body(&self, body: LiveMethodBody) {
        let _ = self.body.set(Arc::new(body));
    }

    /// The body, if the runtime exposes one.
    #[must_use]
    pub fn body(&self) -> Option<Arc<LiveMethodBody>> {
        self.body.get().cloned()
    }

    /// Generic parameters declared by the method definition.
    pub fn generic_parameters(&self) -> impl Iterator<Item = &LiveTypeRc> {
        self.generic_parameters.iter().map(|(_, ty)| ty)
    }

    /// Number of declared generic parameters.
    #[must_use]
    pub fn generic_parameter_count(&self) -> usize {
        self.generic_parameters.count()
    }

    /// Whether the method declares generic parameters and is not instantiated.
    #[must_use]
    pub fn is_generic_definition(&self) -> bool {
        self.instantiation.is_none() && self.generic_parameter_count() > 0
    }

    /// Whether this is an instantiated generic method.
    #[must_use]
    pub fn is_generic_instance(&self) -> bool {
        self.instantiation.is_some()
    }

    /// The generic method definition behind an instantiation.
    #[must_use]
    pub fn generic_definition(&self) -> Option<&LiveMethodRc> {
        self.instantiation.as_ref().map(|(definition, _)| definition)
    }

    /// Method generic arguments of an instantiation.
    #[must_use]
    pub fn generic_arguments(&self) -> &[LiveTypeRc] {
        self.instantiation
            .as_ref()
            .map_or(&[], |(_, arguments)| arguments.as_slice())
    }

    /// Whether the method takes an implicit `this`.
    #[must_use]
    pub fn has_this(&self) -> bool {
        !self.attributes.contains(MethodAttributes::STATIC)
    }

    /// Whether the method is a constructor or type initializer.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.attributes.contains(MethodAttributes::RT_SPECIAL_NAME)
            && (self.name == ".ctor" || self.name == ".cctor")
    }

    /// Close a generic method definition over `arguments`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the method is not a generic definition or the
    /// argument count does not match its arity.
    pub fn make_generic_method(self: &Arc<Self>, arguments: Vec<LiveTypeRc>) -> Result<LiveMethodRc> {
        if !self.is_generic_definition() {
            return Err(malformed_error!("{} is not a generic method definition", self));
        }
        if arguments.len() != self.generic_parameter_count() {
            return Err(malformed_error!(
                "{} expects {} generic arguments, got {}",
                self,
                self.generic_parameter_count(),
                arguments.len()
            ));
        }

        let type_args = self
            .declaring_type()
            .map(|declaring| declaring.generic_arguments().to_vec())
            .unwrap_or_default();
        let signature = self
            .signature()
            .map(|signature| signature.substituted(&type_args, &arguments));

        Ok(Arc::new(LiveMethod::derived(
            self,
            self.declaring.clone(),
            signature,
            Some((self.clone(), arguments)),
        )))
    }
}

impl fmt::Display for LiveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.declaring_type() {
            Some(declaring) => write!(f, "{declaring}::{}", self.name)?,
            None => f.write_str(&self.name)?,
        }
        let arguments = self.generic_arguments();
        if !arguments.is_empty() {
            f.write_str("<")?;
            for (index, argument) in arguments.iter().enumerate() {
                if index > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{argument}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl fmt::Debug for LiveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveMethod")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("name", &self.to_string())
            .finish_non_exhaustive()
    }
}
