//! Generic-parameter binding contexts.
//!
//! Relinking and matching need to know what stands in for a generic parameter at a given point
//! of a reference graph. A [`GenericContext`] answers that question. Contexts are supplied per
//! call and never stored in references.

use std::fmt::Write as _;

use crate::document::{GenericParameterKind, GenericParameterRef, MethodReference, TypeReference};

/// Answers what stands in for a generic parameter.
pub trait GenericContext {
    /// The reference bound to `parameter`, `None` if this context does not know the parameter.
    fn resolve(&self, parameter: &GenericParameterRef) -> Option<TypeReference>;

    /// Description used in [`crate::Error::RelinkTargetNotFound`].
    fn describe(&self) -> String;
}

/// A context that binds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyContext;

impl GenericContext for EmptyContext {
    fn resolve(&self, _parameter: &GenericParameterRef) -> Option<TypeReference> {
        None
    }

    fn describe(&self) -> String {
        "empty context".to_string()
    }
}

/// Bindings for the generic parameters of one type and one method.
///
/// Parameters are looked up by name first and by position if the name is empty or unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericScope {
    types: Vec<(String, TypeReference)>,
    methods: Vec<(String, TypeReference)>,
}

impl GenericScope {
    /// An empty scope.
    #[must_use]
    pub fn new() -> Self {
        GenericScope::default()
    }

    /// A scope where every parameter stands for itself.
    #[must_use]
    pub fn open(type_parameters: &[String], method_parameters: &[String]) -> Self {
        GenericScope {
            types: self_bound(GenericParameterKind::Type, type_parameters),
            methods: self_bound(GenericParameterKind::Method, method_parameters),
        }
    }

    /// The scope inside `ty`: the arguments of a generic instance, or the type's own open
    /// parameters for a definition.
    #[must_use]
    pub fn for_type(ty: &TypeReference) -> Self {
        GenericScope {
            types: type_bindings(ty),
            methods: Vec::new(),
        }
    }

    /// The scope inside `method`: its declaring type's bindings plus the method's own
    /// arguments or open parameters.
    #[must_use]
    pub fn for_method(method: &MethodReference) -> Self {
        let types = method.declaring_type().map(type_bindings).unwrap_or_default();
        let methods = match method {
            MethodReference::Instance { element, arguments } => element
                .member()
                .map(|member| bind(&member.generic_parameters, arguments))
                .unwrap_or_default(),
            MethodReference::Member(member) => {
                self_bound(GenericParameterKind::Method, &member.generic_parameters)
            }
            MethodReference::Dynamic(_) => Vec::new(),
        };
        GenericScope { types, methods }
    }

    /// Bind the next type parameter.
    #[must_use]
    pub fn bind_type(mut self, name: impl Into<String>, ty: TypeReference) -> Self {
        self.types.push((name.into(), ty));
        self
    }

    /// Bind the next method parameter.
    #[must_use]
    pub fn bind_method(mut self, name: impl Into<String>, ty: TypeReference) -> Self {
        self.methods.push((name.into(), ty));
        self
    }

    /// Whether nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.methods.is_empty()
    }
}

fn self_bound(kind: GenericParameterKind, names: &[String]) -> Vec<(String, TypeReference)> {
    names
        .iter()
        .enumerate()
        .map(|(position, name)| {
            #[allow(clippy::cast_possible_truncation)]
            let parameter = TypeReference::generic_parameter(kind, position as u32, name.clone());
            (name.clone(), parameter)
        })
        .collect()
}

fn bind(names: &[String], arguments: &[TypeReference]) -> Vec<(String, TypeReference)> {
    arguments
        .iter()
        .enumerate()
        .map(|(position, argument)| {
            let name = names.get(position).cloned().unwrap_or_default();
            (name, argument.clone())
        })
        .collect()
}

fn type_bindings(ty: &TypeReference) -> Vec<(String, TypeReference)> {
    match ty {
        TypeReference::GenericInstance { element, arguments } => {
            bind(element.generic_parameter_names(), arguments)
        }
        TypeReference::Named(named) => {
            self_bound(GenericParameterKind::Type, &named.generic_parameters)
        }
        _ => Vec::new(),
    }
}

fn lookup(entries: &[(String, TypeReference)], parameter: &GenericParameterRef) -> Option<TypeReference> {
    if !parameter.name.is_empty() {
        if let Some((_, bound)) = entries.iter().find(|(name, _)| *name == parameter.name) {
            return Some(bound.clone());
        }
    }
    entries
        .get(parameter.position as usize)
        .map(|(_, bound)| bound.clone())
}

impl GenericContext for GenericScope {
    fn resolve(&self, parameter: &GenericParameterRef) -> Option<TypeReference> {
        match parameter.kind {
            GenericParameterKind::Type => lookup(&self.types, parameter),
            GenericParameterKind::Method => lookup(&self.methods, parameter),
        }
    }

    fn describe(&self) -> String {
        let mut out = String::from("type <");
        for (index, (name, bound)) in self.types.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            let _ = write!(out, "{name}={bound}");
        }
        out.push_str(">, method <");
        for (index, (name, bound)) in self.methods.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            let _ = write!(out, "{name}={bound}");
        }
        out.push('>');
        out
    }
}
