use std::sync::Arc;

use crate::live::{GenericOwner, LiveMethodRc, LiveModuleRc, LiveTypeRc};

/// The live definitions whose generic parameters may appear in an import.
///
/// Owners are compared by token and module, so a generic parameter seen through a bound member
/// of a generic instance is still recognized as belonging to its definition.
#[derive(Debug, Clone, Default)]
pub struct ImportContext {
    types: Vec<LiveTypeRc>,
    methods: Vec<LiveMethodRc>,
}

fn same_module(a: Option<LiveModuleRc>, b: Option<LiveModuleRc>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
        (None, None) => true,
        _ => false,
    }
}

impl ImportContext {
    /// A context without generic owners.
    #[must_use]
    pub fn new() -> Self {
        ImportContext::default()
    }

    /// The context inside `method`: the method and its declaring type, unwrapped to their
    /// generic definitions.
    #[must_use]
    pub fn for_method(method: &LiveMethodRc) -> Self {
        let definition = method.generic_definition().unwrap_or(method).clone();
        let context = ImportContext::new();
        let context = match method.declaring_type() {
            Some(declaring) => context.with_type(&declaring),
            None => context,
        };
        context.with_method(&definition)
    }

    /// Add a type owner. Generic instances contribute their definition.
    #[must_use]
    pub fn with_type(mut self, ty: &LiveTypeRc) -> Self {
        let definition = ty.generic_definition().unwrap_or(ty).clone();
        if !self.types.iter().any(|known| Arc::ptr_eq(known, &definition)) {
            self.types.push(definition);
        }
        self
    }

    /// Add a method owner.
    #[must_use]
    pub fn with_method(mut self, method: &LiveMethodRc) -> Self {
        if !self.methods.iter().any(|known| Arc::ptr_eq(known, method)) {
            self.methods.push(method.clone());
        }
        self
    }

    /// Whether the generic parameters of `owner` may be referenced here.
    #[must_use]
    pub fn owns(&self, owner: &GenericOwner) -> bool {
        match owner {
            GenericOwner::Type(owner) => owner.upgrade().is_some_and(|owner| {
                self.types.iter().any(|ty| {
                    ty.token == owner.token && same_module(ty.module(), owner.module())
                })
            }),
            GenericOwner::Method(owner) => owner.upgrade().is_some_and(|owner| {
                self.methods.iter().any(|method| {
                    method.token == owner.token && same_module(method.module(), owner.module())
                })
            }),
        }
    }

    /// Description used in [`crate::Error::RelinkTargetNotFound`].
    #[must_use]
    pub fn describe(&self) -> String {
        let types: Vec<String> = self.types.iter().map(|ty| ty.full_name()).collect();
        let methods: Vec<String> = self.methods.iter().map(|m| m.to_string()).collect();
        format!(
            "import context [types: {}; methods: {}]",
            types.join(", "),
            methods.join(", ")
        )
    }
}
