//! Method transplantation.
//!
//! Copies a live method's body, locals and exception regions into a fresh
//! [`DocumentModule`]. The result is a static method on a holder type whose first parameter is
//! the former `this` (passed by reference for value types), so the document can be edited and
//! emitted independently of the type that owns the original method.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilgraft::transplant::MethodTransplanter;
//! # fn demo(method: cilgraft::live::LiveMethodRc) -> cilgraft::Result<()> {
//! let mut transplanter = MethodTransplanter::new(method);
//! let unit = transplanter.transplant()?;
//! for instruction in &unit.definition()?.body.instructions {
//!     println!("{instruction}");
//! }
//!
//! // after the host recompiled the method
//! transplanter.reload()?;
//! transplanter.dispose();
//! # Ok(())
//! # }
//! ```

use crate::{
    config::TransplantConfig,
    disassembler::{decode_regions, BodyDecoder},
    document::{
        DocumentModule, GenericParameter, GenericParameterKind, MethodBody, MethodDefinition,
        ParameterDefinition, TypeDefinition, TypeReference, VariableDefinition,
    },
    import::{ImportContext, ImportKind, ReferenceImporter},
    live::{LiveMethodRc, LiveTypeRc},
    metadata::flags::{GenericParamAttributes, MethodAttributes, TypeAttributes},
    Error, Result,
};

/// A transplanted method together with the document module that owns it.
#[derive(Debug)]
pub struct DocumentMethod {
    module: DocumentModule,
    type_index: usize,
    method_index: usize,
}

impl DocumentMethod {
    /// The owning document module.
    #[must_use]
    pub fn module(&self) -> &DocumentModule {
        &self.module
    }

    /// The owning document module, for editing.
    pub fn module_mut(&mut self) -> &mut DocumentModule {
        &mut self.module
    }

    /// The holder type of the method.
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] once the module was released.
    pub fn holder(&self) -> Result<&TypeDefinition> {
        self.module.ensure_alive()?;
        self.module.types.get(self.type_index).ok_or(Error::Disposed)
    }

    /// The transplanted method.
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] once the module was released.
    pub fn definition(&self) -> Result<&MethodDefinition> {
        self.holder()?
            .methods
            .get(self.method_index)
            .ok_or(Error::Disposed)
    }

    /// The transplanted method, for editing.
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] once the module was released.
    pub fn definition_mut(&mut self) -> Result<&mut MethodDefinition> {
        self.module.ensure_alive()?;
        self.module
            .types
            .get_mut(self.type_index)
            .and_then(|holder| holder.methods.get_mut(self.method_index))
            .ok_or(Error::Disposed)
    }

    /// Release the document module.
    pub fn dispose(&mut self) {
        self.module.dispose();
    }

    /// Take the document module, e.g. to hand it to an emitter.
    #[must_use]
    pub fn into_module(self) -> DocumentModule {
        self.module
    }
}

/// Transplant `method` with the default configuration.
///
/// # Errors
/// Returns [`Error::BodyLess`] for methods without an instruction stream and propagates any
/// decoding or import error.
pub fn transplant(method: &LiveMethodRc) -> Result<DocumentMethod> {
    transplant_with(method, &TransplantConfig::default())
}

/// Stateful transplanter for one live method.
///
/// Holds the current transplantation unit so the host can rebuild it after recompiling the
/// method and release it once emitted.
#[derive(Debug)]
pub struct MethodTransplanter {
    source: LiveMethodRc,
    config: TransplantConfig,
    unit: Option<DocumentMethod>,
}

impl MethodTransplanter {
    /// Transplanter for `source` with the default configuration.
    #[must_use]
    pub fn new(source: LiveMethodRc) -> Self {
        Self::with_config(source, TransplantConfig::default())
    }

    /// Transplanter for `source`.
    #[must_use]
    pub fn with_config(source: LiveMethodRc, config: TransplantConfig) -> Self {
        MethodTransplanter {
            source,
            config,
            unit: None,
        }
    }

    /// The live method being transplanted.
    #[must_use]
    pub fn source(&self) -> &LiveMethodRc {
        &self.source
    }

    /// Build the unit if there is none yet and return it.
    ///
    /// # Errors
    /// See [`transplant`].
    pub fn transplant(&mut self) -> Result<&DocumentMethod> {
        if self.unit.is_none() {
            self.unit = Some(transplant_with(&self.source, &self.config)?);
        }
        self.unit.as_ref().ok_or(Error::Disposed)
    }

    /// Discard the current unit and rebuild it from the live method.
    ///
    /// # Errors
    /// See [`transplant`]. The previous unit is released even if rebuilding fails.
    pub fn reload(&mut self) -> Result<&DocumentMethod> {
        self.dispose();
        self.transplant()
    }

    /// Release the current unit, if any.
    pub fn dispose(&mut self) {
        if let Some(mut unit) = self.unit.take() {
            unit.dispose();
        }
    }

    /// The current unit.
    #[must_use]
    pub fn document(&self) -> Option<&DocumentMethod> {
        self.unit.as_ref()
    }

    /// The current unit, for editing.
    pub fn document_mut(&mut self) -> Option<&mut DocumentMethod> {
        self.unit.as_mut()
    }
}

fn ensure_body(method: &LiveMethodRc) -> Result<()> {
    let reason = if method.attributes.contains(MethodAttributes::ABSTRACT) {
        "abstract"
    } else if method.attributes.contains(MethodAttributes::PINVOKE_IMPL) {
        "platform invoke"
    } else if method.impl_attributes.is_native_or_runtime() {
        "implemented by the runtime"
    } else if method.body().is_none() {
        "no instruction stream"
    } else {
        return Ok(());
    };
    Err(Error::BodyLess(format!("{method} ({reason})")))
}

/// Root of the declaring type's base chain, used as the holder's base type.
fn root_base(declaring: &LiveTypeRc) -> Option<LiveTypeRc> {
    let mut current = declaring.base_type()?;
    while let Some(base) = current.base_type() {
        current = base;
    }
    Some(current)
}

fn generic_parameters<'a>(
    names: impl Iterator<Item = &'a String>,
    kind: GenericParameterKind,
) -> Vec<GenericParameter> {
    names
        .enumerate()
        .map(|(position, name)| {
            #[allow(clippy::cast_possible_truncation)]
            let position = position as u32;
            GenericParameter {
                name: name.clone(),
                position,
                kind,
                attributes: GenericParamAttributes::empty(),
                constraints: Vec::new(),
            }
        })
        .collect()
}

/// Transplant `method` with `config`.
///
/// # Errors
/// See [`transplant`].
pub fn transplant_with(method: &LiveMethodRc, config: &TransplantConfig) -> Result<DocumentMethod> {
    ensure_body(method)?;
    let live_body = method.body().ok_or_else(|| Error::BodyLess(method.to_string()))?;
    let live_module = method
        .module()
        .ok_or_else(|| malformed_error!("Method {} has no live module", method))?;
    let signature = method
        .signature()
        .ok_or_else(|| malformed_error!("Method {} has no signature", method))?;
    let declaring = method.declaring_type();

    log::debug!("transplanting {method} ({} bytes of IL)", live_body.il.len());

    let (namespace, holder_name) = match &declaring {
        Some(ty) => (ty.namespace.clone(), format!("{}{}", config.holder_type_prefix, ty.name)),
        None => (String::new(), format!("{}Globals", config.holder_type_prefix)),
    };
    let mut holder = TypeDefinition::new(
        namespace,
        holder_name.clone(),
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
    );

    let mut document = DocumentModule::new(
        format!("{holder_name}.{}.dll", method.name),
        format!("{holder_name}.{}", method.name),
    );
    let context = ImportContext::for_method(method);
    let mut importer = ReferenceImporter::new(&mut document)?;

    if let Some(ty) = &declaring {
        if let Some(base) = root_base(ty) {
            holder.base_type = Some(importer.import_type(&base, ImportKind::Definition, &context)?);
        }
        let type_parameters = ty.generic_definition().unwrap_or(ty).clone();
        let names: Vec<String> = type_parameters
            .generic_parameters()
            .map(|parameter| parameter.name.clone())
            .collect();
        holder.generic_parameters = generic_parameters(names.iter(), GenericParameterKind::Type);
    }

    let mut parameters = Vec::with_capacity(signature.params.len() + 1);
    if method.has_this() {
        let declaring = declaring
            .as_ref()
            .ok_or_else(|| malformed_error!("Instance method {} has no declaring type", method))?;
        let mut this = importer.import_type(declaring, ImportKind::Open, &context)?;
        if declaring.is_value_type() {
            this = TypeReference::by_ref(this);
        }
        parameters.push(ParameterDefinition::new("this", 1, this));
    }
    for parameter in &signature.params {
        let sequence = u16::try_from(parameters.len() + 1).map_err(|_| {
            malformed_error!("Method {} declares more than {} parameters", method, u16::MAX)
        })?;
        let parameter_type = importer.import_type(&parameter.ty, ImportKind::Open, &context)?;
        let mut definition = ParameterDefinition::new(parameter.name.clone(), sequence, parameter_type);
        definition.attributes = parameter.attributes;
        parameters.push(definition);
    }

    let return_type = importer.import_type(&signature.return_type, ImportKind::Open, &context)?;
    let mut definition = MethodDefinition::new(
        method.name.clone(),
        MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
        return_type,
    );
    let method_parameters: Vec<String> = method
        .generic_parameters()
        .map(|parameter| parameter.name.clone())
        .collect();
    if !method.is_generic_instance() {
        definition.generic_parameters =
            generic_parameters(method_parameters.iter(), GenericParameterKind::Method);
    }

    let mut body = MethodBody {
        max_stack: live_body.max_stack,
        init_locals: live_body.init_locals,
        ..MethodBody::default()
    };
    for local in &live_body.locals {
        let mut variable_type = importer.import_type(&local.ty, ImportKind::Open, &context)?;
        if local.pinned {
            variable_type = TypeReference::Pinned(Box::new(variable_type));
        }
        body.variables.push(VariableDefinition { variable_type });
    }

    BodyDecoder::new(&live_module, &mut importer, &context)
        .with_config(config.decoder)
        .with_fallback(config.image_resolver.as_deref())
        .with_argument_count(parameters.len())
        .decode(&live_body.il, &mut body)?;
    body.exception_regions = decode_regions(&live_body.clauses, &body, &mut importer, &context)?;

    definition.parameters = parameters;
    definition.body = body;
    holder.methods.push(definition);
    let type_index = document.add_type(holder);

    log::debug!(
        "transplanted {method} into {} ({} instructions)",
        document.name,
        document.types[type_index].methods[0].body.instructions.len()
    );

    Ok(DocumentMethod {
        module: document,
        type_index,
        method_index: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::Operand,
        matcher::{field_matches, type_matches},
        live::{LiveMethodBody, LiveMethodSignature, LiveParameter},
        metadata::flags::MethodImplAttributes,
        test::factories::live::{CalculatorFixture, GenericFixture},
    };

    #[test]
    fn add_end_to_end() {
        let fixture = CalculatorFixture::new();
        let unit = transplant(&fixture.add).unwrap();
        let definition = unit.definition().unwrap();

        assert_eq!(definition.name, "Add");
        assert!(definition.is_static());
        assert_eq!(definition.parameters.len(), 3);
        assert_eq!(definition.parameters[0].name, "this");
        assert_eq!(definition.parameters[2].sequence, 3);
        assert!(type_matches(&definition.parameters[0].parameter_type, &fixture.calculator).unwrap());
        assert!(definition.body.variables.is_empty());
        assert!(definition.body.exception_regions.is_empty());
        assert_eq!(definition.body.instructions.len(), 7);
        assert_eq!(definition.body.max_stack, 2);

        match &definition.body.instructions[1].operand {
            Operand::Field(field) => {
                assert!(field_matches(field, &fixture.value_field).unwrap());
                assert!(type_matches(&field.declaring_type, &fixture.calculator).unwrap());
            }
            other => panic!("unexpected operand {other:?}"),
        }

        let holder = unit.holder().unwrap();
        assert_eq!(holder.full_name(), "Demo.Calculator");
        assert_eq!(
            holder.base_type.as_ref().map(ToString::to_string).as_deref(),
            Some("System.Object")
        );
    }

    #[test]
    fn body_less_methods() {
        let fixture = CalculatorFixture::new();
        let abstract_method = fixture.module.define_method(
            &fixture.calculator,
            "Compute",
            MethodAttributes::PUBLIC | MethodAttributes::ABSTRACT | MethodAttributes::VIRTUAL,
        );
        assert!(matches!(transplant(&abstract_method), Err(Error::BodyLess(_))));

        let no_body = fixture.module.define_method(
            &fixture.calculator,
            "Extern",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        );
        assert!(matches!(transplant(&no_body), Err(Error::BodyLess(_))));
    }

    #[test]
    fn internal_calls_are_body_less() {
        let fixture = CalculatorFixture::new();
        let method = fixture.module.define_method_with_impl(
            &fixture.calculator,
            "Native",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodImplAttributes::INTERNAL_CALL,
        );
        assert!(matches!(transplant(&method), Err(Error::BodyLess(_))));
    }

    #[test]
    fn value_type_this_is_by_ref() {
        let fixture = GenericFixture::new();
        let unit = transplant(&fixture.get).unwrap();
        let definition = unit.definition().unwrap();

        let this = &definition.parameters[0].parameter_type;
        assert!(matches!(this, TypeReference::ByRef(_)));
        assert_eq!(this.to_string(), "Ns.Box`1<!0>&");
        assert_eq!(unit.holder().unwrap().generic_parameters.len(), 1);
        assert_eq!(definition.return_type.to_string(), "!0");
    }

    #[test]
    fn reload_and_dispose() {
        let fixture = CalculatorFixture::new();
        let mut transplanter = MethodTransplanter::new(fixture.add.clone());

        let first_id = transplanter.transplant().unwrap().module().id();
        assert_eq!(transplanter.transplant().unwrap().module().id(), first_id);

        let second_id = transplanter.reload().unwrap().module().id();
        assert_ne!(first_id, second_id);
        assert_eq!(
            transplanter.document().unwrap().definition().unwrap().body.instructions.len(),
            7
        );

        transplanter.dispose();
        assert!(transplanter.document().is_none());
    }

    #[test]
    fn parameter_sequence_overflow_is_malformed() {
        let fixture = CalculatorFixture::new();
        let int32 = fixture.core.int32.clone();
        let method = |name: &str, count: usize| {
            let method = fixture.module.define_method(
                &fixture.calculator,
                name,
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            );
            let parameters = (0..count)
                .map(|index| LiveParameter::new(format!("p{index}"), int32.clone()))
                .collect();
            method.set_signature(LiveMethodSignature::new(fixture.core.void.clone(), parameters));
            method.set_body(LiveMethodBody {
                il: vec![0x2A],
                ..LiveMethodBody::default()
            });
            method
        };

        let widest = transplant(&method("Widest", usize::from(u16::MAX))).unwrap();
        let parameters = &widest.definition().unwrap().parameters;
        assert_eq!(parameters.last().unwrap().sequence, u16::MAX);

        let too_wide = method("TooWide", usize::from(u16::MAX) + 1);
        assert!(matches!(transplant(&too_wide), Err(Error::Malformed { .. })));
    }

    #[test]
    fn disposed_unit_refuses_access() {
        let fixture = CalculatorFixture::new();
        let mut unit = transplant(&fixture.add).unwrap();
        unit.dispose();
        assert!(matches!(unit.definition(), Err(Error::Disposed)));
        assert!(matches!(unit.definition_mut(), Err(Error::Disposed)));
    }
}
