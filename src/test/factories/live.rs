//! Factory methods for live view test data.
//!
//! [`CoreLibrary`] provides the handful of built-in types the other fixtures need.
//! [`CalculatorFixture`] is a plain class with an instance method that reads a field, and
//! [`GenericFixture`] a generic value type whose method returns its type parameter.

use std::sync::Arc;

use crate::{
    live::{
        LiveAssemblyRc, LiveDomain, LiveFieldRc, LiveMethodBody, LiveMethodRc,
        LiveMethodSignature, LiveModuleRc, LiveParameter, LiveTypeRc,
    },
    metadata::flags::{FieldAttributes, MethodAttributes, TypeAttributes},
};

/// A domain with a minimal `System.Private.CoreLib`.
pub struct CoreLibrary {
    pub domain: Arc<LiveDomain>,
    pub assembly: LiveAssemblyRc,
    pub module: LiveModuleRc,
    pub object: LiveTypeRc,
    pub value_type: LiveTypeRc,
    pub void: LiveTypeRc,
    pub boolean: LiveTypeRc,
    pub int32: LiveTypeRc,
    pub int64: LiveTypeRc,
    pub string: LiveTypeRc,
    pub exception: LiveTypeRc,
}

impl CoreLibrary {
    pub fn new() -> Self {
        let domain = Arc::new(LiveDomain::new());
        let assembly = domain.add_assembly(
            "System.Private.CoreLib",
            "System.Private.CoreLib, Version=8.0.0.0, Culture=neutral, PublicKeyToken=7cec85d7bea7798e",
            None,
        );
        let module = assembly.add_module("System.Private.CoreLib.dll");

        let object = module.define_type("System", "Object", TypeAttributes::PUBLIC);
        let value_type = module.define_type(
            "System",
            "ValueType",
            TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
        );
        value_type.set_base_type(object.clone());

        let primitive = |name: &str| {
            let ty = module.define_type(
                "System",
                name,
                TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::VALUE_TYPE,
            );
            ty.set_base_type(value_type.clone());
            ty
        };
        let void = primitive("Void");
        let boolean = primitive("Boolean");
        let int32 = primitive("Int32");
        let int64 = primitive("Int64");

        let string = module.define_type(
            "System",
            "String",
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
        );
        string.set_base_type(object.clone());
        let exception = module.define_type("System", "Exception", TypeAttributes::PUBLIC);
        exception.set_base_type(object.clone());

        CoreLibrary {
            domain,
            assembly,
            module,
            object,
            value_type,
            void,
            boolean,
            int32,
            int64,
            string,
            exception,
        }
    }
}

/// `Demo.Calculator` with `int value`, `int Add(int a, int b)` and a global `void Helper()`.
pub struct CalculatorFixture {
    pub core: CoreLibrary,
    pub assembly: LiveAssemblyRc,
    pub module: LiveModuleRc,
    pub calculator: LiveTypeRc,
    pub value_field: LiveFieldRc,
    pub add: LiveMethodRc,
    pub helper: LiveMethodRc,
}

impl CalculatorFixture {
    pub fn new() -> Self {
        let core = CoreLibrary::new();
        let assembly = core.domain.add_assembly(
            "Calculator",
            "Calculator, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null",
            None,
        );
        let module = assembly.add_module("Calculator.dll");

        let calculator = module.define_type("Demo", "Calculator", TypeAttributes::PUBLIC);
        calculator.set_base_type(core.object.clone());
        let value_field = module.define_field(
            &calculator,
            "value",
            core.int32.clone(),
            FieldAttributes::PRIVATE,
        );

        let add = module.define_method(
            &calculator,
            "Add",
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
        );
        add.set_signature(LiveMethodSignature::new(
            core.int32.clone(),
            vec![
                LiveParameter::new("a", core.int32.clone()),
                LiveParameter::new("b", core.int32.clone()),
            ],
        ));

        let module_type = module
            .module_type()
            .expect("every module has a <Module> type");
        let helper = module.define_method(
            &module_type,
            "Helper",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        );
        helper.set_signature(LiveMethodSignature::new(core.void.clone(), vec![]));
        helper.set_body(LiveMethodBody {
            il: vec![0x2A],
            max_stack: 0,
            ..LiveMethodBody::default()
        });

        let fixture = CalculatorFixture {
            core,
            assembly,
            module,
            calculator,
            value_field,
            add,
            helper,
        };
        fixture.add.set_body(LiveMethodBody {
            il: fixture.add_il(),
            max_stack: 2,
            init_locals: true,
            ..LiveMethodBody::default()
        });
        fixture
    }

    /// `ldarg.0; ldfld value; ldarg.1; ldarg.2; add; add; ret`
    pub fn add_il(&self) -> Vec<u8> {
        let mut il = vec![0x02, 0x7B];
        il.extend_from_slice(&self.value_field.token.value().to_le_bytes());
        il.extend_from_slice(&[0x03, 0x04, 0x58, 0x58, 0x2A]);
        il
    }
}

/// The value type `Ns.Box<T>` with a field `T value` and a method `T Get()`.
pub struct GenericFixture {
    pub core: CoreLibrary,
    pub module: LiveModuleRc,
    pub boxed: LiveTypeRc,
    pub t: LiveTypeRc,
    pub value_field: LiveFieldRc,
    pub get: LiveMethodRc,
}

impl GenericFixture {
    pub fn new() -> Self {
        let core = CoreLibrary::new();
        let module = core
            .domain
            .add_assembly("Generic", "Generic, Version=1.0.0.0", None)
            .add_module("Generic.dll");

        let boxed = module.define_type(
            "Ns",
            "Box`1",
            TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::VALUE_TYPE,
        );
        boxed.set_base_type(core.value_type.clone());
        let t = module.define_type_generic_parameter(&boxed, "T");
        let value_field = module.define_field(&boxed, "value", t.clone(), FieldAttributes::PUBLIC);

        let get = module.define_method(
            &boxed,
            "Get",
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
        );
        get.set_signature(LiveMethodSignature::new(t.clone(), vec![]));

        let mut il = vec![0x02, 0x7B];
        il.extend_from_slice(&value_field.token.value().to_le_bytes());
        il.push(0x2A);
        get.set_body(LiveMethodBody {
            il,
            max_stack: 1,
            ..LiveMethodBody::default()
        });

        GenericFixture {
            core,
            module,
            boxed,
            t,
            value_field,
            get,
        }
    }
}
