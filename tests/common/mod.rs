//! Live domains shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use cilgraft::{
    live::{
        LiveAssemblyRc, LiveDomain, LiveExceptionClause, LiveFieldRc, LiveLocal, LiveMethodBody,
        LiveMethodRc, LiveMethodSignature, LiveModuleRc, LiveParameter, LiveTypeRc,
    },
    metadata::flags::{ExceptionHandlerFlags, FieldAttributes, MethodAttributes, TypeAttributes},
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Built-in types of a minimal core library.
pub struct Core {
    pub object: LiveTypeRc,
    pub value_type: LiveTypeRc,
    pub void: LiveTypeRc,
    pub int32: LiveTypeRc,
    pub string: LiveTypeRc,
    pub exception: LiveTypeRc,
}

pub fn core_library(domain: &LiveDomain) -> Core {
    let module = domain
        .add_assembly(
            "System.Private.CoreLib",
            "System.Private.CoreLib, Version=8.0.0.0, Culture=neutral, PublicKeyToken=7cec85d7bea7798e",
            None,
        )
        .add_module("System.Private.CoreLib.dll");

    let object = module.define_type("System", "Object", TypeAttributes::PUBLIC);
    let value_type = module.define_type(
        "System",
        "ValueType",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
    );
    value_type.set_base_type(object.clone());

    let value = |name: &str| {
        let ty = module.define_type(
            "System",
            name,
            TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::VALUE_TYPE,
        );
        ty.set_base_type(value_type.clone());
        ty
    };
    let void = value("Void");
    let int32 = value("Int32");

    let string = module.define_type("System", "String", TypeAttributes::PUBLIC);
    string.set_base_type(object.clone());
    let exception = module.define_type("System", "Exception", TypeAttributes::PUBLIC);
    exception.set_base_type(object.clone());

    Core {
        object,
        value_type,
        void,
        int32,
        string,
        exception,
    }
}

/// One load of the `Shop` assembly.
pub struct Shop {
    pub assembly: LiveAssemblyRc,
    pub module: LiveModuleRc,
    pub cart: LiveTypeRc,
    pub total: LiveFieldRc,
    pub log: LiveMethodRc,
    pub checkout: LiveMethodRc,
}

/// Offsets of the protected block and the handler of `Checkout`.
pub const CHECKOUT_TRY: (u32, u32) = (0, 21);
pub const CHECKOUT_HANDLER: (u32, u32) = (21, 5);

/// Load `Shop` with `Demo.Cart`:
///
/// ```text
/// int Checkout(int price) {
///     int result;
///     try { result = total + price; Log("done"); }
///     catch (Exception) { result = -1; }
///     return result;
/// }
/// ```
pub fn load_shop(domain: &LiveDomain, core: &Core, version: &str) -> Shop {
    let assembly = domain.add_assembly(
        "Shop",
        format!("Shop, Version={version}, Culture=neutral, PublicKeyToken=null"),
        None,
    );
    let module = assembly.add_module("Shop.dll");

    let cart = module.define_type("Demo", "Cart", TypeAttributes::PUBLIC);
    cart.set_base_type(core.object.clone());
    let total = module.define_field(&cart, "total", core.int32.clone(), FieldAttributes::PRIVATE);

    let log = module.define_method(
        &cart,
        "Log",
        MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
    );
    log.set_signature(LiveMethodSignature::new(
        core.void.clone(),
        vec![LiveParameter::new("message", core.string.clone())],
    ));
    log.set_body(LiveMethodBody {
        il: vec![0x2A],
        ..LiveMethodBody::default()
    });

    let checkout = module.define_method(
        &cart,
        "Checkout",
        MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
    );
    checkout.set_signature(LiveMethodSignature::new(
        core.int32.clone(),
        vec![LiveParameter::new("price", core.int32.clone())],
    ));

    let done = module.define_string("done");
    let mut il = vec![0x02, 0x7B];
    il.extend_from_slice(&total.token.value().to_le_bytes());
    il.extend_from_slice(&[0x03, 0x58, 0x0A, 0x72]);
    il.extend_from_slice(&done.value().to_le_bytes());
    il.push(0x28);
    il.extend_from_slice(&log.token.value().to_le_bytes());
    // leave.s end; pop; ldc.i4.m1; stloc.0; leave.s end; end: ldloc.0; ret
    il.extend_from_slice(&[0xDE, 0x05, 0x26, 0x15, 0x0A, 0xDE, 0x00, 0x06, 0x2A]);

    checkout.set_body(LiveMethodBody {
        il,
        max_stack: 2,
        init_locals: true,
        locals: vec![LiveLocal {
            ty: core.int32.clone(),
            pinned: false,
        }],
        clauses: vec![LiveExceptionClause {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: CHECKOUT_TRY.0,
            try_length: CHECKOUT_TRY.1,
            handler_offset: CHECKOUT_HANDLER.0,
            handler_length: CHECKOUT_HANDLER.1,
            catch_type: Some(core.exception.clone()),
            filter_offset: 0,
        }],
    });

    Shop {
        assembly,
        module,
        cart,
        total,
        log,
        checkout,
    }
}

/// A domain with the core library and one `Shop`.
pub fn shop_domain() -> (Arc<LiveDomain>, Core, Shop) {
    init_logging();
    let domain = Arc::new(LiveDomain::new());
    let core = core_library(&domain);
    let shop = load_shop(&domain, &core, "1.0.0.0");
    (domain, core, shop)
}
