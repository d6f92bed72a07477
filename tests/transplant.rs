mod common;

use cilgraft::{
    config::TransplantConfig,
    document::{ExceptionRegionKind, InstructionId, MethodReference, Operand, ResolutionScope},
    live::{LiveMethodBody, LiveMethodSignature},
    matcher,
    metadata::flags::MethodAttributes,
    transplant, transplant_with, Error, MethodTransplanter,
};

use common::{shop_domain, CHECKOUT_HANDLER, CHECKOUT_TRY};

#[test]
fn checkout_round_trips_structure() {
    let (_domain, core, shop) = shop_domain();
    let unit = transplant(&shop.checkout).unwrap();

    assert_eq!(unit.module().name, "Cart.Checkout.dll");
    let holder = unit.holder().unwrap();
    assert_eq!(holder.full_name(), "Demo.Cart");

    let method = unit.definition().unwrap();
    assert!(method.is_static());
    let names: Vec<&str> = method.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["this", "price"]);
    assert_eq!(method.return_type.to_string(), "System.Int32");

    let body = &method.body;
    assert_eq!(body.instructions.len(), 14);
    assert_eq!(body.code_size(), 28);
    assert_eq!(body.variables.len(), 1);
    assert!(body.init_locals);

    let mut expected_offset = 0;
    for instruction in &body.instructions {
        assert_eq!(instruction.offset, expected_offset);
        expected_offset = instruction.next_offset();
    }

    assert_eq!(body.instructions[5].operand, Operand::String("done".into()));
    match &body.instructions[6].operand {
        Operand::Method(reference) => {
            assert_eq!(
                reference.to_string(),
                "System.Void Demo.Cart::Log(System.String)"
            );
            assert!(matcher::method_matches(reference, &shop.log).unwrap());
        }
        other => panic!("unexpected operand {other:?}"),
    }
    assert_eq!(body.instructions[7].operand, Operand::Target(InstructionId(12)));
    assert_eq!(body.instructions[11].operand, Operand::Target(InstructionId(12)));

    let region = &body.exception_regions[0];
    assert_eq!(region.kind, ExceptionRegionKind::Catch);
    assert_eq!(body.boundary_offset(Some(region.try_start)), CHECKOUT_TRY.0);
    assert_eq!(body.boundary_offset(region.try_end), CHECKOUT_TRY.0 + CHECKOUT_TRY.1);
    assert_eq!(body.boundary_offset(Some(region.handler_start)), CHECKOUT_HANDLER.0);
    assert_eq!(
        body.boundary_offset(region.handler_end),
        CHECKOUT_HANDLER.0 + CHECKOUT_HANDLER.1
    );
    assert!(matcher::type_matches(region.catch_type.as_ref().unwrap(), &core.exception).unwrap());
}

#[test]
fn imported_assemblies_carry_identity() {
    let (_domain, _core, shop) = shop_domain();
    let unit = transplant(&shop.checkout).unwrap();

    let shop_reference = unit
        .module()
        .assembly_references
        .iter()
        .find(|reference| reference.name == "Shop")
        .unwrap();
    assert_eq!(shop_reference.identity_hash, Some(shop.assembly.identity_hash));

    match &unit.definition().unwrap().body.instructions[1].operand {
        Operand::Field(field) => {
            let scope = &field.declaring_type.as_named().unwrap().scope;
            assert_eq!(scope, &ResolutionScope::Assembly(shop_reference.clone()));
        }
        other => panic!("unexpected operand {other:?}"),
    }
}

#[test]
fn holder_prefix_and_reload() {
    let (_domain, _core, shop) = shop_domain();
    let config = TransplantConfig {
        holder_type_prefix: "Patched".into(),
        ..TransplantConfig::default()
    };
    let mut transplanter = MethodTransplanter::with_config(shop.checkout.clone(), config);

    let first = transplanter.transplant().unwrap().module().id();
    assert_eq!(
        transplanter.document().unwrap().holder().unwrap().name,
        "PatchedCart"
    );
    let second = transplanter.reload().unwrap().module().id();
    assert_ne!(first, second);
}

#[test]
fn generic_method_instances_become_instance_references() {
    let (_domain, core, shop) = shop_domain();
    let identity = shop.module.define_method(
        &shop.cart,
        "Identity",
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
    );
    let u = shop.module.define_method_generic_parameter(&identity, "U");
    identity.set_signature(LiveMethodSignature::new(
        u.clone(),
        vec![cilgraft::live::LiveParameter::new("value", u)],
    ));
    identity.set_body(LiveMethodBody {
        il: vec![0x02, 0x2A],
        max_stack: 1,
        ..LiveMethodBody::default()
    });

    let closed = identity.make_generic_method(vec![core.int32.clone()]).unwrap();
    let spec = shop.module.register_token(
        cilgraft::metadata::token::TokenKind::MethodSpec,
        cilgraft::live::LiveMember::Method(closed),
    );

    let caller = shop.module.define_method(
        &shop.cart,
        "Call",
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
    );
    caller.set_signature(LiveMethodSignature::new(core.int32.clone(), vec![]));
    let mut il = vec![0x1F, 0x2A, 0x28];
    il.extend_from_slice(&spec.value().to_le_bytes());
    il.push(0x2A);
    caller.set_body(LiveMethodBody {
        il,
        max_stack: 1,
        ..LiveMethodBody::default()
    });

    let unit = transplant(&caller).unwrap();
    let body = &unit.definition().unwrap().body;
    assert_eq!(body.instructions[0].operand, Operand::Int8(42));
    match &body.instructions[1].operand {
        Operand::Method(MethodReference::Instance { element, arguments }) => {
            assert_eq!(element.name(), "Identity");
            assert_eq!(arguments.len(), 1);
            assert_eq!(arguments[0].to_string(), "System.Int32");
        }
        other => panic!("unexpected operand {other:?}"),
    }

    let generic = transplant(&identity).unwrap();
    let definition = generic.definition().unwrap();
    assert_eq!(definition.generic_parameters.len(), 1);
    assert_eq!(definition.return_type.to_string(), "!!0");
}

#[test]
fn missing_tokens_fail_the_whole_transplant() {
    let (_domain, core, shop) = shop_domain();
    let broken = shop.module.define_method(
        &shop.cart,
        "Broken",
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
    );
    broken.set_signature(LiveMethodSignature::new(core.void.clone(), vec![]));
    broken.set_body(LiveMethodBody {
        // call 0x06000099; ret
        il: vec![0x28, 0x99, 0x00, 0x00, 0x06, 0x2A],
        ..LiveMethodBody::default()
    });

    assert!(matches!(
        transplant_with(&broken, &TransplantConfig::strict()),
        Err(Error::MemberMissing(_))
    ));
}

#[test]
fn transplanted_units_are_independent() {
    let (_domain, _core, shop) = shop_domain();
    let mut first = transplant(&shop.checkout).unwrap();
    let second = transplant(&shop.checkout).unwrap();

    first.definition_mut().unwrap().body.instructions.clear();
    assert_eq!(second.definition().unwrap().body.instructions.len(), 14);
    assert_eq!(shop.checkout.body().unwrap().il.len(), 28);
}
