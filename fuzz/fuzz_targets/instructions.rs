#![no_main]

use std::sync::{Arc, OnceLock};

use cilgraft::{
    config::DecoderConfig,
    disassembler::decode_body,
    document::{DocumentModule, MethodBody},
    import::{ImportContext, ReferenceImporter},
    live::{LiveDomain, LiveMethodRc, LiveMethodSignature, LiveModuleRc},
    metadata::flags::{MethodAttributes, TypeAttributes},
};
use libfuzzer_sys::fuzz_target;

struct Target {
    _domain: Arc<LiveDomain>,
    module: LiveModuleRc,
    method: LiveMethodRc,
}

fn target() -> &'static Target {
    static TARGET: OnceLock<Target> = OnceLock::new();
    TARGET.get_or_init(|| {
        let domain = Arc::new(LiveDomain::new());
        let core = domain
            .add_assembly("System.Private.CoreLib", "System.Private.CoreLib", None)
            .add_module("System.Private.CoreLib.dll");
        let object = core.define_type("System", "Object", TypeAttributes::PUBLIC);
        let module = domain.add_assembly("Fuzz", "Fuzz", None).add_module("Fuzz.dll");
        let ty = module.define_type("Fuzz", "Target", TypeAttributes::PUBLIC);
        ty.set_base_type(object.clone());
        let method = module.define_method(&ty, "Run", MethodAttributes::PUBLIC);
        method.set_signature(LiveMethodSignature::new(object, vec![]));
        module.define_string("fuzz");
        Target {
            _domain: domain,
            module,
            method,
        }
    })
}

fuzz_target!(|data: &[u8]| {
    let target = target();
    let mut document = DocumentModule::new("Fuzz.Patch.dll", "Fuzz.Patch");
    let Ok(mut importer) = ReferenceImporter::new(&mut document) else {
        return;
    };
    let mut body = MethodBody::default();
    let _ = decode_body(
        data,
        &target.module,
        &mut body,
        &mut importer,
        &ImportContext::for_method(&target.method),
        &DecoderConfig::lenient(),
    );
});
