#![no_main]

use cilgraft::metadata::{signatures::decode_signature, token::Token};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_signature(data, |token: Token| Ok(token));
});
