//! Re-encoder for decoded straight-line bodies.
//!
//! Emission is not part of the crate, but re-encoding a decoded body is the most direct check
//! that decoding lost nothing. Token operands are mapped back to raw tokens by the caller.

use crate::document::{opcodes::FE_PREFIX, MethodBody, Operand};

/// Encode `body`. `token` maps a token operand back to its raw value.
///
/// Panics on branch operands.
pub fn encode_straight_line(body: &MethodBody, mut token: impl FnMut(&Operand) -> u32) -> Vec<u8> {
    let mut il = Vec::with_capacity(body.code_size() as usize);
    for instruction in &body.instructions {
        if instruction.opcode.op1 == FE_PREFIX {
            il.push(FE_PREFIX);
        }
        il.push(instruction.opcode.op2);

        match &instruction.operand {
            Operand::None => {}
            Operand::Int8(value) => il.extend_from_slice(&value.to_le_bytes()),
            Operand::Int32(value) => il.extend_from_slice(&value.to_le_bytes()),
            Operand::Int64(value) => il.extend_from_slice(&value.to_le_bytes()),
            Operand::Float32(value) => il.extend_from_slice(&value.to_le_bytes()),
            Operand::Float64(value) => il.extend_from_slice(&value.to_le_bytes()),
            Operand::Local(index) | Operand::Argument(index) => {
                if instruction.opcode.operand.fixed_size() == Some(1) {
                    il.push(u8::try_from(*index).unwrap());
                } else {
                    il.extend_from_slice(&index.to_le_bytes());
                }
            }
            Operand::Target(_) | Operand::Targets(_) => {
                panic!("{instruction} is not straight-line code")
            }
            operand => il.extend_from_slice(&token(operand).to_le_bytes()),
        }
    }
    il
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DecoderConfig,
        disassembler::decode_body,
        document::DocumentModule,
        import::{ImportContext, ReferenceImporter},
        test::factories::live::CalculatorFixture,
    };

    fn round_trip(fixture: &CalculatorFixture, il: &[u8], token: impl FnMut(&Operand) -> u32) -> Vec<u8> {
        let mut module = DocumentModule::new("Patch.dll", "Patch");
        let mut importer = ReferenceImporter::new(&mut module).unwrap();
        let mut body = MethodBody::default();
        decode_body(
            il,
            &fixture.module,
            &mut body,
            &mut importer,
            &ImportContext::for_method(&fixture.add),
            &DecoderConfig::lenient(),
        )
        .unwrap();
        encode_straight_line(&body, token)
    }

    #[test]
    fn add_body_round_trips() {
        let fixture = CalculatorFixture::new();
        let il = fixture.add_il();
        let field = fixture.value_field.token.value();
        assert_eq!(round_trip(&fixture, &il, |_| field), il);
    }

    #[test]
    fn immediates_and_wide_forms_round_trip() {
        let fixture = CalculatorFixture::new();
        let hello = fixture.module.define_string("hello");

        let mut il = vec![0x1F, 0xF6]; // ldc.i4.s -10
        il.push(0x20); // ldc.i4
        il.extend_from_slice(&(-123_456_i32).to_le_bytes());
        il.push(0x21); // ldc.i8
        il.extend_from_slice(&i64::MIN.to_le_bytes());
        il.push(0x23); // ldc.r8
        il.extend_from_slice(&1.5_f64.to_le_bytes());
        il.extend_from_slice(&[0xFE, 0x09, 0x02, 0x01]); // ldarg 0x0102
        il.extend_from_slice(&[0x11, 0x07]); // ldloc.s 7
        il.push(0x72); // ldstr
        il.extend_from_slice(&hello.value().to_le_bytes());
        il.extend_from_slice(&[0xFE, 0x01, 0x2A]); // ceq; ret

        assert_eq!(round_trip(&fixture, &il, |_| hello.value()), il);
    }
}
