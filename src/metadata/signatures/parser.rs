use std::marker::PhantomData;

use crate::{
    file::parser::Parser,
    metadata::{
        signatures::{
            CallingConvention, LocalVariable, MethodSignature, Signature, SignatureArray,
            SignatureType,
        },
        token::Token,
        typesystem::{PrimitiveKind, ELEMENT_TYPE},
    },
    Error::RecursionLimit,
    Result,
};

/// Maximum nesting depth of a single type inside a signature blob.
pub const MAX_RECURSION_DEPTH: usize = 50;

const FIELD_HEADER: u8 = 0x06;
const LOCAL_SIG_HEADER: u8 = 0x07;
const PROPERTY_HEADER: u8 = 0x08;
const GENERIC_INST_HEADER: u8 = 0x0A;

/// Decoder for signature blobs (II.23.2).
///
/// Every `TypeDefOrRefOrSpecEncoded` token found in the blob is handed to `resolver`, so the
/// decoded tree is expressed in whatever type the caller needs. Generic element types (`VAR`,
/// `MVAR`, `GENERICINST`) are rejected with [`crate::Error::NotSupported`]: call sites that
/// reach this decoder are always closed over concrete types.
pub struct SignatureDecoder<'a, T, F>
where
    F: FnMut(Token) -> Result<T>,
{
    parser: Parser<'a>,
    depth: usize,
    resolver: F,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T, F> SignatureDecoder<'a, T, F>
where
    F: FnMut(Token) -> Result<T>,
{
    /// Create a decoder over `data` that resolves embedded type tokens through `resolver`.
    pub fn new(data: &'a [u8], resolver: F) -> Self {
        SignatureDecoder {
            parser: Parser::new(data),
            depth: 0,
            resolver,
            _marker: PhantomData,
        }
    }

    /// Decode whatever signature kind the header byte announces.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for property and generic instantiation blobs,
    /// [`crate::Error::Malformed`] for an unknown calling convention and any error of the
    /// individual decoders.
    pub fn decode(&mut self) -> Result<Signature<T>> {
        let header = self.parser.peek_byte()?;
        match header & 0x0F {
            FIELD_HEADER => Ok(Signature::Field(self.decode_field()?)),
            LOCAL_SIG_HEADER => Ok(Signature::Locals(self.decode_locals()?)),
            PROPERTY_HEADER => Err(not_supported_error!(
                "property signature (header 0x{:02x})",
                header
            )),
            GENERIC_INST_HEADER => Err(not_supported_error!(
                "GENERICINST method instantiation (header 0x{:02x})",
                header
            )),
            _ => Ok(Signature::Method(self.decode_method()?)),
        }
    }

    /// Decode a `MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown calling convention, plus any error
    /// raised while decoding the return or parameter types.
    pub fn decode_method(&mut self) -> Result<MethodSignature<T>> {
        let header = self.parser.read_le::<u8>()?;
        let Some(convention) = CallingConvention::from_header(header) else {
            return Err(malformed_error!(
                "MethodSignature - invalid calling convention - 0x{:02x}",
                header
            ));
        };

        let generic_param_count = if header & 0x10 != 0 {
            self.parser.read_compressed_uint()?
        } else {
            0
        };
        let param_count = self.parser.read_compressed_uint()?;
        if param_count as usize > self.parser.remaining() {
            return Err(malformed_error!(
                "MethodSignature - {} parameters declared, {} bytes left",
                param_count,
                self.parser.remaining()
            ));
        }

        let return_type = self.decode_type()?;

        let mut params = Vec::with_capacity(param_count as usize);
        let mut sentinel_seen = false;
        while params.len() < param_count as usize {
            if self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                if sentinel_seen {
                    return Err(malformed_error!("MethodSignature - duplicate SENTINEL"));
                }
                self.parser.advance()?;
                sentinel_seen = true;

                let first_vararg = self.decode_type()?;
                params.push(SignatureType::Sentinel(Box::new(first_vararg)));
                continue;
            }

            params.push(self.decode_type()?);
        }

        Ok(MethodSignature {
            convention,
            has_this: header & 0x20 != 0,
            explicit_this: header & 0x40 != 0,
            generic_param_count,
            return_type,
            params,
        })
    }

    /// Decode a `FieldSig`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the header is not `FIELD`.
    pub fn decode_field(&mut self) -> Result<SignatureType<T>> {
        let header = self.parser.read_le::<u8>()?;
        if header != FIELD_HEADER {
            return Err(malformed_error!(
                "FieldSignature - invalid start - 0x{:02x}",
                header
            ));
        }

        self.decode_type()
    }

    /// Decode a `LocalVarSig`.
    ///
    /// A leading `PINNED` constraint is lifted into [`LocalVariable::pinned`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the header is not `LOCAL_SIG`.
    pub fn decode_locals(&mut self) -> Result<Vec<LocalVariable<T>>> {
        let header = self.parser.read_le::<u8>()?;
        if header != LOCAL_SIG_HEADER {
            return Err(malformed_error!(
                "LocalVarSignature - invalid start - 0x{:02x}",
                header
            ));
        }

        let count = self.parser.read_compressed_uint()?;
        if count as usize > self.parser.remaining() {
            return Err(malformed_error!(
                "LocalVarSignature - {} locals declared, {} bytes left",
                count,
                self.parser.remaining()
            ));
        }

        let mut locals = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let local = match self.decode_type()? {
                SignatureType::Pinned(inner) => LocalVariable {
                    ty: *inner,
                    pinned: true,
                },
                ty => LocalVariable { ty, pinned: false },
            };
            locals.push(local);
        }

        Ok(locals)
    }

    /// Decode a single type, tracking the nesting depth.
    ///
    /// # Errors
    /// Returns [`crate::Error::RecursionLimit`] past [`MAX_RECURSION_DEPTH`] nested types.
    pub fn decode_type(&mut self) -> Result<SignatureType<T>> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let result = self.decode_type_inner();
        self.depth -= 1;
        result
    }

    fn decode_type_inner(&mut self) -> Result<SignatureType<T>> {
        let current_byte = self.parser.read_le::<u8>()?;
        if let Some(primitive) = PrimitiveKind::from_element_type(current_byte) {
            return Ok(match primitive {
                PrimitiveKind::Void => SignatureType::Void,
                kind => SignatureType::Primitive(kind),
            });
        }

        match current_byte {
            ELEMENT_TYPE::PTR => Ok(SignatureType::Pointer(Box::new(self.decode_type()?))),
            ELEMENT_TYPE::BYREF => Ok(SignatureType::ByRef(Box::new(self.decode_type()?))),
            ELEMENT_TYPE::PINNED => Ok(SignatureType::Pinned(Box::new(self.decode_type()?))),
            ELEMENT_TYPE::SZARRAY => Ok(SignatureType::SzArray(Box::new(self.decode_type()?))),
            ELEMENT_TYPE::VALUETYPE => Ok(SignatureType::ValueType(self.resolve_token()?)),
            ELEMENT_TYPE::CLASS => Ok(SignatureType::Class(self.resolve_token()?)),
            ELEMENT_TYPE::ARRAY => {
                let element = self.decode_type()?;
                let rank = self.parser.read_compressed_uint()?;
                if rank == 0 {
                    return Err(malformed_error!("ARRAY - rank must not be 0"));
                }

                let num_sizes = self.parser.read_compressed_uint()?;
                if num_sizes > rank {
                    return Err(malformed_error!(
                        "ARRAY - {} sizes for rank {}",
                        num_sizes,
                        rank
                    ));
                }
                let mut sizes = Vec::with_capacity(num_sizes as usize);
                for _ in 0..num_sizes {
                    sizes.push(self.parser.read_compressed_uint()?);
                }

                let num_lo_bounds = self.parser.read_compressed_uint()?;
                if num_lo_bounds > rank {
                    return Err(malformed_error!(
                        "ARRAY - {} lower bounds for rank {}",
                        num_lo_bounds,
                        rank
                    ));
                }
                let mut lower_bounds = Vec::with_capacity(num_lo_bounds as usize);
                for _ in 0..num_lo_bounds {
                    lower_bounds.push(self.parser.read_compressed_int()?);
                }

                Ok(SignatureType::Array(SignatureArray {
                    element: Box::new(element),
                    rank,
                    sizes,
                    lower_bounds,
                }))
            }
            ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
                let modifier = self.resolve_token()?;
                let element = self.decode_type()?;
                Ok(SignatureType::Modified {
                    required: current_byte == ELEMENT_TYPE::CMOD_REQD,
                    modifier,
                    element: Box::new(element),
                })
            }
            ELEMENT_TYPE::SENTINEL => Ok(SignatureType::Sentinel(Box::new(self.decode_type()?))),
            ELEMENT_TYPE::FNPTR => Ok(SignatureType::FnPtr(Box::new(self.decode_method()?))),
            ELEMENT_TYPE::VAR => Err(not_supported_error!(
                "generic element type VAR (0x{:02x})",
                current_byte
            )),
            ELEMENT_TYPE::MVAR => Err(not_supported_error!(
                "generic element type MVAR (0x{:02x})",
                current_byte
            )),
            ELEMENT_TYPE::GENERICINST => Err(not_supported_error!(
                "generic element type GENERICINST (0x{:02x})",
                current_byte
            )),
            _ => Err(malformed_error!(
                "Unsupported ELEMENT_TYPE - 0x{:02x}",
                current_byte
            )),
        }
    }

    fn resolve_token(&mut self) -> Result<T> {
        let token = self.parser.read_compressed_token()?;
        (self.resolver)(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn raw(data: &[u8]) -> SignatureDecoder<'_, Token, fn(Token) -> Result<Token>> {
        SignatureDecoder::new(data, Ok)
    }

    #[test]
    fn test_decode_primitive_types() {
        let test_cases = [
            (vec![0x01], SignatureType::Void),
            (vec![0x02], SignatureType::Primitive(PrimitiveKind::Boolean)),
            (vec![0x03], SignatureType::Primitive(PrimitiveKind::Char)),
            (vec![0x04], SignatureType::Primitive(PrimitiveKind::I1)),
            (vec![0x05], SignatureType::Primitive(PrimitiveKind::U1)),
            (vec![0x06], SignatureType::Primitive(PrimitiveKind::I2)),
            (vec![0x07], SignatureType::Primitive(PrimitiveKind::U2)),
            (vec![0x08], SignatureType::Primitive(PrimitiveKind::I4)),
            (vec![0x09], SignatureType::Primitive(PrimitiveKind::U4)),
            (vec![0x0A], SignatureType::Primitive(PrimitiveKind::I8)),
            (vec![0x0B], SignatureType::Primitive(PrimitiveKind::U8)),
            (vec![0x0C], SignatureType::Primitive(PrimitiveKind::R4)),
            (vec![0x0D], SignatureType::Primitive(PrimitiveKind::R8)),
            (vec![0x0E], SignatureType::Primitive(PrimitiveKind::String)),
            (vec![0x16], SignatureType::Primitive(PrimitiveKind::TypedReference)),
            (vec![0x18], SignatureType::Primitive(PrimitiveKind::I)),
            (vec![0x19], SignatureType::Primitive(PrimitiveKind::U)),
            (vec![0x1C], SignatureType::Primitive(PrimitiveKind::Object)),
        ];

        for (bytes, expected_type) in test_cases {
            let result = raw(&bytes).decode_type().unwrap();
            assert_eq!(result, expected_type, "Failed for input: {:X?}", bytes);
        }
    }

    #[test]
    fn test_decode_class_and_valuetype() {
        assert_eq!(
            raw(&[0x12, 0x42]).decode_type().unwrap(),
            SignatureType::Class(Token::new(0x1B00_0010))
        );
        assert_eq!(
            raw(&[0x11, 0x35]).decode_type().unwrap(),
            SignatureType::ValueType(Token::new(0x0100_000D))
        );
    }

    #[test]
    fn test_decode_arrays() {
        assert_eq!(
            raw(&[0x1D, 0x08]).decode_type().unwrap(),
            SignatureType::SzArray(Box::new(SignatureType::Primitive(PrimitiveKind::I4)))
        );

        // int[2,3] with lower bounds -1 and 0
        let result = raw(&[0x14, 0x08, 0x02, 0x02, 0x02, 0x03, 0x02, 0x03, 0x00])
            .decode_type()
            .unwrap();
        let SignatureType::Array(array) = result else {
            panic!("Expected general array");
        };
        assert_eq!(array.rank, 2);
        assert_eq!(array.sizes, vec![2, 3]);
        assert_eq!(array.lower_bounds, vec![-1, 0]);
    }

    #[test]
    fn test_decode_array_rank_checks() {
        assert!(matches!(
            raw(&[0x14, 0x08, 0x00, 0x00, 0x00]).decode_type(),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            raw(&[0x14, 0x08, 0x01, 0x02, 0x01, 0x01, 0x00]).decode_type(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_nested_modifiers() {
        // int32 modopt(TypeRef 1) modreq(TypeRef 2)
        let result = raw(&[0x1F, 0x09, 0x20, 0x05, 0x08]).decode_type().unwrap();
        let SignatureType::Modified {
            required,
            modifier,
            element,
        } = result
        else {
            panic!("Expected modifier");
        };
        assert!(required);
        assert_eq!(modifier, Token::new(0x0100_0002));
        assert!(matches!(
            *element,
            SignatureType::Modified {
                required: false,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_vararg_call_site() {
        // vararg void (int32, ..., string)
        let signature = raw(&[0x05, 0x02, 0x01, 0x08, 0x41, 0x0E])
            .decode_method()
            .unwrap();
        assert_eq!(signature.convention, CallingConvention::VarArg);
        assert_eq!(signature.param_count(), 2);
        assert_eq!(signature.sentinel_index(), Some(1));
        assert_eq!(
            signature.params[1],
            SignatureType::Sentinel(Box::new(SignatureType::Primitive(PrimitiveKind::String)))
        );
    }

    #[test]
    fn test_decode_method_header_flags() {
        // instance explicit generic<1> void (object)
        let signature = raw(&[0x70, 0x01, 0x01, 0x01, 0x1C]).decode_method().unwrap();
        assert!(signature.has_this);
        assert!(signature.explicit_this);
        assert_eq!(signature.generic_param_count, 1);
        assert_eq!(signature.header(), 0x70);

        let signature = raw(&[0x09, 0x00, 0x01]).decode_method().unwrap();
        assert_eq!(signature.convention, CallingConvention::Unmanaged);
        assert!(signature.convention.is_unmanaged());

        assert!(matches!(
            raw(&[0x0B, 0x00, 0x01]).decode_method(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_function_pointer() {
        // method int32 *(float64)
        let result = raw(&[0x1B, 0x00, 0x01, 0x08, 0x0D]).decode_type().unwrap();
        let SignatureType::FnPtr(method) = result else {
            panic!("Expected function pointer");
        };
        assert_eq!(method.return_type, SignatureType::Primitive(PrimitiveKind::I4));
        assert_eq!(method.params, vec![SignatureType::Primitive(PrimitiveKind::R8)]);
    }

    #[test]
    fn test_generic_elements_not_supported() {
        for (bytes, name) in [
            (vec![0x13, 0x00], "VAR"),
            (vec![0x1E, 0x00], "MVAR"),
            (vec![0x15, 0x12, 0x05, 0x01, 0x08], "GENERICINST"),
        ] {
            match raw(&bytes).decode_type() {
                Err(Error::NotSupported(message)) => assert!(message.contains(name)),
                other => panic!("Expected NotSupported for {name}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_recursion_limit() {
        let mut data = vec![0x0F; MAX_RECURSION_DEPTH + 1];
        data.push(0x08);
        assert!(matches!(
            raw(&data).decode_type(),
            Err(Error::RecursionLimit(MAX_RECURSION_DEPTH))
        ));
    }

    #[test]
    fn test_resolver_errors_propagate() {
        let mut decoder = SignatureDecoder::new(&[0x06, 0x12, 0x05], |token: Token| {
            Err::<(), _>(Error::MemberMissing(token))
        });
        assert!(matches!(
            decoder.decode_field(),
            Err(Error::MemberMissing(token)) if token.value() == 0x0100_0001
        ));
    }
}
