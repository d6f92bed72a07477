//! Signature blob decoding (ECMA-335 II.23.2).
//!
//! Signature blobs describe method, field and local variable types in a compact,
//! prefix-encoded form. Lengths and counts use the compressed integer encoding of
//! [`crate::file::parser::Parser`]; named types appear as `TypeDefOrRefOrSpecEncoded` tokens
//! which this module hands to a caller-supplied resolver.
//!
//! # Supported element types
//!
//! All primitive element types, `CLASS`, `VALUETYPE`, `PTR`, `BYREF`, `PINNED`, `SZARRAY`,
//! `ARRAY` with optional sizes and lower bounds, `CMOD_REQD`/`CMOD_OPT` (nesting preserved),
//! `SENTINEL` and `FNPTR`. The generic element types `VAR`, `MVAR` and `GENERICINST` are
//! reported as [`crate::Error::NotSupported`].
//!
//! # Examples
//!
//! ```rust
//! use cilgraft::metadata::signatures::{decode_method_signature, SignatureType};
//! use cilgraft::metadata::token::Token;
//!
//! // instance int32 (int32, int32)
//! let signature = decode_method_signature(&[0x20, 0x02, 0x08, 0x08, 0x08], |token: Token| Ok(token))?;
//! assert!(signature.has_this);
//! assert_eq!(signature.param_count(), 2);
//! # Ok::<(), cilgraft::Error>(())
//! ```

mod parser;
mod types;

pub use parser::*;
pub use types::*;

use crate::{metadata::token::Token, Result};

/// Decode any signature blob, dispatching on its header byte.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] for generic element types, property signatures and
/// method instantiation blobs, [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`]
/// for damaged data, and any error produced by `resolver`.
pub fn decode_signature<T, F>(data: &[u8], resolver: F) -> Result<Signature<T>>
where
    F: FnMut(Token) -> Result<T>,
{
    SignatureDecoder::new(data, resolver).decode()
}

/// Decode a method or stand-alone call-site signature.
///
/// # Errors
/// See [`decode_signature`].
pub fn decode_method_signature<T, F>(data: &[u8], resolver: F) -> Result<MethodSignature<T>>
where
    F: FnMut(Token) -> Result<T>,
{
    SignatureDecoder::new(data, resolver).decode_method()
}

/// Decode a field signature, returning the field type.
///
/// # Errors
/// See [`decode_signature`].
pub fn decode_field_signature<T, F>(data: &[u8], resolver: F) -> Result<SignatureType<T>>
where
    F: FnMut(Token) -> Result<T>,
{
    SignatureDecoder::new(data, resolver).decode_field()
}

/// Decode a local variable signature.
///
/// # Errors
/// See [`decode_signature`].
pub fn decode_local_signature<T, F>(data: &[u8], resolver: F) -> Result<Vec<LocalVariable<T>>>
where
    F: FnMut(Token) -> Result<T>,
{
    SignatureDecoder::new(data, resolver).decode_locals()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::PrimitiveKind;

    #[test]
    fn test_decode_signature_dispatch() {
        let field = decode_signature(&[0x06, 0x0E], |token: Token| Ok(token)).unwrap();
        assert_eq!(
            field,
            Signature::Field(SignatureType::Primitive(PrimitiveKind::String))
        );

        let method = decode_signature(&[0x00, 0x00, 0x01], |token: Token| Ok(token)).unwrap();
        assert!(matches!(method, Signature::Method(m) if m.params.is_empty()));

        assert!(matches!(
            decode_signature(&[0x28, 0x00, 0x08], |token: Token| Ok(token)),
            Err(crate::Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_decode_local_signature() {
        // locals (int32, pinned uint8&, class TypeRef 1)
        let locals = decode_local_signature(
            &[0x07, 0x03, 0x08, 0x45, 0x10, 0x05, 0x12, 0x05],
            |token: Token| Ok(token.row()),
        )
        .unwrap();

        assert_eq!(locals.len(), 3);
        assert!(!locals[0].pinned);
        assert!(locals[1].pinned);
        assert_eq!(
            locals[1].ty,
            SignatureType::ByRef(Box::new(SignatureType::Primitive(PrimitiveKind::U1)))
        );
        assert_eq!(locals[2].ty, SignatureType::Class(1));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(decode_method_signature(&[0x00, 0x02, 0x01, 0x08], |token: Token| Ok(token)).is_err());
        assert!(decode_field_signature(&[0x07, 0x08], |token: Token| Ok(token)).is_err());
    }
}
