//! Little-endian primitive reads over raw byte buffers.
//!
//! CIL instruction streams and signature blobs are always little-endian, so unlike a full PE
//! reader only the little-endian direction is provided. All reads are bounds checked and
//! report [`crate::Error::OutOfBounds`] instead of panicking.
//!
//! # Examples
//!
//! ```rust,ignore
//! use cilgraft::file::io::read_le_at;
//!
//! let data = [0x01, 0x00, 0x02, 0x00];
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 1);
//! assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 2);
//! assert_eq!(offset, 4);
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be decoded from a little-endian byte array.
///
/// Implemented for every fixed-width operand type found in CIL opcodes: the signed and unsigned
/// integers from 8 to 64 bits and both IEEE floating point widths.
pub trait CilIO: Sized {
    /// Byte array representation of this type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes left.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_le_primitives() {
        let data = [0xFE, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x80, 0x3F];
        let mut offset = 0;

        assert_eq!(read_le_at::<i32>(&data, &mut offset).unwrap(), -2);
        assert_eq!(read_le_at::<f32>(&data, &mut offset).unwrap(), 1.0);
        assert_eq!(offset, 8);
    }

    #[test]
    fn read_le_out_of_bounds() {
        let data = [0x01, 0x02, 0x03];
        let mut offset = 1;

        assert!(matches!(
            read_le_at::<u32>(&data, &mut offset),
            Err(OutOfBounds)
        ));
        assert_eq!(offset, 1);
        assert_eq!(read_le::<u16>(&data).unwrap(), 0x0201);
    }
}
