use std::fmt;

use strum::Display;

use crate::metadata::typesystem::PrimitiveKind;

/// A decoded type from a signature blob (II.23.2.12).
///
/// `T` is whatever the caller's token resolver produces for a `TypeDefOrRefOrSpecEncoded`
/// token: a raw [`crate::metadata::token::Token`] for inspection, a
/// [`crate::live::LiveTypeRc`] when decoding against a live module, and so on.
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureType<T> {
    /// `void`, only valid as a return type or pointer target
    Void,
    /// A built-in type with its own element type byte
    Primitive(PrimitiveKind),
    /// A reference type named by token
    Class(T),
    /// A value type named by token
    ValueType(T),
    /// Unmanaged pointer
    Pointer(Box<SignatureType<T>>),
    /// Managed reference
    ByRef(Box<SignatureType<T>>),
    /// Pinned local
    Pinned(Box<SignatureType<T>>),
    /// Single dimensional, zero based array
    SzArray(Box<SignatureType<T>>),
    /// General array with explicit rank
    Array(SignatureArray<T>),
    /// A type carrying a custom modifier. Several modifiers nest in blob order.
    Modified {
        /// `modreq` if true, `modopt` otherwise
        required: bool,
        /// The modifier type
        modifier: T,
        /// The modified type
        element: Box<SignatureType<T>>,
    },
    /// Marks the first variable argument of a vararg call site
    Sentinel(Box<SignatureType<T>>),
    /// Function pointer
    FnPtr(Box<MethodSignature<T>>),
}

/// General array shape (II.23.2.13)
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureArray<T> {
    /// The element type
    pub element: Box<SignatureType<T>>,
    /// Number of dimensions
    pub rank: u32,
    /// Sizes of the leading dimensions that declare one
    pub sizes: Vec<u32>,
    /// Lower bounds of the leading dimensions that declare one
    pub lower_bounds: Vec<i32>,
}

/// Calling convention kind stored in the low nibble of a method signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum CallingConvention {
    /// Managed default
    #[default]
    Default,
    /// Unmanaged `cdecl`
    C,
    /// Unmanaged `stdcall`
    StdCall,
    /// Unmanaged `thiscall`
    ThisCall,
    /// Unmanaged `fastcall`
    FastCall,
    /// Managed variable argument list
    VarArg,
    /// Unmanaged, with the concrete convention given by modifiers on the return type
    Unmanaged,
}

impl CallingConvention {
    /// Decode the low nibble of a signature header.
    #[must_use]
    pub fn from_header(header: u8) -> Option<CallingConvention> {
        match header & 0x0F {
            0x0 => Some(CallingConvention::Default),
            0x1 => Some(CallingConvention::C),
            0x2 => Some(CallingConvention::StdCall),
            0x3 => Some(CallingConvention::ThisCall),
            0x4 => Some(CallingConvention::FastCall),
            0x5 => Some(CallingConvention::VarArg),
            0x9 => Some(CallingConvention::Unmanaged),
            _ => None,
        }
    }

    /// The low nibble encoding this convention.
    #[must_use]
    pub fn header_bits(self) -> u8 {
        match self {
            CallingConvention::Default => 0x0,
            CallingConvention::C => 0x1,
            CallingConvention::StdCall => 0x2,
            CallingConvention::ThisCall => 0x3,
            CallingConvention::FastCall => 0x4,
            CallingConvention::VarArg => 0x5,
            CallingConvention::Unmanaged => 0x9,
        }
    }

    /// Any of the native conventions.
    #[must_use]
    pub fn is_unmanaged(self) -> bool {
        !matches!(self, CallingConvention::Default | CallingConvention::VarArg)
    }
}

/// Method, call-site or function pointer signature (II.23.2.1 - II.23.2.3)
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature<T> {
    /// The calling convention kind
    pub convention: CallingConvention,
    /// Instance method, `this` is passed implicitly
    pub has_this: bool,
    /// `this` is the first entry of `params`
    pub explicit_this: bool,
    /// Number of generic parameters, 0 for non-generic methods
    pub generic_param_count: u32,
    /// The return type
    pub return_type: SignatureType<T>,
    /// All parameters in order. For vararg call sites the first variable argument is wrapped
    /// in [`SignatureType::Sentinel`].
    pub params: Vec<SignatureType<T>>,
}

impl<T> MethodSignature<T> {
    /// Number of parameters, including variable arguments.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Index of the first variable argument, if the signature carries a sentinel.
    #[must_use]
    pub fn sentinel_index(&self) -> Option<usize> {
        self.params
            .iter()
            .position(|param| matches!(param, SignatureType::Sentinel(_)))
    }

    /// Encoded header byte for this signature.
    #[must_use]
    pub fn header(&self) -> u8 {
        let mut header = self.convention.header_bits();
        if self.generic_param_count > 0 {
            header |= 0x10;
        }
        if self.has_this {
            header |= 0x20;
        }
        if self.explicit_this {
            header |= 0x40;
        }
        header
    }
}

/// A local variable entry of a `LocalVarSig` (II.23.2.6)
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable<T> {
    /// The variable type with the pinned constraint removed
    pub ty: SignatureType<T>,
    /// The variable pins the object it refers to
    pub pinned: bool,
}

/// Any top-level signature blob.
#[derive(Debug, Clone, PartialEq)]
pub enum Signature<T> {
    /// `MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig`
    Method(MethodSignature<T>),
    /// `FieldSig`
    Field(SignatureType<T>),
    /// `LocalVarSig`
    Locals(Vec<LocalVariable<T>>),
}

impl<T: fmt::Display> fmt::Display for SignatureType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureType::Void => write!(f, "void"),
            SignatureType::Primitive(kind) => write!(f, "{kind}"),
            SignatureType::Class(ty) => write!(f, "class {ty}"),
            SignatureType::ValueType(ty) => write!(f, "valuetype {ty}"),
            SignatureType::Pointer(element) => write!(f, "{element}*"),
            SignatureType::ByRef(element) => write!(f, "{element}&"),
            SignatureType::Pinned(element) => write!(f, "{element} pinned"),
            SignatureType::SzArray(element) => write!(f, "{element}[]"),
            SignatureType::Array(array) => {
                let commas = ",".repeat(array.rank.saturating_sub(1) as usize);
                write!(f, "{}[{commas}]", array.element)
            }
            SignatureType::Modified {
                required,
                modifier,
                element,
            } => {
                let keyword = if *required { "modreq" } else { "modopt" };
                write!(f, "{element} {keyword}({modifier})")
            }
            SignatureType::Sentinel(element) => write!(f, "..., {element}"),
            SignatureType::FnPtr(method) => {
                write!(f, "method {} *(", method.return_type)?;
                for (index, param) in method.params.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ")")
            }
        }
    }
}
