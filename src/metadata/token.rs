//! Metadata tokens as they appear inside CIL operands and signature blobs.
//!
//! A token is a 32-bit value whose high byte names a metadata table and whose low 24 bits are a
//! 1-based row index into that table. Tokens are scoped to the module that defines the table:
//! the same value means different things in different modules, which is why every token lookup
//! in this crate goes through a [`crate::live::LiveModule`].

use std::fmt;

use strum::{Display, EnumIter, IntoEnumIterator};

/// The metadata tables a CIL operand token may point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u8)]
pub enum TokenKind {
    /// `TypeRef` table (0x01)
    TypeRef = 0x01,
    /// `TypeDef` table (0x02)
    TypeDef = 0x02,
    /// `Field` table (0x04)
    Field = 0x04,
    /// `MethodDef` table (0x06)
    MethodDef = 0x06,
    /// `MemberRef` table (0x0A), a field or method reference
    MemberRef = 0x0A,
    /// `StandAloneSig` table (0x11), locals and call-site signatures
    StandAloneSig = 0x11,
    /// `Event` table (0x14)
    Event = 0x14,
    /// `Property` table (0x17)
    Property = 0x17,
    /// `ModuleRef` table (0x1A)
    ModuleRef = 0x1A,
    /// `TypeSpec` table (0x1B)
    TypeSpec = 0x1B,
    /// `Assembly` table (0x20)
    Assembly = 0x20,
    /// `AssemblyRef` table (0x23)
    AssemblyRef = 0x23,
    /// `GenericParam` table (0x2A)
    GenericParam = 0x2A,
    /// `MethodSpec` table (0x2B)
    MethodSpec = 0x2B,
    /// User string heap (0x70), the operand of `ldstr`
    UserString = 0x70,
}

impl TokenKind {
    /// Look up the kind for a raw table byte.
    #[must_use]
    pub fn from_table(table: u8) -> Option<TokenKind> {
        TokenKind::iter().find(|kind| *kind as u8 == table)
    }

    /// Whether a token of this kind names a type.
    #[must_use]
    pub fn is_type(self) -> bool {
        matches!(
            self,
            TokenKind::TypeRef | TokenKind::TypeDef | TokenKind::TypeSpec
        )
    }

    /// Whether a token of this kind names a method or something that may be one.
    #[must_use]
    pub fn is_method(self) -> bool {
        matches!(
            self,
            TokenKind::MethodDef | TokenKind::MemberRef | TokenKind::MethodSpec
        )
    }
}

/// A metadata token: table byte plus 24-bit row index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Create a new token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Build a token from a table kind and a row.
    #[must_use]
    pub fn from_parts(kind: TokenKind, row: u32) -> Self {
        Token((u32::from(kind as u8) << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw 32-bit value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table byte.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The table kind, if the table byte is one a CIL operand may reference.
    #[must_use]
    pub fn kind(&self) -> Option<TokenKind> {
        TokenKind::from_table(self.table())
    }

    /// The 1-based row index.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row() == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
