//! Attribute flags shared by both metadata views.
//!
//! The values follow ECMA-335 II.23.1. The live view reports them as the runtime exposes them;
//! the document model stores them verbatim so they survive a transplant and relink unchanged.

use bitflags::bitflags;

/// Bitmask for member access extraction
pub const MEMBER_ACCESS_MASK: u32 = 0x0007;

bitflags! {
    /// `TypeAttributes` (II.23.1.15), limited to what identity matching needs
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeAttributes: u32 {
        /// Visible outside the assembly
        const PUBLIC = 0x0000_0001;
        /// Nested type with public visibility
        const NESTED_PUBLIC = 0x0000_0002;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Name has special meaning to the runtime
        const SPECIAL_NAME = 0x0000_0400;
        /// Initialize the type before first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
        /// Derives from `System.ValueType` or `System.Enum`. Not an ECMA-335 bit, the runtime
        /// derives it from the base type; kept in the reserved range.
        const VALUE_TYPE = 0x8000_0000;
    }
}

bitflags! {
    /// `MethodAttributes` (II.23.1.10)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAttributes: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Implementation is forwarded through `PInvoke`
        const PINVOKE_IMPL = 0x2000;
        /// Runtime should check name encoding
        const RT_SPECIAL_NAME = 0x1000;
    }
}

impl MethodAttributes {
    /// Only the access bits.
    #[must_use]
    pub fn access(self) -> MethodAttributes {
        MethodAttributes::from_bits_truncate(self.bits() & MEMBER_ACCESS_MASK)
    }
}

bitflags! {
    /// `MethodImplAttributes` (II.23.1.11)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodImplAttributes: u32 {
        /// Method impl is native
        const NATIVE = 0x0001;
        /// Method impl is OPTIL
        const OPTIL = 0x0002;
        /// Method impl is provided by the runtime
        const RUNTIME = 0x0003;
        /// Method impl is unmanaged, otherwise managed
        const UNMANAGED = 0x0004;
        /// Method cannot be inlined
        const NO_INLINING = 0x0008;
        /// Method is a synchronized method
        const SYNCHRONIZED = 0x0020;
        /// Signature is exported exactly as declared
        const PRESERVE_SIG = 0x0080;
        /// Implemented inside the runtime
        const INTERNAL_CALL = 0x1000;
    }
}

impl MethodImplAttributes {
    /// Whether the implementation is something other than IL.
    #[must_use]
    pub fn is_native_or_runtime(self) -> bool {
        self.bits() & 0x0003 != 0 || self.contains(MethodImplAttributes::INTERNAL_CALL)
    }
}

bitflags! {
    /// `FieldAttributes` (II.23.1.5)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAttributes: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field can only be initialized
        const INIT_ONLY = 0x0020;
        /// Value is a compile time constant
        const LITERAL = 0x0040;
        /// Field is special
        const SPECIAL_NAME = 0x0200;
    }
}

bitflags! {
    /// `ParamAttributes` (II.23.1.13)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParamAttributes: u16 {
        /// Param is `[In]`
        const IN = 0x0001;
        /// Param is `[Out]`
        const OUT = 0x0002;
        /// Param is optional
        const OPTIONAL = 0x0010;
        /// Param has a default value
        const HAS_DEFAULT = 0x1000;
        /// Param has `FieldMarshal`
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    /// `GenericParamAttributes` (II.23.1.7)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GenericParamAttributes: u16 {
        /// Covariant
        const COVARIANT = 0x0001;
        /// Contravariant
        const CONTRAVARIANT = 0x0002;
        /// `class` constraint
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// `struct` constraint
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// `new()` constraint
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

bitflags! {
    /// Exception handler flags defining the type of exception handling clause (II.25.4.6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}
