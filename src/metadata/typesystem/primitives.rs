use strum::{EnumIter, IntoEnumIterator};

use crate::metadata::typesystem::ELEMENT_TYPE;

/// The built-in types that have a dedicated element type byte.
///
/// Every variant lives in the `System` namespace of the core library. The importer maps these
/// to [`crate::document::TypeReference::Primitive`] without touching the resolution caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum PrimitiveKind {
    /// System.Void - represents no value
    Void,
    /// System.Boolean - true/false value
    Boolean,
    /// System.Char - Unicode 16-bit character
    Char,
    /// System.SByte - signed 8-bit integer
    I1,
    /// System.Byte - unsigned 8-bit integer
    U1,
    /// System.Int16 - signed 16-bit integer
    I2,
    /// System.UInt16 - unsigned 16-bit integer
    U2,
    /// System.Int32 - signed 32-bit integer
    I4,
    /// System.UInt32 - unsigned 32-bit integer
    U4,
    /// System.Int64 - signed 64-bit integer
    I8,
    /// System.UInt64 - unsigned 64-bit integer
    U8,
    /// System.Single - 32-bit floating point
    R4,
    /// System.Double - 64-bit floating point
    R8,
    /// System.IntPtr - native sized signed integer
    I,
    /// System.UIntPtr - native sized unsigned integer
    U,
    /// System.Object - base class for all reference types
    Object,
    /// System.String - immutable string of Unicode characters
    String,
    /// System.TypedReference - type-safe pointer (used by compiler)
    TypedReference,
}

impl PrimitiveKind {
    /// The element type byte used for this primitive in signature blobs.
    #[must_use]
    pub fn element_type(self) -> u8 {
        match self {
            PrimitiveKind::Void => ELEMENT_TYPE::VOID,
            PrimitiveKind::Boolean => ELEMENT_TYPE::BOOLEAN,
            PrimitiveKind::Char => ELEMENT_TYPE::CHAR,
            PrimitiveKind::I1 => ELEMENT_TYPE::I1,
            PrimitiveKind::U1 => ELEMENT_TYPE::U1,
            PrimitiveKind::I2 => ELEMENT_TYPE::I2,
            PrimitiveKind::U2 => ELEMENT_TYPE::U2,
            PrimitiveKind::I4 => ELEMENT_TYPE::I4,
            PrimitiveKind::U4 => ELEMENT_TYPE::U4,
            PrimitiveKind::I8 => ELEMENT_TYPE::I8,
            PrimitiveKind::U8 => ELEMENT_TYPE::U8,
            PrimitiveKind::R4 => ELEMENT_TYPE::R4,
            PrimitiveKind::R8 => ELEMENT_TYPE::R8,
            PrimitiveKind::I => ELEMENT_TYPE::I,
            PrimitiveKind::U => ELEMENT_TYPE::U,
            PrimitiveKind::Object => ELEMENT_TYPE::OBJECT,
            PrimitiveKind::String => ELEMENT_TYPE::STRING,
            PrimitiveKind::TypedReference => ELEMENT_TYPE::TYPEDBYREF,
        }
    }

    /// Look up the primitive for an element type byte.
    #[must_use]
    pub fn from_element_type(element_type: u8) -> Option<PrimitiveKind> {
        PrimitiveKind::iter().find(|kind| kind.element_type() == element_type)
    }

    /// Namespace of every primitive.
    #[must_use]
    pub fn namespace(self) -> &'static str {
        "System"
    }

    /// The simple type name, e.g. `Int32`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "Void",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::I1 => "SByte",
            PrimitiveKind::U1 => "Byte",
            PrimitiveKind::I2 => "Int16",
            PrimitiveKind::U2 => "UInt16",
            PrimitiveKind::I4 => "Int32",
            PrimitiveKind::U4 => "UInt32",
            PrimitiveKind::I8 => "Int64",
            PrimitiveKind::U8 => "UInt64",
            PrimitiveKind::R4 => "Single",
            PrimitiveKind::R8 => "Double",
            PrimitiveKind::I => "IntPtr",
            PrimitiveKind::U => "UIntPtr",
            PrimitiveKind::Object => "Object",
            PrimitiveKind::String => "String",
            PrimitiveKind::TypedReference => "TypedReference",
        }
    }

    /// The namespace-qualified name, e.g. `System.Int32`.
    #[must_use]
    pub fn full_name(self) -> String {
        format!("{}.{}", self.namespace(), self.name())
    }

    /// Look up a primitive by namespace and simple name.
    #[must_use]
    pub fn from_name(namespace: &str, name: &str) -> Option<PrimitiveKind> {
        if namespace != "System" {
            return None;
        }
        PrimitiveKind::iter().find(|kind| kind.name() == name)
    }

    /// Whether the runtime treats this primitive as a value type.
    #[must_use]
    pub fn is_value_type(self) -> bool {
        !matches!(self, PrimitiveKind::Object | PrimitiveKind::String)
    }
}

impl std::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "System.{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_table_is_bijective() {
        for kind in PrimitiveKind::iter() {
            assert_eq!(
                PrimitiveKind::from_element_type(kind.element_type()),
                Some(kind)
            );
            assert_eq!(PrimitiveKind::from_name("System", kind.name()), Some(kind));
        }

        assert_eq!(PrimitiveKind::from_element_type(ELEMENT_TYPE::CLASS), None);
        assert_eq!(PrimitiveKind::from_element_type(ELEMENT_TYPE::VAR), None);
    }

    #[test]
    fn names() {
        assert_eq!(PrimitiveKind::I4.full_name(), "System.Int32");
        assert_eq!(PrimitiveKind::U.to_string(), "System.UIntPtr");
        assert_eq!(PrimitiveKind::from_name("Other", "Int32"), None);
        assert!(PrimitiveKind::TypedReference.is_value_type());
        assert!(!PrimitiveKind::String.is_value_type());
    }
}
