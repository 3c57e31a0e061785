//! Primitive dispatch table
//!
//! Reflection-style intrinsics dispatch on the primitive kind of an array's item type.
//! The order and the numbers here are part of the runtime layout: the Wasm backend
//! stores `tag` in class structs and switches on it with `br_table`.

use crate::ir::{ArrayElementType, MethodDescriptor, MethodReference, PrimitiveType, ValueType};

/// How one primitive kind is boxed, unboxed and stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveInfo {
    /// Primitive kind
    pub kind: PrimitiveType,
    /// Boxing class
    pub wrapper: &'static str,
    /// Instance method of `wrapper` returning the primitive value
    pub unbox: &'static str,
    /// Element width in bytes
    pub width: u32,
    /// `log2(width)`
    pub shift: u32,
    /// Runtime kind number
    pub tag: u32,
}

/// One entry per primitive kind, indexed by tag
pub const PRIMITIVES: [PrimitiveInfo; 8] = [
    PrimitiveInfo {
        kind: PrimitiveType::Byte,
        wrapper: "java.lang.Byte",
        unbox: "byteValue",
        width: 1,
        shift: 0,
        tag: 1,
    },
    PrimitiveInfo {
        kind: PrimitiveType::Short,
        wrapper: "java.lang.Short",
        unbox: "shortValue",
        width: 2,
        shift: 1,
        tag: 2,
    },
    PrimitiveInfo {
        kind: PrimitiveType::Char,
        wrapper: "java.lang.Character",
        unbox: "charValue",
        width: 2,
        shift: 1,
        tag: 3,
    },
    PrimitiveInfo {
        kind: PrimitiveType::Int,
        wrapper: "java.lang.Integer",
        unbox: "intValue",
        width: 4,
        shift: 2,
        tag: 4,
    },
    PrimitiveInfo {
        kind: PrimitiveType::Long,
        wrapper: "java.lang.Long",
        unbox: "longValue",
        width: 8,
        shift: 3,
        tag: 5,
    },
    PrimitiveInfo {
        kind: PrimitiveType::Float,
        wrapper: "java.lang.Float",
        unbox: "floatValue",
        width: 4,
        shift: 2,
        tag: 6,
    },
    PrimitiveInfo {
        kind: PrimitiveType::Double,
        wrapper: "java.lang.Double",
        unbox: "doubleValue",
        width: 8,
        shift: 3,
        tag: 7,
    },
    PrimitiveInfo {
        kind: PrimitiveType::Boolean,
        wrapper: "java.lang.Boolean",
        unbox: "booleanValue",
        width: 1,
        shift: 0,
        tag: 0,
    },
];

/// Largest tag in the table
pub const MAX_PRIMITIVE_TAG: u32 = 7;

impl PrimitiveInfo {
    /// Entry for `kind`
    pub fn of(kind: PrimitiveType) -> &'static PrimitiveInfo {
        let index = match kind {
            PrimitiveType::Byte => 0,
            PrimitiveType::Short => 1,
            PrimitiveType::Char => 2,
            PrimitiveType::Int => 3,
            PrimitiveType::Long => 4,
            PrimitiveType::Float => 5,
            PrimitiveType::Double => 6,
            PrimitiveType::Boolean => 7,
        };
        &PRIMITIVES[index]
    }

    /// Entry with runtime kind number `tag`
    pub fn by_tag(tag: u32) -> Option<&'static PrimitiveInfo> {
        PRIMITIVES.iter().find(|info| info.tag == tag)
    }

    /// The primitive as a value type
    pub fn value_type(&self) -> ValueType {
        ValueType::Primitive(self.kind)
    }

    /// `Wrapper.valueOf(p)Wrapper`
    pub fn box_method(&self) -> MethodReference {
        MethodReference::new(
            self.wrapper,
            MethodDescriptor::new("valueOf", vec![self.value_type()], ValueType::object(self.wrapper)),
        )
    }

    /// `Wrapper.xxxValue()p`
    pub fn unbox_method(&self) -> MethodReference {
        MethodReference::new(self.wrapper, MethodDescriptor::new(self.unbox, Vec::new(), self.value_type()))
    }

    /// Representation used by array element instructions
    pub fn element_type(&self) -> ArrayElementType {
        match self.kind {
            PrimitiveType::Boolean | PrimitiveType::Byte => ArrayElementType::Byte,
            PrimitiveType::Short => ArrayElementType::Short,
            PrimitiveType::Char => ArrayElementType::Char,
            PrimitiveType::Int => ArrayElementType::Int,
            PrimitiveType::Long => ArrayElementType::Long,
            PrimitiveType::Float => ArrayElementType::Float,
            PrimitiveType::Double => ArrayElementType::Double,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_is_fixed() {
        let kinds: Vec<&str> = PRIMITIVES.iter().map(|p| p.kind.name()).collect();
        assert_eq!(kinds, vec!["byte", "short", "char", "int", "long", "float", "double", "boolean"]);
    }

    #[test]
    fn test_width_matches_shift() {
        for info in &PRIMITIVES {
            assert_eq!(1 << info.shift, info.width, "{}", info.kind.name());
        }
    }

    #[test]
    fn test_tags_are_unique() {
        for tag in 0..=MAX_PRIMITIVE_TAG {
            assert!(PrimitiveInfo::by_tag(tag).is_some());
        }
        assert!(PrimitiveInfo::by_tag(MAX_PRIMITIVE_TAG + 1).is_none());
        assert_eq!(PrimitiveInfo::by_tag(0).map(|p| p.kind), Some(PrimitiveType::Boolean));
    }

    #[test]
    fn test_box_and_unbox_methods() {
        let int = PrimitiveInfo::of(PrimitiveType::Int);
        assert_eq!(int.box_method().to_string(), "java.lang.Integer.valueOf(I)Ljava/lang/Integer;");
        assert_eq!(int.unbox_method().to_string(), "java.lang.Integer.intValue()I");
        assert_eq!(PrimitiveInfo::of(PrimitiveType::Boolean).element_type(), ArrayElementType::Byte);
    }
}
