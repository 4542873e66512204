//! Value types of the Mug type system
//!
//! [`MugValueType`] is a closed sum type with one payload per variant. Equality is structural for
//! primitives, pointers, arrays and function types, and by declaration identity for structs and
//! enums: two syntactically identical `type` declarations are distinct types.

use std::fmt;
use std::rc::Rc;

use mug_syntax::ast::{PrimitiveType, Span};

use crate::backend::module::IrType;

/// Identity of a struct or enum declaration, unique across every unit of a compilation session.
pub type DeclId = usize;

#[derive(Debug, Clone)]
pub enum MugValueType {
    Bool,
    Int8,
    Int32,
    Int64,
    Char,
    Void,
    String,
    Unknown,
    Pointer(Box<MugValueType>),
    Array(Box<MugValueType>),
    Struct(Rc<StructInfo>),
    Enum(Rc<EnumInfo>),
    Function(Vec<MugValueType>, Box<MugValueType>),
}

/// Shape of a declared struct.
#[derive(Debug)]
pub struct StructInfo {
    pub id: DeclId,
    pub name: String,
    pub field_names: Vec<String>,
    pub field_types: Vec<MugValueType>,
    pub field_positions: Vec<Span>,
}

impl StructInfo {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }

    /// Backend name of the struct type.
    pub fn ir_name(&self) -> String {
        format!("{}.{}", self.name, self.id)
    }
}

/// An enum (or error set) over a primitive base type.
#[derive(Debug)]
pub struct EnumInfo {
    pub id: DeclId,
    pub name: String,
    pub base: MugValueType,
    pub members: Vec<(String, i64)>,
    pub is_error_set: bool,
}

impl EnumInfo {
    pub fn member(&self, name: &str) -> Option<i64> {
        self.members.iter().find(|(m, _)| m == name).map(|(_, v)| *v)
    }
}

impl PartialEq for MugValueType {
    fn eq(&self, other: &Self) -> bool {
        use MugValueType::*;
        match (self, other) {
            (Bool, Bool)
            | (Int8, Int8)
            | (Int32, Int32)
            | (Int64, Int64)
            | (Char, Char)
            | (Void, Void)
            | (String, String)
            | (Unknown, Unknown) => true,
            (Pointer(a), Pointer(b)) | (Array(a), Array(b)) => a == b,
            (Struct(a), Struct(b)) => a.id == b.id,
            (Enum(a), Enum(b)) => a.id == b.id,
            (Function(pa, ra), Function(pb, rb)) => pa == pb && ra == rb,
            _ => false,
        }
    }
}

impl Eq for MugValueType {}

impl MugValueType {
    pub fn from_primitive(primitive: PrimitiveType) -> Self {
        match primitive {
            PrimitiveType::Str => MugValueType::String,
            PrimitiveType::Chr => MugValueType::Char,
            PrimitiveType::U1 => MugValueType::Bool,
            PrimitiveType::U8 => MugValueType::Int8,
            // sign is not tracked
            PrimitiveType::I32 | PrimitiveType::U32 => MugValueType::Int32,
            PrimitiveType::I64 | PrimitiveType::U64 => MugValueType::Int64,
            PrimitiveType::Void => MugValueType::Void,
            PrimitiveType::Unknown => MugValueType::Unknown,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, MugValueType::Int8 | MugValueType::Int32 | MugValueType::Int64)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, MugValueType::Void)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, MugValueType::Bool)
    }

    /// Types that compile to a single scalar register (integers, chars, bools, enums).
    pub fn is_scalar(&self) -> bool {
        self.is_int() || matches!(self, MugValueType::Bool | MugValueType::Char | MugValueType::Enum(_))
    }

    /// Bit width of integer-like types.
    pub fn int_width(&self) -> Option<u32> {
        match self {
            MugValueType::Bool => Some(1),
            MugValueType::Int8 | MugValueType::Char => Some(8),
            MugValueType::Int32 => Some(32),
            MugValueType::Int64 => Some(64),
            MugValueType::Enum(info) => info.base.int_width(),
            _ => None,
        }
    }

    /// Element type of indexable values: arrays and strings.
    pub fn element_type(&self) -> Option<MugValueType> {
        match self {
            MugValueType::Array(elem) => Some((**elem).clone()),
            MugValueType::String => Some(MugValueType::Char),
            _ => None,
        }
    }

    pub fn pointee(&self) -> Option<&MugValueType> {
        match self {
            MugValueType::Pointer(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Rc<StructInfo>> {
        match self {
            MugValueType::Struct(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&Rc<EnumInfo>> {
        match self {
            MugValueType::Enum(info) => Some(info),
            _ => None,
        }
    }

    /// Lowered representation in the backend module.
    pub fn ir_type(&self) -> IrType {
        match self {
            MugValueType::Bool => IrType::Int(1),
            MugValueType::Int8 | MugValueType::Char => IrType::Int(8),
            MugValueType::Int32 => IrType::Int(32),
            MugValueType::Int64 => IrType::Int(64),
            MugValueType::Void => IrType::Void,
            MugValueType::String | MugValueType::Unknown => IrType::Pointer(Box::new(IrType::Int(8))),
            MugValueType::Pointer(elem) | MugValueType::Array(elem) => IrType::Pointer(Box::new(elem.ir_type())),
            MugValueType::Struct(info) => IrType::Named(info.ir_name()),
            MugValueType::Enum(info) => info.base.ir_type(),
            MugValueType::Function(params, ret) => IrType::Pointer(Box::new(IrType::Function(
                params.iter().map(MugValueType::ir_type).collect(),
                Box::new(ret.ir_type()),
            ))),
        }
    }
}

impl fmt::Display for MugValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MugValueType::Bool => write!(f, "u1"),
            MugValueType::Int8 => write!(f, "u8"),
            MugValueType::Int32 => write!(f, "i32"),
            MugValueType::Int64 => write!(f, "i64"),
            MugValueType::Char => write!(f, "chr"),
            MugValueType::Void => write!(f, "void"),
            MugValueType::String => write!(f, "str"),
            MugValueType::Unknown => write!(f, "unknown"),
            MugValueType::Pointer(elem) => write!(f, "*{}", elem),
            MugValueType::Array(elem) => write!(f, "[{}]", elem),
            MugValueType::Struct(info) => write!(f, "{}", info.name),
            MugValueType::Enum(info) => write!(f, "{}", info.name),
            MugValueType::Function(params, ret) => {
                write!(f, "func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, "): {}", ret)
            }
        }
    }
}

/// Join types as `a, b, c` for mangled names and diagnostics.
pub fn join_types(types: &[MugValueType]) -> String {
    types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: DeclId) -> MugValueType {
        MugValueType::Struct(Rc::new(StructInfo {
            id,
            name: "Point".to_string(),
            field_names: vec!["x".to_string(), "y".to_string()],
            field_types: vec![MugValueType::Int32, MugValueType::Int32],
            field_positions: vec![Span::new(0, 1), Span::new(2, 3)],
        }))
    }

    #[test]
    fn test_primitives_compare_structurally() {
        assert_eq!(MugValueType::Int32, MugValueType::Int32);
        assert_ne!(MugValueType::Int32, MugValueType::Int64);
        assert_eq!(
            MugValueType::Pointer(Box::new(MugValueType::Char)),
            MugValueType::Pointer(Box::new(MugValueType::Char))
        );
        assert_ne!(
            MugValueType::Array(Box::new(MugValueType::Char)),
            MugValueType::Pointer(Box::new(MugValueType::Char))
        );
    }

    #[test]
    fn test_function_types_compare_structurally() {
        let a = MugValueType::Function(vec![MugValueType::Int32], Box::new(MugValueType::Bool));
        let b = MugValueType::Function(vec![MugValueType::Int32], Box::new(MugValueType::Bool));
        let c = MugValueType::Function(vec![MugValueType::Int64], Box::new(MugValueType::Bool));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_identical_structs_are_distinct_types() {
        assert_eq!(point(1), point(1));
        assert_ne!(point(1), point(2));
        assert_eq!(
            MugValueType::Pointer(Box::new(point(1))),
            MugValueType::Pointer(Box::new(point(1)))
        );
    }

    #[test]
    fn test_u32_maps_to_int32() {
        assert_eq!(MugValueType::from_primitive(PrimitiveType::U32), MugValueType::Int32);
        assert_eq!(MugValueType::from_primitive(PrimitiveType::U1), MugValueType::Bool);
    }

    #[test]
    fn test_display() {
        let func = MugValueType::Function(
            vec![MugValueType::String, MugValueType::Array(Box::new(MugValueType::Int8))],
            Box::new(MugValueType::Pointer(Box::new(point(0)))),
        );
        assert_eq!(func.to_string(), "func(str, [u8]): *Point");
        assert_eq!(MugValueType::Bool.to_string(), "u1");
    }

    #[test]
    fn test_ir_lowering() {
        assert_eq!(MugValueType::String.ir_type().to_string(), "i8*");
        assert_eq!(point(3).ir_type().to_string(), "%\"Point.3\"");
        assert_eq!(MugValueType::Array(Box::new(MugValueType::Int64)).ir_type().to_string(), "i64*");
    }
}
