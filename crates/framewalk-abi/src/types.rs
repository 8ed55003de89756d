//! Value types as the calling conventions see them.
//!
//! Only the properties that decide argument and return placement are
//! modelled: size, class, signedness, and the offsets and types of
//! aggregate members.

use serde::{Deserialize, Serialize};

/// Coarse classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCode {
    Int,
    Pointer,
    Float,
    Struct,
    Union,
    Array,
}

/// A member of a struct or union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Byte offset from the start of the aggregate.
    pub offset: usize,
    /// Member type.
    pub ty: ValueType,
}

impl Field {
    pub fn new(offset: usize, ty: ValueType) -> Self {
        Self { offset, ty }
    }
}

/// Layout of a struct or union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Total size in bytes, including padding.
    pub size: usize,
    /// Members in declaration order.
    pub fields: Vec<Field>,
}

/// The type of an argument or return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueType {
    /// Integer of 1, 2, 4 or 8 bytes.
    Int { size: usize, signed: bool },
    /// Data or code pointer.
    Pointer { size: usize },
    /// Binary floating point of 4, 8 or 16 bytes.
    Float { size: usize },
    Struct(Aggregate),
    Union(Aggregate),
    Array { element: Box<ValueType>, length: usize },
}

impl ValueType {
    /// Signed integer of `size` bytes.
    pub fn int(size: usize) -> Self {
        Self::Int { size, signed: true }
    }

    /// Unsigned integer of `size` bytes.
    pub fn uint(size: usize) -> Self {
        Self::Int { size, signed: false }
    }

    pub fn pointer(size: usize) -> Self {
        Self::Pointer { size }
    }

    pub fn float(size: usize) -> Self {
        Self::Float { size }
    }

    /// Struct with the given size and members.
    pub fn structure(size: usize, fields: Vec<Field>) -> Self {
        Self::Struct(Aggregate { size, fields })
    }

    /// Union with the given size and members, all at offset zero.
    pub fn union(size: usize, members: Vec<ValueType>) -> Self {
        Self::Union(Aggregate {
            size,
            fields: members.into_iter().map(|ty| Field::new(0, ty)).collect(),
        })
    }

    pub fn array(element: ValueType, length: usize) -> Self {
        Self::Array {
            element: Box::new(element),
            length,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Int { size, .. } | Self::Pointer { size } | Self::Float { size } => *size,
            Self::Struct(agg) | Self::Union(agg) => agg.size,
            Self::Array { element, length } => element.size() * length,
        }
    }

    pub fn code(&self) -> TypeCode {
        match self {
            Self::Int { .. } => TypeCode::Int,
            Self::Pointer { .. } => TypeCode::Pointer,
            Self::Float { .. } => TypeCode::Float,
            Self::Struct(_) => TypeCode::Struct,
            Self::Union(_) => TypeCode::Union,
            Self::Array { .. } => TypeCode::Array,
        }
    }

    /// Members of a struct or union; empty for everything else.
    pub fn fields(&self) -> &[Field] {
        match self {
            Self::Struct(agg) | Self::Union(agg) => &agg.fields,
            _ => &[],
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float { .. })
    }

    /// True for structs, unions and arrays.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Struct(_) | Self::Union(_) | Self::Array { .. })
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Int { signed: true, .. })
    }

    /// True for a struct or union whose only member is a float.
    pub fn is_single_float_aggregate(&self) -> bool {
        matches!(self, Self::Struct(_) | Self::Union(_))
            && matches!(self.fields(), [only] if only.ty.is_float())
    }

    /// True for a struct with one or two members, all of them floats.
    pub fn is_float_pair_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
            && (1..=2).contains(&self.fields().len())
            && self.fields().iter().all(|f| f.ty.is_float())
    }

    /// Whether this type starts on an even register pair when passed in
    /// 32-bit integer registers.
    ///
    /// Doubles do, structs follow their first member, and unions follow
    /// any member that does.
    pub fn needs_double_align(&self) -> bool {
        match self {
            Self::Float { size } => *size == 8,
            Self::Struct(agg) => agg.fields.first().is_some_and(|f| f.ty.needs_double_align()),
            Self::Union(agg) => agg.fields.iter().any(|f| f.ty.needs_double_align()),
            _ => false,
        }
    }

    /// Whether the eight bytes at `offset` hold a naturally aligned double.
    ///
    /// Nested structs are searched recursively.
    pub fn has_double_at(&self, offset: usize) -> bool {
        let Self::Struct(agg) = self else {
            return false;
        };
        if agg.size < offset + 8 {
            return false;
        }
        for field in &agg.fields {
            if field.offset > offset {
                return false;
            }
            if field.offset + field.ty.size() <= offset {
                continue;
            }
            if matches!(field.ty, Self::Float { size: 8 }) {
                return true;
            }
            return field.ty.has_double_at(offset - field.offset);
        }
        false
    }
}

/// A value in target byte order, with its address if it lives in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub ty: ValueType,
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub address: Option<u64>,
}

impl Value {
    /// Wraps raw bytes. The length must equal the type's size.
    pub fn new(ty: ValueType, bytes: Vec<u8>) -> Self {
        Self {
            ty,
            bytes,
            address: None,
        }
    }

    /// Encodes an integer or pointer of the given type.
    pub fn from_integer(ty: ValueType, value: u64, endianness: framewalk_core::Endianness) -> Self {
        let bytes = endianness.write(value, ty.size());
        Self::new(ty, bytes)
    }

    /// Records where the value lives in target memory.
    pub fn at(mut self, address: u64) -> Self {
        self.address = Some(address);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
