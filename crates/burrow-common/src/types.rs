//! Attribute type identifiers.

use serde::{Deserialize, Serialize};

/// Data type of an indexed attribute.
///
/// Stored in the index metadata page to identify the key type the index
/// was built over. Only `Int32` keys are currently indexable; the other
/// variants exist so a metadata page can name them and be rejected with a
/// proper error instead of being misread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttrType {
    /// 32-bit signed integer.
    Int32 = 0,
    /// 64-bit IEEE float.
    Float64 = 1,
    /// Variable-length character string.
    Varchar = 2,
}

impl AttrType {
    /// Returns the fixed byte size of a value of this type, or None for
    /// variable-length types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            AttrType::Int32 => Some(4),
            AttrType::Float64 => Some(8),
            AttrType::Varchar => None,
        }
    }

    /// Decodes a type tag read from disk.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AttrType::Int32),
            1 => Some(AttrType::Float64),
            2 => Some(AttrType::Varchar),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrType::Int32 => write!(f, "INT32"),
            AttrType::Float64 => write!(f, "FLOAT64"),
            AttrType::Varchar => write!(f, "VARCHAR"),
        }
    }
}
