//! Index metadata page.
//!
//! Page 0 of an index file records what the index was built over and
//! where its root lives. It is written at creation and rewritten only
//! when a root split moves the root.

use burrow_common::page::PAGE_SIZE;
use burrow_common::types::AttrType;
use burrow_common::{BurrowError, Result};

/// Magic tag at the start of an index metadata page.
pub const INDEX_MAGIC: u32 = u32::from_le_bytes(*b"BRWI");

/// Maximum stored relation-name length in bytes.
pub const RELATION_NAME_MAX: usize = 64;

const NAME_OFFSET: usize = 4;
const ATTR_OFFSET: usize = NAME_OFFSET + RELATION_NAME_MAX;
const TYPE_OFFSET: usize = ATTR_OFFSET + 4;
const ROOT_OFFSET: usize = TYPE_OFFSET + 4;
const HEIGHT_OFFSET: usize = ROOT_OFFSET + 4;

/// Contents of the metadata page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Name of the indexed relation.
    pub relation_name: String,
    /// Byte offset of the key attribute within a relation record.
    pub attr_byte_offset: u32,
    /// Type of the key attribute.
    pub attr_type: AttrType,
    /// Page number of the current root.
    pub root_page: u32,
    /// Tree height; 1 means the root is a leaf.
    pub height: u32,
}

impl IndexMeta {
    /// Serializes the metadata into a page image.
    ///
    /// The relation name must fit `RELATION_NAME_MAX` bytes; the index
    /// constructor enforces this before a meta page is ever written.
    pub fn write_to(&self, page: &mut [u8; PAGE_SIZE]) {
        debug_assert!(self.relation_name.len() <= RELATION_NAME_MAX);

        page[0..4].copy_from_slice(&INDEX_MAGIC.to_le_bytes());

        let name_bytes = self.relation_name.as_bytes();
        let name_len = name_bytes.len().min(RELATION_NAME_MAX);
        page[NAME_OFFSET..NAME_OFFSET + name_len].copy_from_slice(&name_bytes[..name_len]);
        page[NAME_OFFSET + name_len..NAME_OFFSET + RELATION_NAME_MAX].fill(0);

        page[ATTR_OFFSET..ATTR_OFFSET + 4].copy_from_slice(&self.attr_byte_offset.to_le_bytes());
        page[TYPE_OFFSET] = self.attr_type as u8;
        page[ROOT_OFFSET..ROOT_OFFSET + 4].copy_from_slice(&self.root_page.to_le_bytes());
        page[HEIGHT_OFFSET..HEIGHT_OFFSET + 4].copy_from_slice(&self.height.to_le_bytes());
    }

    /// Deserializes the metadata from a page image.
    pub fn read_from(page: &[u8; PAGE_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes([page[0], page[1], page[2], page[3]]);
        if magic != INDEX_MAGIC {
            return Err(BurrowError::Corrupted(
                "index metadata magic mismatch".to_string(),
            ));
        }

        let name_field = &page[NAME_OFFSET..NAME_OFFSET + RELATION_NAME_MAX];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RELATION_NAME_MAX);
        let relation_name = String::from_utf8(name_field[..name_len].to_vec())
            .map_err(|_| BurrowError::Corrupted("relation name is not UTF-8".to_string()))?;

        let attr_type_tag = page[TYPE_OFFSET];
        let attr_type = AttrType::from_u8(attr_type_tag).ok_or_else(|| {
            BurrowError::Corrupted(format!("unknown attribute type tag {}", attr_type_tag))
        })?;

        Ok(Self {
            relation_name,
            attr_byte_offset: u32::from_le_bytes([
                page[ATTR_OFFSET],
                page[ATTR_OFFSET + 1],
                page[ATTR_OFFSET + 2],
                page[ATTR_OFFSET + 3],
            ]),
            attr_type,
            root_page: u32::from_le_bytes([
                page[ROOT_OFFSET],
                page[ROOT_OFFSET + 1],
                page[ROOT_OFFSET + 2],
                page[ROOT_OFFSET + 3],
            ]),
            height: u32::from_le_bytes([
                page[HEIGHT_OFFSET],
                page[HEIGHT_OFFSET + 1],
                page[HEIGHT_OFFSET + 2],
                page[HEIGHT_OFFSET + 3],
            ]),
        })
    }
}
