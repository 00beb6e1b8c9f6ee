//! Record identifiers for heap relations.

use burrow_common::{BurrowError, Result};

/// Identifies a record within a heap file: the page holding it and the
/// slot within that page.
///
/// Opaque to the index; compared only by equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    /// Heap page number.
    pub page_num: u32,
    /// Slot number within the page.
    pub slot: u16,
}

impl RecordId {
    /// Creates a new record ID.
    pub fn new(page_num: u32, slot: u16) -> Self {
        Self { page_num, slot }
    }

    /// Invalid record ID (the on-disk empty-slot sentinel).
    pub const INVALID: RecordId = RecordId {
        page_num: u32::MAX,
        slot: u16::MAX,
    };

    /// Returns true if this is a valid record ID.
    pub fn is_valid(&self) -> bool {
        self.page_num != u32::MAX
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_num, self.slot)
    }
}

/// Extracts the 32-bit little-endian key at `offset` within a record.
pub fn key_at_offset(record: &[u8], offset: usize) -> Result<i32> {
    let end = offset.checked_add(4).filter(|&end| end <= record.len());
    let Some(end) = end else {
        return Err(BurrowError::RecordSizeMismatch {
            expected: offset.saturating_add(4),
            actual: record.len(),
        });
    };
    let bytes: [u8; 4] = record[offset..end].try_into().unwrap_or([0; 4]);
    Ok(i32::from_le_bytes(bytes))
}
