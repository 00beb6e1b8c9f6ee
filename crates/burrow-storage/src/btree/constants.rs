//! Node capacity constants derived from the page size.

use burrow_common::page::PAGE_SIZE;

/// Bytes per key slot (32-bit signed integer).
pub const KEY_SIZE: usize = 4;

/// Bytes per record-id slot (page number + slot + padding).
pub const RID_SIZE: usize = 8;

/// Bytes per child page-number slot.
pub const CHILD_SIZE: usize = 4;

/// Bytes for an internal node's level field.
pub const LEVEL_SIZE: usize = 4;

/// Bytes for a leaf's right-sibling pointer.
pub const SIBLING_SIZE: usize = 4;

/// Sentinel stored in unused key slots.
pub const KEY_ABSENT: i32 = i32::MAX;

/// Maximum (key, rid) pairs per leaf.
pub const LEAF_CAP: usize = (PAGE_SIZE - SIBLING_SIZE) / (KEY_SIZE + RID_SIZE);

/// Maximum key slots per internal node; child slots are `INTERNAL_CAP + 1`.
pub const INTERNAL_CAP: usize = (PAGE_SIZE - CHILD_SIZE - LEVEL_SIZE) / (KEY_SIZE + CHILD_SIZE);

// Both node images must fit a page exactly as laid out.
const _: () = assert!(LEAF_CAP * (KEY_SIZE + RID_SIZE) + SIBLING_SIZE <= PAGE_SIZE);
const _: () = assert!(
    INTERNAL_CAP * KEY_SIZE + (INTERNAL_CAP + 1) * CHILD_SIZE + LEVEL_SIZE <= PAGE_SIZE
);
const _: () = assert!(LEAF_CAP >= 4 && INTERNAL_CAP >= 4);
