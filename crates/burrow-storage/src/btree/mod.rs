//! Disk-resident B+ tree index over one integer attribute of a heap
//! relation.
//!
//! Nodes are whole-page images: a leaf packs parallel key and record-id
//! arrays plus a right-sibling pointer, an internal node packs keys,
//! child page numbers, and its level. Empty slots hold sentinels
//! (`i32::MAX` keys, `u32::MAX` page numbers), so the used prefix of a
//! node is self-describing. The tree starts as a single leaf and grows
//! by splitting: leaves split around the insertion point, internal
//! nodes split at their midpoint and promote a separator, and a root
//! split adds a level.

pub mod constants;
pub mod index;
pub mod meta;
pub mod node;
pub mod scan;

pub use index::BTreeIndex;
pub use scan::Operator;
