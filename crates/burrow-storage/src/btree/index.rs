//! B+ tree index lifecycle, descent, and insertion.

use super::constants::{KEY_ABSENT, LEAF_CAP};
use super::meta::{IndexMeta, RELATION_NAME_MAX};
use super::node::{internal, leaf};
use super::scan::ScanState;
use crate::bufmgr::BufferManager;
use crate::heap::HeapFile;
use crate::record::{key_at_offset, RecordId};
use burrow_common::page::PageId;
use burrow_common::types::AttrType;
use burrow_common::{BurrowError, Result};
use std::sync::Arc;

/// A persistent B+ tree index over one integer attribute of a heap
/// relation.
///
/// The index lives in its own file, named `"{relation}.{offset}"`.
/// Creating it bulk-loads every record of the relation; reopening it
/// recovers the tree from the metadata page. At most one range scan is
/// active at a time and holds a pin on its current leaf.
pub struct BTreeIndex {
    pub(crate) bufmgr: Arc<BufferManager>,
    pub(crate) file_id: u32,
    index_name: String,
    meta: IndexMeta,
    pub(crate) scan: Option<ScanState>,
}

impl BTreeIndex {
    /// Opens the index for `relation`'s attribute at `attr_byte_offset`,
    /// building it from the relation if it does not exist yet.
    ///
    /// Opening an existing index validates that its metadata matches
    /// the parameters; a mismatch fails with `BadIndexInfo` and
    /// releases the file handle.
    pub fn open_or_create(
        bufmgr: Arc<BufferManager>,
        relation: &HeapFile,
        attr_byte_offset: usize,
        attr_type: AttrType,
    ) -> Result<Self> {
        if attr_type != AttrType::Int32 {
            return Err(BurrowError::UnsupportedType(attr_type.to_string()));
        }
        if relation.name().len() > RELATION_NAME_MAX {
            return Err(BurrowError::BadIndexInfo(format!(
                "relation name exceeds {} bytes",
                RELATION_NAME_MAX
            )));
        }

        let index_name = format!("{}.{}", relation.name(), attr_byte_offset);
        if bufmgr.disk().file_exists(&index_name) {
            Self::open(bufmgr, relation.name(), index_name, attr_byte_offset, attr_type)
        } else {
            Self::create(bufmgr, relation, index_name, attr_byte_offset, attr_type)
        }
    }

    /// Creates the index file and bulk-loads it from the relation.
    fn create(
        bufmgr: Arc<BufferManager>,
        relation: &HeapFile,
        index_name: String,
        attr_byte_offset: usize,
        attr_type: AttrType,
    ) -> Result<Self> {
        let file_id = bufmgr.disk().open_file(&index_name)?;

        let (meta_page, meta_guard) = bufmgr.alloc_page(file_id)?;
        debug_assert_eq!(meta_page.page_num, 0);

        // The root starts life as an empty leaf and is promoted to an
        // internal node by the first root split.
        let (root_page, root_guard) = bufmgr.alloc_page(file_id)?;
        root_guard.with_mut(|data| leaf::init(data));
        drop(root_guard);

        let meta = IndexMeta {
            relation_name: relation.name().to_string(),
            attr_byte_offset: attr_byte_offset as u32,
            attr_type,
            root_page: root_page.page_num,
            height: 1,
        };
        meta_guard.with_mut(|data| meta.write_to(data));
        drop(meta_guard);

        let mut index = Self {
            bufmgr,
            file_id,
            index_name,
            meta,
            scan: None,
        };

        for item in relation.scan() {
            let (rid, record) = item?;
            let key = key_at_offset(&record, attr_byte_offset)?;
            index.insert(key, rid)?;
        }

        Ok(index)
    }

    /// Opens an existing index file and validates its metadata.
    fn open(
        bufmgr: Arc<BufferManager>,
        relation_name: &str,
        index_name: String,
        attr_byte_offset: usize,
        attr_type: AttrType,
    ) -> Result<Self> {
        let file_id = bufmgr.disk().open_file(&index_name)?;

        let meta = {
            let guard = bufmgr.fetch_read(PageId::new(file_id, 0));
            match guard.and_then(|g| g.with(IndexMeta::read_from)) {
                Ok(meta) => meta,
                Err(e) => {
                    let _ = bufmgr.disk().close_file(file_id);
                    return Err(e);
                }
            }
        };

        if meta.relation_name != relation_name
            || meta.attr_byte_offset as usize != attr_byte_offset
            || meta.attr_type != attr_type
        {
            let detail = format!(
                "{} was built over {}.{} ({})",
                index_name, meta.relation_name, meta.attr_byte_offset, meta.attr_type
            );
            let _ = bufmgr.disk().close_file(file_id);
            return Err(BurrowError::BadIndexInfo(detail));
        }

        Ok(Self {
            bufmgr,
            file_id,
            index_name,
            meta,
            scan: None,
        })
    }

    /// Returns the index file's name.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the tree height; 1 means the root is a leaf.
    pub fn height(&self) -> u32 {
        self.meta.height
    }

    #[inline]
    pub(crate) fn page_id(&self, page_num: u32) -> PageId {
        PageId::new(self.file_id, page_num)
    }

    /// Inserts a (key, rid) pair.
    ///
    /// Duplicate keys are accepted and kept in insertion order.
    pub fn insert(&mut self, key: i32, rid: RecordId) -> Result<()> {
        if key == KEY_ABSENT {
            // The sentinel itself has no on-disk representation.
            return Err(BurrowError::KeyOutOfRange(key));
        }

        let split = self.insert_into(self.meta.root_page, self.meta.height, key, rid)?;

        if let Some((separator, new_right)) = split {
            // Root split: the tree grows by one level.
            let (new_root, guard) = self.bufmgr.alloc_page(self.file_id)?;
            guard.with_mut(|data| {
                internal::init(data, self.meta.height);
                internal::set_key(data, 0, separator);
                internal::set_child(data, 0, self.meta.root_page);
                internal::set_child(data, 1, new_right);
            });
            drop(guard);

            self.meta.root_page = new_root.page_num;
            self.meta.height += 1;
            self.write_meta()?;
        }

        debug_assert_eq!(
            self.bufmgr.pinned_count(),
            usize::from(self.scan.is_some())
        );
        Ok(())
    }

    /// Recursive descent insert.
    ///
    /// `height` counts the levels remaining below and including
    /// `page_num`; 1 means the page is a leaf. The page stays pinned
    /// across the recursive call so a child split can promote into it
    /// without re-fetching. Returns the separator and new right page
    /// when this node itself split.
    fn insert_into(
        &self,
        page_num: u32,
        height: u32,
        key: i32,
        rid: RecordId,
    ) -> Result<Option<(i32, u32)>> {
        let guard = self.bufmgr.fetch_write(self.page_id(page_num))?;

        if height == 1 {
            if !guard.with(leaf::is_full) {
                guard.with_mut(|data| {
                    let pos = leaf::upper_bound(data, key);
                    leaf::insert_at(data, pos, key, rid);
                });
                return Ok(None);
            }

            // Leaf split; splice the new page into the sibling chain.
            let (new_page, new_guard) = self.bufmgr.alloc_page(self.file_id)?;
            let separator = guard.with_mut(|left| {
                new_guard.with_mut(|right| {
                    leaf::init(right);
                    let separator = leaf::split(left, right, key, rid);
                    leaf::set_right_sibling(right, leaf::right_sibling(left));
                    leaf::set_right_sibling(left, new_page.page_num);
                    separator
                })
            });
            return Ok(Some((separator, new_page.page_num)));
        }

        let (child_index, child_page) = guard.with(|data| {
            let child_index = internal::child_index_for(data, key);
            (child_index, internal::child_at(data, child_index))
        });

        let Some((promoted, new_right)) = self.insert_into(child_page, height - 1, key, rid)?
        else {
            return Ok(None);
        };

        if !guard.with(internal::is_full) {
            guard.with_mut(|data| internal::insert_at(data, child_index, promoted, new_right));
            return Ok(None);
        }

        // Internal split: the promoted key lands at the child's slot.
        let (new_page, new_guard) = self.bufmgr.alloc_page(self.file_id)?;
        let lifted = guard.with_mut(|left| {
            new_guard.with_mut(|right| {
                internal::init(right, internal::level(left));
                internal::split(left, right, child_index, promoted, new_right)
            })
        });
        Ok(Some((lifted, new_page.page_num)))
    }

    /// Exact-match probe: returns the record ID stored under `key`.
    ///
    /// With duplicate keys this returns the first entry in the leaf
    /// the descent reaches.
    pub fn lookup(&self, key: i32) -> Result<RecordId> {
        let leaf_page = self.find_leaf(key)?;
        let guard = self.bufmgr.fetch_read(self.page_id(leaf_page))?;
        guard.with(|data| {
            let pos = leaf::lower_bound(data, key);
            if pos < LEAF_CAP && leaf::key_at(data, pos) == key {
                Ok(leaf::rid_at(data, pos))
            } else {
                Err(BurrowError::NoSuchKey)
            }
        })
    }

    /// Walks from the root to the leaf whose range covers `key`.
    ///
    /// Read-only; holds one pin at a time.
    pub(crate) fn find_leaf(&self, key: i32) -> Result<u32> {
        let mut current = self.meta.root_page;
        for _ in 1..self.meta.height {
            let guard = self.bufmgr.fetch_read(self.page_id(current))?;
            current = guard.with(|data| {
                internal::child_at(data, internal::child_index_for(data, key))
            });
        }
        Ok(current)
    }

    /// Rewrites the metadata page (root moved).
    fn write_meta(&self) -> Result<()> {
        let guard = self.bufmgr.fetch_write(self.page_id(0))?;
        guard.with_mut(|data| self.meta.write_to(data));
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        // End any live scan before flushing so its pin is released.
        self.scan = None;
        let _ = self.bufmgr.flush_file(self.file_id);
        let _ = self.bufmgr.disk().close_file(self.file_id);
    }
}
