//! Bounded range scans over the index.
//!
//! An index runs at most one scan at a time. The cursor owns a read
//! pin on its current leaf and walks the sibling chain, swapping the
//! pin as it crosses leaves; ending the scan (or starting a new one)
//! releases it.

use super::constants::LEAF_CAP;
use super::index::BTreeIndex;
use super::node::leaf;
use crate::bufmgr::PageReadGuard;
use crate::record::RecordId;
use burrow_common::page::{PageId, PAGE_NONE};
use burrow_common::{BurrowError, Result};

/// Comparison operator for scan bounds.
///
/// The low bound takes `Gt`/`Gte`, the high bound `Lt`/`Lte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Lte,
    Gte,
    Gt,
}

/// Live state of the active scan.
pub(crate) struct ScanState {
    high: i32,
    high_op: Operator,
    /// Current leaf, pinned for the lifetime of this state.
    leaf: PageReadGuard,
    /// Next slot to consider within the current leaf.
    next_entry: usize,
}

impl BTreeIndex {
    /// Positions a scan at the first entry qualifying under the low
    /// bound. Any scan already running on this index is ended first.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: Operator,
        high: i32,
        high_op: Operator,
    ) -> Result<()> {
        if low > high {
            return Err(BurrowError::BadScanRange { low, high });
        }
        if !matches!(low_op, Operator::Gt | Operator::Gte)
            || !matches!(high_op, Operator::Lt | Operator::Lte)
        {
            return Err(BurrowError::BadOperator);
        }

        // Release the previous cursor's pin before descending.
        self.scan = None;

        let leaf_page = self.find_leaf(low)?;
        let guard = self.bufmgr.fetch_read(self.page_id(leaf_page))?;
        let next_entry = guard.with(|data| match low_op {
            Operator::Gte => leaf::lower_bound(data, low),
            _ => leaf::upper_bound(data, low),
        });

        self.scan = Some(ScanState {
            high,
            high_op,
            leaf: guard,
            next_entry,
        });
        Ok(())
    }

    /// Returns the next qualifying record ID.
    ///
    /// Fails `ScanComplete` once entries stop qualifying; the scan
    /// stays active (and keeps its pin) until `end_scan`.
    pub fn next_scan(&mut self) -> Result<RecordId> {
        let file_id = self.file_id;
        let scan = self.scan.as_mut().ok_or(BurrowError::ScanNotStarted)?;

        let (exhausted, sibling) = scan.leaf.with(|data| {
            let exhausted =
                scan.next_entry >= LEAF_CAP || !leaf::is_slot_used(data, scan.next_entry);
            (exhausted, leaf::right_sibling(data))
        });

        if exhausted {
            if sibling == PAGE_NONE {
                return Err(BurrowError::ScanComplete);
            }
            // Swap the pin onto the next leaf in the chain.
            let next_leaf = self.bufmgr.fetch_read(PageId::new(file_id, sibling))?;
            scan.leaf = next_leaf;
            scan.next_entry = 0;
        }

        let (key, rid) = scan.leaf.with(|data| {
            (
                leaf::key_at(data, scan.next_entry),
                leaf::rid_at(data, scan.next_entry),
            )
        });

        let qualifies = match scan.high_op {
            Operator::Lt => key < scan.high,
            _ => key <= scan.high,
        };
        if !qualifies {
            return Err(BurrowError::ScanComplete);
        }

        scan.next_entry += 1;
        Ok(rid)
    }

    /// Ends the active scan, releasing its pinned leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        match self.scan.take() {
            Some(_) => Ok(()),
            None => Err(BurrowError::ScanNotStarted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bufmgr::BufferManager;
    use crate::disk::{DiskManager, DiskManagerConfig};
    use crate::heap::HeapFile;
    use burrow_buffer::{BufferPool, BufferPoolConfig};
    use burrow_common::types::AttrType;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn empty_index() -> (BTreeIndex, Arc<BufferManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(DiskManagerConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
        })
        .unwrap();
        let pool = BufferPool::new(BufferPoolConfig { num_frames: 256 });
        let mgr = BufferManager::new(disk, pool);
        let heap = HeapFile::create(mgr.clone(), "rel", 8).unwrap();
        let index = BTreeIndex::open_or_create(mgr.clone(), &heap, 0, AttrType::Int32).unwrap();
        (index, mgr, dir)
    }

    fn rid(n: i32) -> RecordId {
        RecordId::new(n as u32, 0)
    }

    fn drain(index: &mut BTreeIndex) -> Vec<RecordId> {
        let mut out = Vec::new();
        loop {
            match index.next_scan() {
                Ok(rid) => out.push(rid),
                Err(BurrowError::ScanComplete) => break,
                Err(e) => panic!("unexpected scan error: {e}"),
            }
        }
        out
    }

    #[test]
    fn test_scan_validates_range() {
        let (mut index, _mgr, _dir) = empty_index();

        let result = index.start_scan(5, Operator::Gte, 3, Operator::Lte);
        assert!(matches!(
            result,
            Err(BurrowError::BadScanRange { low: 5, high: 3 })
        ));
        // No scan state was created.
        assert!(matches!(
            index.next_scan(),
            Err(BurrowError::ScanNotStarted)
        ));
    }

    #[test]
    fn test_scan_validates_operators() {
        let (mut index, _mgr, _dir) = empty_index();

        for (low_op, high_op) in [
            (Operator::Lt, Operator::Lte),
            (Operator::Lte, Operator::Lt),
            (Operator::Gte, Operator::Gt),
            (Operator::Gt, Operator::Gte),
        ] {
            let result = index.start_scan(0, low_op, 10, high_op);
            assert!(matches!(result, Err(BurrowError::BadOperator)));
        }
    }

    #[test]
    fn test_scan_lifecycle_errors() {
        let (mut index, _mgr, _dir) = empty_index();

        assert!(matches!(
            index.next_scan(),
            Err(BurrowError::ScanNotStarted)
        ));
        assert!(matches!(index.end_scan(), Err(BurrowError::ScanNotStarted)));

        index.start_scan(0, Operator::Gte, 10, Operator::Lte).unwrap();
        index.end_scan().unwrap();
        assert!(matches!(index.end_scan(), Err(BurrowError::ScanNotStarted)));
    }

    #[test]
    fn test_scan_empty_tree_completes() {
        let (mut index, _mgr, _dir) = empty_index();

        index
            .start_scan(i32::MIN, Operator::Gte, i32::MAX, Operator::Lte)
            .unwrap();
        assert!(matches!(index.next_scan(), Err(BurrowError::ScanComplete)));
        // ScanComplete leaves the scan active.
        assert!(matches!(index.next_scan(), Err(BurrowError::ScanComplete)));
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_single_entry() {
        let (mut index, _mgr, _dir) = empty_index();
        index.insert(42, RecordId::new(7, 3)).unwrap();

        index.start_scan(0, Operator::Gte, 100, Operator::Lte).unwrap();
        assert_eq!(index.next_scan().unwrap(), RecordId::new(7, 3));
        assert!(matches!(index.next_scan(), Err(BurrowError::ScanComplete)));
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_bound_operators() {
        let (mut index, _mgr, _dir) = empty_index();
        for key in [10, 20, 30, 40] {
            index.insert(key, rid(key)).unwrap();
        }

        index.start_scan(10, Operator::Gt, 40, Operator::Lt).unwrap();
        assert_eq!(drain(&mut index), vec![rid(20), rid(30)]);
        index.end_scan().unwrap();

        index.start_scan(10, Operator::Gte, 40, Operator::Lte).unwrap();
        assert_eq!(drain(&mut index), vec![rid(10), rid(20), rid(30), rid(40)]);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_crosses_leaves() {
        let (mut index, mgr, _dir) = empty_index();

        let n = LEAF_CAP as i32 * 3;
        for key in 0..n {
            index.insert(key, rid(key)).unwrap();
        }
        assert!(index.height() > 1);

        index
            .start_scan(0, Operator::Gte, n, Operator::Lt)
            .unwrap();
        let rids = drain(&mut index);
        assert_eq!(rids.len(), n as usize);
        assert_eq!(rids, (0..n).map(rid).collect::<Vec<_>>());

        // Exactly one leaf pin while the scan is active.
        assert_eq!(mgr.pinned_count(), 1);
        index.end_scan().unwrap();
        assert_eq!(mgr.pinned_count(), 0);
    }

    #[test]
    fn test_scan_low_bound_mid_tree() {
        let (mut index, _mgr, _dir) = empty_index();

        let n = LEAF_CAP as i32 * 2;
        for key in 0..n {
            index.insert(key, rid(key)).unwrap();
        }

        let low = n / 2;
        index.start_scan(low, Operator::Gt, n, Operator::Lt).unwrap();
        let rids = drain(&mut index);
        assert_eq!(rids.first(), Some(&rid(low + 1)));
        assert_eq!(rids.len(), (n - low - 1) as usize);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_restart_replaces_cursor() {
        let (mut index, mgr, _dir) = empty_index();
        for key in [1, 2, 3] {
            index.insert(key, rid(key)).unwrap();
        }

        index.start_scan(0, Operator::Gte, 10, Operator::Lte).unwrap();
        assert_eq!(index.next_scan().unwrap(), rid(1));

        // Starting a new scan ends the old one; still one pin.
        index.start_scan(2, Operator::Gte, 10, Operator::Lte).unwrap();
        assert_eq!(mgr.pinned_count(), 1);
        assert_eq!(drain(&mut index), vec![rid(2), rid(3)]);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_duplicates_in_order() {
        let (mut index, _mgr, _dir) = empty_index();

        for slot in 0..4u16 {
            index.insert(5, RecordId::new(1, slot)).unwrap();
        }

        index.start_scan(5, Operator::Gte, 5, Operator::Lte).unwrap();
        let rids = drain(&mut index);
        assert_eq!(
            rids,
            (0..4u16).map(|s| RecordId::new(1, s)).collect::<Vec<_>>()
        );
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_extreme_bounds() {
        let (mut index, _mgr, _dir) = empty_index();
        for key in [i32::MIN, -1, 0, 1, i32::MAX - 1] {
            index.insert(key, rid(0)).unwrap();
        }

        index
            .start_scan(i32::MIN, Operator::Gte, i32::MAX, Operator::Lte)
            .unwrap();
        assert_eq!(drain(&mut index).len(), 5);
        index.end_scan().unwrap();

        // Nothing is strictly greater than i32::MAX - 1 but the last key.
        index
            .start_scan(i32::MAX - 1, Operator::Gt, i32::MAX, Operator::Lte)
            .unwrap();
        assert_eq!(drain(&mut index).len(), 0);
        index.end_scan().unwrap();
    }
}
