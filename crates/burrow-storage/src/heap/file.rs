//! Heap file manager with buffer pool integration.

use crate::bufmgr::BufferManager;
use crate::heap::page::{self, HeapHeader};
use crate::heap::scan::HeapScan;
use crate::record::RecordId;
use burrow_common::page::{PageId, PAGE_SIZE};
use burrow_common::{BurrowError, Result};
use bytes::Bytes;
use std::sync::Arc;

/// A relation stored as fixed-size records in a paged file.
///
/// Records are appended densely: page 0 is the header, data pages fill
/// left to right, and a record's ID is fully determined by its ordinal
/// position. All page I/O goes through the buffer manager.
pub struct HeapFile {
    bufmgr: Arc<BufferManager>,
    file_id: u32,
    name: String,
    record_size: usize,
    record_count: u64,
}

impl HeapFile {
    /// Creates a new heap file for records of the given fixed size.
    ///
    /// Fails if a file with this name already exists.
    pub fn create(bufmgr: Arc<BufferManager>, name: &str, record_size: usize) -> Result<Self> {
        if record_size == 0 || page::record_capacity(record_size) == 0 {
            return Err(BurrowError::RecordSizeMismatch {
                expected: PAGE_SIZE - 2,
                actual: record_size,
            });
        }
        if bufmgr.disk().file_exists(name) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("heap file {} already exists", name),
            )
            .into());
        }

        let file_id = bufmgr.disk().open_file(name)?;
        let (header_page, guard) = bufmgr.alloc_page(file_id)?;
        debug_assert_eq!(header_page.page_num, 0);

        let header = HeapHeader {
            record_size: record_size as u32,
            record_count: 0,
        };
        guard.with_mut(|data| header.write_to(data));
        drop(guard);

        Ok(Self {
            bufmgr,
            file_id,
            name: name.to_string(),
            record_size,
            record_count: 0,
        })
    }

    /// Opens an existing heap file, reading its header.
    pub fn open(bufmgr: Arc<BufferManager>, name: &str) -> Result<Self> {
        if !bufmgr.disk().file_exists(name) {
            return Err(BurrowError::PageNotFound(format!("heap file {}", name)));
        }

        let file_id = bufmgr.disk().open_file(name)?;
        let guard = bufmgr.fetch_read(PageId::new(file_id, 0))?;
        let header = guard.with(HeapHeader::read_from)?;
        drop(guard);

        Ok(Self {
            bufmgr,
            file_id,
            name: name.to_string(),
            record_size: header.record_size as usize,
            record_count: header.record_count,
        })
    }

    /// Opens the named heap file, creating it if absent.
    pub fn open_or_create(
        bufmgr: Arc<BufferManager>,
        name: &str,
        record_size: usize,
    ) -> Result<Self> {
        if bufmgr.disk().file_exists(name) {
            Self::open(bufmgr, name)
        } else {
            Self::create(bufmgr, name, record_size)
        }
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fixed record size.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Returns the number of records in the file.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub(crate) fn bufmgr(&self) -> &Arc<BufferManager> {
        &self.bufmgr
    }

    pub(crate) fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Number of records each data page holds.
    pub(crate) fn records_per_page(&self) -> u64 {
        page::record_capacity(self.record_size) as u64
    }

    /// Maps a record ordinal to its (page, slot) position.
    fn position_of(&self, ordinal: u64) -> RecordId {
        let per_page = self.records_per_page();
        RecordId::new(1 + (ordinal / per_page) as u32, (ordinal % per_page) as u16)
    }

    /// Appends a record, returning its ID.
    pub fn append(&mut self, record: &[u8]) -> Result<RecordId> {
        if record.len() != self.record_size {
            return Err(BurrowError::RecordSizeMismatch {
                expected: self.record_size,
                actual: record.len(),
            });
        }

        let rid = self.position_of(self.record_count);

        if rid.slot == 0 {
            let (page_id, guard) = self.bufmgr.alloc_page(self.file_id)?;
            debug_assert_eq!(page_id.page_num, rid.page_num);
            guard.with_mut(|data| {
                page::write_record(data, 0, record);
                page::set_record_count(data, 1);
            });
        } else {
            let guard = self
                .bufmgr
                .fetch_write(PageId::new(self.file_id, rid.page_num))?;
            guard.with_mut(|data| {
                page::write_record(data, rid.slot, record);
                page::set_record_count(data, rid.slot + 1);
            });
        }

        self.record_count += 1;
        self.write_header()?;

        Ok(rid)
    }

    /// Fetches the record with the given ID, or None if out of range.
    pub fn get(&self, rid: RecordId) -> Result<Option<Bytes>> {
        let per_page = self.records_per_page();
        if rid.page_num == 0 || rid.slot as u64 >= per_page {
            return Ok(None);
        }
        let ordinal = (rid.page_num as u64 - 1) * per_page + rid.slot as u64;
        if ordinal >= self.record_count {
            return Ok(None);
        }

        let guard = self
            .bufmgr
            .fetch_read(PageId::new(self.file_id, rid.page_num))?;
        let record = guard.with(|data| {
            Bytes::copy_from_slice(page::record_at(data, rid.slot, self.record_size))
        });
        Ok(Some(record))
    }

    /// Returns a forward scan over all records.
    pub fn scan(&self) -> HeapScan<'_> {
        HeapScan::new(self)
    }

    /// Flushes the file's dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.bufmgr.flush_file(self.file_id)
    }

    fn write_header(&self) -> Result<()> {
        let header = HeapHeader {
            record_size: self.record_size as u32,
            record_count: self.record_count,
        };
        let guard = self.bufmgr.fetch_write(PageId::new(self.file_id, 0))?;
        guard.with_mut(|data| header.write_to(data));
        Ok(())
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{DiskManager, DiskManagerConfig};
    use burrow_buffer::{BufferPool, BufferPoolConfig};
    use tempfile::tempdir;

    fn create_test_mgr() -> (Arc<BufferManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(DiskManagerConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
        })
        .unwrap();
        let pool = BufferPool::new(BufferPoolConfig { num_frames: 64 });
        (BufferManager::new(disk, pool), dir)
    }

    fn record(i: u32) -> Vec<u8> {
        let mut rec = vec![0u8; 16];
        rec[0..4].copy_from_slice(&i.to_le_bytes());
        rec
    }

    #[test]
    fn test_heap_file_create() {
        let (mgr, _dir) = create_test_mgr();
        let heap = HeapFile::create(mgr, "employees", 16).unwrap();

        assert_eq!(heap.name(), "employees");
        assert_eq!(heap.record_size(), 16);
        assert_eq!(heap.record_count(), 0);
    }

    #[test]
    fn test_heap_file_rejects_oversized_records() {
        let (mgr, _dir) = create_test_mgr();
        assert!(HeapFile::create(mgr.clone(), "a", 0).is_err());
        assert!(HeapFile::create(mgr, "b", PAGE_SIZE).is_err());
    }

    #[test]
    fn test_heap_file_append_get() {
        let (mgr, _dir) = create_test_mgr();
        let mut heap = HeapFile::create(mgr, "t", 16).unwrap();

        let rid = heap.append(&record(42)).unwrap();
        assert_eq!(rid, RecordId::new(1, 0));

        let data = heap.get(rid).unwrap().unwrap();
        assert_eq!(&data[0..4], &42u32.to_le_bytes());
    }

    #[test]
    fn test_heap_file_append_wrong_size() {
        let (mgr, _dir) = create_test_mgr();
        let mut heap = HeapFile::create(mgr, "t", 16).unwrap();

        let result = heap.append(&[0u8; 8]);
        assert!(matches!(
            result,
            Err(BurrowError::RecordSizeMismatch {
                expected: 16,
                actual: 8
            })
        ));
    }

    #[test]
    fn test_heap_file_get_out_of_range() {
        let (mgr, _dir) = create_test_mgr();
        let mut heap = HeapFile::create(mgr, "t", 16).unwrap();
        heap.append(&record(1)).unwrap();

        assert!(heap.get(RecordId::new(0, 0)).unwrap().is_none());
        assert!(heap.get(RecordId::new(1, 1)).unwrap().is_none());
        assert!(heap.get(RecordId::new(9, 0)).unwrap().is_none());
    }

    #[test]
    fn test_heap_file_spans_pages() {
        let (mgr, _dir) = create_test_mgr();
        // 1000-byte records: 4 per page.
        let mut heap = HeapFile::create(mgr, "t", 1000).unwrap();

        let mut rids = Vec::new();
        for i in 0..10u32 {
            let mut rec = vec![0u8; 1000];
            rec[0..4].copy_from_slice(&i.to_le_bytes());
            rids.push(heap.append(&rec).unwrap());
        }

        assert_eq!(rids[0], RecordId::new(1, 0));
        assert_eq!(rids[4], RecordId::new(2, 0));
        assert_eq!(rids[9], RecordId::new(3, 1));

        for (i, rid) in rids.iter().enumerate() {
            let data = heap.get(*rid).unwrap().unwrap();
            assert_eq!(&data[0..4], &(i as u32).to_le_bytes());
        }
    }

    #[test]
    fn test_heap_file_reopen() {
        let (mgr, _dir) = create_test_mgr();

        {
            let mut heap = HeapFile::create(mgr.clone(), "t", 16).unwrap();
            for i in 0..20 {
                heap.append(&record(i)).unwrap();
            }
        }

        let heap = HeapFile::open(mgr, "t").unwrap();
        assert_eq!(heap.record_size(), 16);
        assert_eq!(heap.record_count(), 20);

        let data = heap.get(RecordId::new(1, 5)).unwrap().unwrap();
        assert_eq!(&data[0..4], &5u32.to_le_bytes());
    }

    #[test]
    fn test_heap_file_open_missing() {
        let (mgr, _dir) = create_test_mgr();
        assert!(HeapFile::open(mgr, "nope").is_err());
    }

    #[test]
    fn test_heap_file_no_pins_left_behind() {
        let (mgr, _dir) = create_test_mgr();
        let mut heap = HeapFile::create(mgr.clone(), "t", 16).unwrap();

        for i in 0..50 {
            heap.append(&record(i)).unwrap();
        }
        heap.get(RecordId::new(1, 3)).unwrap();

        assert_eq!(mgr.pinned_count(), 0);
    }
}
