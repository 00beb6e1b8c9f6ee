//! Buffer manager: the pinned-page facade over pool and disk.
//!
//! All page access in the heap and index layers goes through this type.
//! Fetching a page pins it and hands back a guard; dropping the guard
//! releases exactly one pin, dirty for write guards that mutated the
//! page, clean otherwise. Pages absent from the pool are loaded from
//! disk, and any dirty page the pool evicts to make room is written
//! back before the caller proceeds.

use crate::disk::{DiskManager, DiskManagerConfig};
use burrow_buffer::{BufferPool, BufferPoolConfig, FrameId};
use burrow_common::config::StorageConfig;
use burrow_common::page::{PageId, PAGE_SIZE};
use burrow_common::Result;
use std::cell::Cell;
use std::sync::Arc;

/// Combines the buffer pool with the disk manager.
pub struct BufferManager {
    disk: DiskManager,
    pool: BufferPool,
}

impl BufferManager {
    /// Creates a buffer manager from its parts.
    pub fn new(disk: DiskManager, pool: BufferPool) -> Arc<Self> {
        Arc::new(Self { disk, pool })
    }

    /// Creates a buffer manager from a storage configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Arc<Self>> {
        let disk = DiskManager::new(DiskManagerConfig {
            data_dir: config.data_dir.clone(),
            fsync_enabled: config.fsync_enabled,
        })?;
        let pool = BufferPool::new(BufferPoolConfig {
            num_frames: config.buffer_pool_frames,
        });
        Ok(Self::new(disk, pool))
    }

    /// Returns the underlying disk manager.
    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Returns the underlying buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Number of pages currently pinned across the pool.
    pub fn pinned_count(&self) -> usize {
        self.pool.pinned_count()
    }

    /// Pins a page, loading it from disk if it is not resident.
    fn pin_frame(&self, page_id: PageId) -> Result<FrameId> {
        if let Some(frame) = self.pool.fetch_page(page_id) {
            return Ok(frame.frame_id());
        }

        let data = self.disk.read_page(page_id)?;
        let (frame, evicted) = self.pool.load_page(page_id, &data)?;
        let frame_id = frame.frame_id();

        if let Some(ev) = evicted {
            if let Err(e) = self.disk.write_page(ev.page_id, &ev.data) {
                // Restore the pin balance before propagating.
                self.pool.unpin_page(page_id, false);
                return Err(e);
            }
        }

        Ok(frame_id)
    }

    /// Pins a page for reading.
    pub fn fetch_read(self: &Arc<Self>, page_id: PageId) -> Result<PageReadGuard> {
        let frame_id = self.pin_frame(page_id)?;
        Ok(PageReadGuard {
            mgr: Arc::clone(self),
            page_id,
            frame_id,
        })
    }

    /// Pins a page for writing.
    pub fn fetch_write(self: &Arc<Self>, page_id: PageId) -> Result<PageWriteGuard> {
        let frame_id = self.pin_frame(page_id)?;
        Ok(PageWriteGuard {
            mgr: Arc::clone(self),
            page_id,
            frame_id,
            dirty: Cell::new(false),
        })
    }

    /// Allocates a new page at the end of the file, zero-filled and
    /// pinned for writing.
    pub fn alloc_page(self: &Arc<Self>, file_id: u32) -> Result<(PageId, PageWriteGuard)> {
        let page_id = self.disk.allocate_page(file_id)?;
        let (frame, evicted) = self.pool.new_page(page_id)?;
        let frame_id = frame.frame_id();

        if let Some(ev) = evicted {
            if let Err(e) = self.disk.write_page(ev.page_id, &ev.data) {
                self.pool.unpin_page(page_id, false);
                return Err(e);
            }
        }

        Ok((
            page_id,
            PageWriteGuard {
                mgr: Arc::clone(self),
                page_id,
                frame_id,
                dirty: Cell::new(false),
            },
        ))
    }

    /// Writes all of one file's dirty pages back and syncs the file.
    pub fn flush_file(&self, file_id: u32) -> Result<()> {
        self.pool
            .flush_file(file_id, |pid, data| self.write_raw(pid, data))?;
        self.disk.sync_file(file_id)
    }

    /// Writes every dirty page back and syncs all files.
    pub fn flush_all(&self) -> Result<()> {
        self.pool.flush_all(|pid, data| self.write_raw(pid, data))?;
        self.disk.sync_all()
    }

    fn write_raw(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        buf.copy_from_slice(data);
        self.disk.write_page(page_id, &buf)
    }
}

/// RAII guard holding a read pin on one page.
pub struct PageReadGuard {
    mgr: Arc<BufferManager>,
    page_id: PageId,
    frame_id: FrameId,
}

impl PageReadGuard {
    /// Returns the pinned page's ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Runs `f` over the page bytes.
    pub fn with<R>(&self, f: impl FnOnce(&[u8; PAGE_SIZE]) -> R) -> R {
        let frame = self.mgr.pool.frame(self.frame_id);
        let data = frame.read_data();
        f(&data)
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        self.mgr.pool.unpin_page(self.page_id, false);
    }
}

/// RAII guard holding a write pin on one page.
///
/// The page is unpinned dirty only if it was actually mutated through
/// `with_mut`.
pub struct PageWriteGuard {
    mgr: Arc<BufferManager>,
    page_id: PageId,
    frame_id: FrameId,
    dirty: Cell<bool>,
}

impl PageWriteGuard {
    /// Returns the pinned page's ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Runs `f` over the page bytes without marking them dirty.
    pub fn with<R>(&self, f: impl FnOnce(&[u8; PAGE_SIZE]) -> R) -> R {
        let frame = self.mgr.pool.frame(self.frame_id);
        let data = frame.read_data();
        f(&data)
    }

    /// Runs `f` over the mutable page bytes and marks the page dirty.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> R) -> R {
        self.dirty.set(true);
        let frame = self.mgr.pool.frame(self.frame_id);
        let mut data = frame.write_data();
        f(&mut data)
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        self.mgr.pool.unpin_page(self.page_id, self.dirty.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_mgr(num_frames: usize) -> (Arc<BufferManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(DiskManagerConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
        })
        .unwrap();
        let pool = BufferPool::new(BufferPoolConfig { num_frames });
        (BufferManager::new(disk, pool), dir)
    }

    #[test]
    fn test_alloc_write_read_roundtrip() {
        let (mgr, _dir) = create_test_mgr(10);
        let fid = mgr.disk().open_file("t").unwrap();

        let (page_id, guard) = mgr.alloc_page(fid).unwrap();
        guard.with_mut(|data| data[7] = 0x77);
        drop(guard);

        let guard = mgr.fetch_read(page_id).unwrap();
        assert_eq!(guard.with(|data| data[7]), 0x77);
    }

    #[test]
    fn test_guard_drop_releases_pin() {
        let (mgr, _dir) = create_test_mgr(10);
        let fid = mgr.disk().open_file("t").unwrap();

        let (page_id, guard) = mgr.alloc_page(fid).unwrap();
        assert_eq!(mgr.pinned_count(), 1);
        drop(guard);
        assert_eq!(mgr.pinned_count(), 0);

        let r1 = mgr.fetch_read(page_id).unwrap();
        let r2 = mgr.fetch_read(page_id).unwrap();
        assert_eq!(mgr.pinned_count(), 1); // one frame, two pins
        drop(r1);
        assert_eq!(mgr.pinned_count(), 1);
        drop(r2);
        assert_eq!(mgr.pinned_count(), 0);
    }

    #[test]
    fn test_write_guard_clean_unless_mutated() {
        let (mgr, _dir) = create_test_mgr(10);
        let fid = mgr.disk().open_file("t").unwrap();

        let (page_id, guard) = mgr.alloc_page(fid).unwrap();
        guard.with_mut(|data| data[0] = 1);
        drop(guard);
        mgr.flush_file(fid).unwrap();

        // A write guard that only reads must not re-dirty the page.
        let guard = mgr.fetch_write(page_id).unwrap();
        let _ = guard.with(|data| data[0]);
        drop(guard);
        assert_eq!(mgr.pool().stats().dirty_frames, 0);
    }

    #[test]
    fn test_eviction_writes_back_through_disk() {
        let (mgr, _dir) = create_test_mgr(2);
        let fid = mgr.disk().open_file("t").unwrap();

        // Dirty more pages than the pool holds.
        let mut page_ids = Vec::new();
        for i in 0..6u8 {
            let (page_id, guard) = mgr.alloc_page(fid).unwrap();
            guard.with_mut(|data| data[0] = i);
            page_ids.push(page_id);
        }

        // Every page reads back with its own byte, resident or not.
        for (i, &page_id) in page_ids.iter().enumerate() {
            let guard = mgr.fetch_read(page_id).unwrap();
            assert_eq!(guard.with(|data| data[0]), i as u8);
        }
    }

    #[test]
    fn test_flush_file_reaches_disk() {
        let (mgr, _dir) = create_test_mgr(10);
        let fid = mgr.disk().open_file("t").unwrap();

        let (page_id, guard) = mgr.alloc_page(fid).unwrap();
        guard.with_mut(|data| data[100] = 0xAA);
        drop(guard);

        mgr.flush_file(fid).unwrap();

        let raw = mgr.disk().read_page(page_id).unwrap();
        assert_eq!(raw[100], 0xAA);
    }

    #[test]
    fn test_from_config() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            buffer_pool_frames: 16,
            fsync_enabled: false,
        };
        let mgr = BufferManager::from_config(&config).unwrap();
        assert_eq!(mgr.pool().num_frames(), 16);
    }
}
