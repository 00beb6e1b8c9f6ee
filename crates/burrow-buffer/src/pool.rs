//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::ClockReplacer;
use burrow_common::page::{PageId, PAGE_SIZE};
use burrow_common::{BurrowError, Result};
use parking_lot::Mutex;
use sysinfo::System;

/// A dirty page that was evicted from the buffer pool.
/// Caller must write this to disk to prevent data loss.
#[derive(Debug)]
pub struct EvictedPage {
    pub page_id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping
/// - Free frame list for new pages
/// - Clock replacement for eviction
/// - Pin counting to keep in-use pages resident
pub struct BufferPool {
    config: BufferPoolConfig,
    frames: Vec<BufferFrame>,
    page_table: PageTable,
    free_list: Mutex<Vec<FrameId>>,
    replacer: ClockReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in the free list; pop from the back so low
        // frame numbers go out first.
        let free_list: Vec<_> = (0..num_frames).rev().map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: PageTable::new(num_frames),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(num_frames),
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM,
    /// with a floor of 1,000 frames so low-memory systems still get
    /// useful caching.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let num_frames = (available_bytes / 4 / PAGE_SIZE).max(1_000);

        Self::new(BufferPoolConfig { num_frames })
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains(page_id)
    }

    /// Returns the frame with the given ID.
    ///
    /// Valid for any ID the pool handed out; a pinned page's frame ID
    /// stays bound to that page until the last unpin.
    #[inline]
    pub fn frame(&self, frame_id: FrameId) -> &BufferFrame {
        &self.frames[frame_id.0 as usize]
    }

    /// Fetches a resident page, pinning it.
    ///
    /// Returns None if the page is not in the pool.
    #[inline]
    pub fn fetch_page(&self, page_id: PageId) -> Option<&BufferFrame> {
        let frame_id = self.page_table.get(page_id)?;
        let frame = &self.frames[frame_id.0 as usize];
        frame.pin();
        self.replacer.record_access(frame_id);
        Some(frame)
    }

    /// Allocates a frame for a new page: free list first, then eviction.
    fn allocate_frame(&self) -> Result<(FrameId, Option<EvictedPage>)> {
        {
            let mut free_list = self.free_list.lock();
            if let Some(frame_id) = free_list.pop() {
                return Ok((frame_id, None));
            }
        }

        let victim_id = self.replacer.evict(|fid| {
            let frame = &self.frames[fid.0 as usize];
            !frame.is_empty() && frame.pin_count() == 0
        });

        let Some(victim_id) = victim_id else {
            return Err(BurrowError::BufferPoolFull);
        };

        let frame = &self.frames[victim_id.0 as usize];

        // Capture the evicted page's image if it needs writing back.
        let evicted = match frame.page_id() {
            Some(page_id) if frame.is_dirty() => {
                let guard = frame.read_data();
                let mut data = Box::new([0u8; PAGE_SIZE]);
                data.copy_from_slice(&**guard);
                Some(EvictedPage { page_id, data })
            }
            _ => None,
        };

        if let Some(old_page_id) = frame.page_id() {
            self.page_table.remove(old_page_id);
        }

        Ok((victim_id, evicted))
    }

    /// Inserts a new page into the buffer pool, pinned and zero-filled.
    ///
    /// If the page already exists, returns the existing frame instead.
    /// Any evicted dirty page is handed back for the caller to write out.
    pub fn new_page(&self, page_id: PageId) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.record_access(frame_id);
            return Ok((frame, None));
        }

        let (frame_id, evicted) = self.allocate_frame()?;

        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_page_id(Some(page_id));
        frame.pin();
        self.replacer.record_access(frame_id);

        self.page_table.insert(page_id, frame_id);

        Ok((frame, evicted))
    }

    /// Loads page data read from disk into the pool, pinned.
    pub fn load_page(
        &self,
        page_id: PageId,
        data: &[u8],
    ) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        let (frame, evicted) = self.new_page(page_id)?;
        frame.copy_from(data);
        Ok((frame, evicted))
    }

    /// Releases one pin on a page, marking it dirty if requested.
    ///
    /// Returns false if the page is not resident.
    #[inline]
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let Some(frame_id) = self.page_table.get(page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.0 as usize];

        if is_dirty {
            frame.set_dirty(true);
        }
        frame.unpin();
        true
    }

    /// Flushes all dirty pages belonging to one file through the callback.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_file<F>(&self, file_id: u32, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        self.flush_matching(|page_id| page_id.file_id == file_id, &mut flush_fn)
    }

    /// Flushes every dirty page through the callback.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_all<F>(&self, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        self.flush_matching(|_| true, &mut flush_fn)
    }

    fn flush_matching<P, F>(&self, pred: P, flush_fn: &mut F) -> Result<usize>
    where
        P: Fn(PageId) -> bool,
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        let mut candidates = Vec::new();
        self.page_table.for_each(|page_id, frame_id| {
            if pred(page_id) {
                candidates.push((page_id, frame_id));
            }
            true
        });

        let mut flushed = 0;
        for (page_id, frame_id) in candidates {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                flush_fn(page_id, &**data)?;
                frame.set_dirty(false);
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Returns the number of frames with at least one pin outstanding.
    pub fn pinned_count(&self) -> usize {
        let mut pinned = 0;
        self.page_table.for_each(|_, frame_id| {
            if self.frames[frame_id.0 as usize].is_pinned() {
                pinned += 1;
            }
            true
        });
        pinned
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;

        self.page_table.for_each(|_, frame_id| {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                pinned_frames += 1;
            }
            if frame.is_dirty() {
                dirty_frames += 1;
            }
            true
        });

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_count(),
            used_frames: self.page_table.len(),
            pinned_frames,
            dirty_frames,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}
