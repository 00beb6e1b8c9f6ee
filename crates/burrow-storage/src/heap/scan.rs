//! Forward scan over a heap file's records.

use crate::heap::file::HeapFile;
use crate::heap::page;
use crate::record::RecordId;
use burrow_common::page::{PageId, PAGE_SIZE};
use burrow_common::Result;
use bytes::Bytes;

/// Iterates a heap file's records in storage order.
///
/// Pages are pinned one at a time; the current page's image is copied
/// out so no pin outlives the iteration step.
pub struct HeapScan<'a> {
    file: &'a HeapFile,
    next_ordinal: u64,
    page_buf: Box<[u8; PAGE_SIZE]>,
    /// Page currently in `page_buf`; 0 (the header page) means none.
    cached_page: u32,
}

impl<'a> HeapScan<'a> {
    pub(crate) fn new(file: &'a HeapFile) -> Self {
        Self {
            file,
            next_ordinal: 0,
            page_buf: Box::new([0u8; PAGE_SIZE]),
            cached_page: 0,
        }
    }

    fn page_image(&mut self, page_num: u32) -> Result<&[u8; PAGE_SIZE]> {
        if self.cached_page != page_num {
            let guard = self
                .file
                .bufmgr()
                .fetch_read(PageId::new(self.file.file_id(), page_num))?;
            guard.with(|data| self.page_buf.copy_from_slice(data));
            self.cached_page = page_num;
        }
        Ok(&self.page_buf)
    }
}

impl Iterator for HeapScan<'_> {
    type Item = Result<(RecordId, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_ordinal >= self.file.record_count() {
            return None;
        }

        let per_page = self.file.records_per_page();
        let ordinal = self.next_ordinal;
        let rid = RecordId::new(1 + (ordinal / per_page) as u32, (ordinal % per_page) as u16);
        let record_size = self.file.record_size();

        let record = match self.page_image(rid.page_num) {
            Ok(image) => Bytes::copy_from_slice(page::record_at(image, rid.slot, record_size)),
            Err(e) => return Some(Err(e)),
        };

        self.next_ordinal += 1;
        Some(Ok((rid, record)))
    }
}
