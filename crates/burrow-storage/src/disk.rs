//! Disk manager for page-level file I/O.

use burrow_common::page::{PageId, PAGE_SIZE};
use burrow_common::{BurrowError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Base directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

/// Manages reading and writing pages to files in a data directory.
///
/// Files are addressed by name (heap files carry the relation name,
/// index files are named `"{relation}.{attr_offset}"`). Opening a file
/// registers it under a numeric file ID; page I/O uses the ID.
pub struct DiskManager {
    config: DiskManagerConfig,
    inner: Mutex<DiskInner>,
}

struct DiskInner {
    ids: HashMap<String, u32>,
    files: HashMap<u32, FileHandle>,
    next_file_id: u32,
}

/// Handle for an open data file.
struct FileHandle {
    file: File,
    #[allow(dead_code)]
    path: PathBuf,
    /// Number of pages in the file.
    num_pages: u32,
}

impl DiskManager {
    /// Creates a new disk manager rooted at the configured directory.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            inner: Mutex::new(DiskInner {
                ids: HashMap::new(),
                files: HashMap::new(),
                next_file_id: 0,
            }),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Returns true if a file with the given name exists on disk.
    pub fn file_exists(&self, name: &str) -> bool {
        self.config.data_dir.join(name).exists()
    }

    /// Opens (creating if absent) a named file and returns its file ID.
    ///
    /// Reopening an already-registered name returns the same ID.
    pub fn open_file(&self, name: &str) -> Result<u32> {
        let mut inner = self.inner.lock();

        if let Some(&id) = inner.ids.get(name) {
            return Ok(id);
        }

        let path = self.config.data_dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let file_id = inner.next_file_id;
        inner.next_file_id += 1;
        inner.ids.insert(name.to_string(), file_id);
        inner.files.insert(
            file_id,
            FileHandle {
                file,
                path,
                num_pages,
            },
        );

        Ok(file_id)
    }

    /// Closes a file, syncing it first and dropping its registration.
    pub fn close_file(&self, file_id: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.files.remove(&file_id) {
            handle.file.sync_all()?;
        }
        inner.ids.retain(|_, &mut id| id != file_id);
        Ok(())
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.inner.lock();
        let handle = Self::handle(&mut inner, page_id.file_id)?;

        if page_id.page_num >= handle.num_pages {
            return Err(BurrowError::PageNotFound(page_id.to_string()));
        }

        let offset = (page_id.page_num as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = [0u8; PAGE_SIZE];
        handle.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = Self::handle(&mut inner, page_id.file_id)?;

        let offset = (page_id.page_num as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(data)?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        if page_id.page_num >= handle.num_pages {
            handle.num_pages = page_id.page_num + 1;
        }

        Ok(())
    }

    /// Allocates a new zero-filled page at the end of the file.
    pub fn allocate_page(&self, file_id: u32) -> Result<PageId> {
        let mut inner = self.inner.lock();
        let handle = Self::handle(&mut inner, file_id)?;

        let page_num = handle.num_pages;
        let offset = (page_num as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        handle.num_pages = page_num + 1;

        Ok(PageId::new(file_id, page_num))
    }

    /// Returns the number of pages in a file.
    pub fn num_pages(&self, file_id: u32) -> Result<u32> {
        let mut inner = self.inner.lock();
        Ok(Self::handle(&mut inner, file_id)?.num_pages)
    }

    /// Syncs one file's pending writes to disk.
    pub fn sync_file(&self, file_id: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::handle(&mut inner, file_id)?.file.sync_all()?;
        Ok(())
    }

    /// Syncs all open files.
    pub fn sync_all(&self) -> Result<()> {
        let inner = self.inner.lock();
        for handle in inner.files.values() {
            handle.file.sync_all()?;
        }
        Ok(())
    }

    fn handle(inner: &mut DiskInner, file_id: u32) -> Result<&mut FileHandle> {
        inner
            .files
            .get_mut(&file_id)
            .ok_or_else(|| BurrowError::PageNotFound(format!("file {} not open", file_id)))
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.sync_all();
    }
}
