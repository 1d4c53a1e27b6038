//! Fixed-size page I/O against the data file.

use bytes::Bytes;
use loam_common::layout::PAGE_SIZE;
use loam_common::{Error, PageNum, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Page-granular handle for the data file.
///
/// The file length is always a whole number of pages. A brand-new file is
/// extended by one page immediately so that page 0 (metadata) exists.
pub struct PagedFile {
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    num_pages: i64,
}

impl PagedFile {
    /// Opens (creating if absent) the data file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(Error::DataFileCorrupted(format!(
                "file size {} is not a multiple of the page size",
                len
            )));
        }

        let paged = Self {
            inner: Mutex::new(Inner {
                file,
                num_pages: (len / PAGE_SIZE as u64) as i64,
            }),
        };
        if paged.num_pages() == 0 {
            paged.extend()?;
        }
        Ok(paged)
    }

    /// Number of pages currently in the file.
    pub fn num_pages(&self) -> i64 {
        self.inner.lock().num_pages
    }

    /// Reads the page at `page_num`.
    pub fn read_page(&self, page_num: PageNum) -> Result<Bytes> {
        let mut inner = self.inner.lock();
        if page_num < 0 || page_num >= inner.num_pages {
            return Err(Error::PageCorrupted {
                page_num,
                reason: "page is beyond the end of the data file".to_string(),
            });
        }
        inner
            .file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        inner.file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Writes a full page at `page_num`.
    ///
    /// Writing past the current end grows the file, which recovery relies on
    /// when a crash loses an unsynced extension but the WAL kept the page.
    pub fn write_page(&self, page_num: PageNum, data: &[u8]) -> Result<()> {
        if data.len() != PAGE_SIZE {
            return Err(Error::PageSizeMismatch {
                expected: PAGE_SIZE,
                actual: data.len(),
            });
        }
        let mut inner = self.inner.lock();
        if page_num < 0 {
            return Err(Error::PageCorrupted {
                page_num,
                reason: "negative page number".to_string(),
            });
        }
        inner
            .file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        inner.file.write_all(data)?;
        if page_num >= inner.num_pages {
            inner.num_pages = page_num + 1;
        }
        Ok(())
    }

    /// Appends one zeroed page and returns its page number.
    pub fn extend(&self) -> Result<PageNum> {
        let mut inner = self.inner.lock();
        let page_num = inner.num_pages;
        inner
            .file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        inner.file.write_all(&[0u8; PAGE_SIZE])?;
        inner.num_pages += 1;
        Ok(page_num)
    }

    /// Fsyncs the data file.
    pub fn sync(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}
