//! Buffer pool manager: cached, logged page access.

use crate::node::Node;
use crate::page::{self, Metadata};
use crate::paged_file::PagedFile;
use bytes::Bytes;
use loam_buffer::{CacheStats, PageCache};
use loam_common::layout::{META_PAGE_NUM, NO_PAGE};
use loam_common::{Error, PageNum, Result, StoreConfig};
use loam_wal::Wal;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Buffer pool manager.
///
/// Serves decoded nodes with read precedence cache → WAL → data file, fans
/// every page write through the WAL, and owns the metadata page (root pointer
/// and free-list head). The data file is only written during checkpoint,
/// which happens once per open; between checkpoints the WAL plus the cache
/// are the live truth.
pub struct BufferPool {
    cache: Mutex<PageCache>,
    wal: Mutex<Wal>,
    file: PagedFile,
    /// In-memory mirror of the metadata page.
    meta: Mutex<Metadata>,
}

impl BufferPool {
    /// Opens the pool over `<stem>.db` and `<stem>.log`.
    ///
    /// Recovery order matters: the WAL is replayed and checkpointed into the
    /// data file first, and only then is page 0 consulted to decide whether
    /// this is a fresh database.
    pub fn open(stem: &Path, config: &StoreConfig) -> Result<Self> {
        let file = PagedFile::open(&sibling_path(stem, "db"))?;
        let mut wal = Wal::open(&sibling_path(stem, "log"), config.sync_writes)?;

        if wal.has_committed() {
            let pages = wal.committed_pages();
            info!(pages = pages.len(), "checkpointing recovered WAL frames");
            for &page_num in &pages {
                let data = wal.read(page_num)?.ok_or_else(|| Error::WalCorrupted {
                    offset: 0,
                    reason: format!("committed page {} has no frame", page_num),
                })?;
                file.write_page(page_num, &data)?;
            }
            file.sync()?;
            wal.clear()?;
        }

        let pool = Self {
            cache: Mutex::new(PageCache::new(config.cache_pages)),
            wal: Mutex::new(wal),
            file,
            meta: Mutex::new(Metadata {
                root_page_num: NO_PAGE,
                free_list_head: NO_PAGE,
            }),
        };

        let meta = page::decode_metadata(&pool.page_bytes(META_PAGE_NUM)?)?;
        if meta.root_page_num > 0 {
            debug!(root = meta.root_page_num, "opened existing database");
            *pool.meta.lock() = meta;
        } else {
            pool.initialize()?;
        }
        Ok(pool)
    }

    /// First-time setup: reserve page 1, point the metadata at an empty leaf
    /// root there, and commit.
    ///
    /// The root page is reserved by physically extending the file so that
    /// later allocations (which extend from the current end) never hand it
    /// out again. A crash before the commit leaves `root_page_num` zeroed on
    /// disk, and the next open retries from scratch.
    fn initialize(&self) -> Result<()> {
        info!("initializing fresh database");
        while self.file.num_pages() < 2 {
            self.file.extend()?;
        }
        self.set_metadata(Metadata {
            root_page_num: 1,
            free_list_head: NO_PAGE,
        })?;
        self.write_node(&Node::new_leaf(1, &[], &[]))?;
        self.commit()
    }

    /// Raw page bytes with read precedence cache → WAL → data file.
    ///
    /// Bytes pulled from the data file are cached on the way back; WAL hits
    /// are already indexed in memory and stay where they are.
    fn page_bytes(&self, page_num: PageNum) -> Result<Bytes> {
        if let Some(data) = self.cache.lock().get(page_num) {
            return Ok(data);
        }
        if let Some(data) = self.wal.lock().read(page_num)? {
            return Ok(data);
        }
        let data = self.file.read_page(page_num)?;
        self.cache.lock().insert(page_num, data.clone());
        Ok(data)
    }

    /// Returns the decoded node stored at `page_num`.
    pub fn read_node(&self, page_num: PageNum) -> Result<Node> {
        let data = self.page_bytes(page_num)?;
        page::decode_node(page_num, &data)
    }

    /// Encodes and writes a node: a PUT frame to the WAL, then the cache.
    pub fn write_node(&self, node: &Node) -> Result<()> {
        let data = page::encode_node(node)?;
        self.write_page(node.page_num, data)
    }

    fn write_page(&self, page_num: PageNum, data: Bytes) -> Result<()> {
        self.wal.lock().append_put(page_num, data.clone())?;
        self.cache.lock().insert(page_num, data);
        Ok(())
    }

    /// Pushes `page_num` onto the free list.
    ///
    /// The page is rewritten as a free page pointing at the old list head,
    /// and the metadata page follows it in the same WAL batch.
    pub fn free_page(&self, page_num: PageNum) -> Result<()> {
        self.cache.lock().remove(page_num);
        let Metadata {
            root_page_num,
            free_list_head,
        } = *self.meta.lock();
        self.write_page(page_num, page::encode_free(free_list_head))?;
        self.set_metadata(Metadata {
            root_page_num,
            free_list_head: page_num,
        })
    }

    /// Returns a page number free for a new node: the head of the free list
    /// if there is one, otherwise a fresh page at the end of the data file.
    pub fn allocate_page(&self) -> Result<PageNum> {
        let Metadata {
            root_page_num,
            free_list_head,
        } = *self.meta.lock();
        if free_list_head <= 0 {
            let page_num = self.file.extend()?;
            debug!(page_num, "extended data file for new page");
            return Ok(page_num);
        }

        let next = page::decode_free(free_list_head, &self.page_bytes(free_list_head)?)?;
        self.set_metadata(Metadata {
            root_page_num,
            free_list_head: next,
        })?;
        Ok(free_list_head)
    }

    /// Current root page number.
    pub fn root_page_num(&self) -> PageNum {
        self.meta.lock().root_page_num
    }

    /// Updates the root pointer and persists the metadata page.
    pub fn set_root(&self, page_num: PageNum) -> Result<()> {
        let free_list_head = self.meta.lock().free_list_head;
        self.set_metadata(Metadata {
            root_page_num: page_num,
            free_list_head,
        })
    }

    fn set_metadata(&self, meta: Metadata) -> Result<()> {
        self.write_page(META_PAGE_NUM, page::encode_metadata(&meta))?;
        *self.meta.lock() = meta;
        Ok(())
    }

    /// Appends a COMMIT frame to the WAL and syncs it. One call per public
    /// mutation makes everything that mutation wrote durable.
    pub fn commit(&self) -> Result<()> {
        self.wal.lock().commit()
    }

    /// Cache hit/miss counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }
}

/// `<stem>.<extension>`, preserving any existing extension in `stem`.
fn sibling_path(stem: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}
