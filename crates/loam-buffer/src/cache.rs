//! Bounded LRU cache for page bytes.

use bytes::Bytes;
use loam_common::PageNum;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Bounded LRU cache mapping page numbers to page images.
///
/// Entries are `Bytes`, so a hit hands back a reference-counted clone rather
/// than copying the page. The least recently used entry is dropped when the
/// cache is full; the WAL or the data file still holds its bytes.
pub struct PageCache {
    entries: LruCache<PageNum, Bytes>,
    hits: u64,
    misses: u64,
}

impl PageCache {
    /// Creates a cache holding at most `capacity` pages.
    ///
    /// A capacity of zero is clamped to one page.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the cached bytes for `page_num`, marking it most recently used.
    pub fn get(&mut self, page_num: PageNum) -> Option<Bytes> {
        match self.entries.get(&page_num) {
            Some(data) => {
                self.hits += 1;
                Some(data.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts (or replaces) the bytes for `page_num`, evicting the least
    /// recently used entry if the cache is full.
    pub fn insert(&mut self, page_num: PageNum, data: Bytes) {
        self.entries.put(page_num, data);
    }

    /// Removes `page_num` from the cache if present.
    pub fn remove(&mut self, page_num: PageNum) {
        self.entries.pop(&page_num);
    }

    /// Number of pages currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no pages are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of pages this cache holds.
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Returns hit/miss counters accumulated since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
        }
    }
}

/// Access statistics for a [`PageCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found their page.
    pub hits: u64,
    /// Lookups that fell through to the WAL or the data file.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
