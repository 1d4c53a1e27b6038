//! Page caching for LoamDB.
//!
//! This crate provides a bounded LRU cache of page images keyed by page
//! number. Every page write goes through the WAL before it reaches the
//! cache, so an evicted entry is never the only copy of its page and
//! eviction needs no write-back.

mod cache;

pub use cache::{CacheStats, PageCache};
