//! Public key-value store facade.

use crate::pool::BufferPool;
use crate::tree::BPlusTree;
use loam_common::layout::{self, KEY_SIZE, VALUE_SIZE};
use loam_common::{Error, Result, StoreConfig};
use parking_lot::RwLock;
use std::path::Path;

/// Persistent key-value store backed by a crash-safe B+ tree.
///
/// `get` runs under a shared lock so readers proceed in parallel; `set` and
/// `delete` take the exclusive lock, so there is exactly one writer at a
/// time. Every mutation ends with a WAL commit and is durable when the call
/// returns. Dropping the store is always safe: anything committed is
/// recovered on the next open, anything else is rolled back.
pub struct Store {
    tree: RwLock<BPlusTree>,
}

impl Store {
    /// Opens (creating if needed) the store backed by `<stem>.db` and
    /// `<stem>.log`.
    pub fn open(stem: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let capacity = config.capacity();
        if capacity < 2 || capacity > layout::node_capacity() {
            return Err(Error::InvalidCapacity(capacity));
        }
        let pool = BufferPool::open(stem.as_ref(), &config)?;
        Ok(Self {
            tree: RwLock::new(BPlusTree::new(pool, capacity)),
        })
    }

    /// Returns the value stored under `key`, or `None` if it is absent.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.tree.read().get(key)
    }

    /// Stores `value` under `key`, overwriting any existing value.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        if key.len() > KEY_SIZE {
            return Err(Error::KeyTooLarge {
                len: key.len(),
                max: KEY_SIZE,
            });
        }
        if value.len() > VALUE_SIZE {
            return Err(Error::ValueTooLarge {
                len: value.len(),
                max: VALUE_SIZE,
            });
        }
        self.tree.write().set(key, value)
    }

    /// Removes `key`. Removing an absent key is a no-op.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.tree.write().delete(key)
    }

    /// Verifies the structural invariants of the underlying tree.
    pub fn check_tree(&self) -> Result<()> {
        self.tree.read().check_structure()
    }

    /// Buffer pool cache statistics.
    pub fn cache_stats(&self) -> loam_buffer::CacheStats {
        self.tree.read().cache_stats()
    }
}
