//! Configuration structures for LoamDB.

use crate::layout;
use serde::{Deserialize, Serialize};

/// Configuration for opening a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Number of pages the buffer pool may hold in memory.
    pub cache_pages: usize,
    /// Maximum number of keys per tree node. `None` uses the default derived
    /// from the page size; overrides must be smaller than that default.
    pub node_capacity: Option<usize>,
    /// Fsync the WAL on every commit. Disable only where durability does not
    /// matter, such as tests.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_pages: 1024,
            node_capacity: None,
            sync_writes: true,
        }
    }
}

impl StoreConfig {
    /// Returns the resolved node capacity.
    pub fn capacity(&self) -> usize {
        self.node_capacity.unwrap_or(layout::node_capacity())
    }
}
