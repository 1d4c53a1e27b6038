//! Right-biased B+ tree engine over the buffer pool.
//!
//! Separators are right-biased: the key at parent index `i` equals the
//! minimum key of the subtree at index `i + 1`, and an exact match in an
//! internal node descends right. This shapes the split rule (a leaf split
//! promotes the right half's first key) and the delete bookkeeping (removing
//! a subtree's minimum invalidates the separator above it).

use crate::node::Node;
use crate::pool::BufferPool;
use loam_common::layout::NO_PAGE;
use loam_common::{Error, PageNum, Result};
use tracing::trace;

/// Persistent right-biased B+ tree.
///
/// Nodes are transient decodings fetched from the pool on every visit and
/// written back after mutation; no node reference outlives one call. The
/// caller provides mutual exclusion: `set`/`delete` take `&mut self` and the
/// store wraps the tree in a reader-writer lock.
pub struct BPlusTree {
    pool: BufferPool,
    capacity: usize,
}

/// Outcome of a recursive insert: the separator and new right page when the
/// visited node split.
type SplitResult = Option<(String, PageNum)>;

impl BPlusTree {
    /// Creates a tree over `pool` with the given node capacity.
    pub fn new(pool: BufferPool, capacity: usize) -> Self {
        Self { pool, capacity }
    }

    /// Looks up `key`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_at(self.pool.root_page_num(), key)
    }

    fn get_at(&self, page_num: PageNum, key: &str) -> Result<Option<String>> {
        let node = self.pool.read_node(page_num)?;
        if node.is_leaf {
            match node.keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(i) => Ok(Some(node.values[i].clone())),
                Err(_) => Ok(None),
            }
        } else {
            let i = child_index(key, &node.keys);
            self.get_at(node.children[i], key)
        }
    }

    /// Inserts `key`, overwriting the value if it is already present.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let root_page = self.pool.root_page_num();
        if let Some((separator, right_page)) = self.set_at(root_page, key, value)? {
            // the root split: grow a new root with a single separator
            let new_root_page = self.pool.allocate_page()?;
            let new_root =
                Node::new_internal(new_root_page, &[separator], &[root_page, right_page]);
            self.pool.write_node(&new_root)?;
            self.pool.set_root(new_root_page)?;
            trace!(root = new_root_page, "tree grew a level");
        }
        self.pool.commit()
    }

    fn set_at(&self, page_num: PageNum, key: &str, value: &str) -> Result<SplitResult> {
        let mut node = self.pool.read_node(page_num)?;
        if node.is_leaf {
            match node.keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(i) => {
                    node.values[i] = value.to_string();
                    self.pool.write_node(&node)?;
                    Ok(None)
                }
                Err(i) => {
                    node.insert_key(key.to_string(), i);
                    node.insert_value(value.to_string(), i);
                    if node.keys.len() > self.capacity {
                        return self.split_leaf(node).map(Some);
                    }
                    self.pool.write_node(&node)?;
                    Ok(None)
                }
            }
        } else {
            let i = child_index(key, &node.keys);
            let Some((separator, right_page)) = self.set_at(node.children[i], key, value)? else {
                return Ok(None);
            };
            node.insert_key(separator, i);
            node.insert_child(right_page, i + 1);
            if node.keys.len() > self.capacity {
                return self.split_internal(node).map(Some);
            }
            self.pool.write_node(&node)?;
            Ok(None)
        }
    }

    /// Splits an over-full leaf. The separator handed to the parent is the
    /// right half's first key, which stays in the right leaf.
    fn split_leaf(&self, mut node: Node) -> Result<(String, PageNum)> {
        let mid = node.keys.len() / 2;
        let right_page = self.pool.allocate_page()?;
        let right = Node::new_leaf(right_page, &node.keys[mid..], &node.values[mid..]);
        node.keys.truncate(mid);
        node.values.truncate(mid);

        let separator = right.keys[0].clone();
        self.pool.write_node(&node)?;
        self.pool.write_node(&right)?;
        trace!(left = node.page_num, right = right_page, "split leaf");
        Ok((separator, right_page))
    }

    /// Splits an over-full internal node. The middle key moves up to the
    /// parent and belongs to neither half.
    fn split_internal(&self, mut node: Node) -> Result<(String, PageNum)> {
        let mid = node.keys.len() / 2;
        let separator = node.keys[mid].clone();
        let right_page = self.pool.allocate_page()?;
        let right = Node::new_internal(right_page, &node.keys[mid + 1..], &node.children[mid + 1..]);
        node.keys.truncate(mid);
        node.children.truncate(mid + 1);

        self.pool.write_node(&node)?;
        self.pool.write_node(&right)?;
        trace!(left = node.page_num, right = right_page, "split internal node");
        Ok((separator, right_page))
    }

    /// Removes `key`. Removing an absent key is a no-op.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let root_page = self.pool.root_page_num();
        self.delete_at(root_page, key)?;

        let root = self.pool.read_node(root_page)?;
        if !root.is_leaf && root.keys.is_empty() {
            // the root lost its last separator; its sole child takes over
            self.pool.set_root(root.children[0])?;
            self.pool.free_page(root_page)?;
            trace!(root = root.children[0], "tree lost a level");
        }
        self.pool.commit()
    }

    /// Recursive delete. Returns whether the visited node is now under-full.
    fn delete_at(&self, page_num: PageNum, key: &str) -> Result<bool> {
        let mut node = self.pool.read_node(page_num)?;
        if node.is_leaf {
            let Ok(i) = node.keys.binary_search_by(|k| k.as_str().cmp(key)) else {
                return Ok(false);
            };
            node.delete_key(i);
            node.delete_value(i);
            self.pool.write_node(&node)?;
            return Ok(node.keys.len() < self.capacity / 2);
        }

        let i = child_index(key, &node.keys);
        let child_underflow = self.delete_at(node.children[i], key)?;
        if child_underflow {
            self.rebalance(&mut node, i, key)?;
        } else if i > 0 && node.keys[i - 1] == key {
            // the deleted key was the minimum of subtree i; refresh the
            // separator that named it
            node.keys[i - 1] = self.min_key_of(node.children[i])?;
            self.pool.write_node(&node)?;
        }
        Ok(node.keys.len() < self.capacity / 2)
    }

    /// Restores minimum occupancy of child `i` with exactly one remedial
    /// action: borrow from the left sibling, borrow from the right sibling,
    /// merge into the left sibling, or merge with the right sibling, in that
    /// priority order.
    fn rebalance(&self, parent: &mut Node, i: usize, deleted_key: &str) -> Result<()> {
        if i > 0 {
            let left = self.pool.read_node(parent.children[i - 1])?;
            if left.can_lend(self.capacity) {
                return self.borrow_from_left(parent, i, left);
            }
            if i + 1 < parent.children.len() {
                let right = self.pool.read_node(parent.children[i + 1])?;
                if right.can_lend(self.capacity) {
                    return self.borrow_from_right(parent, i, right, deleted_key);
                }
            }
            return self.merge_into_left(parent, i, left);
        }

        let right = self.pool.read_node(parent.children[i + 1])?;
        if right.can_lend(self.capacity) {
            return self.borrow_from_right(parent, i, right, deleted_key);
        }
        self.merge_from_right(parent, i, right)
    }

    /// Moves the left sibling's maximum element into child `i`.
    ///
    /// A leaf receives the borrowed key itself; an internal child instead
    /// receives the current parent separator as its new minimum key, with the
    /// borrowed child page. Either way the parent separator becomes the
    /// borrowed key.
    fn borrow_from_left(&self, parent: &mut Node, i: usize, mut left: Node) -> Result<()> {
        let mut child = self.pool.read_node(parent.children[i])?;
        let (key, value, grandchild) = left.remove_max();
        if child.is_leaf {
            child.accept_max_from_left(key.clone(), value, NO_PAGE);
        } else {
            child.accept_max_from_left(parent.keys[i - 1].clone(), None, grandchild);
        }
        parent.keys[i - 1] = key;

        self.pool.write_node(&left)?;
        self.pool.write_node(&child)?;
        self.pool.write_node(parent)?;
        Ok(())
    }

    /// Moves the right sibling's minimum element into child `i`.
    fn borrow_from_right(
        &self,
        parent: &mut Node,
        i: usize,
        mut right: Node,
        deleted_key: &str,
    ) -> Result<()> {
        let mut child = self.pool.read_node(parent.children[i])?;
        if child.is_leaf {
            let (key, value, _) = right.remove_min();
            child.accept_min_from_right(key, value, NO_PAGE);
        } else {
            // remove_min of an internal node returns a separator, not the
            // subtree minimum; capture the minimum before removal
            let min_key = self.min_key(&right)?;
            let (_, _, grandchild) = right.remove_min();
            child.accept_min_from_right(min_key, None, grandchild);
        }
        parent.keys[i] = self.min_key(&right)?;
        if i > 0 && parent.keys[i - 1] == deleted_key {
            parent.keys[i - 1] = self.min_key(&child)?;
        }

        self.pool.write_node(&right)?;
        self.pool.write_node(&child)?;
        self.pool.write_node(parent)?;
        Ok(())
    }

    /// Folds child `i` into its left sibling and frees its page. An internal
    /// merge re-inserts the separator the right child implicitly held: its
    /// subtree minimum.
    fn merge_into_left(&self, parent: &mut Node, i: usize, mut left: Node) -> Result<()> {
        let child = self.pool.read_node(parent.children[i])?;
        let child_page = child.page_num;
        if child.is_leaf {
            left.keys.extend(child.keys);
            left.values.extend(child.values);
        } else {
            let separator = self.min_key(&child)?;
            left.keys.push(separator);
            left.keys.extend(child.keys);
            left.children.extend(child.children);
        }
        parent.delete_key(i - 1);
        parent.delete_child(i);

        self.pool.write_node(&left)?;
        self.pool.write_node(parent)?;
        self.pool.free_page(child_page)
    }

    /// Folds the right sibling into child `i` (used when there is no left
    /// sibling) and frees the right sibling's page.
    fn merge_from_right(&self, parent: &mut Node, i: usize, right: Node) -> Result<()> {
        let mut child = self.pool.read_node(parent.children[i])?;
        let right_page = right.page_num;
        if child.is_leaf {
            child.keys.extend(right.keys);
            child.values.extend(right.values);
        } else {
            let separator = self.min_key(&right)?;
            child.keys.push(separator);
            child.keys.extend(right.keys);
            child.children.extend(right.children);
        }
        parent.delete_key(i);
        parent.delete_child(i + 1);

        self.pool.write_node(&child)?;
        self.pool.write_node(parent)?;
        self.pool.free_page(right_page)
    }

    /// The first key of the leftmost leaf under `node`.
    fn min_key(&self, node: &Node) -> Result<String> {
        if node.is_leaf {
            Ok(node.keys[0].clone())
        } else {
            self.min_key_of(node.children[0])
        }
    }

    fn min_key_of(&self, page_num: PageNum) -> Result<String> {
        let node = self.pool.read_node(page_num)?;
        self.min_key(&node)
    }

    /// Walks the whole tree verifying its structural invariants: key order
    /// within and across nodes, arity of values and children, occupancy
    /// bounds, and uniform leaf depth.
    pub fn check_structure(&self) -> Result<()> {
        self.check_node(self.pool.root_page_num(), None, None, true)?;
        Ok(())
    }

    /// Checks one node and its subtree; returns the height of the subtree.
    fn check_node(
        &self,
        page_num: PageNum,
        lower: Option<&str>,
        upper: Option<&str>,
        is_root: bool,
    ) -> Result<usize> {
        let node = self.pool.read_node(page_num)?;

        if node.keys.len() > self.capacity {
            return Err(Error::TreeCorrupted(format!(
                "page {} holds {} keys, over capacity {}",
                page_num,
                node.keys.len(),
                self.capacity
            )));
        }
        if !is_root && node.keys.len() < self.capacity / 2 {
            return Err(Error::TreeCorrupted(format!(
                "page {} holds {} keys, under minimum {}",
                page_num,
                node.keys.len(),
                self.capacity / 2
            )));
        }
        for pair in node.keys.windows(2) {
            if pair[0] >= pair[1] {
                return Err(Error::TreeCorrupted(format!(
                    "page {} keys are not strictly increasing ({:?} then {:?})",
                    page_num, pair[0], pair[1]
                )));
            }
        }
        for key in &node.keys {
            if lower.is_some_and(|low| key.as_str() < low) {
                return Err(Error::TreeCorrupted(format!(
                    "page {} key {:?} is below its subtree bound {:?}",
                    page_num, key, lower
                )));
            }
            if upper.is_some_and(|high| key.as_str() >= high) {
                return Err(Error::TreeCorrupted(format!(
                    "page {} key {:?} is past its subtree bound {:?}",
                    page_num, key, upper
                )));
            }
        }

        if node.is_leaf {
            if node.values.len() != node.keys.len() {
                return Err(Error::TreeCorrupted(format!(
                    "leaf {} holds {} keys but {} values",
                    page_num,
                    node.keys.len(),
                    node.values.len()
                )));
            }
            return Ok(1);
        }

        if node.children.len() != node.keys.len() + 1 {
            return Err(Error::TreeCorrupted(format!(
                "internal node {} holds {} keys but {} children",
                page_num,
                node.keys.len(),
                node.children.len()
            )));
        }
        let mut height = 0;
        for (i, &child) in node.children.iter().enumerate() {
            let child_lower = if i == 0 {
                lower
            } else {
                Some(node.keys[i - 1].as_str())
            };
            let child_upper = if i == node.keys.len() {
                upper
            } else {
                Some(node.keys[i].as_str())
            };
            let child_height = self.check_node(child, child_lower, child_upper, false)?;
            if i == 0 {
                height = child_height;
            } else if child_height != height {
                return Err(Error::TreeCorrupted(format!(
                    "internal node {} has children of unequal height",
                    page_num
                )));
            }
        }
        Ok(height + 1)
    }

    /// Cache statistics of the underlying pool.
    pub fn cache_stats(&self) -> loam_buffer::CacheStats {
        self.pool.cache_stats()
    }
}

/// Index of the child to descend into for `key`.
///
/// An exact separator match goes right: the separator is the minimum key of
/// its right subtree.
fn child_index(key: &str, keys: &[String]) -> usize {
    match keys.binary_search_by(|k| k.as_str().cmp(key)) {
        Ok(i) => i + 1,
        Err(i) => i,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_index_descends_right_on_match() {
        let keys: Vec<String> = ["g", "m", "t"].iter().map(|s| s.to_string()).collect();

        assert_eq!(child_index("a", &keys), 0);
        assert_eq!(child_index("g", &keys), 1); // exact match goes right
        assert_eq!(child_index("h", &keys), 1);
        assert_eq!(child_index("m", &keys), 2);
        assert_eq!(child_index("s", &keys), 2);
        assert_eq!(child_index("t", &keys), 3);
        assert_eq!(child_index("z", &keys), 3);
    }

    #[test]
    fn test_child_index_empty_keys() {
        assert_eq!(child_index("a", &[]), 0);
    }
}
