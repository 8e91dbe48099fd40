//! B-tree operations over the storage layer.
//!
//! The tree uses top-down preemptive maintenance: inserts split a full child
//! before descending into it, and deletes grow an underfull child (borrow
//! from a sibling or merge with one) before descending, so no operation ever
//! revisits an ancestor after descending.
//!
//! The root always lives at node index 0. When insertion must grow the tree,
//! the root's contents are copied into a freshly allocated node and index 0
//! is rewritten as the new one-child root; when deletion leaves the root
//! with a single child, that child is pulled back into index 0.

use std::cmp::Ordering;
use std::path::Path;

use crate::config::TreeConfig;
use crate::drive::Drive;
use crate::error::{Error, NodeIndex, Result};
use crate::node::Node;

/// Position of a key within the tree: the node that holds it and the key's
/// slot in that node.
#[derive(Debug, Clone, Copy)]
struct KeyRef {
    node: NodeIndex,
    slot: usize,
}

/// An on-disk B-tree mapping byte-string keys to `u64` values.
///
/// Keys are variable-length byte strings of up to `key_size - 1` bytes;
/// values are fixed-width `u64`. The tree lives in a single file whose
/// layout is pinned by the persisted `key_size` and `degree` parameters.
///
/// All operations are synchronous and the instance exclusively owns its
/// backing file: mutations take `&mut self`, queries take `&self`. The root
/// node is kept in memory; all other nodes are read on demand.
#[derive(Debug)]
pub struct BTree {
    drive: Drive,
    root: Node,
    sync_on_write: bool,
}

impl BTree {
    /// Opens the tree at `path`, creating the file if it does not exist.
    ///
    /// An existing file's persisted `key_size` and `degree` are adopted and
    /// the configured values are informational only; a fresh file is
    /// initialized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for rejected parameters,
    /// [`Error::CannotOpen`] if the file cannot be opened read-write, and
    /// [`Error::Corrupt`] if an existing file is malformed.
    pub fn open(path: impl AsRef<Path>, config: TreeConfig) -> Result<Self> {
        let (drive, root) = Drive::open(path.as_ref(), &config)?;
        Ok(Self { drive, root, sync_on_write: config.sync_on_write })
    }

    // ------------------------------------------------------------------
    // Point operations
    // ------------------------------------------------------------------

    /// Returns the value stored under `key`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for a key longer than the slot allows,
    /// or an error if a node read fails.
    pub fn get(&self, key: &[u8]) -> Result<Option<u64>> {
        self.check_probe(key)?;
        let Some(at) = self.search(key)? else {
            return Ok(None);
        };
        if at.node == 0 {
            return Ok(Some(self.root.values[at.slot]));
        }
        let node = self.drive.read_node(at.node)?;
        Ok(Some(node.values[at.slot]))
    }

    /// Returns whether `key` is stored in the tree.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get`](Self::get).
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.check_probe(key)?;
        Ok(self.search(key)?.is_some())
    }

    /// Inserts or updates a key. Returns `true` iff a new key was added;
    /// inserting an existing key overwrites its value in place and leaves
    /// [`size`](Self::size) unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for an empty key or one longer than
    /// `key_size - 1` bytes, or an error if node I/O fails.
    pub fn put(&mut self, key: &[u8], value: u64) -> Result<bool> {
        self.check_storable(key)?;
        if self.root.keys.len() == self.drive.layout.max_keys() {
            self.expand_root()?;
        }
        let added = insert_nonfull(&mut self.drive, &mut self.root, key, value)?;
        self.flush()?;
        Ok(added)
    }

    /// Removes `key`, returning its prior value, or `None` if it was not
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for a key longer than the slot allows,
    /// or an error if node I/O fails.
    pub fn remove(&mut self, key: &[u8]) -> Result<Option<u64>> {
        self.check_probe(key)?;
        let removed = remove_key(&mut self.drive, &mut self.root, key)?;

        // A root left keyless with a single child shrinks the tree by one
        // level: pull the child's contents into index 0 and free the child.
        if self.root.keys.is_empty() && !self.root.children.is_empty() {
            debug_assert_eq!(self.root.children.len(), 1);
            let child = self.drive.read_node(self.root.children[0])?;
            let freed = child.index;
            self.root.keys = child.keys;
            self.root.values = child.values;
            self.root.children = child.children;
            self.drive.write_node(&self.root)?;
            self.drive.push_free(freed)?;
            tracing::trace!(freed, "collapsed root");
        }

        self.flush()?;
        Ok(removed)
    }

    /// Number of live keys in the tree. Reads the cached header; no I/O.
    pub fn size(&self) -> u64 {
        u64::from(self.drive.header.key_count)
    }

    /// Returns whether the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    // ------------------------------------------------------------------
    // Order queries
    // ------------------------------------------------------------------
    //
    // Each query descends from the root tracking the best candidate seen on
    // the way down; the empty vector is the "no neighbor" sentinel (empty
    // keys are not storable, so the sentinel is unambiguous).

    /// Returns the smallest stored key, or the empty vector for an empty
    /// tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a node read fails.
    pub fn first(&self) -> Result<Vec<u8>> {
        if self.root.is_leaf() {
            return Ok(self.root.keys.first().cloned().unwrap_or_default());
        }
        let mut node = self.drive.read_node(self.root.children[0])?;
        while !node.is_leaf() {
            node = self.drive.read_node(node.children[0])?;
        }
        Ok(node.keys.first().cloned().unwrap_or_default())
    }

    /// Returns the largest stored key, or the empty vector for an empty
    /// tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a node read fails.
    pub fn last(&self) -> Result<Vec<u8>> {
        if self.root.is_leaf() {
            return Ok(self.root.keys.last().cloned().unwrap_or_default());
        }
        let mut node = self.drive.read_node(self.root.children[self.root.children.len() - 1])?;
        while !node.is_leaf() {
            node = self.drive.read_node(node.children[node.children.len() - 1])?;
        }
        Ok(node.keys.last().cloned().unwrap_or_default())
    }

    /// Returns the largest stored key strictly less than `key`, or the
    /// empty vector when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for an over-long probe, or an error if
    /// a node read fails.
    pub fn lower(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_probe(key)?;
        self.neighbor_below(key, false)
    }

    /// Returns the largest stored key less than or equal to `key`, or the
    /// empty vector when none exists.
    ///
    /// # Errors
    ///
    /// Same conditions as [`lower`](Self::lower).
    pub fn lower_or_equal(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_probe(key)?;
        self.neighbor_below(key, true)
    }

    /// Returns the smallest stored key strictly greater than `key`, or the
    /// empty vector when none exists.
    ///
    /// # Errors
    ///
    /// Same conditions as [`lower`](Self::lower).
    pub fn higher(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_probe(key)?;
        self.neighbor_above(key, false)
    }

    /// Returns the smallest stored key greater than or equal to `key`, or
    /// the empty vector when none exists.
    ///
    /// # Errors
    ///
    /// Same conditions as [`lower`](Self::lower).
    pub fn higher_or_equal(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_probe(key)?;
        self.neighbor_above(key, true)
    }

    // ------------------------------------------------------------------
    // Properties and inspection hooks
    // ------------------------------------------------------------------

    /// The persisted key slot width in bytes.
    pub fn key_size(&self) -> u32 {
        self.drive.header.key_size
    }

    /// The persisted branching parameter t.
    pub fn degree(&self) -> u32 {
        self.drive.header.degree
    }

    /// Total nodes allocated in the file, including free ones.
    pub fn node_count(&self) -> u64 {
        self.drive.node_count()
    }

    /// Depth of the free-node stack.
    pub fn free_node_count(&self) -> u32 {
        self.drive.header.free_node_count
    }

    /// Maximum keys per node (2t - 1).
    pub fn max_keys_per_node(&self) -> usize {
        self.drive.layout.max_keys()
    }

    /// Minimum keys per non-root node (t - 1).
    pub fn min_keys_per_node(&self) -> usize {
        self.drive.layout.min_keys()
    }

    /// Maximum children per node (2t).
    pub fn max_children_per_node(&self) -> usize {
        self.drive.layout.max_children()
    }

    /// Returns the keys stored in the node at `index` (diagnostic hook).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] for an out-of-range index or a malformed
    /// record.
    pub fn keys_in_node(&self, index: NodeIndex) -> Result<Vec<Vec<u8>>> {
        if index == 0 {
            return Ok(self.root.keys.clone());
        }
        Ok(self.drive.read_node(index)?.keys)
    }

    /// Returns the child indexes of the node at `index` (diagnostic hook).
    ///
    /// # Errors
    ///
    /// Same conditions as [`keys_in_node`](Self::keys_in_node).
    pub fn children_in_node(&self, index: NodeIndex) -> Result<Vec<NodeIndex>> {
        if index == 0 {
            return Ok(self.root.children.clone());
        }
        Ok(self.drive.read_node(index)?.children)
    }

    /// Returns the free-node stack, top of the stack first (diagnostic
    /// hook).
    ///
    /// # Errors
    ///
    /// Returns an error if a stack slot read fails.
    pub fn free_nodes(&self) -> Result<Vec<NodeIndex>> {
        self.drive.free_nodes()
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    /// Locates `key`, returning the node and slot that hold it.
    fn search(&self, key: &[u8]) -> Result<Option<KeyRef>> {
        let (slot, found) = find_key_index(&self.root, key);
        if found {
            return Ok(Some(KeyRef { node: 0, slot }));
        }
        if self.root.is_leaf() {
            return Ok(None);
        }
        let mut node = self.drive.read_node(self.root.children[slot])?;
        loop {
            let (slot, found) = find_key_index(&node, key);
            if found {
                return Ok(Some(KeyRef { node: node.index, slot }));
            }
            if node.is_leaf() {
                return Ok(None);
            }
            node = self.drive.read_node(node.children[slot])?;
        }
    }

    /// Moves the full root's contents into a fresh node, leaving index 0 as
    /// a keyless root with that node as its only child, then splits the
    /// child. Preserves the invariant that the root lives at index 0.
    fn expand_root(&mut self) -> Result<()> {
        let index = self.drive.pop_free()?;
        let mut moved = Node::empty(index);
        moved.keys = std::mem::take(&mut self.root.keys);
        moved.values = std::mem::take(&mut self.root.values);
        moved.children = std::mem::take(&mut self.root.children);
        self.drive.write_node(&moved)?;

        self.root.children.push(index);
        self.drive.write_node(&self.root)?;
        tracing::trace!(moved_to = index, "expanded root");

        split_child(&mut self.drive, &mut self.root, 0)
    }

    /// Descends toward `key` keeping the best strictly-smaller (or equal,
    /// when `inclusive`) key seen so far.
    fn neighbor_below(&self, key: &[u8], inclusive: bool) -> Result<Vec<u8>> {
        let mut candidate = Vec::new();
        let mut next = below_step(&self.root, key, inclusive, &mut candidate);
        while let Some(index) = next {
            let node = self.drive.read_node(index)?;
            next = below_step(&node, key, inclusive, &mut candidate);
        }
        Ok(candidate)
    }

    /// Descends toward `key` keeping the best strictly-greater (or equal,
    /// when `inclusive`) key seen so far.
    fn neighbor_above(&self, key: &[u8], inclusive: bool) -> Result<Vec<u8>> {
        let mut candidate = Vec::new();
        let mut next = above_step(&self.root, key, inclusive, &mut candidate);
        while let Some(index) = next {
            let node = self.drive.read_node(index)?;
            next = above_step(&node, key, inclusive, &mut candidate);
        }
        Ok(candidate)
    }

    /// Rejects probe keys that could never be stored because they exceed
    /// the slot width.
    fn check_probe(&self, key: &[u8]) -> Result<()> {
        let max = self.drive.layout.max_payload();
        if key.len() > max {
            return Err(Error::InvalidKey { len: key.len(), max });
        }
        Ok(())
    }

    /// Rejects keys that cannot be stored: over-long payloads and the empty
    /// key (reserved as the no-neighbor sentinel).
    fn check_storable(&self, key: &[u8]) -> Result<()> {
        self.check_probe(key)?;
        if key.is_empty() {
            return Err(Error::InvalidKey { len: 0, max: self.drive.layout.max_payload() });
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.sync_on_write {
            self.drive.sync()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Node scans
// ---------------------------------------------------------------------------

/// Linear lower-bound scan: the index of the first key not less than `key`,
/// and whether that key equals `key`.
fn find_key_index(node: &Node, key: &[u8]) -> (usize, bool) {
    for (i, stored) in node.keys.iter().enumerate() {
        match key.cmp(stored.as_slice()) {
            Ordering::Equal => return (i, true),
            Ordering::Less => return (i, false),
            Ordering::Greater => {},
        }
    }
    (node.keys.len(), false)
}

/// Index of the first key in `node` that is >= `key`.
fn first_not_below(node: &Node, key: &[u8]) -> usize {
    node.keys.iter().position(|k| k.as_slice() >= key).unwrap_or(node.keys.len())
}

/// Index of the first key in `node` that is > `key`.
fn first_above(node: &Node, key: &[u8]) -> usize {
    node.keys.iter().position(|k| k.as_slice() > key).unwrap_or(node.keys.len())
}

/// One descent step of a lower / lower_or_equal query: updates `candidate`
/// with the best smaller key in `node` and returns the child to descend
/// into, or `None` at a leaf.
fn below_step(
    node: &Node,
    key: &[u8],
    inclusive: bool,
    candidate: &mut Vec<u8>,
) -> Option<NodeIndex> {
    let i = if inclusive { first_above(node, key) } else { first_not_below(node, key) };
    if i > 0 {
        candidate.clear();
        candidate.extend_from_slice(&node.keys[i - 1]);
    }
    node.children.get(i).copied()
}

/// One descent step of a higher / higher_or_equal query.
fn above_step(
    node: &Node,
    key: &[u8],
    inclusive: bool,
    candidate: &mut Vec<u8>,
) -> Option<NodeIndex> {
    let i = if inclusive { first_not_below(node, key) } else { first_above(node, key) };
    if i < node.keys.len() {
        candidate.clear();
        candidate.extend_from_slice(&node.keys[i]);
    }
    node.children.get(i).copied()
}

// ---------------------------------------------------------------------------
// Insert
// ---------------------------------------------------------------------------

/// Inserts into the subtree rooted at `node`, which is guaranteed not full.
/// Returns `true` iff a new key was added.
fn insert_nonfull(drive: &mut Drive, node: &mut Node, key: &[u8], value: u64) -> Result<bool> {
    let (mut slot, found) = find_key_index(node, key);
    if found {
        node.values[slot] = value;
        drive.write_node(node)?;
        return Ok(false);
    }

    if node.is_leaf() {
        node.keys.insert(slot, key.to_vec());
        node.values.insert(slot, value);
        drive.write_node(node)?;
        drive.header.key_count += 1;
        drive.write_header()?;
        return Ok(true);
    }

    let mut child = drive.read_node(node.children[slot])?;
    if child.keys.len() == drive.layout.max_keys() {
        split_child(drive, node, slot)?;
        // The promoted median landed at `slot`; re-compare to pick a side.
        match key.cmp(node.keys[slot].as_slice()) {
            Ordering::Equal => {
                node.values[slot] = value;
                drive.write_node(node)?;
                return Ok(false);
            },
            Ordering::Greater => slot += 1,
            Ordering::Less => {},
        }
        child = drive.read_node(node.children[slot])?;
    }
    insert_nonfull(drive, &mut child, key, value)
}

/// Splits the full child at `child_index` of `parent` around its median
/// key: the upper half moves to a freshly allocated node and the median is
/// promoted into `parent`.
fn split_child(drive: &mut Drive, parent: &mut Node, child_index: usize) -> Result<()> {
    let t = drive.layout.degree();
    let right_index = drive.pop_free()?;
    let mut left = drive.read_node(parent.children[child_index])?;
    debug_assert_eq!(left.keys.len(), drive.layout.max_keys());

    let mut right = Node::empty(right_index);
    right.keys = left.keys.split_off(t);
    right.values = left.values.split_off(t);
    if !left.is_leaf() {
        right.children = left.children.split_off(t);
    }
    let median_key = left.keys.remove(t - 1);
    let median_value = left.values.remove(t - 1);

    parent.keys.insert(child_index, median_key);
    parent.values.insert(child_index, median_value);
    parent.children.insert(child_index + 1, right_index);

    drive.write_node(parent)?;
    drive.write_node(&left)?;
    drive.write_node(&right)
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// Removes `key` from the subtree rooted at `node`. The caller guarantees
/// `node` is either the root or holds more than `min_keys` keys.
fn remove_key(drive: &mut Drive, node: &mut Node, key: &[u8]) -> Result<Option<u64>> {
    let (slot, found) = find_key_index(node, key);

    if node.is_leaf() {
        if !found {
            return Ok(None);
        }
        let (_, value) = remove_entry(drive, node, slot)?;
        return Ok(Some(value));
    }

    let child = drive.read_node(node.children[slot])?;
    if child.keys.len() <= drive.layout.min_keys() {
        grow_child(drive, node, child, slot)?;
        // Growing may have rotated or merged keys through this node, so the
        // target child and slot can both have moved; rescan from here.
        return remove_key(drive, node, key);
    }

    if found {
        // Replace the separator with its in-order predecessor, which lives
        // on the rightmost path of the left child.
        let value = node.values[slot];
        let mut child = child;
        let (pred_key, pred_value) = remove_max(drive, &mut child)?;
        node.keys[slot] = pred_key;
        node.values[slot] = pred_value;
        drive.write_node(node)?;
        return Ok(Some(value));
    }

    let mut child = child;
    remove_key(drive, &mut child, key)
}

/// Removes and returns the largest entry of the subtree rooted at `node`.
/// The caller guarantees `node` holds more than `min_keys` keys.
fn remove_max(drive: &mut Drive, node: &mut Node) -> Result<(Vec<u8>, u64)> {
    if node.is_leaf() {
        let slot = node.keys.len() - 1;
        return remove_entry(drive, node, slot);
    }

    let last = node.children.len() - 1;
    let child = drive.read_node(node.children[last])?;
    if child.keys.len() <= drive.layout.min_keys() {
        grow_child(drive, node, child, last)?;
        return remove_max(drive, node);
    }

    let mut child = child;
    remove_max(drive, &mut child)
}

/// Removes the entry at `slot` from `node`, rewriting the node and the
/// header count. Returns the removed key and value.
fn remove_entry(drive: &mut Drive, node: &mut Node, slot: usize) -> Result<(Vec<u8>, u64)> {
    let key = node.keys.remove(slot);
    let value = node.values.remove(slot);
    drive.write_node(node)?;
    drive.header.key_count -= 1;
    drive.write_header()?;
    Ok((key, value))
}

/// Ensures `child` (the `index`-th child of `parent`) ends up with more
/// than `min_keys` keys: borrow from the left sibling, else from the right,
/// else merge with a sibling. A merge pulls one separator out of `parent`,
/// which is why callers must descend from a parent that is either the root
/// or above the minimum itself.
fn grow_child(drive: &mut Drive, parent: &mut Node, child: Node, index: usize) -> Result<()> {
    let min_keys = drive.layout.min_keys();
    let mut child = child;

    let mut left = None;
    if index > 0 {
        let mut sibling = drive.read_node(parent.children[index - 1])?;
        if sibling.keys.len() > min_keys {
            // Rotate: the separator drops into the child, the sibling's
            // last entry rises into the parent.
            let last = sibling.keys.len() - 1;
            let sep_key = std::mem::replace(&mut parent.keys[index - 1], sibling.keys.remove(last));
            let sep_value =
                std::mem::replace(&mut parent.values[index - 1], sibling.values.remove(last));
            child.keys.insert(0, sep_key);
            child.values.insert(0, sep_value);
            if !sibling.is_leaf() {
                let moved = sibling.children.remove(sibling.children.len() - 1);
                child.children.insert(0, moved);
            }
            drive.write_node(&sibling)?;
            drive.write_node(&child)?;
            return drive.write_node(parent);
        }
        left = Some(sibling);
    }

    let mut right = None;
    if index + 1 < parent.children.len() {
        let mut sibling = drive.read_node(parent.children[index + 1])?;
        if sibling.keys.len() > min_keys {
            let sep_key = std::mem::replace(&mut parent.keys[index], sibling.keys.remove(0));
            let sep_value = std::mem::replace(&mut parent.values[index], sibling.values.remove(0));
            child.keys.push(sep_key);
            child.values.push(sep_value);
            if !sibling.is_leaf() {
                child.children.push(sibling.children.remove(0));
            }
            drive.write_node(&sibling)?;
            drive.write_node(&child)?;
            return drive.write_node(parent);
        }
        right = Some(sibling);
    }

    // Merge around a separator, always into the left member of the pair:
    // the right sibling folds into the child when one exists, else the
    // child folds into its left sibling.
    let (mut dst, src, sep) = match (right, left) {
        (Some(right), _) => (child, right, index),
        (None, Some(left)) => (left, child, index - 1),
        (None, None) => {
            return Err(Error::Corrupt {
                reason: format!("node {} has a lone underfull child", parent.index),
            });
        },
    };

    dst.keys.push(parent.keys.remove(sep));
    dst.values.push(parent.values.remove(sep));
    parent.children.remove(sep + 1);

    dst.keys.extend(src.keys);
    dst.values.extend(src.values);
    dst.children.extend(src.children);

    drive.write_node(&dst)?;
    drive.write_node(parent)?;
    drive.push_free(src.index)?;
    tracing::trace!(merged = src.index, into = dst.index, "merged siblings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn open(dir: &tempfile::TempDir) -> BTree {
        let config = TreeConfig { key_size: 8, degree: 2, sync_on_write: false };
        BTree::open(dir.path().join("t.btree"), config).unwrap()
    }

    #[test]
    fn test_empty_tree() {
        let dir = tempdir().unwrap();
        let tree = open(&dir);
        assert_eq!(tree.size(), 0);
        assert!(tree.is_empty());
        assert_eq!(tree.get(b"a").unwrap(), None);
        assert_eq!(tree.first().unwrap(), Vec::<u8>::new());
        assert_eq!(tree.last().unwrap(), Vec::<u8>::new());
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_put_get_update() {
        let dir = tempdir().unwrap();
        let mut tree = open(&dir);

        assert!(tree.put(b"k", 1).unwrap());
        assert_eq!(tree.get(b"k").unwrap(), Some(1));
        assert!(tree.contains(b"k").unwrap());

        // Second put of the same key updates in place.
        assert!(!tree.put(b"k", 2).unwrap());
        assert_eq!(tree.get(b"k").unwrap(), Some(2));
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn test_remove_returns_prior_value() {
        let dir = tempdir().unwrap();
        let mut tree = open(&dir);

        tree.put(b"k", 9).unwrap();
        assert_eq!(tree.remove(b"k").unwrap(), Some(9));
        assert_eq!(tree.remove(b"k").unwrap(), None);
        assert_eq!(tree.get(b"k").unwrap(), None);
        assert_eq!(tree.size(), 0);
    }

    #[test]
    fn test_root_expansion_keeps_root_at_zero() {
        let dir = tempdir().unwrap();
        let mut tree = open(&dir);

        // max_keys is 3 for t=2; the fourth insert expands the root.
        for (i, key) in [b"a", b"b", b"c"].iter().enumerate() {
            tree.put(*key, i as u64).unwrap();
        }
        assert_eq!(tree.node_count(), 1);
        assert!(tree.children_in_node(0).unwrap().is_empty());

        tree.put(b"d", 3).unwrap();
        assert_eq!(tree.keys_in_node(0).unwrap(), vec![b"b".to_vec()]);
        assert_eq!(tree.children_in_node(0).unwrap().len(), 2);
        for key in [b"a", b"b", b"c", b"d"] {
            assert!(tree.contains(key).unwrap());
        }
    }

    #[test]
    fn test_update_during_descent_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.btree");
        let config = TreeConfig { key_size: 8, degree: 2, sync_on_write: false };

        {
            let mut tree = BTree::open(&path, config).unwrap();
            for (i, key) in [b"a", b"b", b"c", b"d", b"e"].iter().enumerate() {
                tree.put(*key, i as u64).unwrap();
            }
            // "b" is the root separator after expansion; overwrite it.
            assert_eq!(tree.keys_in_node(0).unwrap(), vec![b"b".to_vec()]);
            assert!(!tree.put(b"b", 99).unwrap());
        }

        let tree = BTree::open(&path, config).unwrap();
        assert_eq!(tree.get(b"b").unwrap(), Some(99));
    }

    #[test]
    fn test_order_queries() {
        let dir = tempdir().unwrap();
        let mut tree = open(&dir);
        for key in [b"b", b"d", b"f"] {
            tree.put(key, 0).unwrap();
        }

        assert_eq!(tree.first().unwrap(), b"b".to_vec());
        assert_eq!(tree.last().unwrap(), b"f".to_vec());
        assert_eq!(tree.lower(b"d").unwrap(), b"b".to_vec());
        assert_eq!(tree.lower(b"b").unwrap(), Vec::<u8>::new());
        assert_eq!(tree.lower_or_equal(b"d").unwrap(), b"d".to_vec());
        assert_eq!(tree.lower_or_equal(b"e").unwrap(), b"d".to_vec());
        assert_eq!(tree.higher(b"d").unwrap(), b"f".to_vec());
        assert_eq!(tree.higher(b"f").unwrap(), Vec::<u8>::new());
        assert_eq!(tree.higher_or_equal(b"d").unwrap(), b"d".to_vec());
        assert_eq!(tree.higher_or_equal(b"e").unwrap(), b"f".to_vec());
        assert_eq!(tree.higher(b"").unwrap(), b"b".to_vec());
    }

    #[test]
    fn test_rejects_unstorable_keys() {
        let dir = tempdir().unwrap();
        let mut tree = open(&dir);

        assert!(matches!(tree.put(b"", 1).unwrap_err(), Error::InvalidKey { .. }));
        assert!(matches!(tree.put(b"too-long!", 1).unwrap_err(), Error::InvalidKey { .. }));
        assert!(matches!(tree.get(b"too-long!").unwrap_err(), Error::InvalidKey { .. }));

        // Empty probes are fine; nothing stored can match them.
        assert_eq!(tree.get(b"").unwrap(), None);
        assert!(!tree.contains(b"").unwrap());
    }

    #[test]
    fn test_merge_frees_nodes() {
        let dir = tempdir().unwrap();
        let mut tree = open(&dir);

        for key in [b"a", b"b", b"c", b"d"] {
            tree.put(key, 0).unwrap();
        }
        let grown_nodes = tree.node_count();
        assert!(grown_nodes > 1);

        for key in [b"a", b"b", b"c", b"d"] {
            tree.remove(key).unwrap();
        }
        assert_eq!(tree.size(), 0);
        // The file never shrinks; emptied nodes land on the free stack.
        assert_eq!(tree.node_count(), grown_nodes);
        assert_eq!(u64::from(tree.free_node_count()), grown_nodes - 1);
    }
}
