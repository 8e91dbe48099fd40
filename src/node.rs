//! Logical B-tree nodes and their on-disk codec.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, NodeIndex, Result};
use crate::layout::NodeLayout;

/// A decoded B-tree node.
///
/// `keys` and `values` run in parallel and are strictly ascending by key.
/// `children` is empty for a leaf and holds `keys.len() + 1` entries for an
/// internal node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// This node's position in the file.
    pub index: NodeIndex,
    /// Key payloads.
    pub keys: Vec<Vec<u8>>,
    /// Values, parallel to `keys`.
    pub values: Vec<u64>,
    /// Child node indexes (empty for a leaf).
    pub children: Vec<NodeIndex>,
}

impl Node {
    /// Creates an empty leaf node at the given index.
    pub fn empty(index: NodeIndex) -> Self {
        Self { index, ..Self::default() }
    }

    /// A node with no children is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Encodes the node into a fresh `node_size` buffer.
    ///
    /// Unused key/value/child slots and the padding word are zero. The
    /// free-link word at offset 8 is also left zero; the storage layer
    /// skips it on write because it belongs to the free-stack allocator.
    pub fn to_bytes(&self, layout: &NodeLayout) -> Vec<u8> {
        let mut buf = vec![0u8; layout.node_size()];
        LittleEndian::write_u32(&mut buf[0..4], self.keys.len() as u32);
        LittleEndian::write_u32(&mut buf[4..8], self.children.len() as u32);

        let mut off = layout.children_offset();
        for &child in &self.children {
            LittleEndian::write_u32(&mut buf[off..off + 4], child);
            off += 4;
        }

        let mut off = layout.keys_offset();
        for key in &self.keys {
            buf[off] = key.len() as u8;
            buf[off + 1..off + 1 + key.len()].copy_from_slice(key);
            off += layout.key_size();
        }

        let mut off = layout.values_offset();
        for &value in &self.values {
            LittleEndian::write_u64(&mut buf[off..off + 8], value);
            off += 8;
        }

        buf
    }

    /// Decodes the node at `index` from a `node_size` buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the buffer is short, a count is out of
    /// range, the leaf/internal child count is inconsistent, or a key slot's
    /// length byte exceeds the storable payload.
    pub fn from_bytes(layout: &NodeLayout, index: NodeIndex, buf: &[u8]) -> Result<Self> {
        if buf.len() < layout.node_size() {
            return Err(Error::Corrupt { reason: format!("node {index} truncated") });
        }

        let key_count = LittleEndian::read_u32(&buf[0..4]) as usize;
        let child_count = LittleEndian::read_u32(&buf[4..8]) as usize;
        if key_count > layout.max_keys() {
            return Err(Error::Corrupt {
                reason: format!(
                    "node {index} claims {key_count} keys (limit {})",
                    layout.max_keys()
                ),
            });
        }
        if child_count != 0 && child_count != key_count + 1 {
            return Err(Error::Corrupt {
                reason: format!("node {index} has {key_count} keys but {child_count} children"),
            });
        }

        let mut children = Vec::with_capacity(child_count);
        let mut off = layout.children_offset();
        for _ in 0..child_count {
            children.push(LittleEndian::read_u32(&buf[off..off + 4]));
            off += 4;
        }

        let mut keys = Vec::with_capacity(key_count);
        let mut off = layout.keys_offset();
        for _ in 0..key_count {
            let len = buf[off] as usize;
            if len > layout.max_payload() {
                return Err(Error::Corrupt {
                    reason: format!("node {index} has a key slot with length byte {len}"),
                });
            }
            keys.push(buf[off + 1..off + 1 + len].to_vec());
            off += layout.key_size();
        }

        let mut values = Vec::with_capacity(key_count);
        let mut off = layout.values_offset();
        for _ in 0..key_count {
            values.push(LittleEndian::read_u64(&buf[off..off + 8]));
            off += 8;
        }

        Ok(Self { index, keys, values, children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> NodeLayout {
        NodeLayout::new(8, 2)
    }

    #[test]
    fn test_leaf_round_trip() {
        let node = Node {
            index: 3,
            keys: vec![b"ant".to_vec(), b"bee".to_vec(), b"cat".to_vec()],
            values: vec![1, 2, 3],
            children: Vec::new(),
        };
        let bytes = node.to_bytes(&layout());
        let recovered = Node::from_bytes(&layout(), 3, &bytes).unwrap();
        assert_eq!(node, recovered);
        assert!(recovered.is_leaf());
    }

    #[test]
    fn test_internal_round_trip() {
        let node = Node {
            index: 0,
            keys: vec![b"m".to_vec()],
            values: vec![42],
            children: vec![1, 2],
        };
        let bytes = node.to_bytes(&layout());
        let recovered = Node::from_bytes(&layout(), 0, &bytes).unwrap();
        assert_eq!(node, recovered);
        assert!(!recovered.is_leaf());
    }

    #[test]
    fn test_key_slot_tail_is_ignored() {
        // A shorter key written over a longer one must not leak tail bytes.
        let long = Node {
            index: 1,
            keys: vec![b"abcdefg".to_vec()],
            values: vec![7],
            children: Vec::new(),
        };
        let mut bytes = long.to_bytes(&layout());
        let short = Node { index: 1, keys: vec![b"ab".to_vec()], values: vec![8], children: Vec::new() };
        let short_bytes = short.to_bytes(&layout());
        // Splice the short encoding's key slot prefix over the long one,
        // leaving the old tail bytes in place.
        let keys_off = layout().keys_offset();
        bytes[keys_off..keys_off + 3].copy_from_slice(&short_bytes[keys_off..keys_off + 3]);
        let recovered = Node::from_bytes(&layout(), 1, &bytes).unwrap();
        assert_eq!(recovered.keys[0], b"ab".to_vec());
    }

    #[test]
    fn test_rejects_key_count_over_limit() {
        let node = Node::empty(0);
        let mut bytes = node.to_bytes(&layout());
        bytes[0] = 4; // max_keys is 3 for t=2
        let err = Node::from_bytes(&layout(), 0, &bytes).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_rejects_inconsistent_child_count() {
        let node = Node {
            index: 0,
            keys: vec![b"k".to_vec()],
            values: vec![1],
            children: Vec::new(),
        };
        let mut bytes = node.to_bytes(&layout());
        bytes[4] = 3; // one key needs zero or two children
        let err = Node::from_bytes(&layout(), 0, &bytes).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_rejects_oversized_length_byte() {
        let node =
            Node { index: 0, keys: vec![b"k".to_vec()], values: vec![1], children: Vec::new() };
        let mut bytes = node.to_bytes(&layout());
        bytes[layout().keys_offset()] = 8; // payload limit is 7
        let err = Node::from_bytes(&layout(), 0, &bytes).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_rejects_truncated_buffer() {
        let err = Node::from_bytes(&layout(), 0, &[0u8; 20]).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }
}
