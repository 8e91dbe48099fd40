//! On-disk layout: the file header codec and node size/offset arithmetic.
//!
//! The file is a 16-byte header followed by an array of fixed-size node
//! records. All sizes are functions of the two persisted parameters
//! `key_size` and `degree`, so a `(key_size, degree)` pair pins the entire
//! layout.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, NodeIndex, Result};

/// File header size in bytes (four u32 fields).
pub const HEADER_SIZE: usize = 16;

/// Node header size in bytes (four u32 fields before the child array).
pub const NODE_HEADER_SIZE: usize = 16;

/// The persisted tree parameters and live counters.
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     key_size (u32 LE)
/// 4       4     degree (u32 LE)
/// 8       4     key_count (u32 LE)        total live keys, i.e. size()
/// 12      4     free_node_count (u32 LE)  depth of the free-node stack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    /// Bytes reserved per key slot.
    pub key_size: u32,
    /// Branching parameter t.
    pub degree: u32,
    /// Total live keys in the tree.
    pub key_count: u32,
    /// Depth of the free-node stack.
    pub free_node_count: u32,
}

impl TreeHeader {
    /// Creates the header of a freshly initialized tree.
    pub fn new(key_size: u32, degree: u32) -> Self {
        Self { key_size, degree, key_count: 0, free_node_count: 0 }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.key_size);
        LittleEndian::write_u32(&mut buf[4..8], self.degree);
        LittleEndian::write_u32(&mut buf[8..12], self.key_count);
        LittleEndian::write_u32(&mut buf[12..16], self.free_node_count);
        buf
    }

    /// Deserializes a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the buffer is shorter than
    /// [`HEADER_SIZE`].
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::Corrupt { reason: "header too short".to_string() });
        }
        Ok(Self {
            key_size: LittleEndian::read_u32(&buf[0..4]),
            degree: LittleEndian::read_u32(&buf[4..8]),
            key_count: LittleEndian::read_u32(&buf[8..12]),
            free_node_count: LittleEndian::read_u32(&buf[12..16]),
        })
    }
}

/// Derived size and offset arithmetic for a `(key_size, degree)` pair.
///
/// Node record layout, relative to the node's base position:
///
/// ```text
/// Offset               Size                 Field
/// ------               ----                 -----
/// 0                    4                    key_count (u32 LE)
/// 4                    4                    child_count (u32 LE)
/// 8                    4                    free_link (u32 LE, allocator-owned)
/// 12                   4                    padding (zero)
/// 16                   4 * max_children     child node indexes (u32 LE)
/// 16 + 4*max_children  key_size * max_keys  key slots (byte 0 = length L,
///                                           bytes 1..1+L = payload)
/// ...                  8 * max_keys         values (u64 LE)
/// ```
///
/// The `free_link` word is not part of the logical node: it holds free-stack
/// entries and is read and written only by the allocator.
#[derive(Debug, Clone, Copy)]
pub struct NodeLayout {
    key_size: usize,
    degree: usize,
}

impl NodeLayout {
    /// Byte offset of the allocator-owned free-link word within a node body.
    pub const FREE_LINK_OFFSET: u64 = 8;

    /// Creates the layout for the given parameters.
    pub fn new(key_size: u32, degree: u32) -> Self {
        Self { key_size: key_size as usize, degree: degree as usize }
    }

    /// Bytes reserved per key slot.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Branching parameter t.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Minimum keys per non-root node (t - 1).
    pub fn min_keys(&self) -> usize {
        self.degree - 1
    }

    /// Maximum keys per node (2t - 1).
    pub fn max_keys(&self) -> usize {
        2 * self.degree - 1
    }

    /// Maximum children per node (2t).
    pub fn max_children(&self) -> usize {
        2 * self.degree
    }

    /// Longest storable key payload (key_size - 1; byte 0 holds the length).
    pub fn max_payload(&self) -> usize {
        self.key_size - 1
    }

    /// Size of one node record in bytes.
    pub fn node_size(&self) -> usize {
        NODE_HEADER_SIZE
            + 4 * self.max_children()
            + self.key_size * self.max_keys()
            + 8 * self.max_keys()
    }

    /// Byte position of the node at `index`.
    pub fn node_pos(&self, index: NodeIndex) -> u64 {
        HEADER_SIZE as u64 + u64::from(index) * self.node_size() as u64
    }

    /// Offset of the child index array within a node record.
    pub fn children_offset(&self) -> usize {
        NODE_HEADER_SIZE
    }

    /// Offset of the key slot array within a node record.
    pub fn keys_offset(&self) -> usize {
        NODE_HEADER_SIZE + 4 * self.max_children()
    }

    /// Offset of the value array within a node record.
    pub fn values_offset(&self) -> usize {
        self.keys_offset() + self.key_size * self.max_keys()
    }

    /// Byte position of free-stack slot `slot` (0-based). Slot j lives in
    /// the free-link word of the node at index 1 + j; the root's body is
    /// never used for the stack.
    pub fn free_slot_pos(&self, slot: u32) -> u64 {
        self.node_pos(1 + slot) + Self::FREE_LINK_OFFSET
    }
}
