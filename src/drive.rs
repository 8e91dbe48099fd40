//! Backing-file storage: header and node I/O plus the free-node stack.
//!
//! All multi-byte integers are little-endian on disk regardless of host
//! endianness; key payload bytes are stored verbatim. I/O is positional
//! (`pread`/`pwrite` via [`FileExt`]) so reads never disturb a shared file
//! cursor and no seek state is carried between calls. On Windows the
//! `seek_read`/`seek_write` fallbacks are used.
//!
//! The free-node stack lives inside node bodies: stack slot j occupies the
//! free-link word (offset 8) of the node at index 1 + j. The stack is
//! addressed purely by position, so no threading pointer is needed and the
//! stack is bounded by the number of nodes ever allocated. Node writes skip
//! that word; it belongs to the allocator alone.

use std::fs::{File, OpenOptions};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::config::TreeConfig;
use crate::error::{Error, NodeIndex, Result};
use crate::layout::{NodeLayout, TreeHeader, HEADER_SIZE};
use crate::node::Node;

/// Owner of the backing file.
///
/// Translates logical operations (read/write header, read/write node,
/// allocate/free node) into byte-exact file I/O and maintains the free-node
/// stack. The file handle is exclusively owned for the drive's lifetime.
#[derive(Debug)]
pub(crate) struct Drive {
    file: File,
    /// Size and offset arithmetic for the persisted parameters.
    pub(crate) layout: NodeLayout,
    /// In-memory copy of the file header; rewritten after every change.
    pub(crate) header: TreeHeader,
    node_count: u64,
}

impl Drive {
    /// Opens or creates the backing file, returning the drive and the root
    /// node.
    ///
    /// An existing file's header parameters win over `config`; a fresh
    /// (zero-length) file is initialized from `config` with a header and an
    /// empty root at index 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for rejected parameters,
    /// [`Error::CannotOpen`] if the file cannot be opened read-write, and
    /// [`Error::Corrupt`] if an existing file's length is not header plus a
    /// whole number of nodes or its header is malformed.
    pub fn open(path: &Path, config: &TreeConfig) -> Result<(Self, Node)> {
        config.validate()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| Error::CannotOpen { path: path.display().to_string(), source })?;

        let len = file.metadata()?.len();
        if len == 0 {
            let header = TreeHeader::new(config.key_size, config.degree);
            let layout = NodeLayout::new(config.key_size, config.degree);
            let mut drive = Self { file, layout, header, node_count: 1 };
            let root = Node::empty(0);
            drive.write_header()?;
            drive.write_node(&root)?;
            drive.sync()?;
            tracing::debug!(
                key_size = config.key_size,
                degree = config.degree,
                "created b-tree file"
            );
            return Ok((drive, root));
        }

        if len < HEADER_SIZE as u64 {
            return Err(Error::Corrupt {
                reason: format!("file is {len} bytes, shorter than the {HEADER_SIZE}-byte header"),
            });
        }

        let mut buf = [0u8; HEADER_SIZE];
        read_exact_at(&file, &mut buf, 0)?;
        let header = TreeHeader::from_bytes(&buf)?;
        if TreeConfig::new(header.key_size, header.degree).validate().is_err() {
            return Err(Error::Corrupt {
                reason: format!(
                    "header parameters out of range: key_size={} degree={}",
                    header.key_size, header.degree
                ),
            });
        }

        let layout = NodeLayout::new(header.key_size, header.degree);
        let body = len - HEADER_SIZE as u64;
        if body == 0 || body % layout.node_size() as u64 != 0 {
            return Err(Error::Corrupt {
                reason: format!(
                    "file length {len} is not header plus a whole number of {}-byte nodes",
                    layout.node_size()
                ),
            });
        }
        let node_count = body / layout.node_size() as u64;
        if u64::from(header.free_node_count) > node_count - 1 {
            return Err(Error::Corrupt {
                reason: format!(
                    "free stack depth {} exceeds the {} non-root nodes",
                    header.free_node_count,
                    node_count - 1
                ),
            });
        }

        if header.key_size != config.key_size || header.degree != config.degree {
            tracing::warn!(
                file_key_size = header.key_size,
                file_degree = header.degree,
                "existing file parameters differ from the requested ones; adopting the file's"
            );
        }

        let drive = Self { file, layout, header, node_count };
        let root = drive.read_node(0)?;
        tracing::debug!(
            key_size = header.key_size,
            degree = header.degree,
            nodes = node_count,
            keys = header.key_count,
            "opened b-tree file"
        );
        Ok((drive, root))
    }

    /// Total nodes allocated in the file (including free ones).
    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    /// Rewrites the file header from the in-memory copy.
    pub fn write_header(&mut self) -> Result<()> {
        write_all_at(&self.file, &self.header.to_bytes(), 0)
    }

    /// Reads and decodes the node at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] for an out-of-range index, a short read,
    /// or a malformed record.
    pub fn read_node(&self, index: NodeIndex) -> Result<Node> {
        if u64::from(index) >= self.node_count {
            return Err(Error::Corrupt {
                reason: format!("node index {index} out of range (file has {})", self.node_count),
            });
        }
        let mut buf = vec![0u8; self.layout.node_size()];
        read_exact_at(&self.file, &mut buf, self.layout.node_pos(index))?;
        Node::from_bytes(&self.layout, index, &buf)
    }

    /// Writes a node record, skipping the allocator-owned free-link word.
    pub fn write_node(&mut self, node: &Node) -> Result<()> {
        debug_assert!(u64::from(node.index) < self.node_count);
        let buf = node.to_bytes(&self.layout);
        let pos = self.layout.node_pos(node.index);
        write_all_at(&self.file, &buf[..8], pos)?;
        write_all_at(&self.file, &buf[12..], pos + 12)
    }

    /// Appends exactly one zeroed node to the file and pushes its index
    /// onto the free stack.
    pub fn push_node(&mut self) -> Result<()> {
        let index = self.node_count as NodeIndex;
        let new_len = self.layout.node_pos(index) + self.layout.node_size() as u64;
        self.file.set_len(new_len)?;
        self.node_count += 1;
        self.push_free(index)
    }

    /// Pushes `index` onto the free stack and rewrites the header.
    pub fn push_free(&mut self, index: NodeIndex) -> Result<()> {
        let pos = self.layout.free_slot_pos(self.header.free_node_count);
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, index);
        write_all_at(&self.file, &buf, pos)?;
        self.header.free_node_count += 1;
        self.write_header()
    }

    /// Pops a vacant node index, growing the file first when the stack is
    /// empty. The returned node's body content is unspecified; the caller
    /// must write a fresh node before using it.
    pub fn pop_free(&mut self) -> Result<NodeIndex> {
        if self.header.free_node_count == 0 {
            self.push_node()?;
        }
        self.header.free_node_count -= 1;
        let mut buf = [0u8; 4];
        read_exact_at(&self.file, &mut buf, self.layout.free_slot_pos(self.header.free_node_count))?;
        self.write_header()?;
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Returns the free stack contents, top of the stack first.
    pub fn free_nodes(&self) -> Result<Vec<NodeIndex>> {
        let mut result = Vec::with_capacity(self.header.free_node_count as usize);
        for slot in (0..self.header.free_node_count).rev() {
            let mut buf = [0u8; 4];
            read_exact_at(&self.file, &mut buf, self.layout.free_slot_pos(slot))?;
            result.push(LittleEndian::read_u32(&buf));
        }
        Ok(result)
    }

    /// Flushes OS-buffered file data to the device.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Platform-specific position-based I/O helpers
// ---------------------------------------------------------------------------

/// Reads exactly `buf.len()` bytes from `file` at the given byte `offset`.
///
/// A short read means the file ends inside a record and surfaces as
/// [`Error::Corrupt`].
#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    file.read_exact_at(buf, offset).map_err(|e| map_read_error(e, offset))
}

/// Windows fallback: `seek_read` in a loop.
#[cfg(windows)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < buf.len() {
        let n = file
            .seek_read(&mut buf[pos..], offset + pos as u64)
            .map_err(|e| map_read_error(e, offset))?;
        if n == 0 {
            return Err(Error::Corrupt { reason: format!("short read at offset {offset}") });
        }
        pos += n;
    }
    Ok(())
}

fn map_read_error(e: std::io::Error, offset: u64) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::Corrupt { reason: format!("short read at offset {offset}") }
    } else {
        Error::Io { source: e }
    }
}

/// Writes all of `data` to `file` at the given byte `offset`.
#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> Result<()> {
    file.write_all_at(data, offset)?;
    Ok(())
}

/// Windows fallback for positional writes.
#[cfg(windows)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < data.len() {
        let n = file.seek_write(&data[pos..], offset + pos as u64)?;
        pos += n;
    }
    Ok(())
}
