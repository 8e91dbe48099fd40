//! acorn: a single-file on-disk B-tree mapping short byte-string keys to
//! `u64` values.
//!
//! The tree is a persistent ordered map with the classic B-tree operations
//! (lookup, insert, update, delete, size) plus order-based neighbor queries
//! (first, last, predecessor, successor). Everything lives in one file whose
//! byte layout is pinned by two parameters fixed at creation:
//!
//! - **`key_size`**: the space reserved per key slot (a multiple of 8 in
//!   8..=128). A key's payload can be up to `key_size - 1` bytes; byte 0 of
//!   each slot stores the payload length.
//! - **`degree`** (t > 1): every node except the root holds between t - 1
//!   and 2t - 1 keys.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 BTree API                   │
//! │   (get, put, remove, order queries, ...)    │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │               Tree Layer                    │
//! │  (search, preemptive split / grow, merge)   │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │             Storage Layer                   │
//! │  (node codec, free-node stack, file I/O)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The storage layer appends nodes to the file one at a time and recycles
//! vacated ones through a LIFO free stack stored inside node bodies, so the
//! file needs no separate allocator region and never shrinks. The tree
//! layer splits full children before descending on insert and grows
//! underfull children (borrow or merge) before descending on delete, so no
//! operation revisits an ancestor. The root permanently occupies node
//! index 0.
//!
//! Access is single-threaded and synchronous; the backing file is
//! exclusively owned by the tree instance. Durability is best-effort: every
//! mutation is flushed (configurable via
//! [`TreeConfig::sync_on_write`](TreeConfig)), but there are no
//! crash-atomic guarantees.
//!
//! ## Quick Start
//!
//! ```no_run
//! use acorn::{BTree, TreeConfig};
//!
//! let mut tree = BTree::open("data.btree", TreeConfig::new(32, 8))?;
//!
//! tree.put(b"alpha", 1)?;
//! tree.put(b"beta", 2)?;
//! assert_eq!(tree.get(b"alpha")?, Some(1));
//! assert_eq!(tree.size(), 2);
//!
//! // Order queries; the empty vector means "no neighbor".
//! assert_eq!(tree.higher(b"alpha")?, b"beta".to_vec());
//! assert_eq!(tree.lower(b"alpha")?, Vec::<u8>::new());
//!
//! tree.remove(b"alpha")?;
//! # Ok::<(), acorn::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod drive;
mod error;
mod layout;
mod node;
mod tree;

pub use config::{TreeConfig, MAX_KEY_SIZE, MIN_KEY_SIZE};
pub use error::{Error, NodeIndex, Result};
pub use tree::BTree;
