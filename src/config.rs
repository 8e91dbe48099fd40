//! Tree configuration options.

use crate::error::{Error, Result};

/// Smallest allowed key slot width in bytes.
pub const MIN_KEY_SIZE: u32 = 8;

/// Largest allowed key slot width in bytes.
pub const MAX_KEY_SIZE: u32 = 128;

/// Configuration options for opening or creating a B-tree file.
///
/// `key_size` and `degree` are properties of the file: when an existing file
/// is opened its header parameters win and the configured ones are
/// informational only. `sync_on_write` is a runtime knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Bytes reserved per key slot (a multiple of 8, in 8..=128). A key's
    /// payload can be up to `key_size - 1` bytes; the first byte of each
    /// slot stores the payload length.
    pub key_size: u32,
    /// Branching parameter t (> 1): every node except the root holds
    /// between t - 1 and 2t - 1 keys.
    pub degree: u32,
    /// Whether to fsync after every mutating operation (default true for
    /// durability).
    pub sync_on_write: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { key_size: 128, degree: 1024, sync_on_write: true }
    }
}

impl TreeConfig {
    /// Creates a configuration with the given slot width and degree.
    pub fn new(key_size: u32, degree: u32) -> Self {
        Self { key_size, degree, ..Self::default() }
    }

    /// Validates the parameters.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.degree <= 1 {
            return Err(Error::InvalidConfig {
                reason: format!("degree must be > 1, got {}", self.degree),
            });
        }
        if self.key_size % 8 != 0 || self.key_size < MIN_KEY_SIZE || self.key_size > MAX_KEY_SIZE {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "key_size must be a multiple of 8 in [{MIN_KEY_SIZE}, {MAX_KEY_SIZE}], got {}",
                    self.key_size
                ),
            });
        }
        Ok(())
    }
}
