//! Error types for the acorn B-tree.

use std::io;

use snafu::Snafu;

/// Node identifier: a node's position in the backing file (0 = root).
pub type NodeIndex = u32;

/// Result type alias for acorn operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during B-tree operations.
#[derive(Debug, Snafu)]
pub enum Error {
    /// Backing file cannot be created or opened read-write.
    #[snafu(display("cannot open b-tree file {path}: {source}"))]
    CannotOpen {
        /// Path that failed to open.
        path: String,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The file contents do not form a valid tree.
    #[snafu(display("corrupt b-tree file: {reason}"))]
    Corrupt {
        /// Description of what was corrupted.
        reason: String,
    },

    /// A key that can never be stored: longer than the configured slot
    /// allows, or empty (the empty key is the reserved no-neighbor
    /// sentinel of the order queries).
    #[snafu(display("invalid key of {len} bytes (limit {max})"))]
    InvalidKey {
        /// Actual payload length in bytes.
        len: usize,
        /// Maximum storable payload length in bytes.
        max: usize,
    },

    /// Rejected tree parameters.
    #[snafu(display("invalid configuration: {reason}"))]
    InvalidConfig {
        /// Description of the rejected parameter.
        reason: String,
    },

    /// I/O failure during a read, write, or flush.
    #[snafu(display("I/O error: {source}"))]
    Io {
        /// The underlying I/O error.
        source: io::Error,
    },
}

// Automatic conversion from io::Error for ergonomic ? usage
impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Io { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        let display = format!("{err}");
        assert!(display.starts_with("I/O error:"), "got: {display}");
    }

    #[test]
    fn test_error_display_cannot_open() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::CannotOpen { path: "/tmp/t.btree".to_string(), source: io_err };
        let display = format!("{err}");
        assert!(display.contains("/tmp/t.btree"), "got: {display}");
    }

    #[test]
    fn test_error_display_corrupt() {
        let err = Error::Corrupt { reason: "short header".to_string() };
        assert_eq!(format!("{err}"), "corrupt b-tree file: short header");
    }

    #[test]
    fn test_error_display_invalid_key() {
        let err = Error::InvalidKey { len: 40, max: 31 };
        assert_eq!(format!("{err}"), "invalid key of 40 bytes (limit 31)");
    }

    #[test]
    fn test_error_display_invalid_config() {
        let err = Error::InvalidConfig { reason: "degree must be > 1".to_string() };
        assert_eq!(format!("{err}"), "invalid configuration: degree must be > 1");
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as StdError;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);

        // snafu should preserve the source chain
        assert!(err.source().is_some(), "Error::Io should have a source");
    }
}
