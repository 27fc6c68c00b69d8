//! Error types for the `questbot-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`] through the
//! standard [`Result`] type.

/// Errors that can occur during registry and grid operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorldError {
    /// A location index does not exist in the registry.
    #[error("location index {index} out of range (registry holds {len})")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of locations in the registry.
        len: usize,
    },

    /// A textual grid had rows of different widths or unknown characters.
    #[error("malformed grid at row {row}: {reason}")]
    MalformedGrid {
        /// Zero-based row where the problem was found.
        row: usize,
        /// What is wrong with the row.
        reason: String,
    },

    /// Grid dimensions do not fit in memory arithmetic.
    #[error("grid of {width}x{height} tiles is too large")]
    GridTooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}
