//! Error types for block operations.

use hmatrix_kernels::KernelError;
use thiserror::Error;

/// Errors reported by leaf-block operations.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Operation invoked on a block with an incompatible storage tag.
    #[error("{op} requires {expected} storage, block is {found}")]
    WrongStorage {
        /// Operation name.
        op: &'static str,
        /// Required storage tag(s).
        expected: &'static str,
        /// Actual storage tag.
        found: &'static str,
    },

    /// Block shapes do not line up.
    #[error("{op}: shape mismatch (expected {expected_n1}x{expected_n2}, got {n1}x{n2})")]
    ShapeMismatch {
        /// Operation name.
        op: &'static str,
        /// Expected rows.
        expected_n1: usize,
        /// Expected columns.
        expected_n2: usize,
        /// Actual rows.
        n1: usize,
        /// Actual columns.
        n2: usize,
    },

    /// Operation requires a square block.
    #[error("{op} requires a square block, got {n1}x{n2}")]
    NotSquare {
        /// Operation name.
        op: &'static str,
        /// Rows.
        n1: usize,
        /// Columns.
        n2: usize,
    },

    /// The permutation stored in a unit-lower factor is invalid.
    #[error("invalid permutation stored in lower factor: entry {value} for size {n}")]
    InvalidPermutation {
        /// Offending decoded value.
        value: usize,
        /// Matrix dimension.
        n: usize,
    },

    /// A numeric kernel failed.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Result type for block operations.
pub type Result<T> = std::result::Result<T, BlockError>;
