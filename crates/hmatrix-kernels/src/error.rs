//! Error types for the numeric kernels.

use thiserror::Error;

/// Errors reported by the dense factorisation kernels.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The Jacobi SVD iteration did not reach its off-diagonal tolerance.
    #[error("SVD failed to converge after {sweeps} Jacobi sweeps")]
    SvdNoConvergence {
        /// Number of sweeps performed before giving up.
        sweeps: usize,
    },

    /// LU elimination found a pivot column with no usable entry.
    #[error("singular pivot in column {col} during LU factorisation")]
    SingularPivot {
        /// Column in which every candidate pivot was zero.
        col: usize,
    },
}

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
