//! Dense numeric kernels for the hmatrix crates.
//!
//! A typed facade over the level-1/2/3 operations and factorisations the
//! leaf-block engine is built from: BLAS-style helpers on column-major
//! slices, Householder QR with factored-form application, one-sided Jacobi
//! SVD, and LU with partial row pivoting. Everything is generic over the
//! [`Scalar`] trait, instantiated for `f64` and `Complex64`.

pub mod blas;
pub mod error;
pub mod lu;
pub mod qr;
pub mod scalar;
pub mod svd;

pub use error::{KernelError, Result};
pub use scalar::Scalar;
