//! Leaf blocks of a hierarchical matrix and their rank-truncated algebra.
//!
//! A hierarchical matrix partitions a large dense matrix into a tree of
//! rectangular blocks; each leaf is either stored densely or approximated by
//! a low-rank outer product `U V^H`. This crate provides the per-leaf
//! engine: the tagged [`Block`] type, conversions between storage variants,
//! rank-truncated additions ([`Block::add_lrm`], [`Block::add_gem`]),
//! QR-based unification of adjacent blocks ([`Block::unify_cols`],
//! [`Block::unify_rows`]), LU factorisation with an embedded row permutation
//! ([`Block::decomp_lu`]) and the triangular products and solves reading the
//! packed factors.
//!
//! Truncation is controlled everywhere by a relative tolerance and a rank
//! cap; a pluggable [`RankReducer`] strategy can replace the plain SVD
//! truncation step, e.g. to preserve Haar-wavelet moments across the
//! compression.

mod add;
mod block;
mod error;
mod factor;
mod reducer;
mod unify;

pub use block::{Block, EPS0};
pub use error::{BlockError, Result};
pub use reducer::{RankReducer, Reduction, SvdReducer};
