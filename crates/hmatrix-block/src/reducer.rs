//! Rank-reducer strategy plugged into the truncating block operations.
//!
//! A reducer replaces the plain SVD truncation step by a user-supplied rule
//! that may preserve a bilinear form (Haar-wavelet moments in the motivating
//! application) exactly across truncation. The block engine treats it as a
//! pure function: it transforms the moment test matrices into the internal
//! basis of the operation at hand, hands everything over, and multiplies the
//! returned factors back -- it never inspects the reducer's internals.

use hmatrix_kernels::Scalar;

use crate::add::truncate_pair;
use crate::error::Result;

/// Strategy producing a rank-reduced factorisation while preserving a
/// caller-chosen contract.
pub trait RankReducer<T: Scalar> {
    /// Number of columns of the moment test matrices `X` and `Y`.
    fn cols(&self) -> usize;

    /// Add `(U, V)` of rank `k` to the factorisation `(U0, V0)` of rank
    /// `rank` and truncate with tolerance `delta` and cap `kgoal`.
    ///
    /// `X` is `n2 x cols` and `Y` is `n1 x cols`, each with its own leading
    /// dimension. Returns the new `(rank, U, V)` with `U` sized `n1 x rank`
    /// and `V` sized `n2 x rank`.
    #[allow(clippy::too_many_arguments)]
    fn add_low_rank(
        &self,
        delta: f64,
        kgoal: usize,
        n1: usize,
        n2: usize,
        u0: &[T],
        v0: &[T],
        rank: usize,
        u: &[T],
        ldu: usize,
        v: &[T],
        ldv: usize,
        k: usize,
        x: &[T],
        ldx: usize,
        y: &[T],
        ldy: usize,
    ) -> Result<(usize, Vec<T>, Vec<T>)>;

    /// Truncate the explicit factorisation `A V^H` where `A` is `m x kmid`
    /// (singular values already folded in) and `V` is `n x kmid`.
    ///
    /// Returns `(rank, U, V)` with `U` sized `m x rank`, `V` sized
    /// `n x rank` and `rank <= max_rank`.
    #[allow(clippy::too_many_arguments)]
    fn create_low_rank(
        &self,
        eps: f64,
        max_rank: usize,
        m: usize,
        kmid: usize,
        n: usize,
        a: &[T],
        v: &[T],
        x: &[T],
        ldx: usize,
        y: &[T],
        ldy: usize,
    ) -> Result<(usize, Vec<T>, Vec<T>)>;
}

/// A reducer strategy bundled with its moment test matrices.
///
/// `x` must hold at least `ldx * (cols - 1) + rows` entries for the row
/// count of the operation it is passed to (and likewise `y`); the engine
/// slices sub-ranges of both when an operation splits its factors.
pub struct Reduction<'a, T: Scalar> {
    /// The reduction strategy.
    pub reducer: &'a dyn RankReducer<T>,
    /// Moment test matrix applied on the column side.
    pub x: &'a [T],
    /// Leading dimension of `x`.
    pub ldx: usize,
    /// Moment test matrix applied on the row side.
    pub y: &'a [T],
    /// Leading dimension of `y`.
    pub ldy: usize,
}

/// Reference reducer: plain SVD truncation, ignoring the moment matrices.
///
/// Useful for exercising the reducer plumbing and as the baseline the
/// moment-preserving implementations are measured against.
#[derive(Debug, Default)]
pub struct SvdReducer {
    cols: usize,
}

impl SvdReducer {
    /// Create a reducer advertising `cols` moment columns (the moments are
    /// accepted and ignored).
    pub fn new(cols: usize) -> Self {
        Self { cols }
    }
}

impl<T: Scalar> RankReducer<T> for SvdReducer {
    fn cols(&self) -> usize {
        self.cols
    }

    fn add_low_rank(
        &self,
        delta: f64,
        kgoal: usize,
        n1: usize,
        n2: usize,
        u0: &[T],
        v0: &[T],
        rank: usize,
        u: &[T],
        ldu: usize,
        v: &[T],
        ldv: usize,
        k: usize,
        _x: &[T],
        _ldx: usize,
        _y: &[T],
        _ldy: usize,
    ) -> Result<(usize, Vec<T>, Vec<T>)> {
        let ksum = rank + k;
        let mut ua = Vec::with_capacity(ksum * n1);
        ua.extend_from_slice(&u0[..rank * n1]);
        for l in 0..k {
            ua.extend_from_slice(&u[l * ldu..l * ldu + n1]);
        }
        let mut va = Vec::with_capacity(ksum * n2);
        va.extend_from_slice(&v0[..rank * n2]);
        for l in 0..k {
            va.extend_from_slice(&v[l * ldv..l * ldv + n2]);
        }
        truncate_pair(n1, n2, ksum, ua, va, delta, kgoal, true)
    }

    fn create_low_rank(
        &self,
        eps: f64,
        max_rank: usize,
        m: usize,
        kmid: usize,
        n: usize,
        a: &[T],
        v: &[T],
        _x: &[T],
        _ldx: usize,
        _y: &[T],
        _ldy: usize,
    ) -> Result<(usize, Vec<T>, Vec<T>)> {
        truncate_pair(
            m,
            n,
            kmid,
            a[..m * kmid].to_vec(),
            v[..n * kmid].to_vec(),
            eps,
            max_rank,
            false,
        )
    }
}
