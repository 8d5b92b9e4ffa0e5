//! The matrix leaf block and its storage variants.
//!
//! A block is an `n1 x n2` rectangular leaf of a hierarchical matrix. Its
//! storage is one of six mutually exclusive variants (the mnemonics follow
//! the H-matrix literature):
//!
//! - `LrM` -- low-rank outer product `U V^H`, factors stored column-major,
//! - `GeM` -- generic dense, column-major,
//! - `UtM` -- upper triangular, packed upper columnwise (`j+1` entries per
//!   column `j`),
//! - `LtM` -- unit-lower triangular with the image of the row permutation
//!   encoded in the diagonal slot of each packed column,
//! - `HeM` -- Hermitian, packed upper columnwise,
//! - `SyM` -- complex-symmetric, packed upper columnwise.
//!
//! The packed triangular/Hermitian variants are only available for square
//! blocks. A freshly created block is `LrM` of rank zero, which represents
//! the zero matrix.

use hmatrix_kernels::blas::{gemmh, nrm2, setzero, utrmmh};
use hmatrix_kernels::qr::geqrf;
use hmatrix_kernels::svd::svals;
use hmatrix_kernels::Scalar;

use crate::error::{BlockError, Result};

/// Singular values at or below this floor never keep a rank slot alive.
pub const EPS0: f64 = 1e-64;

/// Storage variant of a [`Block`], payload owned by the variant.
#[derive(Debug, Clone)]
pub(crate) enum Storage<T> {
    /// Low-rank `U V^H`: `u` is `n1 x rank`, `v` is `n2 x rank`.
    LowRank { rank: usize, u: Vec<T>, v: Vec<T> },
    /// Dense column-major `n1 x n2`.
    Dense(Vec<T>),
    /// Packed upper triangle, column `j` holding rows `0..=j`.
    UpperPacked(Vec<T>),
    /// Packed unit-lower triangle; the head entry of column `j` encodes the
    /// permutation image of row `j`, followed by the strictly-lower entries.
    LowerPacked(Vec<T>),
    /// Packed upper triangle of a Hermitian matrix.
    HermitianPacked(Vec<T>),
    /// Packed upper triangle of a complex-symmetric matrix.
    SymmetricPacked(Vec<T>),
}

/// Offset of packed-upper column `j`.
#[inline]
pub(crate) fn upper_off(j: usize) -> usize {
    j * (j + 1) / 2
}

/// Offset of packed-lower column `j` for dimension `n`.
#[inline]
pub(crate) fn lower_off(n: usize, j: usize) -> usize {
    j * (2 * n - j + 1) / 2
}

/// A rectangular leaf block of a hierarchical matrix.
#[derive(Debug, Clone)]
pub struct Block<T> {
    pub(crate) n1: usize,
    pub(crate) n2: usize,
    pub(crate) storage: Storage<T>,
}

impl<T: Scalar> Block<T> {
    /// Create an `n1 x n2` block representing the zero matrix (rank-0 `LrM`).
    pub fn new(n1: usize, n2: usize) -> Self {
        Self {
            n1,
            n2,
            storage: Storage::LowRank {
                rank: 0,
                u: Vec::new(),
                v: Vec::new(),
            },
        }
    }

    /// Number of rows.
    pub fn n1(&self) -> usize {
        self.n1
    }

    /// Number of columns.
    pub fn n2(&self) -> usize {
        self.n2
    }

    /// Rank of a low-rank block; zero for dense variants.
    pub fn rank(&self) -> usize {
        match &self.storage {
            Storage::LowRank { rank, .. } => *rank,
            _ => 0,
        }
    }

    /// True for the low-rank variant.
    pub fn is_lrm(&self) -> bool {
        matches!(self.storage, Storage::LowRank { .. })
    }

    /// True for every dense variant (`UtM`/`LtM`/`HeM`/`SyM` imply `GeM`).
    pub fn is_gem(&self) -> bool {
        !self.is_lrm()
    }

    /// True for the packed upper-triangular variant.
    pub fn is_utm(&self) -> bool {
        matches!(self.storage, Storage::UpperPacked(_))
    }

    /// True for the packed unit-lower variant with embedded permutation.
    pub fn is_ltm(&self) -> bool {
        matches!(self.storage, Storage::LowerPacked(_))
    }

    /// True for the packed Hermitian variant.
    pub fn is_hem(&self) -> bool {
        matches!(self.storage, Storage::HermitianPacked(_))
    }

    /// True for the packed complex-symmetric variant.
    pub fn is_sym(&self) -> bool {
        matches!(self.storage, Storage::SymmetricPacked(_))
    }

    pub(crate) fn tag_name(&self) -> &'static str {
        match &self.storage {
            Storage::LowRank { .. } => "LrM",
            Storage::Dense(_) => "GeM",
            Storage::UpperPacked(_) => "UtM",
            Storage::LowerPacked(_) => "LtM",
            Storage::HermitianPacked(_) => "HeM",
            Storage::SymmetricPacked(_) => "SyM",
        }
    }

    pub(crate) fn require_square(&self, op: &'static str) -> Result<()> {
        if self.n1 != self.n2 {
            return Err(BlockError::NotSquare {
                op,
                n1: self.n1,
                n2: self.n2,
            });
        }
        Ok(())
    }

    pub(crate) fn wrong_storage(&self, op: &'static str, expected: &'static str) -> BlockError {
        BlockError::WrongStorage {
            op,
            expected,
            found: self.tag_name(),
        }
    }

    /// Retag as dense, zero-initialised to the exact `n1 * n2` footprint.
    pub fn set_gem(&mut self) {
        self.storage = Storage::Dense(vec![T::zero(); self.n1 * self.n2]);
    }

    /// Retag as low-rank of the given rank with zeroed factors.
    pub fn set_lrm(&mut self, rank: usize) {
        self.storage = Storage::LowRank {
            rank,
            u: vec![T::zero(); rank * self.n1],
            v: vec![T::zero(); rank * self.n2],
        };
    }

    /// Retag as packed upper triangular (square blocks only).
    pub fn set_utm(&mut self) -> Result<()> {
        self.require_square("set_utm")?;
        self.storage = Storage::UpperPacked(vec![T::zero(); upper_off(self.n1)]);
        Ok(())
    }

    /// Retag as packed unit-lower triangular with embedded permutation.
    pub fn set_ltm(&mut self) -> Result<()> {
        self.require_square("set_ltm")?;
        self.storage = Storage::LowerPacked(vec![T::zero(); upper_off(self.n1)]);
        Ok(())
    }

    /// Retag as packed Hermitian (square blocks only).
    pub fn set_hem(&mut self) -> Result<()> {
        self.require_square("set_hem")?;
        self.storage = Storage::HermitianPacked(vec![T::zero(); upper_off(self.n1)]);
        Ok(())
    }

    /// Retag as packed complex-symmetric (square blocks only).
    pub fn set_sym(&mut self) -> Result<()> {
        self.require_square("set_sym")?;
        self.storage = Storage::SymmetricPacked(vec![T::zero(); upper_off(self.n1)]);
        Ok(())
    }

    /// Low-rank factors `(rank, u, v)` if the block is `LrM`.
    pub fn lr_factors(&self) -> Option<(usize, &[T], &[T])> {
        match &self.storage {
            Storage::LowRank { rank, u, v } => Some((*rank, u, v)),
            _ => None,
        }
    }

    /// Dense payload if the block is plain `GeM`.
    pub fn dense(&self) -> Option<&[T]> {
        match &self.storage {
            Storage::Dense(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable dense payload if the block is plain `GeM`.
    pub fn dense_mut(&mut self) -> Option<&mut [T]> {
        match &mut self.storage {
            Storage::Dense(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable low-rank factors `(u, v)` if the block is `LrM`.
    pub fn lr_factors_mut(&mut self) -> Option<(&mut [T], &mut [T])> {
        match &mut self.storage {
            Storage::LowRank { u, v, .. } => Some((u, v)),
            _ => None,
        }
    }

    /// Packed payload of a triangular/Hermitian/symmetric variant.
    pub fn packed(&self) -> Option<&[T]> {
        match &self.storage {
            Storage::UpperPacked(d)
            | Storage::LowerPacked(d)
            | Storage::HermitianPacked(d)
            | Storage::SymmetricPacked(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable packed payload of a triangular/Hermitian/symmetric variant.
    pub fn packed_mut(&mut self) -> Option<&mut [T]> {
        match &mut self.storage {
            Storage::UpperPacked(d)
            | Storage::LowerPacked(d)
            | Storage::HermitianPacked(d)
            | Storage::SymmetricPacked(d) => Some(d),
            _ => None,
        }
    }

    /// Decode the row permutation embedded in a unit-lower factor.
    ///
    /// The permutation lives in the diagonal slots of the packed columns;
    /// this accessor validates that the decoded sequence is a permutation of
    /// `0..n1` before handing it out.
    pub fn permutation(&self) -> Result<Vec<usize>> {
        let data = match &self.storage {
            Storage::LowerPacked(d) => d,
            _ => return Err(self.wrong_storage("permutation", "LtM")),
        };
        let n = self.n1;
        let mut ip = vec![0usize; n];
        let mut seen = vec![false; n];
        for (j, e) in ip.iter_mut().enumerate() {
            let code = data[lower_off(n, j)].re();
            if !(code.is_finite() && code >= 0.0 && code < n as f64) {
                return Err(BlockError::InvalidPermutation {
                    value: code as usize,
                    n,
                });
            }
            let idx = code as usize;
            if seen[idx] {
                return Err(BlockError::InvalidPermutation { value: idx, n });
            }
            seen[idx] = true;
            *e = idx;
        }
        Ok(ip)
    }

    /// Copy a plain dense block into `a` (leading dimension `lda`).
    pub fn conv_gem_into(&self, a: &mut [T], lda: usize) -> Result<()> {
        let data = self
            .dense()
            .ok_or_else(|| self.wrong_storage("conv_gem_into", "GeM"))?;
        for j in 0..self.n2 {
            a[j * lda..j * lda + self.n1].copy_from_slice(&data[j * self.n1..(j + 1) * self.n1]);
        }
        Ok(())
    }

    /// Expand the packed Hermitian upper triangle into a full dense matrix,
    /// mirroring the off-diagonal entries with conjugation.
    pub fn conv_hem_into(&self, a: &mut [T], lda: usize) -> Result<()> {
        let data = match &self.storage {
            Storage::HermitianPacked(d) => d,
            _ => return Err(self.wrong_storage("conv_hem_into", "HeM")),
        };
        expand_upper(self.n2, data, a, lda, true);
        Ok(())
    }

    /// Expand the packed symmetric upper triangle into a full dense matrix
    /// (no conjugation on the mirror).
    pub fn conv_sym_into(&self, a: &mut [T], lda: usize) -> Result<()> {
        let data = match &self.storage {
            Storage::SymmetricPacked(d) => d,
            _ => return Err(self.wrong_storage("conv_sym_into", "SyM")),
        };
        expand_upper(self.n2, data, a, lda, false);
        Ok(())
    }

    /// Materialise `U V^H` into `a` (leading dimension `lda`); rank zero
    /// writes an all-zero matrix.
    pub fn conv_lrm_into(&self, a: &mut [T], lda: usize) -> Result<()> {
        let (rank, u, v) = self
            .lr_factors()
            .ok_or_else(|| self.wrong_storage("conv_lrm_into", "LrM"))?;
        if rank > 0 {
            gemmh(self.n1, rank, self.n2, T::one(), u, self.n1, v, self.n2, a, lda);
        } else {
            for j in 0..self.n2 {
                setzero(&mut a[j * lda..j * lda + self.n1]);
            }
        }
        Ok(())
    }

    /// Replace low-rank storage by its dense materialisation.
    pub fn conv_lrm_to_gem(&mut self) -> Result<()> {
        let (rank, u, v) = match &self.storage {
            Storage::LowRank { rank, u, v } => (*rank, u, v),
            _ => return Err(self.wrong_storage("conv_lrm_to_gem", "LrM")),
        };
        let mut data = vec![T::zero(); self.n1 * self.n2];
        if rank > 0 {
            gemmh(
                self.n1,
                rank,
                self.n2,
                T::one(),
                u,
                self.n1,
                v,
                self.n2,
                &mut data,
                self.n1,
            );
        }
        self.storage = Storage::Dense(data);
        Ok(())
    }

    /// Compress a dense block to low rank with relative tolerance `eps`.
    ///
    /// Keeps the largest `k` with `sigma_{k-1} > eps * sigma_0` and
    /// `sigma_{k-1} >= EPS0`; the retained singular values are folded into
    /// the `V` factor.
    pub fn conv_gem_to_lrm(&mut self, eps: f64) -> Result<()> {
        let data = match &self.storage {
            Storage::Dense(d) => d,
            _ => return Err(self.wrong_storage("conv_gem_to_lrm", "GeM")),
        };
        let tmp = data.clone();
        self.svd_truncate_dense(tmp, eps, usize::MAX, None)
    }

    /// Expand any storage variant into `a` (leading dimension `lda`).
    ///
    /// A unit-lower factor is rendered as `L` itself; the embedded
    /// permutation is not applied.
    pub fn to_dense_into(&self, a: &mut [T], lda: usize) {
        let (n1, n2) = (self.n1, self.n2);
        match &self.storage {
            Storage::LowRank { rank, u, v } => {
                if *rank > 0 {
                    gemmh(n1, *rank, n2, T::one(), u, n1, v, n2, a, lda);
                } else {
                    for j in 0..n2 {
                        setzero(&mut a[j * lda..j * lda + n1]);
                    }
                }
            }
            Storage::Dense(d) => {
                for j in 0..n2 {
                    a[j * lda..j * lda + n1].copy_from_slice(&d[j * n1..(j + 1) * n1]);
                }
            }
            Storage::UpperPacked(d) => {
                for j in 0..n2 {
                    setzero(&mut a[j * lda..j * lda + n1]);
                    let off = upper_off(j);
                    for i in 0..=j {
                        a[i + j * lda] = d[off + i];
                    }
                }
            }
            Storage::LowerPacked(d) => {
                for j in 0..n2 {
                    setzero(&mut a[j * lda..j * lda + n1]);
                    a[j + j * lda] = T::one();
                    let off = lower_off(n1, j);
                    for i in j + 1..n1 {
                        a[i + j * lda] = d[off + (i - j)];
                    }
                }
            }
            Storage::HermitianPacked(d) => expand_upper(n2, d, a, lda, true),
            Storage::SymmetricPacked(d) => expand_upper(n2, d, a, lda, false),
        }
    }

    /// Singular values of a low-rank block, computed from the QR factors of
    /// `U` and `V` without materialising the product.
    pub fn get_svals_lrm(&self) -> Result<Vec<f64>> {
        let (rank, u, v) = self
            .lr_factors()
            .ok_or_else(|| self.wrong_storage("get_svals_lrm", "LrM"))?;
        if rank == 0 {
            return Ok(Vec::new());
        }
        let (n1, n2) = (self.n1, self.n2);
        let mmin = n1.min(rank);
        let nmin = n2.min(rank);

        let mut qu = u.to_vec();
        let mut qv = v.to_vec();
        let mut tau1 = vec![T::zero(); mmin];
        let mut tau2 = vec![T::zero(); nmin];
        geqrf(n1, rank, &mut qu, n1, &mut tau1);
        geqrf(n2, rank, &mut qv, n2, &mut tau2);

        let mut r = vec![T::zero(); mmin * nmin];
        utrmmh(mmin, rank, nmin, &qu, n1, &qv, n2, &mut r);

        let mut s = vec![0.0; mmin.min(nmin)];
        svals(mmin, nmin, &mut r, mmin, &mut s)?;
        Ok(s)
    }

    /// Exact concatenation of an external `(U, V)` pair of rank `k` onto a
    /// low-rank block; no truncation.
    pub(crate) fn append(&mut self, k: usize, u: &[T], ldu: usize, v: &[T], ldv: usize) {
        let (n1, n2) = (self.n1, self.n2);
        let Storage::LowRank { rank, u: u0, v: v0 } = &mut self.storage else {
            unreachable!("append is only called on LrM blocks");
        };
        u0.reserve(k * n1);
        for l in 0..k {
            u0.extend_from_slice(&u[l * ldu..l * ldu + n1]);
        }
        v0.reserve(k * n2);
        for l in 0..k {
            v0.extend_from_slice(&v[l * ldv..l * ldv + n2]);
        }
        *rank += k;
    }

    /// Frobenius norm of the block (any variant).
    pub fn norm_frobenius(&self) -> f64 {
        let mut tmp = vec![T::zero(); self.n1 * self.n2];
        self.to_dense_into(&mut tmp, self.n1);
        nrm2(&tmp)
    }
}

/// Expand a packed upper triangle into full dense form, mirroring the
/// off-diagonal entries (conjugated for the Hermitian case).
fn expand_upper<T: Scalar>(n: usize, data: &[T], a: &mut [T], lda: usize, conjugate: bool) {
    let mut p = 0;
    for j in 0..n {
        for i in 0..j {
            let t = data[p];
            p += 1;
            a[i + j * lda] = t;
            a[j + i * lda] = if conjugate { t.conj() } else { t };
        }
        a[j * (lda + 1)] = data[p];
        p += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn new_block_is_zero_low_rank() {
        let b: Block<f64> = Block::new(5, 3);
        assert!(b.is_lrm());
        assert!(!b.is_gem());
        assert_eq!(b.rank(), 0);

        let mut dense = vec![1.0; 15];
        b.to_dense_into(&mut dense, 5);
        assert!(dense.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn hem_expansion_is_hermitian() {
        let mut b: Block<Complex64> = Block::new(3, 3);
        b.set_hem().unwrap();
        {
            let data = b.packed_mut().unwrap();
            // Columns: [d0], [a01, d1], [a02, a12, d2].
            data[0] = Complex64::new(1.0, 0.0);
            data[1] = Complex64::new(2.0, 1.0);
            data[2] = Complex64::new(3.0, 0.0);
            data[3] = Complex64::new(0.5, -2.0);
            data[4] = Complex64::new(1.5, 0.5);
            data[5] = Complex64::new(4.0, 0.0);
        }
        let mut a = vec![Complex64::new(0.0, 0.0); 9];
        b.conv_hem_into(&mut a, 3).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let d = a[i + j * 3] - a[j + i * 3].conj();
                assert!(d.norm() < 1e-15, "not Hermitian at ({i},{j})");
            }
        }
        assert_eq!(a[1], Complex64::new(2.0, -1.0));
    }

    #[test]
    fn sym_expansion_mirrors_without_conjugation() {
        let mut b: Block<Complex64> = Block::new(2, 2);
        b.set_sym().unwrap();
        {
            let data = b.packed_mut().unwrap();
            data[0] = Complex64::new(1.0, 0.5);
            data[1] = Complex64::new(2.0, -1.0);
            data[2] = Complex64::new(3.0, 0.25);
        }
        let mut a = vec![Complex64::new(0.0, 0.0); 4];
        b.conv_sym_into(&mut a, 2).unwrap();
        assert_eq!(a[1], a[2]);
        assert_eq!(a[1], Complex64::new(2.0, -1.0));
    }

    #[test]
    fn lrm_gem_roundtrip_rank_one() {
        // U = (1,2,3,4)^T, V = (1,1,1,1)^T.
        let mut b: Block<f64> = Block::new(4, 4);
        b.set_lrm(1);
        {
            let (u, v) = b.lr_factors_mut().unwrap();
            u.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
            v.copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
        }
        let mut reference = vec![0.0; 16];
        b.to_dense_into(&mut reference, 4);

        b.conv_lrm_to_gem().unwrap();
        assert!(b.is_gem() && !b.is_lrm());
        b.conv_gem_to_lrm(1e-10).unwrap();
        assert_eq!(b.rank(), 1);

        let mut rec = vec![0.0; 16];
        b.to_dense_into(&mut rec, 4);
        for i in 0..16 {
            assert!((rec[i] - reference[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn conv_gem_to_lrm_drops_tiny_singular_values() {
        // Entirely below the EPS0 floor: the block becomes rank zero.
        let mut b: Block<f64> = Block::new(3, 3);
        b.set_gem();
        for e in b.dense_mut().unwrap().iter_mut() {
            *e = 1e-70;
        }
        b.conv_gem_to_lrm(1e-10).unwrap();
        assert_eq!(b.rank(), 0);
    }

    #[test]
    fn get_svals_of_diagonal_outer_product() {
        let mut b: Block<f64> = Block::new(4, 4);
        b.set_lrm(2);
        {
            let (u, v) = b.lr_factors_mut().unwrap();
            // 3 e1 e1^T + 2 e2 e2^T.
            u[0] = 3.0;
            u[4 + 1] = 2.0;
            v[0] = 1.0;
            v[4 + 1] = 1.0;
        }
        let s = b.get_svals_lrm().unwrap();
        assert_eq!(s.len(), 2);
        assert!((s[0] - 3.0).abs() < 1e-12);
        assert!((s[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn permutation_rejects_garbage() {
        let mut b: Block<f64> = Block::new(3, 3);
        b.set_ltm().unwrap();
        {
            let data = b.packed_mut().unwrap();
            data[lower_off(3, 0)] = 7.0; // out of range
        }
        assert!(b.permutation().is_err());
    }

    #[test]
    fn set_utm_requires_square() {
        let mut b: Block<f64> = Block::new(3, 4);
        assert!(b.set_utm().is_err());
        assert!(b.set_hem().is_err());
    }
}
