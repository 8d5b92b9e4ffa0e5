//! Rank-truncated unification of two adjacent blocks.
//!
//! `unify_cols` joins two blocks side by side, `unify_rows` stacks them.
//! When both inputs are low rank the merge works entirely on QR factors of
//! the stacked factors: the combined left (resp. right) factor is
//! QR-factorised once, each input's opposite factor separately, and the
//! truncated SVD of a small triangular product recombines everything. Any
//! other storage combination falls back to a dense materialisation followed
//! by a truncated SVD.

use hmatrix_kernels::blas::{gemhm, gemm, gemmh, rscal, utrmmh};
use hmatrix_kernels::qr::{geqrf, orgqr};
use hmatrix_kernels::svd::gesvd;
use hmatrix_kernels::Scalar;

use crate::add::select_rank;
use crate::block::{Block, Storage};
use crate::error::{BlockError, Result};
use crate::reducer::Reduction;

impl<T: Scalar> Block<T> {
    /// Join `mbl1` and `mbl2` side by side into this block (common row
    /// count, `n2 = mbl1.n2 + mbl2.n2`), truncating to `(delta, kgoal)`.
    pub fn unify_cols(
        &mut self,
        delta: f64,
        kgoal: usize,
        mbl1: &Block<T>,
        mbl2: &Block<T>,
        red: Option<&Reduction<'_, T>>,
    ) -> Result<()> {
        if mbl1.n1 != mbl2.n1 || self.n1 != mbl1.n1 || self.n2 != mbl1.n2 + mbl2.n2 {
            return Err(BlockError::ShapeMismatch {
                op: "unify_cols",
                expected_n1: self.n1,
                expected_n2: self.n2,
                n1: mbl1.n1.max(mbl2.n1),
                n2: mbl1.n2 + mbl2.n2,
            });
        }
        if mbl1.is_lrm() && mbl2.is_lrm() {
            self.unify_cols_lrmlrm(delta, kgoal, mbl1, mbl2, red)
        } else {
            let (n1, n2) = (self.n1, self.n2);
            let mut tmp = vec![T::zero(); n1 * n2];
            mbl1.to_dense_into(&mut tmp, n1);
            mbl2.to_dense_into(&mut tmp[n1 * mbl1.n2..], n1);
            self.svd_truncate_dense(tmp, delta, kgoal, red)
        }
    }

    /// Stack `mbl1` on top of `mbl2` into this block (common column count,
    /// `n1 = mbl1.n1 + mbl2.n1`), truncating to `(delta, kgoal)`.
    pub fn unify_rows(
        &mut self,
        delta: f64,
        kgoal: usize,
        mbl1: &Block<T>,
        mbl2: &Block<T>,
        red: Option<&Reduction<'_, T>>,
    ) -> Result<()> {
        if mbl1.n2 != mbl2.n2 || self.n2 != mbl1.n2 || self.n1 != mbl1.n1 + mbl2.n1 {
            return Err(BlockError::ShapeMismatch {
                op: "unify_rows",
                expected_n1: self.n1,
                expected_n2: self.n2,
                n1: mbl1.n1 + mbl2.n1,
                n2: mbl1.n2.max(mbl2.n2),
            });
        }
        if mbl1.is_lrm() && mbl2.is_lrm() {
            self.unify_rows_lrmlrm(delta, kgoal, mbl1, mbl2, red)
        } else {
            let (n1, n2) = (self.n1, self.n2);
            let mut tmp = vec![T::zero(); n1 * n2];
            mbl1.to_dense_into(&mut tmp, n1);
            mbl2.to_dense_into(&mut tmp[mbl1.n1..], n1);
            self.svd_truncate_dense(tmp, delta, kgoal, red)
        }
    }

    /// Low-rank fast path of [`Block::unify_cols`].
    fn unify_cols_lrmlrm(
        &mut self,
        delta: f64,
        kgoal: usize,
        mbl1: &Block<T>,
        mbl2: &Block<T>,
        red: Option<&Reduction<'_, T>>,
    ) -> Result<()> {
        let (k1, u1, v1src) = mbl1.lr_factors().expect("checked LrM");
        let (k2, u2, v2src) = mbl2.lr_factors().expect("checked LrM");
        let ksum = k1 + k2;
        if ksum == 0 {
            self.set_lrm(0);
            return Ok(());
        }
        let (n1, n2) = (self.n1, self.n2);
        let (n2a, n2b) = (mbl1.n2, mbl2.n2);
        let ku = n1.min(ksum);

        // Combined QR of [U1 | U2]; separate QRs of V1 and V2.
        let mut ua = Vec::with_capacity(ksum * n1);
        ua.extend_from_slice(u1);
        ua.extend_from_slice(u2);
        let mut qv1 = v1src.to_vec();
        let mut qv2 = v2src.to_vec();
        let mut tau = vec![T::zero(); ku];
        let mut tau1 = vec![T::zero(); k1.min(n2a)];
        let mut tau2 = vec![T::zero(); k2.min(n2b)];
        geqrf(n1, ksum, &mut ua, n1, &mut tau);
        geqrf(n2a, k1, &mut qv1, n2a, &mut tau1);
        geqrf(n2b, k2, &mut qv2, n2b, &mut tau2);

        // M = [R[:, :k1] T1^H | R[:, k1:] T2^H], exploiting that both
        // factors of each product are upper triangular.
        let mut m = vec![T::zero(); ku * ksum];
        utrmmh(ku, k1, k1, &ua, n1, &qv1, n2a, &mut m[..ku * k1]);
        for j in 0..k2 {
            for i in 0..ku {
                let mut d = T::zero();
                for l in (i.max(j + k1) - k1)..k2 {
                    d = d + ua[i + (k1 + l) * n1] * qv2[j + l * n2b].conj();
                }
                m[i + (j + k1) * ku] = d;
            }
        }

        let mut s = vec![0.0; ku];
        let mut vt = vec![T::zero(); ku * ksum];
        gesvd(ku, ksum, &mut m, ku, &mut s, &mut vt, ku)?;

        match red {
            None => {
                let kt = select_rank(&s, ku.min(kgoal), delta);
                if kt == 0 {
                    self.set_lrm(0);
                    return Ok(());
                }
                orgqr(n1, ku, &mut ua, n1, &tau);
                for l in 0..kt {
                    rscal(s[l], &mut m[l * ku..l * ku + ku]);
                }
                let mut nu = vec![T::zero(); kt * n1];
                gemm(n1, ku, kt, T::one(), &ua, n1, &m, ku, &mut nu, n1);

                let mut nv = vec![T::zero(); kt * n2];
                orgqr(n2a, k1, &mut qv1, n2a, &tau1);
                gemmh(n2a, k1, kt, T::one(), &qv1, n2a, &vt, ku, &mut nv, n2);
                orgqr(n2b, k2, &mut qv2, n2b, &tau2);
                gemmh(
                    n2b,
                    k2,
                    kt,
                    T::one(),
                    &qv2,
                    n2b,
                    &vt[k1 * ku..],
                    ku,
                    &mut nv[n2a..],
                    n2,
                );
                self.storage = Storage::LowRank {
                    rank: kt,
                    u: nu,
                    v: nv,
                };
            }
            Some(red) => {
                // Transposed (not conjugated) right vectors for the reducer.
                let mut vbig = vec![T::zero(); ku * ksum];
                for i in 0..ku {
                    for j in 0..ksum {
                        vbig[j + i * ksum] = vt[i + j * ku];
                    }
                }
                orgqr(n1, ku, &mut ua, n1, &tau);
                orgqr(n2a, k1, &mut qv1, n2a, &tau1);
                orgqr(n2b, k2, &mut qv2, n2b, &tau2);
                for l in 0..ku {
                    rscal(s[l], &mut m[l * ku..l * ku + ku]);
                }

                // Moment matrices transformed into the internal bases:
                // Xnew = [Q1^H X_top ; Q2^H X_bot], Ynew = Q^H Y.
                let cols = red.reducer.cols();
                let mut xnew = vec![T::zero(); ksum * cols];
                gemhm(n2a, k1, cols, T::one(), &qv1, n2a, red.x, red.ldx, &mut xnew, ksum);
                gemhm(
                    n2b,
                    k2,
                    cols,
                    T::one(),
                    &qv2,
                    n2b,
                    &red.x[n2a..],
                    red.ldx,
                    &mut xnew[k1..],
                    ksum,
                );
                let mut ynew = vec![T::zero(); ku * cols];
                gemhm(n1, ku, cols, T::one(), &ua, n1, red.y, red.ldy, &mut ynew, ku);

                let (nr, du, dv) = red.reducer.create_low_rank(
                    delta, kgoal, ku, ku, ksum, &m, &vbig, &xnew, ksum, &ynew, ku,
                )?;

                let mut nu = vec![T::zero(); nr * n1];
                gemm(n1, ku, nr, T::one(), &ua, n1, &du, ku, &mut nu, n1);
                let mut nv = vec![T::zero(); nr * n2];
                gemm(n2a, k1, nr, T::one(), &qv1, n2a, &dv, ksum, &mut nv, n2);
                gemm(
                    n2b,
                    k2,
                    nr,
                    T::one(),
                    &qv2,
                    n2b,
                    &dv[k1..],
                    ksum,
                    &mut nv[n2a..],
                    n2,
                );
                self.storage = Storage::LowRank {
                    rank: nr,
                    u: nu,
                    v: nv,
                };
            }
        }
        Ok(())
    }

    /// Low-rank fast path of [`Block::unify_rows`].
    fn unify_rows_lrmlrm(
        &mut self,
        delta: f64,
        kgoal: usize,
        mbl1: &Block<T>,
        mbl2: &Block<T>,
        red: Option<&Reduction<'_, T>>,
    ) -> Result<()> {
        let (k1, u1src, v1) = mbl1.lr_factors().expect("checked LrM");
        let (k2, u2src, v2) = mbl2.lr_factors().expect("checked LrM");
        let ksum = k1 + k2;
        if ksum == 0 {
            self.set_lrm(0);
            return Ok(());
        }
        let (n1, n2) = (self.n1, self.n2);
        let (n1a, n1b) = (mbl1.n1, mbl2.n1);
        let kv = n2.min(ksum);

        // Combined QR of [V1 | V2]; separate QRs of U1 and U2.
        let mut va = Vec::with_capacity(ksum * n2);
        va.extend_from_slice(v1);
        va.extend_from_slice(v2);
        let mut qu1 = u1src.to_vec();
        let mut qu2 = u2src.to_vec();
        let mut tau = vec![T::zero(); kv];
        let mut tau1 = vec![T::zero(); k1.min(n1a)];
        let mut tau2 = vec![T::zero(); k2.min(n1b)];
        geqrf(n2, ksum, &mut va, n2, &mut tau);
        geqrf(n1a, k1, &mut qu1, n1a, &mut tau1);
        geqrf(n1b, k2, &mut qu2, n1b, &mut tau2);

        // M = [T1 R[:, :k1]^H ; T2 R[:, k1:]^H] built column by column from
        // the triangular factors.
        let mut m = vec![T::zero(); ksum * kv];
        for j in 0..k1 {
            for i in 0..k1 {
                let mut d = T::zero();
                for l in i.max(j)..k1 {
                    d = d + qu1[i + l * n1a] * va[j + l * n2].conj();
                }
                m[i + j * ksum] = d;
            }
            for i in 0..k2 {
                let mut d = T::zero();
                for l in i..k2 {
                    d = d + qu2[i + l * n1b] * va[j + (k1 + l) * n2].conj();
                }
                m[i + k1 + j * ksum] = d;
            }
        }
        for j in k1..kv {
            for i in 0..k2 {
                let mut d = T::zero();
                for l in (i.max(j - k1))..k2 {
                    d = d + qu2[i + l * n1b] * va[j + (k1 + l) * n2].conj();
                }
                m[i + k1 + j * ksum] = d;
            }
        }

        let mut s = vec![0.0; kv];
        let mut vt = vec![T::zero(); kv * kv];
        gesvd(ksum, kv, &mut m, ksum, &mut s, &mut vt, kv)?;

        match red {
            None => {
                let kt = select_rank(&s, kv.min(kgoal), delta);
                if kt == 0 {
                    self.set_lrm(0);
                    return Ok(());
                }
                for l in 0..kt {
                    rscal(s[l], &mut m[l * ksum..l * ksum + ksum]);
                }
                let mut nu = vec![T::zero(); kt * n1];
                orgqr(n1a, k1, &mut qu1, n1a, &tau1);
                gemm(n1a, k1, kt, T::one(), &qu1, n1a, &m, ksum, &mut nu, n1);
                orgqr(n1b, k2, &mut qu2, n1b, &tau2);
                gemm(
                    n1b,
                    k2,
                    kt,
                    T::one(),
                    &qu2,
                    n1b,
                    &m[k1..],
                    ksum,
                    &mut nu[n1a..],
                    n1,
                );

                orgqr(n2, kv, &mut va, n2, &tau);
                let mut nv = vec![T::zero(); kt * n2];
                gemmh(n2, kv, kt, T::one(), &va, n2, &vt, kv, &mut nv, n2);
                self.storage = Storage::LowRank {
                    rank: kt,
                    u: nu,
                    v: nv,
                };
            }
            Some(red) => {
                // Transposed (not conjugated) right vectors, indices per the
                // row-wise layout of this merge.
                let mut vbig = vec![T::zero(); kv * kv];
                for i in 0..kv {
                    for j in 0..kv {
                        vbig[j + i * kv] = vt[i + j * kv];
                    }
                }
                orgqr(n1a, k1, &mut qu1, n1a, &tau1);
                orgqr(n1b, k2, &mut qu2, n1b, &tau2);
                orgqr(n2, kv, &mut va, n2, &tau);
                for l in 0..kv {
                    rscal(s[l], &mut m[l * ksum..l * ksum + ksum]);
                }

                let cols = red.reducer.cols();
                let mut xnew = vec![T::zero(); kv * cols];
                gemhm(n2, kv, cols, T::one(), &va, n2, red.x, red.ldx, &mut xnew, kv);
                let mut ynew = vec![T::zero(); ksum * cols];
                gemhm(n1a, k1, cols, T::one(), &qu1, n1a, red.y, red.ldy, &mut ynew, ksum);
                gemhm(
                    n1b,
                    k2,
                    cols,
                    T::one(),
                    &qu2,
                    n1b,
                    &red.y[n1a..],
                    red.ldy,
                    &mut ynew[k1..],
                    ksum,
                );

                let (nr, du, dv) = red.reducer.create_low_rank(
                    delta, kgoal, ksum, kv, kv, &m, &vbig, &xnew, kv, &ynew, ksum,
                )?;

                let mut nu = vec![T::zero(); nr * n1];
                gemm(n1a, k1, nr, T::one(), &qu1, n1a, &du, ksum, &mut nu, n1);
                gemm(
                    n1b,
                    k2,
                    nr,
                    T::one(),
                    &qu2,
                    n1b,
                    &du[k1..],
                    ksum,
                    &mut nu[n1a..],
                    n1,
                );
                let mut nv = vec![T::zero(); nr * n2];
                gemm(n2, kv, nr, T::one(), &va, n2, &dv, kv, &mut nv, n2);
                self.storage = Storage::LowRank {
                    rank: nr,
                    u: nu,
                    v: nv,
                };
            }
        }
        Ok(())
    }
}
