//! Rank-truncated accumulation of low-rank and dense updates.
//!
//! The central routine is [`Block::addtrll`]: it fuses a low-rank increment
//! into a low-rank block through paired QR factorisations, a small
//! triangular product, and a truncated SVD, so the full `n1 x n2` product is
//! never formed. The public `add_*` entry points dispatch on the storage tag
//! and maintain the memory-saving invariant by promoting a block to dense
//! whenever `rank * (n1 + n2) > n1 * n2`.

use hmatrix_kernels::blas::{gemmh_acc, nrm2, rscal, utrmmh};
use hmatrix_kernels::qr::{geqrf, ormqr};
use hmatrix_kernels::svd::gesvd;
use hmatrix_kernels::Scalar;

use crate::block::{upper_off, Block, Storage, EPS0};
use crate::error::Result;
use crate::reducer::Reduction;

/// Cutoff for the remainder tail of [`Block::addtrll_rmnd`].
const RMND_CUT: f64 = 1e-16;

/// Largest `kt <= start` with `sigma_{kt-1} > delta * sigma_0` and
/// `sigma_{kt-1} >= EPS0`.
pub(crate) fn select_rank(s: &[f64], start: usize, delta: f64) -> usize {
    let mut kt = start;
    while kt > 0 && (s[kt - 1] <= delta * s[0] || s[kt - 1] < EPS0) {
        kt -= 1;
    }
    kt
}

/// Truncate the factorisation `Ua Va^H` (`Ua` is `n1 x ksum`, `Va` is
/// `n2 x ksum`, both consumed) to rank at most `kgoal` with tolerance
/// `delta`. With `hard_zero`, entries of the small product matrix below
/// `delta * ||M||_F / sqrt(mmin * nmin)` are zeroed before the SVD to keep
/// noise from inflating the rank.
#[allow(clippy::too_many_arguments)]
pub(crate) fn truncate_pair<T: Scalar>(
    n1: usize,
    n2: usize,
    ksum: usize,
    mut ua: Vec<T>,
    mut va: Vec<T>,
    delta: f64,
    kgoal: usize,
    hard_zero: bool,
) -> Result<(usize, Vec<T>, Vec<T>)> {
    if ksum == 0 {
        return Ok((0, Vec::new(), Vec::new()));
    }
    let mmin = n1.min(ksum);
    let nmin = n2.min(ksum);
    let amin = mmin.min(nmin);

    let mut tau1 = vec![T::zero(); mmin];
    let mut tau2 = vec![T::zero(); nmin];
    geqrf(n1, ksum, &mut ua, n1, &mut tau1);
    geqrf(n2, ksum, &mut va, n2, &mut tau2);

    let mut r = vec![T::zero(); mmin * nmin];
    utrmmh(mmin, ksum, nmin, &ua, n1, &va, n2, &mut r);

    if hard_zero {
        let thresh = delta * nrm2(&r) / ((mmin * nmin) as f64).sqrt();
        for e in r.iter_mut() {
            if e.abs_val() < thresh {
                *e = T::zero();
            }
        }
    }

    let mut s = vec![0.0; amin];
    let mut vt = vec![T::zero(); amin * nmin];
    gesvd(mmin, nmin, &mut r, mmin, &mut s, &mut vt, amin)?;

    let kt = select_rank(&s, amin.min(kgoal), delta);
    if kt == 0 {
        return Ok((0, Vec::new(), Vec::new()));
    }

    let mut nu = vec![T::zero(); kt * n1];
    let mut nv = vec![T::zero(); kt * n2];
    for j in 0..kt {
        for i in 0..mmin {
            nu[i + j * n1] = r[i + j * mmin].scale(s[j]);
        }
        for i in 0..nmin {
            nv[i + j * n2] = vt[j + i * amin].conj();
        }
    }
    ormqr(n1, kt, mmin, &ua, n1, &tau1, &mut nu, n1);
    ormqr(n2, kt, nmin, &va, n2, &tau2, &mut nv, n2);
    Ok((kt, nu, nv))
}

impl<T: Scalar> Block<T> {
    /// Rank-truncated addition of `(U, V)` of rank `k` to a low-rank block:
    /// the result approximates `U0 V0^H + U V^H` with tolerance `delta` and
    /// rank at most `kgoal`.
    ///
    /// With a reducer the truncation step is delegated wholesale; the plain
    /// path QR-factorises the concatenated factors, hard-zeroes noise in the
    /// small product, and truncates its SVD.
    #[allow(clippy::too_many_arguments)]
    pub fn addtrll(
        &mut self,
        k: usize,
        u: &[T],
        ldu: usize,
        v: &[T],
        ldv: usize,
        delta: f64,
        kgoal: usize,
        red: Option<&Reduction<'_, T>>,
    ) -> Result<()> {
        if !self.is_lrm() {
            return Err(self.wrong_storage("addtrll", "LrM"));
        }
        if k == 0 {
            return Ok(());
        }
        let (n1, n2) = (self.n1, self.n2);
        let Storage::LowRank { rank, u: u0, v: v0 } = std::mem::replace(
            &mut self.storage,
            Storage::LowRank {
                rank: 0,
                u: Vec::new(),
                v: Vec::new(),
            },
        ) else {
            unreachable!()
        };

        let (nr, nu, nv) = match red {
            Some(red) => red.reducer.add_low_rank(
                delta, kgoal, n1, n2, &u0, &v0, rank, u, ldu, v, ldv, k, red.x, red.ldx, red.y,
                red.ldy,
            )?,
            None => {
                let ksum = rank + k;
                let mut ua = Vec::with_capacity(ksum * n1);
                ua.extend_from_slice(&u0);
                for l in 0..k {
                    ua.extend_from_slice(&u[l * ldu..l * ldu + n1]);
                }
                let mut va = Vec::with_capacity(ksum * n2);
                va.extend_from_slice(&v0);
                for l in 0..k {
                    va.extend_from_slice(&v[l * ldv..l * ldv + n2]);
                }
                truncate_pair(n1, n2, ksum, ua, va, delta, kgoal, true)?
            }
        };
        self.storage = Storage::LowRank {
            rank: nr,
            u: nu,
            v: nv,
        };
        Ok(())
    }

    /// Like [`Block::addtrll`], but splits the update into a retained part
    /// and a remainder `(k_R, U_R, V_R)` covering the singular directions
    /// between the retained rank and the `1e-16 * sigma_0` tail cutoff.
    ///
    /// The singular values are split as `sqrt(sigma)` onto both factors so
    /// that retained part plus remainder reproduce the exact sum.
    #[allow(clippy::too_many_arguments)]
    pub fn addtrll_rmnd(
        &mut self,
        k: usize,
        u: &[T],
        ldu: usize,
        v: &[T],
        ldv: usize,
        delta: f64,
        kgoal: usize,
    ) -> Result<Option<(usize, Vec<T>, Vec<T>)>> {
        if !self.is_lrm() {
            return Err(self.wrong_storage("addtrll_rmnd", "LrM"));
        }
        if k == 0 {
            return Ok(None);
        }
        let (n1, n2) = (self.n1, self.n2);
        let Storage::LowRank { rank, u: u0, v: v0 } = std::mem::replace(
            &mut self.storage,
            Storage::LowRank {
                rank: 0,
                u: Vec::new(),
                v: Vec::new(),
            },
        ) else {
            unreachable!()
        };

        let ksum = rank + k;
        let mmin = n1.min(ksum);
        let nmin = n2.min(ksum);
        let amin = mmin.min(nmin);

        let mut ua = Vec::with_capacity(ksum * n1);
        ua.extend_from_slice(&u0);
        for l in 0..k {
            ua.extend_from_slice(&u[l * ldu..l * ldu + n1]);
        }
        let mut va = Vec::with_capacity(ksum * n2);
        va.extend_from_slice(&v0);
        for l in 0..k {
            va.extend_from_slice(&v[l * ldv..l * ldv + n2]);
        }

        let mut tau1 = vec![T::zero(); mmin];
        let mut tau2 = vec![T::zero(); nmin];
        geqrf(n1, ksum, &mut ua, n1, &mut tau1);
        geqrf(n2, ksum, &mut va, n2, &mut tau2);

        let mut r = vec![T::zero(); mmin * nmin];
        utrmmh(mmin, ksum, nmin, &ua, n1, &va, n2, &mut r);

        let mut s = vec![0.0; amin];
        let mut vt = vec![T::zero(); amin * nmin];
        gesvd(mmin, nmin, &mut r, mmin, &mut s, &mut vt, amin)?;

        let kt = select_rank(&s, amin.min(kgoal), delta);
        if kt > 0 {
            let mut nu = vec![T::zero(); kt * n1];
            let mut nv = vec![T::zero(); kt * n2];
            for j in 0..kt {
                let ss = s[j].sqrt();
                for i in 0..mmin {
                    nu[i + j * n1] = r[i + j * mmin].scale(ss);
                }
                for i in 0..nmin {
                    nv[i + j * n2] = vt[j + i * amin].conj().scale(ss);
                }
            }
            ormqr(n1, kt, mmin, &ua, n1, &tau1, &mut nu, n1);
            ormqr(n2, kt, nmin, &va, n2, &tau2, &mut nv, n2);
            self.storage = Storage::LowRank {
                rank: kt,
                u: nu,
                v: nv,
            };
        }

        let mut kl = amin;
        while kl > kt && (s[kl - 1] <= RMND_CUT * s[0] || s[kl - 1] < EPS0) {
            kl -= 1;
        }
        let kr = kl - kt;
        if kr == 0 {
            return Ok(None);
        }

        let mut ur = vec![T::zero(); kr * n1];
        let mut vr = vec![T::zero(); kr * n2];
        for j in 0..kr {
            let ss = s[j + kt].sqrt();
            for i in 0..mmin {
                ur[i + j * n1] = r[i + (j + kt) * mmin].scale(ss);
            }
            for i in 0..nmin {
                vr[i + j * n2] = vt[(j + kt) + i * amin].conj().scale(ss);
            }
        }
        ormqr(n1, kr, mmin, &ua, n1, &tau1, &mut ur, n1);
        ormqr(n2, kr, nmin, &va, n2, &tau2, &mut vr, n2);
        Ok(Some((kr, ur, vr)))
    }

    /// Shared dense-to-low-rank truncation: consumes the dense image `tmp`
    /// (`n1 x n2`), truncates its SVD at `(delta, kgoal)` and stores the
    /// result. The singular values are folded into the `V` factor; the
    /// reducer branch instead scales the left vectors and hands the
    /// conjugate-transposed right vectors over.
    pub(crate) fn svd_truncate_dense(
        &mut self,
        mut tmp: Vec<T>,
        delta: f64,
        kgoal: usize,
        red: Option<&Reduction<'_, T>>,
    ) -> Result<()> {
        let (n1, n2) = (self.n1, self.n2);
        let nmin = n1.min(n2);
        let mut s = vec![0.0; nmin];
        let mut vt = vec![T::zero(); nmin * n2];
        gesvd(n1, n2, &mut tmp, n1, &mut s, &mut vt, nmin)?;

        match red {
            None => {
                let kt = select_rank(&s, nmin.min(kgoal), delta);
                if kt > 0 {
                    let nu = tmp[..kt * n1].to_vec();
                    let mut nv = vec![T::zero(); kt * n2];
                    for l in 0..kt {
                        for j in 0..n2 {
                            nv[j + l * n2] = vt[l + j * nmin].conj().scale(s[l]);
                        }
                    }
                    self.storage = Storage::LowRank {
                        rank: kt,
                        u: nu,
                        v: nv,
                    };
                } else {
                    self.set_lrm(0);
                }
            }
            Some(red) => {
                let mut vmat = vec![T::zero(); nmin * n2];
                for i in 0..n2 {
                    for j in 0..nmin {
                        vmat[i + j * n2] = vt[j + i * nmin].conj();
                    }
                }
                for l in 0..nmin {
                    rscal(s[l], &mut tmp[l * n1..l * n1 + n1]);
                }
                let (nr, nu, nv) = red.reducer.create_low_rank(
                    delta,
                    kgoal,
                    n1,
                    nmin,
                    n2,
                    &tmp[..n1 * nmin],
                    &vmat,
                    red.x,
                    red.ldx,
                    red.y,
                    red.ldy,
                )?;
                self.storage = Storage::LowRank {
                    rank: nr,
                    u: nu,
                    v: nv,
                };
            }
        }
        Ok(())
    }

    /// Add the dense matrix `A` (leading dimension `lda`) to this block.
    ///
    /// A low-rank block is materialised, summed and recompressed at
    /// `(eps, rankmax)`; a dense block accumulates in place into the
    /// triangle its tag prescribes.
    #[allow(clippy::too_many_arguments)]
    pub fn add_gem(
        &mut self,
        a: &[T],
        lda: usize,
        eps: f64,
        rankmax: usize,
        red: Option<&Reduction<'_, T>>,
    ) -> Result<()> {
        let (n1, n2) = (self.n1, self.n2);
        match &mut self.storage {
            Storage::LowRank { rank, u, v } => {
                let mut tmp = vec![T::zero(); n1 * n2];
                for j in 0..n2 {
                    tmp[j * n1..(j + 1) * n1].copy_from_slice(&a[j * lda..j * lda + n1]);
                }
                if *rank > 0 {
                    gemmh_acc(n1, *rank, n2, u, n1, v, n2, &mut tmp, n1);
                }

                match red {
                    None => {
                        // Plain SVD truncation; here the singular values are
                        // folded into the left factor.
                        let nmin = n1.min(n2);
                        let mut s = vec![0.0; nmin];
                        let mut vt = vec![T::zero(); nmin * n2];
                        gesvd(n1, n2, &mut tmp, n1, &mut s, &mut vt, nmin)?;

                        let kt = select_rank(&s, nmin.min(rankmax), eps);
                        if kt > 0 {
                            let mut nu = vec![T::zero(); kt * n1];
                            let mut nv = vec![T::zero(); kt * n2];
                            for l in 0..kt {
                                for i in 0..n1 {
                                    nu[i + l * n1] = tmp[i + l * n1].scale(s[l]);
                                }
                                for j in 0..n2 {
                                    nv[j + l * n2] = vt[l + j * nmin].conj();
                                }
                            }
                            self.storage = Storage::LowRank {
                                rank: kt,
                                u: nu,
                                v: nv,
                            };
                        } else {
                            self.set_lrm(0);
                        }
                    }
                    Some(red) => {
                        let nmin = n1.min(n2);
                        let mut s = vec![0.0; nmin];
                        let mut vt = vec![T::zero(); nmin * n2];
                        gesvd(n1, n2, &mut tmp, n1, &mut s, &mut vt, nmin)?;

                        // The reducer receives the transposed (not
                        // conjugated) right vectors and sigma-scaled left
                        // vectors.
                        let mut vmat = vec![T::zero(); nmin * n2];
                        for i in 0..n2 {
                            for j in 0..nmin {
                                vmat[i + j * n2] = vt[j + i * nmin];
                            }
                        }
                        for l in 0..nmin {
                            rscal(s[l], &mut tmp[l * n1..l * n1 + n1]);
                        }
                        let (nr, nu, nv) = red.reducer.create_low_rank(
                            eps,
                            rankmax,
                            n1,
                            nmin,
                            n2,
                            &tmp[..n1 * nmin],
                            &vmat,
                            red.x,
                            red.ldx,
                            red.y,
                            red.ldy,
                        )?;
                        self.storage = Storage::LowRank {
                            rank: nr,
                            u: nu,
                            v: nv,
                        };
                    }
                }
                Ok(())
            }
            Storage::HermitianPacked(_) | Storage::SymmetricPacked(_) => self.add_gem_to_hem(a, lda),
            Storage::UpperPacked(data) => {
                for j in 0..n2 {
                    let off = upper_off(j);
                    for i in 0..=j {
                        data[off + i] = data[off + i] + a[i + j * lda];
                    }
                }
                Ok(())
            }
            Storage::Dense(data) => {
                for j in 0..n2 {
                    for i in 0..n1 {
                        data[i + j * n1] = data[i + j * n1] + a[i + j * lda];
                    }
                }
                Ok(())
            }
            Storage::LowerPacked(_) => Err(self.wrong_storage("add_gem", "LrM, GeM, UtM, HeM or SyM")),
        }
    }

    /// Accumulate the upper triangle of a dense matrix into a packed
    /// Hermitian/symmetric block.
    pub fn add_gem_to_hem(&mut self, a: &[T], lda: usize) -> Result<()> {
        let n2 = self.n2;
        let data = match &mut self.storage {
            Storage::HermitianPacked(d) | Storage::SymmetricPacked(d) => d,
            _ => return Err(self.wrong_storage("add_gem_to_hem", "HeM or SyM")),
        };
        let mut p = 0;
        for j in 0..n2 {
            for i in 0..=j {
                data[p] = data[p] + a[i + j * lda];
                p += 1;
            }
        }
        Ok(())
    }

    /// Accumulate the upper triangle of `U V^H` into a packed
    /// Hermitian/symmetric block.
    pub fn add_lrm_to_hem(&mut self, k: usize, u: &[T], ldu: usize, v: &[T], ldv: usize) -> Result<()> {
        let n1 = self.n1;
        let data = match &mut self.storage {
            Storage::HermitianPacked(d) | Storage::SymmetricPacked(d) => d,
            _ => return Err(self.wrong_storage("add_lrm_to_hem", "HeM or SyM")),
        };
        add_lr_into_packed_upper(data, n1, k, u, ldu, v, ldv);
        Ok(())
    }

    /// Accumulate the upper triangle of `U V^H` into a packed upper
    /// triangular block.
    pub fn add_lrm_to_utm(&mut self, k: usize, u: &[T], ldu: usize, v: &[T], ldv: usize) -> Result<()> {
        let n1 = self.n1;
        let data = match &mut self.storage {
            Storage::UpperPacked(d) => d,
            _ => return Err(self.wrong_storage("add_lrm_to_utm", "UtM")),
        };
        add_lr_into_packed_upper(data, n1, k, u, ldu, v, ldv);
        Ok(())
    }

    /// Accumulate `U V^H` into a plain dense block.
    pub fn add_lrm_to_gem(&mut self, k: usize, u: &[T], ldu: usize, v: &[T], ldv: usize) -> Result<()> {
        let (n1, n2) = (self.n1, self.n2);
        let data = match &mut self.storage {
            Storage::Dense(d) => d,
            _ => return Err(self.wrong_storage("add_lrm_to_gem", "GeM")),
        };
        gemmh_acc(n1, k, n2, u, ldu, v, ldv, data, n1);
        Ok(())
    }

    /// Dispatch a low-rank update into whichever dense variant the block
    /// carries.
    fn add_lr_update_dense(&mut self, k: usize, u: &[T], ldu: usize, v: &[T], ldv: usize) -> Result<()> {
        match &self.storage {
            Storage::HermitianPacked(_) | Storage::SymmetricPacked(_) => {
                self.add_lrm_to_hem(k, u, ldu, v, ldv)
            }
            Storage::UpperPacked(_) => self.add_lrm_to_utm(k, u, ldu, v, ldv),
            Storage::Dense(_) => self.add_lrm_to_gem(k, u, ldu, v, ldv),
            _ => Err(self.wrong_storage("add_lrm", "GeM, UtM, HeM or SyM")),
        }
    }

    /// Add a low-rank update and truncate to `(eps, kgoal)`; promotes to
    /// dense when the low-rank form stops saving memory.
    #[allow(clippy::too_many_arguments)]
    pub fn add_lrm(
        &mut self,
        k: usize,
        u: &[T],
        ldu: usize,
        v: &[T],
        ldv: usize,
        eps: f64,
        kgoal: usize,
        red: Option<&Reduction<'_, T>>,
    ) -> Result<()> {
        if self.is_lrm() {
            self.addtrll(k, u, ldu, v, ldv, eps, kgoal, red)?;
            if self.rank() * (self.n1 + self.n2) > self.n1 * self.n2 {
                self.conv_lrm_to_gem()?;
            }
            Ok(())
        } else {
            self.add_lr_update_dense(k, u, ldu, v, ldv)
        }
    }

    /// Add a low-rank update without truncation (exact concatenation);
    /// promotes to dense when the low-rank form stops saving memory.
    pub fn add_lrm_exact(&mut self, k: usize, u: &[T], ldu: usize, v: &[T], ldv: usize) -> Result<()> {
        if self.is_lrm() {
            self.append(k, u, ldu, v, ldv);
            if self.rank() * (self.n1 + self.n2) > self.n1 * self.n2 {
                self.conv_lrm_to_gem()?;
            }
            Ok(())
        } else {
            self.add_lr_update_dense(k, u, ldu, v, ldv)
        }
    }

    /// Add a low-rank update, truncate to `(eps, kgoal)` and hand back the
    /// discarded remainder, if any.
    ///
    /// When the promotion to dense fires, the remainder is folded back into
    /// the dense block and `None` is returned; a dense target accumulates
    /// the whole update directly.
    #[allow(clippy::too_many_arguments)]
    pub fn add_lrm_rmnd(
        &mut self,
        k: usize,
        u: &[T],
        ldu: usize,
        v: &[T],
        ldv: usize,
        eps: f64,
        kgoal: usize,
    ) -> Result<Option<(usize, Vec<T>, Vec<T>)>> {
        if self.is_lrm() {
            let rem = self.addtrll_rmnd(k, u, ldu, v, ldv, eps, kgoal)?;
            if self.rank() * (self.n1 + self.n2) > self.n1 * self.n2 {
                self.conv_lrm_to_gem()?;
                if let Some((kr, ur, vr)) = rem {
                    self.add_lrm_to_gem(kr, &ur, self.n1, &vr, self.n2)?;
                }
                return Ok(None);
            }
            Ok(rem)
        } else {
            self.add_lr_update_dense(k, u, ldu, v, ldv)?;
            Ok(None)
        }
    }
}

/// `packed[upper triangle] += U V^H` for a packed upper layout of dimension
/// `n`.
fn add_lr_into_packed_upper<T: Scalar>(
    data: &mut [T],
    n: usize,
    k: usize,
    u: &[T],
    ldu: usize,
    v: &[T],
    ldv: usize,
) {
    for l in 0..k {
        for j in 0..n {
            let w = v[j + l * ldv].conj();
            let off = upper_off(j);
            for i in 0..=j {
                data[off + i] = data[off + i] + w * u[i + l * ldu];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::block::Block;

    /// Block holding `sum_l weights[l] * e_{cols[l]} e_{cols[l]}^T` on an
    /// n-by-n grid: singular values are exactly the weights.
    fn diagonal_lr_block(n: usize, cols: &[usize], weights: &[f64]) -> Block<f64> {
        let mut b = Block::new(n, n);
        b.set_lrm(cols.len());
        let (u, v) = b.lr_factors_mut().unwrap();
        for (l, (&c, &w)) in cols.iter().zip(weights.iter()).enumerate() {
            u[c + l * n] = w;
            v[c + l * n] = 1.0;
        }
        b
    }

    #[test]
    fn addtrll_orthogonal_subspaces_keeps_all_directions() {
        let mut b = diagonal_lr_block(8, &[0, 1], &[3.0, 2.0]);
        let inc = diagonal_lr_block(8, &[2, 3], &[1.5, 1.0]);
        let (k, u, v) = inc.lr_factors().unwrap();
        b.addtrll(k, u, 8, v, 8, 1e-12, 4, None).unwrap();

        assert_eq!(b.rank(), 4);
        let s = b.get_svals_lrm().unwrap();
        assert!((s[0] - 3.0).abs() < 1e-10);
        assert!((s[1] - 2.0).abs() < 1e-10);
        assert!((s[2] - 1.5).abs() < 1e-10);
        assert!((s[3] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn addtrll_rank_cap_discards_smallest_directions() {
        let mut b = diagonal_lr_block(8, &[0, 1], &[3.0, 2.0]);
        let inc = diagonal_lr_block(8, &[2, 3], &[1.5, 1.0]);
        let (k, u, v) = inc.lr_factors().unwrap();
        b.addtrll(k, u, 8, v, 8, 1e-12, 2, None).unwrap();

        assert_eq!(b.rank(), 2);
        let s = b.get_svals_lrm().unwrap();
        assert!((s[0] - 3.0).abs() < 1e-10);
        assert!((s[1] - 2.0).abs() < 1e-10);

        // The discarded tail is exactly the increment: its norm is the
        // truncation error.
        let mut dense = vec![0.0; 64];
        b.to_dense_into(&mut dense, 8);
        let mut err_sq = 0.0;
        for (idx, &e) in dense.iter().enumerate() {
            let (i, j) = (idx % 8, idx / 8);
            let want = match (i, j) {
                (0, 0) => 3.0,
                (1, 1) => 2.0,
                _ => 0.0,
            };
            err_sq += (e - want) * (e - want);
        }
        assert!(err_sq.sqrt() < 1e-10);
    }

    #[test]
    fn add_lrm_with_zero_rank_update_is_noop() {
        let mut b = diagonal_lr_block(6, &[0], &[1.0]);
        b.add_lrm(0, &[], 6, &[], 6, 1e-8, 10, None).unwrap();
        assert_eq!(b.rank(), 1);
        let s = b.get_svals_lrm().unwrap();
        assert!((s[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn add_lrm_exact_promotes_when_memory_saving_stops() {
        // 3x5: a rank-2 form needs 2*(3+5) = 16 > 15 = n1*n2 entries.
        let mut b: Block<f64> = Block::new(3, 5);
        b.set_lrm(1);
        {
            let (u, v) = b.lr_factors_mut().unwrap();
            u.copy_from_slice(&[1.0, 0.0, 0.0]);
            v.copy_from_slice(&[1.0, 1.0, 0.0, 0.0, 0.0]);
        }
        let u2 = [0.0, 1.0, 0.0];
        let v2 = [0.0, 0.0, 1.0, 1.0, 0.0];
        b.add_lrm_exact(1, &u2, 3, &v2, 5).unwrap();
        assert!(b.is_gem());
        assert!(!b.is_lrm());

        let dense = b.dense().unwrap();
        assert_eq!(dense[0], 1.0); // (0,0)
        assert_eq!(dense[3], 1.0); // (0,1)
        assert_eq!(dense[1 + 2 * 3], 1.0); // (1,2)
        assert_eq!(dense[1 + 3 * 3], 1.0); // (1,3)
    }

    #[test]
    fn addtrll_rmnd_splits_exactly() {
        let mut b = diagonal_lr_block(8, &[0, 1], &[3.0, 2.0]);
        let inc = diagonal_lr_block(8, &[2, 3], &[1.5, 1.0]);
        let (k, u, v) = inc.lr_factors().unwrap();
        let rem = b.addtrll_rmnd(k, u, 8, v, 8, 1e-12, 2).unwrap();

        assert_eq!(b.rank(), 2);
        let (kr, ur, vr) = rem.expect("a remainder must be produced");
        assert_eq!(kr, 2);

        // Retained part plus remainder reproduce the exact sum.
        let mut dense = vec![0.0; 64];
        b.to_dense_into(&mut dense, 8);
        hmatrix_kernels::blas::gemmh_acc(8, kr, 8, &ur, 8, &vr, 8, &mut dense, 8);
        for (idx, &e) in dense.iter().enumerate() {
            let (i, j) = (idx % 8, idx / 8);
            let want = match (i, j) {
                (0, 0) => 3.0,
                (1, 1) => 2.0,
                (2, 2) => 1.5,
                (3, 3) => 1.0,
                _ => 0.0,
            };
            assert!((e - want).abs() < 1e-10, "({i},{j})");
        }
    }

    #[test]
    fn addtrll_rmnd_full_goal_leaves_no_remainder() {
        let mut b = diagonal_lr_block(8, &[0, 1], &[3.0, 2.0]);
        let inc = diagonal_lr_block(8, &[2, 3], &[1.5, 1.0]);
        let (k, u, v) = inc.lr_factors().unwrap();
        // kgoal = amin = 4 retains everything.
        let rem = b.addtrll_rmnd(k, u, 8, v, 8, 1e-12, 4).unwrap();
        assert_eq!(b.rank(), 4);
        assert!(rem.is_none());
    }

    #[test]
    fn add_gem_accumulates_into_upper_triangle_of_hem() {
        let mut b: Block<f64> = Block::new(2, 2);
        b.set_hem().unwrap();
        let a = [1.0, 99.0, 2.0, 3.0]; // lower entry 99 must be ignored
        b.add_gem(&a, 2, 1e-8, 10, None).unwrap();
        let packed = b.packed().unwrap();
        assert_eq!(packed, &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn add_gem_on_low_rank_recompresses() {
        let mut b = diagonal_lr_block(4, &[0], &[2.0]);
        // Add e2 e2^T as a dense matrix.
        let mut a = vec![0.0; 16];
        a[1 + 4] = 1.0;
        b.add_gem(&a, 4, 1e-10, 10, None).unwrap();
        assert!(b.is_lrm());
        assert_eq!(b.rank(), 2);
        let s = b.get_svals_lrm().unwrap();
        assert!((s[0] - 2.0).abs() < 1e-10);
        assert!((s[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn rank_bound_invariant_after_truncation() {
        // Random-ish dense content compressed at a coarse tolerance: the
        // retained tail must stay above delta * sigma_0.
        let delta = 1e-2;
        let mut b: Block<f64> = Block::new(6, 6);
        b.set_gem();
        {
            let d = b.dense_mut().unwrap();
            for (i, e) in d.iter_mut().enumerate() {
                *e = ((i * 7919 % 97) as f64 - 48.0) / 97.0;
            }
        }
        b.conv_gem_to_lrm(delta).unwrap();
        let s = b.get_svals_lrm().unwrap();
        if let Some(&last) = s.last() {
            assert!(last > delta * s[0]);
        }
    }
}
