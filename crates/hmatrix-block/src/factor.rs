//! LU factorisation of a dense block and the triangular products and
//! solves reading the packed factors.
//!
//! `decomp_lu` fuses the row permutation into the unit-lower factor: the
//! diagonal slot of each packed column, which would otherwise store a
//! constant `1`, holds the permutation image of that row instead. The
//! solves and products below decode it on the fly; callers can obtain it as
//! an index array through [`Block::permutation`].

use hmatrix_kernels::blas::axpy;
use hmatrix_kernels::lu::getrf;
use hmatrix_kernels::Scalar;

use crate::block::{lower_off, upper_off, Block, Storage};
use crate::error::Result;

impl<T: Scalar> Block<T> {
    /// Factor this square dense block as `P A = L U`, writing the unit-lower
    /// factor (with embedded permutation) into `l` and the upper factor into
    /// `u`. The contents of this block are destroyed.
    pub fn decomp_lu(&mut self, l: &mut Block<T>, u: &mut Block<T>) -> Result<()> {
        self.require_square("decomp_lu")?;
        let n = self.n1;
        let data = match &mut self.storage {
            Storage::Dense(d) => d,
            _ => return Err(self.wrong_storage("decomp_lu", "GeM")),
        };

        let mut ipiv = vec![0usize; n];
        getrf(n, data, n, &mut ipiv)?;

        if l.n1 != n || l.n2 != n || u.n1 != n || u.n2 != n {
            return Err(crate::error::BlockError::ShapeMismatch {
                op: "decomp_lu",
                expected_n1: n,
                expected_n2: n,
                n1: l.n1.max(u.n1),
                n2: l.n2.max(u.n2),
            });
        }
        l.set_ltm()?;
        u.set_utm()?;

        // Compose the permutation from the recorded row swaps.
        let mut perm: Vec<usize> = (0..n).collect();
        for (j, &p) in ipiv.iter().enumerate() {
            perm.swap(j, p);
        }

        let data = match &self.storage {
            Storage::Dense(d) => d,
            _ => unreachable!(),
        };
        let ldata = match &mut l.storage {
            Storage::LowerPacked(d) => d,
            _ => unreachable!(),
        };
        let udata = match &mut u.storage {
            Storage::UpperPacked(d) => d,
            _ => unreachable!(),
        };
        for j in 0..n {
            let uoff = upper_off(j);
            for i in 0..=j {
                udata[uoff + i] = data[i + j * n];
            }
            let loff = lower_off(n, j);
            ldata[loff] = T::from_f64(perm[j] as f64);
            for i in j + 1..n {
                ldata[loff + (i - j)] = data[i + j * n];
            }
        }
        Ok(())
    }

    /// `y += d * P L x` for a unit-lower factor with embedded permutation.
    pub fn mlta_ltm_vec(&self, d: T, x: &[T], y: &mut [T]) -> Result<()> {
        if !self.is_ltm() {
            return Err(self.wrong_storage("mlta_ltm_vec", "LtM"));
        }
        let ip = self.permutation()?;
        let n = self.n1;
        let data = match &self.storage {
            Storage::LowerPacked(dd) => dd,
            _ => unreachable!(),
        };

        let mut z = vec![T::zero(); n];
        for j in 0..n {
            let off = lower_off(n, j);
            let e = d * x[j];
            z[j] = z[j] + e;
            for i in j + 1..n {
                z[i] = z[i] + e * data[off + (i - j)];
            }
        }
        for i in 0..n {
            y[ip[i]] = y[ip[i]] + z[i];
        }
        Ok(())
    }

    /// `y += d * (P L)^H x = d * L^H P^{-1} x`.
    pub fn mlta_ltmh_vec(&self, d: T, x: &[T], y: &mut [T]) -> Result<()> {
        if !self.is_ltm() {
            return Err(self.wrong_storage("mlta_ltmh_vec", "LtM"));
        }
        let ip = self.permutation()?;
        let n = self.n1;
        let data = match &self.storage {
            Storage::LowerPacked(dd) => dd,
            _ => unreachable!(),
        };

        let mut z: Vec<T> = (0..n).map(|j| x[ip[j]]).collect();
        // z := L^H z in place; ascending rows only read entries not yet
        // overwritten.
        for j in 0..n {
            let off = lower_off(n, j);
            let mut acc = z[j];
            for i in j + 1..n {
                acc = acc + data[off + (i - j)].conj() * z[i];
            }
            z[j] = acc;
        }
        axpy(d, &z, y);
        Ok(())
    }

    /// `y += d * U x` for a packed upper triangular factor.
    pub fn mlta_utm_vec(&self, d: T, x: &[T], y: &mut [T]) -> Result<()> {
        let data = match &self.storage {
            Storage::UpperPacked(dd) => dd,
            _ => return Err(self.wrong_storage("mlta_utm_vec", "UtM")),
        };
        for j in 0..self.n2 {
            let off = upper_off(j);
            let e = d * x[j];
            for i in 0..=j {
                y[i] = y[i] + e * data[off + i];
            }
        }
        Ok(())
    }

    /// `y += d * U^H x` for a packed upper triangular factor.
    pub fn mlta_utmh_vec(&self, d: T, x: &[T], y: &mut [T]) -> Result<()> {
        let data = match &self.storage {
            Storage::UpperPacked(dd) => dd,
            _ => return Err(self.wrong_storage("mlta_utmh_vec", "UtM")),
        };
        for j in 0..self.n2 {
            let off = upper_off(j);
            let mut e = T::zero();
            for i in 0..=j {
                e = e + data[off + i].conj() * x[i];
            }
            y[j] = y[j] + d * e;
        }
        Ok(())
    }

    /// Solve `P L X = B` for `X` with `m` right-hand sides; `B` (leading
    /// dimension `ldb`) is overwritten by the solution.
    pub fn ltr_solve(&self, m: usize, b: &mut [T], ldb: usize) -> Result<()> {
        if !self.is_ltm() {
            return Err(self.wrong_storage("ltr_solve", "LtM"));
        }
        let ip = self.permutation()?;
        let n = self.n1;
        let data = match &self.storage {
            Storage::LowerPacked(dd) => dd,
            _ => unreachable!(),
        };

        let mut z = vec![T::zero(); n * m];
        for j in 0..m {
            for i in 0..n {
                z[i + j * n] = b[ip[i] + j * ldb];
            }
        }
        // Forward substitution with the unit diagonal implicit.
        for j in 0..m {
            let col = j * n;
            for c in 0..n {
                let zc = z[c + col];
                let off = lower_off(n, c);
                for r in c + 1..n {
                    z[r + col] = z[r + col] - data[off + (r - c)] * zc;
                }
            }
        }
        for j in 0..m {
            b[j * ldb..j * ldb + n].copy_from_slice(&z[j * n..(j + 1) * n]);
        }
        Ok(())
    }

    /// Solve `(P L)^H X = L^H P^{-1} X = B` for `X` with `m` right-hand
    /// sides; `B` is overwritten by the solution.
    pub fn ltrh_solve(&self, m: usize, b: &mut [T], ldb: usize) -> Result<()> {
        if !self.is_ltm() {
            return Err(self.wrong_storage("ltrh_solve", "LtM"));
        }
        let ip = self.permutation()?;
        let n = self.n1;
        let data = match &self.storage {
            Storage::LowerPacked(dd) => dd,
            _ => unreachable!(),
        };

        let mut z = vec![T::zero(); n * m];
        for j in 0..m {
            z[j * n..(j + 1) * n].copy_from_slice(&b[j * ldb..j * ldb + n]);
        }
        // L^H is unit upper triangular: backward substitution.
        for j in 0..m {
            let col = j * n;
            for c in (0..n).rev() {
                let off = lower_off(n, c);
                let mut acc = z[c + col];
                for r in c + 1..n {
                    acc = acc - data[off + (r - c)].conj() * z[r + col];
                }
                z[c + col] = acc;
            }
        }
        for j in 0..m {
            for i in 0..n {
                b[ip[i] + j * ldb] = z[i + j * n];
            }
        }
        Ok(())
    }

    /// Solve `X U = B` for `X` (`m` rows); `B` has leading dimension `ldb`,
    /// the solution is written to `x` with leading dimension `ldx`.
    #[allow(clippy::too_many_arguments)]
    pub fn utr_solve_left(&self, m: usize, b: &[T], ldb: usize, x: &mut [T], ldx: usize) -> Result<()> {
        let data = match &self.storage {
            Storage::UpperPacked(dd) => dd,
            _ => return Err(self.wrong_storage("utr_solve_left", "UtM")),
        };
        let mut p = 0;
        for j in 0..self.n1 {
            let (head, tail) = x.split_at_mut(j * ldx);
            tail[..m].copy_from_slice(&b[j * ldb..j * ldb + m]);
            for l in 0..j {
                let d = -data[p];
                p += 1;
                axpy(d, &head[l * ldx..l * ldx + m], &mut tail[..m]);
            }
            let e = T::one() / data[p];
            p += 1;
            for xe in tail[..m].iter_mut() {
                *xe = e * *xe;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::block::Block;
    use hmatrix_kernels::blas::gemv_acc;
    use hmatrix_kernels::Scalar;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn dense_block<T: Scalar>(n: usize, seed: u64) -> (Block<T>, Vec<T>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let data: Vec<T> = (0..n * n)
            .map(|_| T::from_re_im(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
            .collect();
        let mut b = Block::new(n, n);
        b.set_gem();
        b.dense_mut().unwrap().copy_from_slice(&data);
        (b, data)
    }

    #[test]
    fn decomp_lu_two_by_two_literal() {
        // A = [[4, 3], [6, 3]]: ip = [1, 0], L = [[1, 0], [2/3, 1]],
        // U = [[6, 3], [0, 1]].
        let mut a: Block<f64> = Block::new(2, 2);
        a.set_gem();
        a.dense_mut().unwrap().copy_from_slice(&[4.0, 6.0, 3.0, 3.0]);

        let mut l = Block::new(2, 2);
        let mut u = Block::new(2, 2);
        a.decomp_lu(&mut l, &mut u).unwrap();

        assert!(l.is_ltm() && u.is_utm());
        assert_eq!(l.permutation().unwrap(), vec![1, 0]);

        let lp = l.packed().unwrap();
        assert!((lp[1] - 2.0 / 3.0).abs() < 1e-15); // strictly lower entry of column 0

        let up = u.packed().unwrap();
        assert!((up[0] - 6.0).abs() < 1e-15);
        assert!((up[1] - 3.0).abs() < 1e-15);
        assert!((up[2] - 1.0).abs() < 1e-15);
    }

    fn lu_reconstructs_generic<T: Scalar>() {
        let n = 5;
        let (mut a, orig) = dense_block::<T>(n, 41);
        let mut l = Block::new(n, n);
        let mut u = Block::new(n, n);
        a.decomp_lu(&mut l, &mut u).unwrap();

        // The decoded permutation must be a permutation of 0..n.
        let ip = l.permutation().unwrap();
        let mut sorted = ip.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..n).collect::<Vec<_>>());

        // y = P L (U x) must equal A x for a handful of basis vectors.
        for c in 0..n {
            let mut x = vec![T::zero(); n];
            x[c] = T::one();
            let mut w = vec![T::zero(); n];
            u.mlta_utm_vec(T::one(), &x, &mut w).unwrap();
            let mut y = vec![T::zero(); n];
            l.mlta_ltm_vec(T::one(), &w, &mut y).unwrap();

            let mut want = vec![T::zero(); n];
            gemv_acc(n, n, T::one(), &orig, n, &x, &mut want);
            for i in 0..n {
                assert!((y[i] - want[i]).abs_val() < 1e-12, "col {c} row {i}");
            }
        }
    }

    hmatrix_kernels::scalar_tests!(lu_reconstructs, lu_reconstructs_generic);

    fn ltr_solve_roundtrip_generic<T: Scalar>() {
        let n = 6;
        let (mut a, _) = dense_block::<T>(n, 43);
        let mut l = Block::new(n, n);
        let mut u = Block::new(n, n);
        a.decomp_lu(&mut l, &mut u).unwrap();

        // Two right-hand sides with a padded leading dimension.
        let m = 2;
        let ldb = n + 2;
        let mut rng = ChaCha8Rng::seed_from_u64(44);
        let rhs: Vec<T> = (0..ldb * m)
            .map(|_| T::from_re_im(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
            .collect();

        let mut b = rhs.clone();
        l.ltr_solve(m, &mut b, ldb).unwrap();

        // P L X must reproduce the right-hand side.
        for j in 0..m {
            let x = &b[j * ldb..j * ldb + n];
            let mut y = vec![T::zero(); n];
            l.mlta_ltm_vec(T::one(), x, &mut y).unwrap();
            for i in 0..n {
                assert!((y[i] - rhs[i + j * ldb]).abs_val() < 1e-12);
            }
        }

        let mut b2 = rhs.clone();
        l.ltrh_solve(m, &mut b2, ldb).unwrap();
        for j in 0..m {
            let x = &b2[j * ldb..j * ldb + n];
            let mut y = vec![T::zero(); n];
            l.mlta_ltmh_vec(T::one(), x, &mut y).unwrap();
            for i in 0..n {
                assert!((y[i] - rhs[i + j * ldb]).abs_val() < 1e-12);
            }
        }
    }

    hmatrix_kernels::scalar_tests!(ltr_solve_roundtrip, ltr_solve_roundtrip_generic);

    fn utr_solve_left_roundtrip_generic<T: Scalar>() {
        let n = 5;
        let (mut a, _) = dense_block::<T>(n, 47);
        let mut l = Block::new(n, n);
        let mut u = Block::new(n, n);
        a.decomp_lu(&mut l, &mut u).unwrap();

        let m = 3;
        let mut rng = ChaCha8Rng::seed_from_u64(48);
        let b: Vec<T> = (0..m * n)
            .map(|_| T::from_re_im(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
            .collect();
        let mut x = vec![T::zero(); m * n];
        u.utr_solve_left(m, &b, m, &mut x, m).unwrap();

        // X U = B, checked entry by entry from the packed factor.
        let up = u.packed().unwrap();
        for j in 0..n {
            for r in 0..m {
                let mut sum = T::zero();
                for l2 in 0..=j {
                    sum = sum + x[r + l2 * m] * up[crate::block::upper_off(j) + l2];
                }
                assert!((sum - b[r + j * m]).abs_val() < 1e-12, "({r},{j})");
            }
        }
    }

    hmatrix_kernels::scalar_tests!(utr_solve_left_roundtrip, utr_solve_left_roundtrip_generic);

    fn utm_adjoint_product_generic<T: Scalar>() {
        let n = 4;
        let (mut a, _) = dense_block::<T>(n, 49);
        let mut l = Block::new(n, n);
        let mut u = Block::new(n, n);
        a.decomp_lu(&mut l, &mut u).unwrap();

        // <U x, y> == <x, U^H y>.
        let mut rng = ChaCha8Rng::seed_from_u64(50);
        let x: Vec<T> = (0..n)
            .map(|_| T::from_re_im(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
            .collect();
        let y: Vec<T> = (0..n)
            .map(|_| T::from_re_im(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
            .collect();

        let mut ux = vec![T::zero(); n];
        u.mlta_utm_vec(T::one(), &x, &mut ux).unwrap();
        let mut uhy = vec![T::zero(); n];
        u.mlta_utmh_vec(T::one(), &y, &mut uhy).unwrap();

        let lhs = hmatrix_kernels::blas::dotc(&ux, &y);
        let rhs = hmatrix_kernels::blas::dotc(&x, &uhy);
        assert!((lhs - rhs).abs_val() < 1e-12);
    }

    hmatrix_kernels::scalar_tests!(utm_adjoint_product, utm_adjoint_product_generic);
}
