//! Flexible restarted GMRES on top of an abstract matrix-vector product.
//!
//! The solver sees the system matrix only through [`LinearOperator`]: an
//! accumulating product `y += alpha * A * x` and an in-place right
//! preconditioner. Because the preconditioned vectors `z_i` are stored
//! explicitly, the preconditioner may change from iteration to iteration
//! (the "flexible" in FGMRES); the final update is `x += Z y`.

use hmatrix_kernels::blas::{axpy, dotc, nrm2, rscal, setzero};
use hmatrix_kernels::Scalar;

mod givens;

use givens::{apply_rot, gen_rot};

/// Abstract system matrix: accumulating product plus an optional right
/// preconditioner.
pub trait LinearOperator<T: Scalar> {
    /// Problem dimension.
    fn dim(&self) -> usize;

    /// `y += alpha * A * x`.
    fn amux(&self, alpha: T, x: &[T], y: &mut [T]);

    /// Apply the right preconditioner to `z` in place. The default is the
    /// identity; implementations may vary it between iterations.
    fn precond_apply(&self, _z: &mut [T]) {}
}

/// Outcome of an [`fgmres`] run.
#[derive(Debug, Clone, Copy)]
pub struct FgmresStats {
    /// Whether the target relative residual was reached.
    pub converged: bool,
    /// Relative residual after the final iteration.
    pub residual: f64,
    /// Matrix-vector products performed.
    pub steps: usize,
}

/// Solve `A x = b` by flexible restarted GMRES.
///
/// `x` holds the initial guess on entry and the best iterate on return.
/// `tol` is the target relative residual, `restart` the Krylov dimension
/// per cycle, and `max_steps` the budget of matrix-vector products. A zero
/// right-hand side short-circuits to `x = 0`.
pub fn fgmres<T: Scalar, A: LinearOperator<T> + ?Sized>(
    a: &A,
    b: &[T],
    x: &mut [T],
    tol: f64,
    restart: usize,
    max_steps: usize,
) -> FgmresStats {
    let n = a.dim();
    let m = restart.max(1);

    let normb = nrm2(b);
    if normb == 0.0 {
        setzero(x);
        return FgmresStats {
            converged: true,
            residual: 0.0,
            steps: 0,
        };
    }

    // r = b - A x
    let mut r = b.to_vec();
    a.amux(-T::one(), x, &mut r);
    let mut beta = nrm2(&r);

    let mut resid = beta / normb;
    if resid <= tol {
        return FgmresStats {
            converged: true,
            residual: resid,
            steps: 0,
        };
    }

    let mut v = vec![T::zero(); n * (m + 1)];
    let mut z = vec![T::zero(); n * m];
    let mut h = vec![T::zero(); (m + 1) * m];
    let mut cs = vec![0.0f64; m + 1];
    let mut sn = vec![T::zero(); m + 1];
    let mut s = vec![T::zero(); m + 1];

    let mut j = 1usize;
    while j <= max_steps {
        // v_0 = r / beta starts the cycle.
        v[..n].copy_from_slice(&r);
        rscal(1.0 / beta, &mut v[..n]);
        setzero(&mut s);
        s[0] = T::from_f64(beta);

        let mut i = 0usize;
        while i < m && j <= max_steps {
            // z_i = M v_i, v_{i+1} = A z_i
            z[i * n..(i + 1) * n].copy_from_slice(&v[i * n..(i + 1) * n]);
            a.precond_apply(&mut z[i * n..(i + 1) * n]);

            let (head, tail) = v.split_at_mut((i + 1) * n);
            let vnext = &mut tail[..n];
            setzero(vnext);
            a.amux(T::one(), &z[i * n..(i + 1) * n], vnext);

            // Modified Gram-Schmidt against v_0..v_i.
            for k in 0..=i {
                let vk = &head[k * n..(k + 1) * n];
                let hk = dotc(vk, vnext);
                h[k + i * (m + 1)] = hk;
                axpy(-hk, vk, vnext);
            }
            let hnorm = nrm2(vnext);
            h[(i + 1) + i * (m + 1)] = T::from_f64(hnorm);
            if hnorm > 0.0 {
                rscal(1.0 / hnorm, vnext);
            }

            // Apply the accumulated rotations to the new column, then
            // generate the one zeroing the subdiagonal.
            for k in 0..i {
                let (ha, hb) = apply_rot(h[k + i * (m + 1)], h[k + 1 + i * (m + 1)], cs[k], sn[k]);
                h[k + i * (m + 1)] = ha;
                h[k + 1 + i * (m + 1)] = hb;
            }
            let (c, sr) = gen_rot(h[i + i * (m + 1)], h[i + 1 + i * (m + 1)]);
            cs[i] = c;
            sn[i] = sr;
            let (ha, hb) = apply_rot(h[i + i * (m + 1)], h[i + 1 + i * (m + 1)], c, sr);
            h[i + i * (m + 1)] = ha;
            h[i + 1 + i * (m + 1)] = hb;
            let (sa, sb) = apply_rot(s[i], s[i + 1], c, sr);
            s[i] = sa;
            s[i + 1] = sb;

            resid = s[i + 1].abs_val() / normb;
            if resid < tol {
                update(n, i + 1, &h, m + 1, &s, &z, x);
                return FgmresStats {
                    converged: true,
                    residual: resid,
                    steps: j,
                };
            }
            i += 1;
            j += 1;
        }

        // Only the i columns computed this cycle enter the update (the
        // cycle may have been cut short by the step budget).
        update(n, i, &h, m + 1, &s, &z, x);

        // True residual for the restart.
        r.copy_from_slice(b);
        a.amux(-T::one(), x, &mut r);
        beta = nrm2(&r);
        resid = beta / normb;
        if resid < tol {
            return FgmresStats {
                converged: true,
                residual: resid,
                steps: j,
            };
        }
    }

    FgmresStats {
        converged: false,
        residual: resid,
        steps: max_steps,
    }
}

/// Solve the `k x k` upper-triangular system `H y = s` and update
/// `x += Z y`.
fn update<T: Scalar>(n: usize, k: usize, h: &[T], ldh: usize, s: &[T], z: &[T], x: &mut [T]) {
    let mut y: Vec<T> = s[..k].to_vec();
    for i in (0..k).rev() {
        let mut sum = y[i];
        for l in i + 1..k {
            sum = sum - h[i + l * ldh] * y[l];
        }
        y[i] = sum / h[i + i * ldh];
    }
    for (l, &yl) in y.iter().enumerate() {
        axpy(yl, &z[l * n..(l + 1) * n], x);
    }
}
