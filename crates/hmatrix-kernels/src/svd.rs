//! Singular value decomposition by one-sided Jacobi rotations.
//!
//! The engine feeds this kernel small, well-conditioned matrices (products
//! of QR factors, or individual leaf blocks), where the one-sided Jacobi
//! iteration is both simple and fully accurate: columns of `A` are rotated
//! pairwise until mutually orthogonal, giving `A = U * diag(s) * V^H` with
//! the rotations accumulated into `V`.

use crate::error::{KernelError, Result};
use crate::scalar::Scalar;

const MAX_SWEEPS: usize = 40;
const PAIR_TOL: f64 = 1e-15;

/// Orthogonalise the columns of the m-by-n `a` (n <= m), accumulating the
/// rotations into the n-by-n `v` when present. On return the columns of `a`
/// are mutually orthogonal with decreasing norms `s`, and `a` holds the
/// scaled left singular vectors before normalisation.
fn jacobi<T: Scalar>(
    m: usize,
    n: usize,
    a: &mut [T],
    lda: usize,
    s: &mut [f64],
    mut v: Option<&mut [T]>,
) -> Result<()> {
    if let Some(vm) = v.as_deref_mut() {
        for e in vm.iter_mut() {
            *e = T::zero();
        }
        for j in 0..n {
            vm[j + j * n] = T::one();
        }
    }

    let mut converged = n < 2;
    for _sweep in 0..MAX_SWEEPS {
        if converged {
            break;
        }
        converged = true;
        for p in 0..n.saturating_sub(1) {
            for q in p + 1..n {
                let (bp, bq) = (p * lda, q * lda);
                let mut app = 0.0;
                let mut aqq = 0.0;
                let mut apq = T::zero();
                for i in 0..m {
                    let (x, y) = (a[i + bp], a[i + bq]);
                    app += x.abs_sq();
                    aqq += y.abs_sq();
                    apq = apq + x.conj() * y;
                }
                let g = apq.abs_val();
                if g == 0.0 || g <= PAIR_TOL * (app * aqq).sqrt() {
                    continue;
                }
                converged = false;

                // Unitary 2x2 rotation zeroing the off-diagonal Gram entry:
                // [Ap', Aq'] = [Ap, Aq] * [[c, s*phase], [-s*conj(phase), c]].
                let phase = apq.scale(1.0 / g);
                let zeta = (aqq - app) / (2.0 * g);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let sr = c * t;

                for i in 0..m {
                    let (x, y) = (a[i + bp], a[i + bq]);
                    a[i + bp] = x.scale(c) - (phase.conj() * y).scale(sr);
                    a[i + bq] = (phase * x).scale(sr) + y.scale(c);
                }
                if let Some(vm) = v.as_deref_mut() {
                    for i in 0..n {
                        let (x, y) = (vm[i + p * n], vm[i + q * n]);
                        vm[i + p * n] = x.scale(c) - (phase.conj() * y).scale(sr);
                        vm[i + q * n] = (phase * x).scale(sr) + y.scale(c);
                    }
                }
            }
        }
    }
    if !converged {
        return Err(KernelError::SvdNoConvergence { sweeps: MAX_SWEEPS });
    }

    // Column norms, sorted descending; ties keep their original order.
    let mut norms = vec![0.0f64; n];
    for (j, nj) in norms.iter_mut().enumerate() {
        *nj = a[j * lda..j * lda + m]
            .iter()
            .map(|e| e.abs_sq())
            .sum::<f64>()
            .sqrt();
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&p, &q| norms[q].total_cmp(&norms[p]));

    let a_old = a.to_vec();
    let v_old = v.as_deref().map(|vm| vm.to_vec());
    for (j, &src) in order.iter().enumerate() {
        s[j] = norms[src];
        let inv = if norms[src] > 0.0 { 1.0 / norms[src] } else { 0.0 };
        for i in 0..m {
            a[i + j * lda] = a_old[i + src * lda].scale(inv);
        }
        if let Some(vm) = v.as_deref_mut() {
            let vo = v_old.as_ref().unwrap();
            for i in 0..n {
                vm[i + j * n] = vo[i + src * n];
            }
        }
    }
    Ok(())
}

/// Full SVD of the m-by-n matrix `a`: `A = U * diag(s) * V^H`.
///
/// The left singular vectors overwrite the leading `min(m, n)` columns of
/// `a`; `s` receives the `min(m, n)` singular values in decreasing order and
/// `vt` the matrix `V^H` (`min(m, n)`-by-n, leading dimension `ldvt`).
pub fn gesvd<T: Scalar>(
    m: usize,
    n: usize,
    a: &mut [T],
    lda: usize,
    s: &mut [f64],
    vt: &mut [T],
    ldvt: usize,
) -> Result<()> {
    let nmin = m.min(n);
    if nmin == 0 {
        return Ok(());
    }
    if m >= n {
        let mut v = vec![T::zero(); n * n];
        jacobi(m, n, a, lda, s, Some(&mut v))?;
        for l in 0..nmin {
            for j in 0..n {
                vt[l + j * ldvt] = v[j + l * n].conj();
            }
        }
    } else {
        // Work on A^H (n-by-m): A^H = U' S V'^H gives A = V' S U'^H.
        let mut ah = vec![T::zero(); n * m];
        for j in 0..n {
            for i in 0..m {
                ah[j + i * n] = a[i + j * lda].conj();
            }
        }
        let mut v = vec![T::zero(); m * m];
        jacobi(n, m, &mut ah, n, s, Some(&mut v))?;
        for l in 0..m {
            for i in 0..m {
                a[i + l * lda] = v[i + l * m];
            }
        }
        for l in 0..m {
            for j in 0..n {
                vt[l + j * ldvt] = ah[j + l * n].conj();
            }
        }
    }
    Ok(())
}

/// Singular values only; the contents of `a` are destroyed.
pub fn svals<T: Scalar>(m: usize, n: usize, a: &mut [T], lda: usize, s: &mut [f64]) -> Result<()> {
    let nmin = m.min(n);
    if nmin == 0 {
        return Ok(());
    }
    if m >= n {
        jacobi(m, n, a, lda, s, None)
    } else {
        let mut ah = vec![T::zero(); n * m];
        for j in 0..n {
            for i in 0..m {
                ah[j + i * n] = a[i + j * lda].conj();
            }
        }
        jacobi(n, m, &mut ah, n, s, None)
    }
}
