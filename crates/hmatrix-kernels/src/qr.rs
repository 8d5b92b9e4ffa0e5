//! Householder QR factorisation and application of the factored `Q`.
//!
//! [`geqrf`] leaves `R` on and above the diagonal and the reflector vectors
//! below it, with an implicit unit head. The sign convention makes every
//! `tau` real, so each reflector `H = I - tau v v^H` is Hermitian and the
//! same routine applies `Q` and materialises it.

use crate::scalar::Scalar;

/// Generate a Householder reflector for `x = a[offset..m]` of column `col`.
///
/// On return the head entry holds `beta` and the tail holds the scaled
/// reflector; the returned `tau` is real (zero for an already-reduced
/// column).
fn reflector<T: Scalar>(a: &mut [T], lda: usize, m: usize, offset: usize, col: usize) -> T {
    let base = col * lda;
    let alpha = a[offset + base];
    let mut tail_sq = 0.0;
    for i in offset + 1..m {
        tail_sq += a[i + base].abs_sq();
    }
    let s = (alpha.abs_sq() + tail_sq).sqrt();
    if s == 0.0 {
        return T::zero();
    }

    let amag = alpha.abs_val();
    let phase = if amag > 0.0 {
        alpha.scale(1.0 / amag)
    } else {
        T::one()
    };
    let beta = -phase.scale(s);
    let denom = alpha - beta; // phase * (|alpha| + s), nonzero since s > 0
    for i in offset + 1..m {
        a[i + base] = a[i + base] / denom;
    }
    a[offset + base] = beta;
    T::from_f64((amag + s) / s)
}

/// Apply `H = I - tau v v^H` (reflector `idx` of the factored `a`) to the
/// columns `0..n` of `c` from the left.
fn apply_reflector<T: Scalar>(
    a: &[T],
    lda: usize,
    m: usize,
    idx: usize,
    tau: T,
    c: &mut [T],
    ldc: usize,
    n: usize,
) {
    if tau == T::zero() {
        return;
    }
    for j in 0..n {
        let base = j * ldc;
        let mut w = c[idx + base];
        for i in idx + 1..m {
            w = w + a[i + idx * lda].conj() * c[i + base];
        }
        w = tau * w;
        c[idx + base] = c[idx + base] - w;
        for i in idx + 1..m {
            c[i + base] = c[i + base] - w * a[i + idx * lda];
        }
    }
}

/// In-place QR factorisation of the m-by-n matrix `a`.
///
/// `tau` must hold at least `min(m, n)` entries.
pub fn geqrf<T: Scalar>(m: usize, n: usize, a: &mut [T], lda: usize, tau: &mut [T]) {
    let kmax = m.min(n);
    for k in 0..kmax {
        let t = reflector(a, lda, m, k, k);
        tau[k] = t;
        if t != T::zero() && k + 1 < n {
            // Temporarily split off the reflector column to appease aliasing:
            // the reflector lives in column k, the update touches k+1..n.
            let (head, rest) = a.split_at_mut((k + 1) * lda);
            apply_reflector_split(head, lda, m, k, t, rest, lda, n - k - 1);
        }
    }
}

/// Variant of [`apply_reflector`] where the reflector column and the target
/// columns live in disjoint slices of the same matrix.
fn apply_reflector_split<T: Scalar>(
    refl: &[T],
    lda: usize,
    m: usize,
    idx: usize,
    tau: T,
    c: &mut [T],
    ldc: usize,
    n: usize,
) {
    for j in 0..n {
        let base = j * ldc;
        let mut w = c[idx + base];
        for i in idx + 1..m {
            w = w + refl[i + idx * lda].conj() * c[i + base];
        }
        w = tau * w;
        c[idx + base] = c[idx + base] - w;
        for i in idx + 1..m {
            c[i + base] = c[i + base] - w * refl[i + idx * lda];
        }
    }
}

/// `C := Q C` where `Q` is the m-by-m product of the first `k` reflectors
/// stored in `a` by [`geqrf`], and `C` is m-by-n.
#[allow(clippy::too_many_arguments)]
pub fn ormqr<T: Scalar>(
    m: usize,
    n: usize,
    k: usize,
    a: &[T],
    lda: usize,
    tau: &[T],
    c: &mut [T],
    ldc: usize,
) {
    // Q C = H_0 (H_1 (... (H_{k-1} C))), so reflectors apply last-to-first.
    for i in (0..k).rev() {
        apply_reflector(a, lda, m, i, tau[i], c, ldc, n);
    }
}

/// Materialise the first `k` columns of `Q` in place of the factored `a`.
pub fn orgqr<T: Scalar>(m: usize, k: usize, a: &mut [T], lda: usize, tau: &[T]) {
    let mut q = vec![T::zero(); m * k];
    for j in 0..k {
        q[j + j * m] = T::one();
    }
    ormqr(m, k, k, a, lda, tau, &mut q, m);
    for j in 0..k {
        let base = j * lda;
        a[base..base + m].copy_from_slice(&q[j * m..j * m + m]);
    }
}
