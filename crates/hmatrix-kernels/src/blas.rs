//! Level-1/2/3 helpers on column-major slices.
//!
//! Every matrix argument is a column-major slice with an explicit leading
//! dimension; a matrix of `n` columns with leading dimension `ld` occupies
//! `ld * (n - 1) + rows` entries, column `j` starting at `j * ld`.

use crate::scalar::Scalar;

/// Set every entry of `x` to zero.
pub fn setzero<T: Scalar>(x: &mut [T]) {
    for e in x.iter_mut() {
        *e = T::zero();
    }
}

/// Copy `x` into `y`; the slices must have equal length.
pub fn copy<T: Scalar>(x: &[T], y: &mut [T]) {
    y.copy_from_slice(x);
}

/// Scale `x` by the scalar `alpha`.
pub fn scal<T: Scalar>(alpha: T, x: &mut [T]) {
    for e in x.iter_mut() {
        *e = alpha * *e;
    }
}

/// Scale `x` by the real factor `alpha`.
pub fn rscal<T: Scalar>(alpha: f64, x: &mut [T]) {
    for e in x.iter_mut() {
        *e = e.scale(alpha);
    }
}

/// `y += alpha * x`.
pub fn axpy<T: Scalar>(alpha: T, x: &[T], y: &mut [T]) {
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi = *yi + alpha * xi;
    }
}

/// Conjugated dot product `sum_i conj(x_i) * y_i`.
pub fn dotc<T: Scalar>(x: &[T], y: &[T]) -> T {
    x.iter()
        .zip(y.iter())
        .fold(T::zero(), |acc, (&xi, &yi)| acc + xi.conj() * yi)
}

/// Euclidean norm of `x`.
pub fn nrm2<T: Scalar>(x: &[T]) -> f64 {
    x.iter().map(|e| e.abs_sq()).sum::<f64>().sqrt()
}

/// `C := alpha * A * B` with `A` m-by-k, `B` k-by-n, `C` m-by-n.
#[allow(clippy::too_many_arguments)]
pub fn gemm<T: Scalar>(
    m: usize,
    k: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    c: &mut [T],
    ldc: usize,
) {
    for j in 0..n {
        for i in 0..m {
            let mut sum = T::zero();
            for l in 0..k {
                sum = sum + a[i + l * lda] * b[l + j * ldb];
            }
            c[i + j * ldc] = alpha * sum;
        }
    }
}

/// `y += alpha * A * x` with `A` m-by-n.
pub fn gemv_acc<T: Scalar>(m: usize, n: usize, alpha: T, a: &[T], lda: usize, x: &[T], y: &mut [T]) {
    for j in 0..n {
        let e = alpha * x[j];
        for i in 0..m {
            y[i] = y[i] + e * a[i + j * lda];
        }
    }
}

/// `C := alpha * A * B^H` with `A` m-by-k, `B` n-by-k, `C` m-by-n.
#[allow(clippy::too_many_arguments)]
pub fn gemmh<T: Scalar>(
    m: usize,
    k: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    c: &mut [T],
    ldc: usize,
) {
    for j in 0..n {
        for i in 0..m {
            let mut sum = T::zero();
            for l in 0..k {
                sum = sum + a[i + l * lda] * b[j + l * ldb].conj();
            }
            c[i + j * ldc] = alpha * sum;
        }
    }
}

/// `C += A * B^H` with `A` m-by-k, `B` n-by-k, `C` m-by-n.
#[allow(clippy::too_many_arguments)]
pub fn gemmh_acc<T: Scalar>(
    m: usize,
    k: usize,
    n: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    c: &mut [T],
    ldc: usize,
) {
    for j in 0..n {
        for i in 0..m {
            let mut sum = T::zero();
            for l in 0..k {
                sum = sum + a[i + l * lda] * b[j + l * ldb].conj();
            }
            c[i + j * ldc] = c[i + j * ldc] + sum;
        }
    }
}

/// `C := alpha * A^H * B` with `A` m-by-k, `B` m-by-n, `C` k-by-n.
#[allow(clippy::too_many_arguments)]
pub fn gemhm<T: Scalar>(
    m: usize,
    k: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    c: &mut [T],
    ldc: usize,
) {
    for j in 0..n {
        for i in 0..k {
            let mut sum = T::zero();
            for l in 0..m {
                sum = sum + a[l + i * lda].conj() * b[l + j * ldb];
            }
            c[i + j * ldc] = alpha * sum;
        }
    }
}

/// `C := R_A * R_B^H` where `R_A` and `R_B` are the upper-trapezoidal QR
/// factors left in place by [`crate::qr::geqrf`].
///
/// `R_A` is the m-by-k upper part of `a`, `R_B` the n-by-k upper part of
/// `b`; `C` is m-by-n with leading dimension `m`. The summation index skips
/// entries that upper-triangularity forces to zero.
pub fn utrmmh<T: Scalar>(
    m: usize,
    k: usize,
    n: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    c: &mut [T],
) {
    for j in 0..n {
        for i in 0..m {
            let mut sum = T::zero();
            for l in i.max(j)..k {
                sum = sum + a[i + l * lda] * b[j + l * ldb].conj();
            }
            c[i + j * m] = sum;
        }
    }
}
