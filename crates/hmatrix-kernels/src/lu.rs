//! LU factorisation with partial row pivoting.

use crate::error::{KernelError, Result};
use crate::scalar::Scalar;

/// In-place LU factorisation of the n-by-n matrix `a` with partial row
/// pivoting: `P A = L U` with `L` unit-lower and `U` upper triangular, both
/// stored in `a`.
///
/// `ipiv[k]` records the row (0-based, `>= k`) swapped with row `k` at step
/// `k`. A column with no usable pivot aborts the factorisation.
pub fn getrf<T: Scalar>(n: usize, a: &mut [T], lda: usize, ipiv: &mut [usize]) -> Result<()> {
    for k in 0..n {
        let mut piv = k;
        let mut pmax = a[k + k * lda].abs_sq();
        for i in k + 1..n {
            let m = a[i + k * lda].abs_sq();
            if m > pmax {
                pmax = m;
                piv = i;
            }
        }
        ipiv[k] = piv;
        if pmax == 0.0 {
            return Err(KernelError::SingularPivot { col: k });
        }
        if piv != k {
            for j in 0..n {
                a.swap(k + j * lda, piv + j * lda);
            }
        }

        let pivot = a[k + k * lda];
        for i in k + 1..n {
            a[i + k * lda] = a[i + k * lda] / pivot;
        }
        for j in k + 1..n {
            let akj = a[k + j * lda];
            if akj == T::zero() {
                continue;
            }
            for i in k + 1..n {
                a[i + j * lda] = a[i + j * lda] - a[i + k * lda] * akj;
            }
        }
    }
    Ok(())
}
