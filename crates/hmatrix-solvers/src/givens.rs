//! Givens rotations for the Hessenberg least-squares recurrence.
//!
//! The cosine is always real; the sine carries the phase in the complex
//! instantiation. Generation uses a magnitude-split scheme: the rotation
//! parameter `k = conj(b / a)` is computed through whichever component of
//! `a` dominates, so neither ratio involves a small denominator.

use hmatrix_kernels::Scalar;

/// Generate `(cos, sin)` with `cos` real such that the rotation applied by
/// [`apply_rot`] zeroes `b`.
pub(crate) fn gen_rot<T: Scalar>(a: T, b: T) -> (f64, T) {
    if b == T::zero() {
        return (1.0, T::zero());
    }
    if a == T::zero() {
        return (0.0, T::one());
    }
    let (ar, ai) = (a.re(), a.im());
    let (br, bi) = (b.re(), b.im());
    let k1 = (ar * br + ai * bi) / a.abs_sq();
    let k2 = if ar.abs() >= ai.abs() {
        (k1 * ai - bi) / ar
    } else {
        (br - k1 * ar) / ai
    };
    let cs = 1.0 / (1.0 + k1 * k1 + k2 * k2).sqrt();
    (cs, T::from_re_im(cs * k1, cs * k2))
}

/// Apply the rotation: returns `(cs * a + sn * b, cs * b - conj(sn) * a)`.
pub(crate) fn apply_rot<T: Scalar>(a: T, b: T, cs: f64, sn: T) -> (T, T) {
    (a.scale(cs) + sn * b, b.scale(cs) - sn.conj() * a)
}
