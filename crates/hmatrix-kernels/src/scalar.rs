//! Scalar trait shared by every kernel and block operation.
//!
//! The engine is instantiated for real (`f64`) and complex (`Complex64`)
//! double precision. The trait collects the handful of operations the
//! kernels need beyond plain arithmetic: conjugation, real/imaginary parts,
//! magnitudes, and construction from real values.

use num_complex::Complex64;
use num_traits::{One, Zero};

/// Scalar type of a matrix block: real or complex double precision.
pub trait Scalar:
    Clone
    + Copy
    + std::fmt::Debug
    + PartialEq
    + Zero
    + One
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
    + std::ops::Neg<Output = Self>
    + Send
    + Sync
    + 'static
{
    /// Complex conjugate (identity for real scalars).
    fn conj(self) -> Self;

    /// Real part.
    fn re(self) -> f64;

    /// Imaginary part (zero for real scalars).
    fn im(self) -> f64;

    /// Squared absolute value, |z|^2.
    fn abs_sq(self) -> f64;

    /// Absolute value as f64.
    fn abs_val(self) -> f64 {
        self.abs_sq().sqrt()
    }

    /// Build from a real value.
    fn from_f64(val: f64) -> Self;

    /// Build from real and imaginary parts; the real instantiation keeps
    /// only `re`.
    fn from_re_im(re: f64, im: f64) -> Self;

    /// Multiply by a real factor.
    fn scale(self, s: f64) -> Self;

    /// Check if the value is NaN.
    fn is_nan(self) -> bool;
}

impl Scalar for f64 {
    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn re(self) -> f64 {
        self
    }

    #[inline]
    fn im(self) -> f64 {
        0.0
    }

    #[inline]
    fn abs_sq(self) -> f64 {
        self * self
    }

    #[inline]
    fn abs_val(self) -> f64 {
        self.abs()
    }

    #[inline]
    fn from_f64(val: f64) -> Self {
        val
    }

    #[inline]
    fn from_re_im(re: f64, _im: f64) -> Self {
        re
    }

    #[inline]
    fn scale(self, s: f64) -> Self {
        self * s
    }

    #[inline]
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
}

impl Scalar for Complex64 {
    #[inline]
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }

    #[inline]
    fn re(self) -> f64 {
        self.re
    }

    #[inline]
    fn im(self) -> f64 {
        self.im
    }

    #[inline]
    fn abs_sq(self) -> f64 {
        self.norm_sqr()
    }

    #[inline]
    fn abs_val(self) -> f64 {
        self.norm()
    }

    #[inline]
    fn from_f64(val: f64) -> Self {
        Complex64::new(val, 0.0)
    }

    #[inline]
    fn from_re_im(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }

    #[inline]
    fn scale(self, s: f64) -> Self {
        Complex64::new(self.re * s, self.im * s)
    }

    #[inline]
    fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }
}

/// Macro to generate f64 and Complex64 test variants from a generic test
/// function.
///
/// # Example
///
/// ```ignore
/// fn roundtrip_generic<T: Scalar>() {
///     // test implementation
/// }
///
/// hmatrix_kernels::scalar_tests!(roundtrip, roundtrip_generic);
/// // Generates:
/// // #[test] fn roundtrip_f64() { roundtrip_generic::<f64>(); }
/// // #[test] fn roundtrip_c64() { roundtrip_generic::<Complex64>(); }
/// ```
#[macro_export]
macro_rules! scalar_tests {
    ($name:ident, $test_fn:ident) => {
        paste::paste! {
            #[test]
            fn [<$name _f64>]() {
                $test_fn::<f64>();
            }

            #[test]
            fn [<$name _c64>]() {
                $test_fn::<num_complex::Complex64>();
            }
        }
    };
}
