//! The floating-point scalar type the Taylor engine and stepper are generic over.
//!
//! The source system supports `binary64`, `binary80` and `binary128`; this
//! crate abstracts over the arithmetic a backend needs as the [`Scalar`]
//! trait and wires up one concrete implementation, `f64`. A `binary128`
//! backend (e.g. via `rug` or `astro-float`, the way [`crate`]'s sibling
//! `num-anafis` crate selects extended precision through Cargo features)
//! would implement the same trait without touching the engine above it.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Arithmetic a Taylor coefficient and a stepper state value must support.
pub trait Scalar:
    Copy
    + Clone
    + Debug
    + PartialOrd
    + Default
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// The additive identity.
    const ZERO: Self;
    /// The multiplicative identity.
    const ONE: Self;

    /// Lossy conversion from a `f64` literal (used to seed constants).
    fn from_f64(x: f64) -> Self;
    /// Lossy conversion to `f64` (used for stepsize/tolerance arithmetic, which
    /// is always performed in `f64` regardless of the stepper's scalar type).
    fn to_f64(self) -> f64;

    /// Sine.
    fn sin(self) -> Self;
    /// Cosine.
    fn cos(self) -> Self;
    /// `e^self`.
    fn exp(self) -> Self;
    /// Natural logarithm.
    fn ln(self) -> Self;
    /// Square root.
    fn sqrt(self) -> Self;
    /// `self^exponent`.
    fn powf(self, exponent: Self) -> Self;
    /// Absolute value.
    fn abs(self) -> Self;
    /// `true` unless the value is NaN or infinite. Used to catch overflow
    /// (e.g. `exp` of a large argument) that the analytic domain checks in
    /// [`crate::taylor`] don't cover, since those only reject inputs known
    /// in advance to be out of an operator's domain.
    fn is_finite(self) -> bool;
}

impl Scalar for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_f64(x: f64) -> Self {
        x
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn sin(self) -> Self {
        f64::sin(self)
    }

    #[inline]
    fn cos(self) -> Self {
        f64::cos(self)
    }

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }

    #[inline]
    fn ln(self) -> Self {
        f64::ln(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline]
    fn powf(self, exponent: Self) -> Self {
        f64::powf(self, exponent)
    }

    #[inline]
    fn abs(self) -> Self {
        f64::abs(self)
    }

    #[inline]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}
