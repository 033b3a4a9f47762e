//! Num - The numeric unit of every signal value
//!
//! Compact 16-byte complex scalar: real + imaginary part, IEEE-754 double.
//! Every stack slot, delay cell and recorded result in the simulation is one
//! `Num`. Real-valued signals carry an imaginary part of exactly zero.
//!
//! # Example
//! ```
//! use sigflow::Num;
//!
//! let a = Num::new(1.0, 2.0);
//! let b = Num::real(3.0);
//! assert_eq!(a + b, Num::new(4.0, 2.0));
//! assert_eq!(a.conj(), Num::new(1.0, -2.0));
//! assert_eq!(Num::real(-4.0).sqrt(), Num::new(0.0, 2.0));
//! ```

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Complex double-precision scalar.
///
/// Arithmetic is standard complex arithmetic; equality compares both
/// components.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(C)]
pub struct Num {
    /// Real part
    pub re: f64,
    /// Imaginary part
    pub im: f64,
}

impl Num {
    /// Zero value
    pub const ZERO: Self = Self { re: 0.0, im: 0.0 };

    /// Real one
    pub const ONE: Self = Self { re: 1.0, im: 0.0 };

    /// Create from real and imaginary parts
    #[inline]
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Create a purely real value
    #[inline]
    pub const fn real(re: f64) -> Self {
        Self { re, im: 0.0 }
    }

    /// Is the imaginary part exactly zero?
    #[inline]
    pub fn is_real(self) -> bool {
        self.im == 0.0
    }

    /// Magnitude |z| as a plain float
    #[inline]
    pub fn magnitude(self) -> f64 {
        self.re.hypot(self.im)
    }

    /// Complex conjugate
    #[inline]
    pub fn conj(self) -> Self {
        Self { re: self.re, im: -self.im }
    }

    /// Magnitude |z| as a real value
    #[inline]
    pub fn abs(self) -> Self {
        Self::real(self.magnitude())
    }

    /// Principal square root.
    ///
    /// The branch cut follows the sign of the imaginary part, so
    /// `sqrt(-4)` is `2i` and conjugation commutes with the root.
    pub fn sqrt(self) -> Self {
        let magnitude = self.magnitude();
        Self {
            re: ((magnitude + self.re) * 0.5).sqrt(),
            im: ((magnitude - self.re) * 0.5).sqrt().copysign(self.im),
        }
    }
}

impl From<f64> for Num {
    #[inline]
    fn from(re: f64) -> Self {
        Self::real(re)
    }
}

impl Add for Num {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self { re: self.re + rhs.re, im: self.im + rhs.im }
    }
}

impl Sub for Num {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self { re: self.re - rhs.re, im: self.im - rhs.im }
    }
}

impl Mul for Num {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self {
            re: self.re * rhs.re - self.im * rhs.im,
            im: self.re * rhs.im + self.im * rhs.re,
        }
    }
}

impl Div for Num {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        let denominator = rhs.re * rhs.re + rhs.im * rhs.im;
        Self {
            re: (self.re * rhs.re + self.im * rhs.im) / denominator,
            im: (self.im * rhs.re - self.re * rhs.im) / denominator,
        }
    }
}

impl Neg for Num {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self { re: -self.re, im: -self.im }
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im == 0.0 {
            write!(f, "{}", self.re)
        } else if self.im < 0.0 {
            write!(f, "{}-{}i", self.re, -self.im)
        } else {
            write!(f, "{}+{}i", self.re, self.im)
        }
    }
}
