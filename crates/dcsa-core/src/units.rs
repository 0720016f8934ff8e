//! Unit-safe wrappers for the two quantities the DC model carries.
//!
//! The DC approximation works entirely in per-unit power and radians. Keeping
//! them as newtypes stops an angle from being passed where an injection is
//! expected (and the reverse) at the network boundary.
//!
//! ```
//! use dcsa_core::units::{PerUnit, Radians};
//!
//! let injection = PerUnit(1.5) - PerUnit(0.5);
//! assert_eq!(injection.value(), 1.0);
//!
//! let shift = Radians::from_degrees(30.0);
//! assert!((shift.value() - std::f64::consts::PI / 6.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign for $type {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.6} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }
    };
}

/// Power expressed on the system base (p.u.).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct PerUnit(pub f64);

/// Angle in radians.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Radians(pub f64);

impl_unit_ops!(PerUnit, "p.u.");
impl_unit_ops!(Radians, "rad");

impl Radians {
    pub fn from_degrees(degrees: f64) -> Self {
        Self(degrees.to_radians())
    }

    pub fn to_degrees(self) -> f64 {
        self.0.to_degrees()
    }
}

impl std::iter::Sum for PerUnit {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(PerUnit(0.0), |acc, x| acc + x)
    }
}
