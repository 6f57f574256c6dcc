//! Arbitrary-precision rational numbers.
//!
//! Every scalar value in Railway is a [`Rational`]: an exact fraction of two
//! arbitrary-precision integers, always stored normalized (denominator
//! positive, `gcd(numerator, denominator) == 1`). Grounded on the teacher
//! codebase's `types::fraction::Fraction`, which implements Python's
//! `fractions.Fraction` the same way over `num_bigint::BigInt`.

use std::{
    cmp::Ordering,
    fmt,
    ops::{Add, Mul, Neg, Sub},
};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};

use crate::error::{ErrorKind, RunError};

/// An exact rational number, normalized to lowest terms with a positive
/// denominator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rational {
    numerator: BigInt,
    denominator: BigInt,
}

impl Rational {
    /// Builds a normalized rational from a numerator/denominator pair.
    ///
    /// # Errors
    /// Returns [`ErrorKind::ZeroError`] if `denominator` is zero.
    pub fn new(numerator: BigInt, denominator: BigInt) -> Result<Self, RunError> {
        if denominator.is_zero() {
            return Err(RunError::new(ErrorKind::ZeroError, "rational with zero denominator"));
        }
        let (n, d) = Self::normalize(numerator, denominator);
        Ok(Self {
            numerator: n,
            denominator: d,
        })
    }

    fn normalize(mut n: BigInt, mut d: BigInt) -> (BigInt, BigInt) {
        if d.is_negative() {
            n = -n;
            d = -d;
        }
        let g = n.gcd(&d);
        if !g.is_zero() && g != BigInt::from(1) {
            n /= &g;
            d /= &g;
        }
        (n, d)
    }

    #[must_use]
    pub fn zero() -> Self {
        Self {
            numerator: BigInt::from(0),
            denominator: BigInt::from(1),
        }
    }

    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self {
            numerator: BigInt::from(value),
            denominator: BigInt::from(1),
        }
    }

    #[must_use]
    pub fn numerator(&self) -> &BigInt {
        &self.numerator
    }

    #[must_use]
    pub fn denominator(&self) -> &BigInt {
        &self.denominator
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.numerator.is_zero()
    }

    /// Truthiness: every non-zero rational is "true", matching Railway's
    /// reuse of numbers as booleans in conditions and boolean operators.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !self.is_zero()
    }

    #[must_use]
    pub fn from_bool(b: bool) -> Self {
        if b { Self::from_i64(1) } else { Self::from_i64(0) }
    }

    /// Truncates toward zero, matching `int(fraction)` semantics used
    /// throughout the reference interpreter for array indices and lengths.
    ///
    /// # Errors
    /// Returns [`ErrorKind::IndexError`] if the value does not fit in an `i64`.
    pub fn to_index(&self) -> Result<i64, RunError> {
        let truncated = &self.numerator / &self.denominator;
        truncated
            .try_into()
            .map_err(|_| RunError::new(ErrorKind::IndexError, "index value out of range"))
    }

    /// Exact addition.
    pub fn add(&self, other: &Self) -> Self {
        let n = &self.numerator * &other.denominator + &other.numerator * &self.denominator;
        let d = &self.denominator * &other.denominator;
        let (n, d) = Self::normalize(n, d);
        Self {
            numerator: n,
            denominator: d,
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &Self) -> Self {
        let n = &self.numerator * &other.numerator;
        let d = &self.denominator * &other.denominator;
        let (n, d) = Self::normalize(n, d);
        Self {
            numerator: n,
            denominator: d,
        }
    }

    /// Exact division.
    ///
    /// # Errors
    /// Returns [`ErrorKind::ZeroError`] if `other` is zero.
    pub fn div(&self, other: &Self) -> Result<Self, RunError> {
        if other.is_zero() {
            return Err(RunError::new(ErrorKind::ZeroError, "division by zero"));
        }
        let n = &self.numerator * &other.denominator;
        let d = &self.denominator * &other.numerator;
        let (n, d) = Self::normalize(n, d);
        Ok(Self {
            numerator: n,
            denominator: d,
        })
    }

    /// Floor division, per spec §9: `//` on rationals is floor division as
    /// the underlying bignum library defines it.
    ///
    /// # Errors
    /// Returns [`ErrorKind::ZeroError`] if `other` is zero.
    pub fn floor_div(&self, other: &Self) -> Result<Self, RunError> {
        if other.is_zero() {
            return Err(RunError::new(ErrorKind::ZeroError, "floor division by zero"));
        }
        let n = &self.numerator * &other.denominator;
        let d = &self.denominator * &other.numerator;
        let q = n.div_floor(&d);
        Ok(Self::from_bigint(q))
    }

    /// Modulo, defined as `a - floor_div(a, b) * b`.
    ///
    /// # Errors
    /// Returns [`ErrorKind::ZeroError`] if `other` is zero.
    pub fn modulo(&self, other: &Self) -> Result<Self, RunError> {
        let q = self.floor_div(other)?;
        Ok(self.sub(&q.mul(other)))
    }

    /// Exponentiation with an integer exponent (the reference interpreter
    /// only ever applies `**` with integral exponents in practice; a
    /// fractional exponent raises `ValueError` since it cannot in general
    /// stay exact).
    ///
    /// # Errors
    /// Returns [`ErrorKind::ValueError`] for a non-integral exponent, or
    /// [`ErrorKind::ZeroError`] for a negative power of zero.
    pub fn pow(&self, exponent: &Self) -> Result<Self, RunError> {
        if exponent.denominator != BigInt::from(1) {
            return Err(RunError::new(ErrorKind::ValueError, "exponent must be an integer"));
        }
        let exp = exponent.numerator.clone();
        if exp.is_negative() {
            if self.is_zero() {
                return Err(RunError::new(ErrorKind::ZeroError, "zero to a negative power"));
            }
            let positive = Self::from_bigint(-exp);
            let forward = self.pow(&positive)?;
            return Self::from_i64(1).div(&forward);
        }
        let mut result = Self::from_i64(1);
        let mut base = self.clone();
        let mut e = exp;
        let zero = BigInt::from(0);
        let two = BigInt::from(2);
        while e > zero {
            if (&e % &two) == BigInt::from(1) {
                result = result.mul(&base);
            }
            base = base.mul(&base);
            e /= &two;
        }
        Ok(result)
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        Self {
            numerator: -self.numerator.clone(),
            denominator: self.denominator.clone(),
        }
    }

    fn from_bigint(n: BigInt) -> Self {
        Self {
            numerator: n,
            denominator: BigInt::from(1),
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = &self.numerator * &other.denominator;
        let rhs = &other.numerator * &self.denominator;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == BigInt::from(1) {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

// Convenience operator overloads for call sites that prefer `a + b` to
// `a.add(&b)`; the fallible variants (div, floor_div, modulo, pow) stay
// method calls since they must surface `ZeroError`/`ValueError`.
impl Add for &Rational {
    type Output = Rational;
    fn add(self, rhs: Self) -> Rational {
        Rational::add(self, rhs)
    }
}
impl Sub for &Rational {
    type Output = Rational;
    fn sub(self, rhs: Self) -> Rational {
        Rational::sub(self, rhs)
    }
}
impl Mul for &Rational {
    type Output = Rational;
    fn mul(self, rhs: Self) -> Rational {
        Rational::mul(self, rhs)
    }
}
impl Neg for &Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        Rational::neg(self)
    }
}
// `Div`/`Rem` are intentionally not implemented as operator overloads: both
// can fail with `ZeroError` and must return `RunResult` via `div`/`modulo`.

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(BigInt::from(n), BigInt::from(d)).unwrap()
    }

    #[test]
    fn normalizes_sign_and_gcd() {
        let x = r(-4, -8);
        assert_eq!(x.numerator(), &BigInt::from(1));
        assert_eq!(x.denominator(), &BigInt::from(2));
    }

    #[test]
    fn zero_denominator_is_zero_error() {
        let err = Rational::new(BigInt::from(1), BigInt::from(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ZeroError);
    }

    #[test]
    fn exact_arithmetic() {
        assert_eq!(r(1, 3).add(&r(1, 6)), r(1, 2));
        assert_eq!(r(1, 2).mul(&r(2, 3)), r(1, 3));
        assert_eq!(r(1, 2).div(&r(1, 4)).unwrap(), r(2, 1));
    }

    #[test]
    fn division_by_zero_is_zero_error() {
        let err = r(1, 1).div(&r(0, 1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ZeroError);
    }

    #[test]
    fn floor_div_rounds_toward_negative_infinity() {
        assert_eq!(Rational::from_i64(-7).floor_div(&Rational::from_i64(2)).unwrap(), Rational::from_i64(-4));
    }

    #[test]
    fn pow_handles_negative_exponents() {
        assert_eq!(r(2, 1).pow(&Rational::from_i64(-1)).unwrap(), r(1, 2));
    }

    #[test]
    fn ordering_compares_across_denominators() {
        assert!(r(1, 3) < r(1, 2));
    }

    #[test]
    fn display_omits_denominator_for_integers() {
        assert_eq!(Rational::from_i64(5).to_string(), "5");
        assert_eq!(r(1, 2).to_string(), "1/2");
    }
}
