//! Exact rational arithmetic for sample and time bookkeeping.
//!
//! Sample rates, frame rates, and subcarrier frequencies are kept as reduced
//! integer ratios so that long renders never accumulate rounding drift. All
//! operations reduce by GCD and keep the denominator positive.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// A reduced ratio of two signed 64-bit integers with `den > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    num: i64,
    den: i64,
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.abs().max(1)
}

impl Rational {
    pub const ZERO: Rational = Rational { num: 0, den: 1 };

    /// Construct and reduce. Panics on a zero denominator, which is always a
    /// programming error at the call site.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "rational denominator must be non-zero");
        let sign = if den < 0 { -1 } else { 1 };
        let g = gcd(num, den);
        Self {
            num: sign * num / g,
            den: sign * den / g,
        }
    }

    pub const fn integer(value: i64) -> Self {
        Self { num: value, den: 1 }
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn den(&self) -> i64 {
        self.den
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn recip(&self) -> Self {
        assert!(self.num != 0, "reciprocal of zero");
        Self::new(self.den, self.num)
    }

    /// Truncating conversion to an integer count.
    pub fn floor(&self) -> i64 {
        self.num.div_euclid(self.den)
    }

    pub fn ceil(&self) -> i64 {
        -(-self.num).div_euclid(self.den)
    }

    /// Rescale `value` counted in timebase `from` into timebase `to`,
    /// rounding to nearest. This is the PTS conversion used by the
    /// time-align policy.
    pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
        // value * from / to, carried out in i128 to survive 90 kHz * MHz products
        let num = value as i128 * from.num as i128 * to.den as i128;
        let den = from.den as i128 * to.num as i128;
        let half = den.abs() / 2;
        let rounded = if num >= 0 { num + half } else { num - half } / den;
        rounded as i64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl Add for Rational {
    type Output = Rational;
    fn add(self, rhs: Rational) -> Rational {
        Rational::new(self.num * rhs.den + rhs.num * self.den, self.den * rhs.den)
    }
}

impl Sub for Rational {
    type Output = Rational;
    fn sub(self, rhs: Rational) -> Rational {
        Rational::new(self.num * rhs.den - rhs.num * self.den, self.den * rhs.den)
    }
}

impl Mul for Rational {
    type Output = Rational;
    fn mul(self, rhs: Rational) -> Rational {
        // Cross-reduce before multiplying to keep intermediates small
        let g1 = gcd(self.num, rhs.den);
        let g2 = gcd(rhs.num, self.den);
        Rational::new(
            (self.num / g1) * (rhs.num / g2),
            (self.den / g2) * (rhs.den / g1),
        )
    }
}

impl Div for Rational {
    type Output = Rational;
    fn div(self, rhs: Rational) -> Rational {
        self * rhs.recip()
    }
}
