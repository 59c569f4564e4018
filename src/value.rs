//! # Value Module
//!
//! Scalar arithmetic values for the expression engine. A value is either an
//! exact rational or a 64-bit float, and every operation follows one
//! promotion rule: mixing a rational with a real produces a real, and any
//! operation that cannot stay exact (sqrt, ln, trig, non-integer powers)
//! produces a real.
//!
//! ## Key Design
//! - `Ratio` keeps `gcd(|num|, den) == 1` after every producing operation.
//! - `den == 0` encodes ±∞ with `num` forced to ±1; division by zero
//!   produces this sentinel instead of raising.
//! - Rational arithmetic runs in 128-bit intermediates; results that no
//!   longer fit the 64-bit fields demote to `Real`.
//! - Values are `Copy` — the evaluator clones freely on every load.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

// -----------------------------------------------------------------------------
// VALUE — Rational / Real Scalar
// -----------------------------------------------------------------------------

/// A scalar: an exact rational or an IEEE-754 double.
#[derive(Clone, Copy, PartialEq)]
pub enum Value {
    /// Exact rational `num / den`. Normalized: `den == 1` when `num == 0`,
    /// `num == ±1` when `den == 0` (the infinity sentinel), reduced otherwise.
    Ratio { num: i64, den: u64 },
    /// 64-bit floating point.
    Real(f64),
}

impl Value {
    /// The rational zero.
    pub const ZERO: Value = Value::Ratio { num: 0, den: 1 };

    /// Creates an integer-valued rational.
    #[inline]
    pub const fn int(n: i64) -> Value {
        Value::Ratio { num: n, den: 1 }
    }

    /// Creates a normalized rational from a signed numerator and denominator.
    #[inline]
    pub fn ratio(num: i64, den: i64) -> Value {
        make_ratio(num as i128, den as i128)
    }

    /// Creates a real value.
    #[inline]
    pub const fn real(x: f64) -> Value {
        Value::Real(x)
    }

    /// Converts to `f64`, mapping the infinity sentinel to ±∞.
    #[inline]
    pub fn to_f64(self) -> f64 {
        match self {
            Value::Ratio { num, den } => num as f64 / den as f64,
            Value::Real(x) => x,
        }
    }

    /// Returns `true` for the `Real` variant.
    #[inline]
    pub fn is_real(self) -> bool {
        matches!(self, Value::Real(_))
    }

    // -------------------------------------------------------------------------
    // LITERAL PARSING
    // -------------------------------------------------------------------------

    /// Parses a numeric literal from the start of `s`.
    ///
    /// Tries an integer match and a decimal-real match; the longer one wins,
    /// so `"3"` is an exact rational while `"3.0"` and `"2e6"` are reals.
    /// Returns the value and the number of bytes consumed, or `None` when
    /// `s` does not start with a literal.
    pub fn parse(s: &str) -> Option<(Value, usize)> {
        let b = s.as_bytes();
        let mut i = 0;

        if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
            i += 1;
        }

        let int_digits = count_digits(&b[i..]);
        let int_end = i + int_digits;

        // Fractional part: a dot must be followed by a digit to count.
        let mut real_end = int_end;
        let mut frac_digits = 0;
        if real_end < b.len() && b[real_end] == b'.' {
            frac_digits = count_digits(&b[real_end + 1..]);
            if frac_digits > 0 {
                real_end += 1 + frac_digits;
            }
        }

        // Exponent: only consumed when digits follow.
        if (int_digits > 0 || frac_digits > 0)
            && real_end < b.len()
            && (b[real_end] == b'e' || b[real_end] == b'E')
        {
            let mut j = real_end + 1;
            if j < b.len() && (b[j] == b'+' || b[j] == b'-') {
                j += 1;
            }
            let exp_digits = count_digits(&b[j..]);
            if exp_digits > 0 {
                real_end = j + exp_digits;
            }
        }

        if real_end > int_end && (int_digits > 0 || frac_digits > 0) {
            let x: f64 = s[..real_end].parse().ok()?;
            return Some((Value::Real(x), real_end));
        }
        if int_digits > 0 {
            let val = match s[..int_end].parse::<i64>() {
                Ok(n) => Value::int(n),
                // Integer too wide for the rational field: fall back to real.
                Err(_) => Value::Real(s[..int_end].parse::<f64>().ok()?),
            };
            return Some((val, int_end));
        }
        None
    }

    // -------------------------------------------------------------------------
    // FLOOR DIVISION / MODULO / POWER
    // -------------------------------------------------------------------------

    /// Floor division: `floor(self / rhs)`, always an integer rational.
    pub fn floor_div(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Ratio { num: n1, den: d1 }, Value::Ratio { num: n2, den: d2 }) => {
                if d1 == 0 || d2 == 0 || n2 == 0 {
                    return int_from_floor((self.to_f64() / rhs.to_f64()).floor());
                }
                let a = n1 as i128 * d2 as i128;
                let b = n2 as i128 * d1 as i128;
                make_ratio(floor_div_i128(a, b), 1)
            }
            _ => int_from_floor((self.to_f64() / rhs.to_f64()).floor()),
        }
    }

    /// Raises `self` to the power `rhs`.
    ///
    /// A rational base with an integer rational exponent stays exact through
    /// fast exponentiation; everything else goes through `powf`.
    pub fn pow(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Ratio { num, den }, Value::Ratio { num: p, den: 1 }) => {
                int_pow(num, den, p).unwrap_or_else(|| Value::Real(self.to_f64().powf(p as f64)))
            }
            _ => Value::Real(self.to_f64().powf(rhs.to_f64())),
        }
    }

    // -------------------------------------------------------------------------
    // NAMED OPERATIONS
    // -------------------------------------------------------------------------

    /// Absolute value.
    pub fn abs(self) -> Value {
        match self {
            Value::Ratio { num, den } => make_ratio((num as i128).abs(), den as i128),
            Value::Real(x) => Value::Real(x.abs()),
        }
    }

    /// Largest integer not above the value, as an integer rational.
    pub fn floor(self) -> Value {
        match self {
            Value::Ratio { den: 0, .. } => self,
            Value::Ratio { num, den } => make_ratio(floor_div_i128(num as i128, den as i128), 1),
            Value::Real(x) => int_from_floor(x.floor()),
        }
    }

    /// Smallest integer not below the value, as an integer rational.
    pub fn ceil(self) -> Value {
        match self {
            Value::Ratio { den: 0, .. } => self,
            Value::Ratio { num, den } => {
                make_ratio(-floor_div_i128(-(num as i128), den as i128), 1)
            }
            Value::Real(x) => int_from_floor(x.ceil()),
        }
    }

    /// Square root; always real (negative inputs yield NaN).
    pub fn sqrt(self) -> Value {
        Value::Real(self.to_f64().sqrt())
    }

    /// Logarithm of `self` in base `base`; always real.
    pub fn log(self, base: Value) -> Value {
        Value::Real(self.to_f64().ln() / base.to_f64().ln())
    }

    /// Natural logarithm; always real.
    pub fn ln(self) -> Value {
        Value::Real(self.to_f64().ln())
    }

    /// Sine; always real.
    pub fn sin(self) -> Value {
        Value::Real(self.to_f64().sin())
    }

    /// Cosine; always real.
    pub fn cos(self) -> Value {
        Value::Real(self.to_f64().cos())
    }

    /// Tangent; always real.
    pub fn tan(self) -> Value {
        Value::Real(self.to_f64().tan())
    }
}

// -----------------------------------------------------------------------------
// OPERATOR IMPLS — Promotion Lives Here
// -----------------------------------------------------------------------------

impl Neg for Value {
    type Output = Value;

    fn neg(self) -> Value {
        match self {
            Value::Ratio { num, den } => make_ratio(-(num as i128), den as i128),
            Value::Real(x) => Value::Real(-x),
        }
    }
}

impl Add for Value {
    type Output = Value;

    fn add(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Ratio { num: n1, den: d1 }, Value::Ratio { num: n2, den: d2 }) => {
                // Cross products fit i128; only their sum can overflow.
                let num = (n1 as i128 * d2 as i128).checked_add(n2 as i128 * d1 as i128);
                match num {
                    Some(num) => make_ratio_wide(num, d1 as u128 * d2 as u128),
                    None => Value::Real(self.to_f64() + rhs.to_f64()),
                }
            }
            _ => Value::Real(self.to_f64() + rhs.to_f64()),
        }
    }
}

impl Sub for Value {
    type Output = Value;

    fn sub(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Ratio { num: n1, den: d1 }, Value::Ratio { num: n2, den: d2 }) => {
                let num = (n1 as i128 * d2 as i128).checked_sub(n2 as i128 * d1 as i128);
                match num {
                    Some(num) => make_ratio_wide(num, d1 as u128 * d2 as u128),
                    None => Value::Real(self.to_f64() - rhs.to_f64()),
                }
            }
            _ => Value::Real(self.to_f64() - rhs.to_f64()),
        }
    }
}

impl Mul for Value {
    type Output = Value;

    fn mul(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Ratio { num: n1, den: d1 }, Value::Ratio { num: n2, den: d2 }) => {
                make_ratio_wide(n1 as i128 * n2 as i128, d1 as u128 * d2 as u128)
            }
            _ => Value::Real(self.to_f64() * rhs.to_f64()),
        }
    }
}

impl Div for Value {
    type Output = Value;

    fn div(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Ratio { num: n1, den: d1 }, Value::Ratio { num: n2, den: d2 }) => {
                // The divisor's sign moves into the numerator.
                let mut num = n1 as i128 * d2 as i128;
                if n2 < 0 {
                    num = -num;
                }
                make_ratio_wide(num, d1 as u128 * n2.unsigned_abs() as u128)
            }
            _ => Value::Real(self.to_f64() / rhs.to_f64()),
        }
    }
}

impl Rem for Value {
    type Output = Value;

    /// Modulo. Rational % rational takes the sign of the divisor with
    /// `0 <= |r| < |b|`; any real operand falls back to `fmod` semantics.
    fn rem(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Ratio { num: n1, den: d1 }, Value::Ratio { num: n2, den: d2 }) => {
                if d1 == 0 || d2 == 0 || n2 == 0 {
                    return Value::Real(self.to_f64() % rhs.to_f64());
                }
                let a = n1 as i128 * d2 as i128;
                let b = n2 as i128 * d1 as i128;
                // Euclidean remainder shifted to the divisor's sign.
                let mut r = a.rem_euclid(b);
                if b < 0 && r != 0 {
                    r += b;
                }
                make_ratio_wide(r, d1 as u128 * d2 as u128)
            }
            _ => Value::Real(self.to_f64() % rhs.to_f64()),
        }
    }
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

// -----------------------------------------------------------------------------
// RATIONAL HELPERS
// -----------------------------------------------------------------------------

/// Builds a normalized rational from wide intermediates with a signed
/// denominator. Only safe for denominators derived from a single `u64`.
fn make_ratio(mut num: i128, mut den: i128) -> Value {
    if den < 0 {
        num = -num;
        den = -den;
    }
    make_ratio_wide(num, den as u128)
}

/// Builds a normalized rational from wide intermediates.
///
/// Reduces by gcd, collapses `num == 0` to `0/1` and `den == 0` to the
/// signed infinity sentinel. A reduced value that no longer fits the
/// 64-bit fields demotes to `Real`.
fn make_ratio_wide(num: i128, den: u128) -> Value {
    if den == 0 {
        return Value::Ratio {
            num: if num < 0 { -1 } else { 1 },
            den: 0,
        };
    }
    if num == 0 {
        return Value::ZERO;
    }

    let negative = num < 0;
    let g = gcd(num.unsigned_abs(), den);
    let n = num.unsigned_abs() / g;
    let d = den / g;

    let num_fits = if negative {
        n <= i64::MIN.unsigned_abs() as u128
    } else {
        n <= i64::MAX as u128
    };
    if num_fits && d <= u64::MAX as u128 {
        Value::Ratio {
            num: if negative { (n as u64).wrapping_neg() as i64 } else { n as i64 },
            den: d as u64,
        }
    } else {
        Value::Real(num as f64 / den as f64)
    }
}

/// Euclidean gcd on unsigned 128-bit integers.
fn gcd(mut a: u128, mut b: u128) -> u128 {
    while a > 0 {
        let t = b % a;
        b = a;
        a = t;
    }
    b
}

/// Floor division on wide integers, `b != 0`.
fn floor_div_i128(a: i128, b: i128) -> i128 {
    if b < 0 {
        (-a).div_euclid(-b)
    } else {
        a.div_euclid(b)
    }
}

/// Converts an already-floored float to an integer rational.
/// NaN stays real; infinities become the rational sentinel. Casting
/// saturates at the `i64` range.
fn int_from_floor(f: f64) -> Value {
    if f.is_nan() {
        Value::Real(f)
    } else if f.is_infinite() {
        Value::Ratio {
            num: if f < 0.0 { -1 } else { 1 },
            den: 0,
        }
    } else {
        Value::int(f as i64)
    }
}

/// Fast exponentiation of `num/den` by the integer `p`.
///
/// Squaring runs in 128-bit steps; `None` signals overflow, letting the
/// caller demote to a real power instead.
fn int_pow(num: i64, den: u64, p: i64) -> Option<Value> {
    let (mut num_step, mut den_step): (i128, i128);
    if p < 0 {
        // Invert the base, keeping the sign in the numerator.
        if num < 0 {
            num_step = -(den as i128);
            den_step = -(num as i128);
        } else {
            num_step = den as i128;
            den_step = num as i128;
        }
    } else {
        num_step = num as i128;
        den_step = den as i128;
    }

    let mut p = p.unsigned_abs();
    let mut num_pow: i128 = 1;
    let mut den_pow: i128 = 1;
    while p > 0 {
        if p & 1 == 1 {
            num_pow = num_pow.checked_mul(num_step)?;
            den_pow = den_pow.checked_mul(den_step)?;
        }
        p >>= 1;
        if p > 0 {
            num_step = num_step.checked_mul(num_step)?;
            den_step = den_step.checked_mul(den_step)?;
        }
    }
    Some(make_ratio(num_pow, den_pow))
}

// -----------------------------------------------------------------------------
// PRINTING
// -----------------------------------------------------------------------------

impl fmt::Display for Value {
    /// Prints `n` for integers, `n / d` for other rationals (including the
    /// `n / 0` infinity sentinel), and the shortest round-trip decimal for
    /// reals.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Ratio { num, den: 1 } => write!(f, "{}", num),
            Value::Ratio { num, den } => write!(f, "{} / {}", num, den),
            // `{:?}` keeps a trailing `.0` on integral reals, so printed
            // reals re-parse as reals.
            Value::Real(x) => write!(f, "{:?}", x),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
