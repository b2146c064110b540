//! Numeric tower.
//!
//! Arithmetic lifts every operand to an exact [`Decimal`], computes exactly and then
//! reduces the result to the narrowest [`Number`] representation that preserves it:
//!
//! 1. a whole value becomes `Int` when it fits in `i64`, otherwise an exact `Big`
//!    integer (scale 0);
//! 2. a fractional value becomes `Float` when its `f64` conversion is finite,
//!    otherwise a `Big` decimal with trailing zeros stripped.
//!
//! Floats are lifted through their shortest round-trip decimal expansion, so
//! `(+ 0.5 0.6)` is exactly `1.1`. Division is the one inexact operation: quotients are
//! rounded half away from zero at [`DIVISION_SCALE`] fractional digits.

use crate::Error;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Fractional digits kept by division
pub const DIVISION_SCALE: u32 = 32;

/// Arbitrary-precision decimal: `unscaled * 10^-scale`
#[derive(Clone)]
pub struct Decimal {
    unscaled: BigInt,
    scale: i32,
}

fn ten_pow(exp: u32) -> BigInt {
    BigInt::from(10u32).pow(exp)
}

/// Exponent distance between two scales, as accepted by [`ten_pow`]
fn scale_gap(high: i32, low: i32) -> u32 {
    u32::try_from(i64::from(high) - i64::from(low)).unwrap_or(u32::MAX)
}

impl Decimal {
    pub fn new(unscaled: BigInt, scale: i32) -> Self {
        Decimal { unscaled, scale }
    }

    pub fn zero() -> Self {
        Decimal::new(BigInt::zero(), 0)
    }

    pub fn from_i64(n: i64) -> Self {
        Decimal::new(BigInt::from(n), 0)
    }

    /// Exact decimal expansion of the shortest representation that round-trips to `x`.
    /// Returns `None` for NaN and the infinities.
    pub fn from_f64(x: f64) -> Option<Self> {
        if !x.is_finite() {
            return None;
        }
        Decimal::parse(&format!("{x:e}"))
    }

    /// Parse plain or scientific decimal notation (`-12.5`, `1.5e-3`, `7E10`)
    pub fn parse(text: &str) -> Option<Self> {
        let (mantissa, exponent) = match text.find(['e', 'E']) {
            Some(pos) => (&text[..pos], text[pos + 1..].parse::<i32>().ok()?),
            None => (text, 0),
        };
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (mantissa, ""),
        };
        if !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let digits_present = int_part.chars().any(|c| c.is_ascii_digit()) || !frac_part.is_empty();
        if !digits_present {
            return None;
        }

        let mut digits = int_part.to_owned();
        if matches!(digits.as_str(), "" | "-" | "+") {
            digits.push('0');
        }
        digits.push_str(frac_part);
        let unscaled: BigInt = digits.parse().ok()?;
        let scale = i32::try_from(frac_part.len()).ok()?.checked_sub(exponent)?;
        Some(Decimal::new(unscaled, scale))
    }

    /// Nearest `f64`; values beyond the `f64` range become infinite
    pub fn to_f64(&self) -> f64 {
        format!("{}e{}", self.unscaled, -i64::from(self.scale))
            .parse()
            .unwrap_or(f64::NAN)
    }

    pub fn is_zero(&self) -> bool {
        self.unscaled.is_zero()
    }

    pub fn is_integer(&self) -> bool {
        self.scale <= 0 || (&self.unscaled % ten_pow(scale_gap(self.scale, 0))).is_zero()
    }

    /// The value as an integer, if it has no fractional part
    pub fn to_integer(&self) -> Option<BigInt> {
        if self.scale <= 0 {
            return Some(&self.unscaled * ten_pow(scale_gap(0, self.scale)));
        }
        let divisor = ten_pow(scale_gap(self.scale, 0));
        if (&self.unscaled % &divisor).is_zero() {
            Some(&self.unscaled / divisor)
        } else {
            None
        }
    }

    /// Same value with the smallest scale that represents it exactly
    pub fn strip_trailing_zeros(&self) -> Decimal {
        if self.unscaled.is_zero() {
            return Decimal::zero();
        }
        let ten = BigInt::from(10u32);
        let mut unscaled = self.unscaled.clone();
        let mut scale = self.scale;
        while (&unscaled % &ten).is_zero() {
            unscaled /= &ten;
            scale -= 1;
        }
        Decimal::new(unscaled, scale)
    }

    /// Both unscaled values brought to the larger of the two scales
    fn aligned(&self, other: &Decimal) -> (BigInt, BigInt, i32) {
        let scale = self.scale.max(other.scale);
        let lhs = &self.unscaled * ten_pow(scale_gap(scale, self.scale));
        let rhs = &other.unscaled * ten_pow(scale_gap(scale, other.scale));
        (lhs, rhs, scale)
    }

    /// Quotient rounded half away from zero to `scale` fractional digits.
    /// Returns `None` when `divisor` is zero.
    pub fn checked_div(&self, divisor: &Decimal, scale: u32) -> Option<Decimal> {
        if divisor.is_zero() {
            return None;
        }
        let result_scale = i32::try_from(scale).ok()?;

        // unscaled result = self.unscaled * 10^(scale + divisor.scale - self.scale) / divisor.unscaled
        let shift = i64::from(result_scale) + i64::from(divisor.scale) - i64::from(self.scale);
        let (numerator, denominator) = if shift >= 0 {
            (
                &self.unscaled * ten_pow(u32::try_from(shift).ok()?),
                divisor.unscaled.clone(),
            )
        } else {
            (
                self.unscaled.clone(),
                &divisor.unscaled * ten_pow(u32::try_from(-shift).ok()?),
            )
        };

        let mut quotient = &numerator / &denominator;
        let remainder = &numerator % &denominator;
        if remainder.abs() * 2 >= denominator.abs() {
            if numerator.is_negative() == denominator.is_negative() {
                quotient += 1;
            } else {
                quotient -= 1;
            }
        }
        Some(Decimal::new(quotient, result_scale))
    }
}

impl Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        let (lhs, rhs, scale) = self.aligned(&rhs);
        Decimal::new(lhs + rhs, scale)
    }
}

impl Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        let (lhs, rhs, scale) = self.aligned(&rhs);
        Decimal::new(lhs - rhs, scale)
    }
}

impl Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal::new(
            self.unscaled * rhs.unscaled,
            self.scale.saturating_add(rhs.scale),
        )
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let (lhs, rhs, _) = self.aligned(other);
        lhs == rhs
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unscaled.is_zero() {
            return write!(f, "0");
        }
        if self.scale <= 0 {
            let zeros = "0".repeat(scale_gap(0, self.scale) as usize);
            return write!(f, "{}{zeros}", self.unscaled);
        }

        let sign = if self.unscaled.is_negative() { "-" } else { "" };
        let mut digits = self.unscaled.abs().to_string();
        let scale = self.scale as usize;
        if digits.len() <= scale {
            digits.insert_str(0, &"0".repeat(scale + 1 - digits.len()));
        }
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({self})")
    }
}

/// A numeric atom
#[derive(Clone, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
    /// Exact value outside the range of the other two representations
    Big(Decimal),
}

impl Number {
    /// Narrowest representation of `value`
    pub fn reduce(value: Decimal) -> Number {
        if let Some(integer) = value.to_integer() {
            return match integer.to_i64() {
                Some(n) => Number::Int(n),
                None => Number::Big(Decimal::new(integer, 0)),
            };
        }
        let float = value.to_f64();
        if float.is_finite() {
            Number::Float(float)
        } else {
            Number::Big(value.strip_trailing_zeros())
        }
    }

    /// Exact decimal value. Non-finite floats have none and are a type error.
    pub fn to_decimal(&self) -> Result<Decimal, Error> {
        match self {
            Number::Int(n) => Ok(Decimal::from_i64(*n)),
            Number::Float(x) => Decimal::from_f64(*x)
                .ok_or_else(|| Error::TypeError(format!("cannot do exact arithmetic on {x}"))),
            Number::Big(d) => Ok(d.clone()),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Number::Int(n) => *n as f64,
            Number::Float(x) => *x,
            Number::Big(d) => d.to_f64(),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            // Shortest round-trip form, always with a decimal point or exponent
            Number::Float(x) => write!(f, "{x:?}"),
            Number::Big(d) => write!(f, "{d}"),
        }
    }
}

impl fmt::Debug for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "Int({n})"),
            Number::Float(x) => write!(f, "Float({x:?})"),
            Number::Big(d) => write!(f, "Big({d})"),
        }
    }
}

/// `numbers` summed from zero
pub fn sum<'a>(numbers: impl IntoIterator<Item = &'a Number>) -> Result<Number, Error> {
    let mut total = Decimal::zero();
    for n in numbers {
        total = total + n.to_decimal()?;
    }
    Ok(Number::reduce(total))
}

/// `numbers` multiplied together, starting from one
pub fn product<'a>(numbers: impl IntoIterator<Item = &'a Number>) -> Result<Number, Error> {
    let mut total = Decimal::from_i64(1);
    for n in numbers {
        total = total * n.to_decimal()?;
    }
    Ok(Number::reduce(total))
}

/// `first` minus each of `rest` in turn
pub fn difference<'a>(
    first: &Number,
    rest: impl IntoIterator<Item = &'a Number>,
) -> Result<Number, Error> {
    let mut total = first.to_decimal()?;
    for n in rest {
        total = total - n.to_decimal()?;
    }
    Ok(Number::reduce(total))
}

/// `first` divided by each of `rest` in turn
pub fn quotient<'a>(
    first: &Number,
    rest: impl IntoIterator<Item = &'a Number>,
) -> Result<Number, Error> {
    let mut total = first.to_decimal()?;
    for n in rest {
        total = total
            .checked_div(&n.to_decimal()?, DIVISION_SCALE)
            .ok_or_else(|| Error::EvalError("Division by zero".to_owned()))?;
    }
    Ok(Number::reduce(total))
}
