use crate::common::*;
use crate::error::EvaluationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A term total. Integer arithmetic stays integral until a division leaves a remainder.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(Int),
    Float(Float),
}

impl Number {
    pub(crate) const ZERO: Self = Self::Int(0);

    pub fn as_int(self) -> Int {
        match self {
            Self::Int(x) => x,
            Self::Float(x) => x as Int,
        }
    }

    pub fn as_float(self) -> Float {
        match self {
            Self::Int(x) => x as Float,
            Self::Float(x) => x,
        }
    }

    /// The integer value, if this number has no fractional part.
    pub fn to_whole(self) -> Option<Int> {
        match self {
            Self::Int(x) => Some(x),
            // 2^63 itself does not fit
            Self::Float(x) if x.fract() == 0.0 && x >= Int::MIN as Float && x < -(Int::MIN as Float) => {
                Some(x as Int)
            }
            Self::Float(_) => None,
        }
    }

    pub(crate) fn normalize(self) -> Self {
        match self.to_whole() {
            Some(x) => Self::Int(x),
            None => self,
        }
    }

    pub fn checked_div(self, rhs: Self) -> Result<Self, EvaluationError> {
        if rhs == Self::ZERO {
            return Err(EvaluationError::DivisionByZero);
        }
        Ok(match (self, rhs) {
            (Self::Int(x), Self::Int(y)) => match (x.checked_rem(y), x.checked_div(y)) {
                (Some(0), Some(q)) => Self::Int(q),
                _ => Self::Float(x as Float / y as Float).normalize(),
            },
            (x, y) => Self::Float(x.as_float() / y.as_float()).normalize(),
        })
    }

    pub fn checked_rem(self, rhs: Self) -> Result<Self, EvaluationError> {
        if rhs == Self::ZERO {
            return Err(EvaluationError::DivisionByZero);
        }
        Ok(match (self, rhs) {
            (Self::Int(x), Self::Int(y)) => match x.checked_rem(y) {
                Some(r) => Self::Int(r),
                None => Self::ZERO,
            },
            (x, y) => Self::Float(x.as_float() % y.as_float()).normalize(),
        })
    }

    pub fn apply(self, op: Operator, rhs: Self) -> Result<Self, EvaluationError> {
        Ok(match op {
            Operator::Add => self + rhs,
            Operator::Sub => self - rhs,
            Operator::Mul => self * rhs,
            Operator::Div => return self.checked_div(rhs),
            Operator::Rem => return self.checked_rem(rhs),
        })
    }
}

impl Default for Number {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::ops::Neg for Number {
    type Output = Self;

    fn neg(self) -> Self::Output {
        match self {
            Self::Int(x) => match x.checked_neg() {
                Some(x) => Self::Int(x),
                None => Self::Float(-(x as Float)),
            },
            Self::Float(x) => Self::Float(-x),
        }
    }
}

/// Integer operands stay integral unless the result overflows `Int`.
macro_rules! val_impl_bin_op {
    ($Name:ident, $fn_name:ident, $checked:ident) => {
        impl std::ops::$Name for Number {
            type Output = Self;

            fn $fn_name(self, rhs: Self) -> Self::Output {
                match (self, rhs) {
                    (Self::Int(x), Self::Int(y)) => match x.$checked(y) {
                        Some(z) => Self::Int(z),
                        None => Self::Float(std::ops::$Name::$fn_name(x as Float, y as Float)),
                    },
                    (x, y) => {
                        Self::Float(std::ops::$Name::$fn_name(x.as_float(), y.as_float())).normalize()
                    }
                }
            }
        }
    };
}

val_impl_bin_op!(Add, add, checked_add);
val_impl_bin_op!(Sub, sub, checked_sub);
val_impl_bin_op!(Mul, mul, checked_mul);

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(x), Self::Int(y)) => x == y,
            _ => self.as_float().eq(&other.as_float()),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Int(x), Self::Int(y)) => x.partial_cmp(y),
            _ => self.as_float().partial_cmp(&other.as_float()),
        }
    }
}

impl From<Int> for Number {
    fn from(x: Int) -> Self {
        Self::Int(x)
    }
}

impl From<Float> for Number {
    fn from(x: Float) -> Self {
        Self::Float(x).normalize()
    }
}

impl std::iter::Sum for Number {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |a, b| a + b)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(x) => fmt::Display::fmt(x, f),
            Self::Float(x) => fmt::Display::fmt(x, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        assert_eq!(Number::Int(2) + Number::Int(3), Number::Int(5));
        assert!(matches!(Number::Int(6).checked_div(Number::Int(3)), Ok(Number::Int(2))));
        assert!(matches!(Number::Int(7).checked_rem(Number::Int(4)), Ok(Number::Int(3))));
    }

    #[test]
    fn test_division_produces_floats() {
        assert_eq!(Number::Int(5).checked_div(Number::Int(2)), Ok(Number::Float(2.5)));
        assert_eq!(Number::Float(1.5) * Number::Int(2), Number::Int(3));
        assert_eq!(Number::Float(2.5).to_string(), "2.5");
        assert_eq!(Number::from(4.0).to_string(), "4");
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(Number::Int(1).checked_div(Number::ZERO), Err(EvaluationError::DivisionByZero));
        assert_eq!(Number::Int(1).checked_rem(Number::Float(0.0)), Err(EvaluationError::DivisionByZero));
    }

    #[test]
    fn test_overflow_widens_to_float() {
        let max = Number::Int(Int::MAX);
        assert_eq!(max + Number::Int(1), Number::Float(9223372036854775808.0));
        assert!(matches!(max + Number::Int(1), Number::Float(_)));
        assert!(matches!(Number::Int(Int::MIN) - Number::Int(1), Number::Float(_)));
        assert!(matches!(max * Number::Int(2), Number::Float(_)));
        assert!(matches!(-Number::Int(Int::MIN), Number::Float(_)));

        let quotient = Number::Int(Int::MIN).checked_div(Number::Int(-1)).unwrap();
        assert!(matches!(quotient, Number::Float(x) if x == 9223372036854775808.0));
        assert_eq!(Number::Int(Int::MIN).checked_rem(Number::Int(-1)), Ok(Number::Int(0)));
    }

    #[test]
    fn test_out_of_range_floats_stay_floats() {
        let product = Number::Float(10000000000.5) * Number::Int(10000000000);
        assert!(matches!(product, Number::Float(_)));
        assert_eq!(product.to_whole(), None);
        assert_eq!(Number::Float(Float::INFINITY).to_whole(), None);
        assert_eq!(Number::Float(-9223372036854775808.0).to_whole(), Some(Int::MIN));
    }

    #[test]
    fn test_serde_untagged() {
        assert_eq!(serde_json::to_string(&Number::Int(3)).unwrap(), "3");
        assert_eq!(serde_json::from_str::<Number>("2.5").unwrap(), Number::Float(2.5));
        assert!(matches!(serde_json::from_str::<Number>("7").unwrap(), Number::Int(7)));
    }
}
