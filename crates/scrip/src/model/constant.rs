use std::{cmp::Ordering, fmt};

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConstantArithmeticError {
    #[error("operation only defined for integral types")]
    MustBeIntegral,
    #[error("division by zero")]
    DivideByZero,
    #[error("NaN comparison")]
    NaNComparison,
    #[error("bad shift (shift amount is negative or too large)")]
    BadShift,
}

/// Numeric literal value: scripts only know integers and single floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f32),
}

impl Constant {
    pub fn is_float(&self) -> bool {
        matches!(self, Constant::Float(_))
    }

    pub fn nonzero(&self) -> bool {
        match self {
            Constant::Int(x) => *x != 0,
            Constant::Float(x) => *x != 0.0f32,
        }
    }

    // integers convert to nearest float, which is also what a script VM does
    pub fn to_float(&self) -> f32 {
        match self {
            Constant::Int(v) => *v as f32,
            Constant::Float(v) => *v,
        }
    }

    // truncates toward zero
    pub fn to_int(&self) -> i64 {
        match self {
            Constant::Int(v) => *v,
            Constant::Float(v) => *v as i64,
        }
    }

    /// Minimum number of bits needed to hold the value in two's complement.
    /// Floats have no minimum: any float slot holds any float literal.
    pub fn min_bits(&self) -> u32 {
        match self {
            Constant::Int(v) => 64 - (v ^ (v >> 63)).leading_zeros() + 1,
            Constant::Float(_) => 0,
        }
    }

    fn promote(lhs: Self, rhs: Self) -> (Self, Self) {
        if lhs.is_float() || rhs.is_float() {
            (
                Constant::Float(lhs.to_float()),
                Constant::Float(rhs.to_float()),
            )
        } else {
            (lhs, rhs)
        }
    }

    pub fn add(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        match Self::promote(lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a.wrapping_add(b))),
            (a, b) => Ok(Constant::Float(a.to_float() + b.to_float())),
        }
    }

    pub fn sub(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        match Self::promote(lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a.wrapping_sub(b))),
            (a, b) => Ok(Constant::Float(a.to_float() - b.to_float())),
        }
    }

    pub fn mul(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        match Self::promote(lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a.wrapping_mul(b))),
            (a, b) => Ok(Constant::Float(a.to_float() * b.to_float())),
        }
    }

    pub fn div(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        match Self::promote(lhs, rhs) {
            (Constant::Int(_), Constant::Int(0)) => Err(ConstantArithmeticError::DivideByZero),
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a.wrapping_div(b))),
            (a, b) => Ok(Constant::Float(a.to_float() / b.to_float())),
        }
    }

    pub fn modulo(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        match (lhs, rhs) {
            (Constant::Int(_), Constant::Int(0)) => Err(ConstantArithmeticError::DivideByZero),
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a.wrapping_rem(b))),
            _ => Err(ConstantArithmeticError::MustBeIntegral),
        }
    }

    pub fn bit_and(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        match (lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a & b)),
            _ => Err(ConstantArithmeticError::MustBeIntegral),
        }
    }

    pub fn bit_or(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        match (lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a | b)),
            _ => Err(ConstantArithmeticError::MustBeIntegral),
        }
    }

    pub fn bit_xor(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        match (lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a ^ b)),
            _ => Err(ConstantArithmeticError::MustBeIntegral),
        }
    }

    fn shift_amount(rhs: Self) -> Result<u32, ConstantArithmeticError> {
        match rhs {
            Constant::Int(b) if (0..64).contains(&b) => Ok(b as u32),
            Constant::Int(_) => Err(ConstantArithmeticError::BadShift),
            Constant::Float(_) => Err(ConstantArithmeticError::MustBeIntegral),
        }
    }

    pub fn lshift(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        let amount = Self::shift_amount(rhs)?;
        match lhs {
            Constant::Int(a) => Ok(Constant::Int(a << amount)),
            Constant::Float(_) => Err(ConstantArithmeticError::MustBeIntegral),
        }
    }

    pub fn rshift(lhs: Self, rhs: Self) -> Result<Self, ConstantArithmeticError> {
        let amount = Self::shift_amount(rhs)?;
        match lhs {
            Constant::Int(a) => Ok(Constant::Int(a >> amount)),
            Constant::Float(_) => Err(ConstantArithmeticError::MustBeIntegral),
        }
    }

    pub fn ord(lhs: Self, rhs: Self) -> Result<Ordering, ConstantArithmeticError> {
        match Self::promote(lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Ord::cmp(&a, &b)),
            (a, b) => PartialOrd::partial_cmp(&a.to_float(), &b.to_float())
                .ok_or(ConstantArithmeticError::NaNComparison),
        }
    }

    pub fn neg(&self) -> Self {
        match self {
            Constant::Int(a) => Constant::Int(a.wrapping_neg()),
            Constant::Float(a) => Constant::Float(-a),
        }
    }

    pub fn bit_not(&self) -> Result<Self, ConstantArithmeticError> {
        match self {
            Constant::Int(v) => Ok(Constant::Int(!v)),
            Constant::Float(_) => Err(ConstantArithmeticError::MustBeIntegral),
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Constant::Int(value as i64)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{v:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_bits() {
        assert_eq!(Constant::Int(0).min_bits(), 1);
        assert_eq!(Constant::Int(127).min_bits(), 8);
        assert_eq!(Constant::Int(128).min_bits(), 9);
        assert_eq!(Constant::Int(-128).min_bits(), 8);
        assert_eq!(Constant::Int(-129).min_bits(), 9);
        assert_eq!(Constant::Int(i32::MAX as i64).min_bits(), 32);
        assert_eq!(Constant::Float(1.5).min_bits(), 0);
    }

    #[test]
    fn test_promotion() {
        assert_eq!(
            Constant::add(Constant::Int(1), Constant::Float(0.5)),
            Ok(Constant::Float(1.5))
        );
        assert_eq!(
            Constant::div(Constant::Int(7), Constant::Int(2)),
            Ok(Constant::Int(3))
        );
        assert_eq!(
            Constant::div(Constant::Int(7), Constant::Int(0)),
            Err(ConstantArithmeticError::DivideByZero)
        );
        assert_eq!(
            Constant::modulo(Constant::Float(7.0), Constant::Int(2)),
            Err(ConstantArithmeticError::MustBeIntegral)
        );
    }

    #[test]
    fn test_shifts() {
        assert_eq!(
            Constant::lshift(Constant::Int(1), Constant::Int(4)),
            Ok(Constant::Int(16))
        );
        assert_eq!(
            Constant::rshift(Constant::Int(1), Constant::Int(-1)),
            Err(ConstantArithmeticError::BadShift)
        );
    }
}
