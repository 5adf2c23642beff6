//! Transport-safe numeric coercion.
//!
//! JSON has no representation for NaN or ±Infinity, and numeric backends
//! hand back a zoo of scalar wrappers and arrays. [`safe_float`] folds all of
//! them into a [`SafeValue`]: a finite `f64`, `null`, or an ordered sequence.
//!
//! # Rules
//!
//! | Input | Result |
//! |-------|--------|
//! | finite scalar (int, float, bool) | `Number` |
//! | NaN, ±Inf | `Null` |
//! | numeric string (`" 3.5 "`) | `Number` |
//! | unparseable string, `Null` | `Null` |
//! | array with exactly one leaf | that leaf, as above |
//! | empty array | empty `Seq` |
//! | any other array | `Seq`, element-wise over the outer dimension |
//!
//! # Example
//!
//! ```
//! use u_attribution::sanitize::{safe_float, NumericValue, SafeValue};
//!
//! assert_eq!(safe_float(&NumericValue::Int(3)), SafeValue::Number(3.0));
//! assert_eq!(safe_float(&NumericValue::Float(f64::NAN)), SafeValue::Null);
//! assert_eq!(
//!     safe_float(&NumericValue::from(vec![1.0, f64::INFINITY])),
//!     SafeValue::Seq(vec![SafeValue::Number(1.0), SafeValue::Null]),
//! );
//! ```

use serde::Serialize;

/// A numeric value as produced by a numeric backend.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Float32(f32),
    Bool(bool),
    Text(String),
    Null,
    /// Possibly nested array; inner arrays are further dimensions.
    Array(Vec<NumericValue>),
}

impl NumericValue {
    /// Total number of scalar leaves, counting through nested arrays.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Array(items) => items.iter().map(Self::leaf_count).sum(),
            _ => 1,
        }
    }

    /// The single scalar leaf, if the value holds exactly one.
    fn single_leaf(&self) -> Option<&NumericValue> {
        match self {
            Self::Array(items) => items.iter().find(|i| i.leaf_count() == 1)?.single_leaf(),
            scalar => Some(scalar),
        }
    }

    /// Converts a scalar to `f64`. Arrays and unparseable text are `None`.
    fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Float32(v) => Some(f64::from(*v)),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Null | Self::Array(_) => None,
        }
    }
}

impl From<f64> for NumericValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for NumericValue {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<i64> for NumericValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for NumericValue {
    fn from(v: usize) -> Self {
        Self::UInt(v as u64)
    }
}

impl From<bool> for NumericValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for NumericValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<NumericValue>> From<Option<T>> for NumericValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<NumericValue>> From<Vec<T>> for NumericValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

/// A JSON-safe numeric value.
///
/// Serializes as a number, `null`, or an array of the same.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SafeValue {
    Number(f64),
    Null,
    Seq(Vec<SafeValue>),
}

impl SafeValue {
    /// The finite number, if this is a scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Sanitizes a numeric value for transport. See the module docs for rules.
pub fn safe_float(value: &NumericValue) -> SafeValue {
    if let NumericValue::Array(items) = value {
        if value.leaf_count() != 1 {
            return SafeValue::Seq(items.iter().map(safe_float).collect());
        }
    }
    match value.single_leaf().and_then(NumericValue::to_f64).and_then(finite) {
        Some(v) => SafeValue::Number(v),
        None => SafeValue::Null,
    }
}

/// Scalar chokepoint: `Some(v)` for finite `v`, `None` for NaN and ±Inf.
#[inline]
pub fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_scalars_pass_through() {
        assert_eq!(safe_float(&NumericValue::Int(3)), SafeValue::Number(3.0));
        assert_eq!(safe_float(&NumericValue::UInt(7)), SafeValue::Number(7.0));
        assert_eq!(safe_float(&2.5_f64.into()), SafeValue::Number(2.5));
        assert_eq!(safe_float(&0.5_f32.into()), SafeValue::Number(0.5));
        assert_eq!(safe_float(&true.into()), SafeValue::Number(1.0));
        assert_eq!(safe_float(&(-0.0_f64).into()), SafeValue::Number(-0.0));
    }

    #[test]
    fn non_finite_and_missing_become_null() {
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(safe_float(&v.into()), SafeValue::Null);
        }
        assert_eq!(safe_float(&f32::NAN.into()), SafeValue::Null);
        assert_eq!(safe_float(&NumericValue::Null), SafeValue::Null);
        assert_eq!(safe_float(&None::<f64>.into()), SafeValue::Null);
    }

    #[test]
    fn strings_parse_after_trimming() {
        assert_eq!(safe_float(&" 3.5 ".into()), SafeValue::Number(3.5));
        assert_eq!(safe_float(&"inf".into()), SafeValue::Null);
        assert_eq!(safe_float(&"nan".into()), SafeValue::Null);
        assert_eq!(safe_float(&"abc".into()), SafeValue::Null);
    }

    #[test]
    fn single_leaf_arrays_unwrap() {
        assert_eq!(safe_float(&vec![4.0].into()), SafeValue::Number(4.0));
        let nested = NumericValue::Array(vec![NumericValue::Array(vec![NumericValue::Int(9)])]);
        assert_eq!(safe_float(&nested), SafeValue::Number(9.0));
        assert_eq!(safe_float(&vec![f64::NAN].into()), SafeValue::Null);
    }

    #[test]
    fn multi_element_arrays_map_in_order() {
        let v: NumericValue = vec![Some(-1.96), None, Some(f64::NAN), Some(1.96)].into();
        assert_eq!(
            safe_float(&v),
            SafeValue::Seq(vec![
                SafeValue::Number(-1.96),
                SafeValue::Null,
                SafeValue::Null,
                SafeValue::Number(1.96),
            ])
        );
    }

    #[test]
    fn two_dimensional_arrays_map_outer_dimension() {
        let v: NumericValue = vec![vec![1.0, 2.0], vec![3.0, f64::INFINITY]].into();
        assert_eq!(
            safe_float(&v),
            SafeValue::Seq(vec![
                SafeValue::Seq(vec![SafeValue::Number(1.0), SafeValue::Number(2.0)]),
                SafeValue::Seq(vec![SafeValue::Number(3.0), SafeValue::Null]),
            ])
        );
    }

    #[test]
    fn empty_array_is_empty_sequence() {
        assert_eq!(safe_float(&Vec::<f64>::new().into()), SafeValue::Seq(vec![]));
    }

    #[test]
    fn serializes_to_json_safe_values() {
        let v = safe_float(&vec![Some(1.5), None, Some(f64::NAN)].into());
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1.5,null,null]");
        assert_eq!(serde_json::to_string(&SafeValue::Null).unwrap(), "null");
    }

    #[test]
    fn finite_helper() {
        assert_eq!(finite(1.0), Some(1.0));
        assert_eq!(finite(f64::NAN), None);
        assert_eq!(finite(f64::NEG_INFINITY), None);
    }
}
