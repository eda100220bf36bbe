//! Equality strategies used to decide whether a watched value changed.
//!
//! Each watcher picks one [`Comparison`] at registration time.

use crate::value::Value;

/// How a watcher compares a freshly computed value with the last recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparison {
    /// Identity for arrays and objects, content for primitives; `NaN` equals `NaN`.
    #[default]
    Reference,
    /// Canonical serialized form. The recorded value is a deep snapshot.
    Structural,
}

impl Comparison {
    /// Returns true if `new` and `old` count as unchanged under this strategy.
    pub fn are_equal(self, new: &Value, old: &Value) -> bool {
        match self {
            Comparison::Reference => reference_eq(new, old),
            Comparison::Structural => structural_eq(new, old),
        }
    }

    /// The value to record as the watcher's last value.
    pub fn snapshot(self, value: &Value) -> Value {
        match self {
            Comparison::Reference => value.clone(),
            Comparison::Structural => value.deep_copy(),
        }
    }
}

/// Reference equality, with `NaN` treated as equal to itself.
///
/// ```
/// use scope_flow::{equality::reference_eq, Value};
///
/// assert!(reference_eq(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
///
/// let a = Value::array([1, 2]);
/// assert!(reference_eq(&a, &a.clone()));
/// assert!(!reference_eq(&a, &Value::array([1, 2])));
/// ```
pub fn reference_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        _ => false,
    }
}

/// Structural equality by canonical serialized form.
///
/// Inherits the gaps of serialization: `Undefined` object members are
/// ignored and non-finite numbers serialize like `Null`.
pub fn structural_eq(a: &Value, b: &Value) -> bool {
    a.to_json() == b.to_json()
}
