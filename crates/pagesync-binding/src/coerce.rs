//! Value coercions shared by token expansion and the expression evaluator.

use serde_json::Value;

/// Boolean coercion used for `!` tokens.
///
/// Absent and `null` are false; numbers are true when non-zero; strings are
/// true unless empty or `"false"` (any case); arrays are true when non-empty;
/// objects are always true.
#[must_use]
pub fn to_boolean(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

/// Plain string conversion used when interpolating tokens into text.
#[must_use]
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.as_f64().map_or_else(|| n.to_string(), format_f64),
        },
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Shortest float text; integral values print without a fraction.
#[must_use]
pub fn format_f64(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}
