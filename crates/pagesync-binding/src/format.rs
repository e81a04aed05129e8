//! Numeric display formatting for `{token:spec}` placeholders.
//!
//! | Spec | Meaning | Default precision |
//! |------|---------|-------------------|
//! | `D` | Integer (truncated), zero-padded to the precision | 0 |
//! | `F` | Fixed-point | 2 |
//! | `N` | Number (fixed-point, no group separators) | 2 |
//! | `P` | Percent (value × 100) | 2 |
//! | `E` / `e` | Exponential, three-digit signed exponent | 6 |
//! | `X` / `x` | Hexadecimal, zero-padded to the precision | 0 |
//!
//! `C`, `G` and `R` are recognised but unsupported. Anything that cannot be
//! formatted (non-numeric value, malformed precision, precision above
//! [`MAX_PRECISION`], negative hex) returns `None` and the caller falls back
//! to plain string conversion.

use serde_json::Value;

/// Largest precision a format specifier may request.
pub const MAX_PRECISION: usize = 99;

/// Format `value` according to `spec`, or `None` on failure.
#[must_use]
pub fn format_value(value: &Value, spec: &str) -> Option<String> {
    let mut chars = spec.chars();
    let kind = chars.next()?;
    let precision_text = chars.as_str();
    let precision = if precision_text.is_empty() {
        None
    } else {
        match precision_text.parse::<usize>() {
            Ok(p) if p <= MAX_PRECISION => Some(p),
            Ok(p) => {
                tracing::debug!(spec, precision = p, "format precision out of range");
                return None;
            }
            Err(_) => {
                tracing::debug!(spec, "malformed precision in format specifier");
                return None;
            }
        }
    };

    let number = value.as_f64()?;
    match kind {
        'D' | 'd' => Some(format_decimal(number, precision.unwrap_or(0))),
        'F' | 'f' | 'N' | 'n' => Some(format!("{:.*}", precision.unwrap_or(2), number)),
        'P' | 'p' => Some(format!("{:.*}%", precision.unwrap_or(2), number * 100.0)),
        'E' | 'e' => Some(format_exponential(number, precision.unwrap_or(6), kind == 'E')),
        'X' | 'x' => format_hex(number, precision.unwrap_or(0), kind == 'X'),
        'C' | 'c' | 'G' | 'g' | 'R' | 'r' => {
            tracing::debug!(spec, "unsupported format specifier");
            None
        }
        _ => {
            tracing::debug!(spec, "unknown format specifier");
            None
        }
    }
}

fn format_decimal(number: f64, digits: usize) -> String {
    let integer = number.trunc() as i64;
    let magnitude = integer.unsigned_abs();
    if integer < 0 {
        format!("-{magnitude:0digits$}")
    } else {
        format!("{magnitude:0digits$}")
    }
}

fn format_exponential(number: f64, digits: usize, upper: bool) -> String {
    let rendered = format!("{number:.digits$e}");
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let marker = if upper { 'E' } else { 'e' };
    format!("{mantissa}{marker}{sign}{:03}", exponent.unsigned_abs())
}

fn format_hex(number: f64, digits: usize, upper: bool) -> Option<String> {
    if number < 0.0 || number.fract() != 0.0 || !number.is_finite() {
        tracing::debug!(number, "hex formatting requires a non-negative integer");
        return None;
    }
    let integer = number as u64;
    Some(if upper {
        format!("{integer:0digits$X}")
    } else {
        format!("{integer:0digits$x}")
    })
}
