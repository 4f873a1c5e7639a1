//! Lexical type coercion for extracted values.
//!
//! A raw JSON value becomes a typed [`FieldValue`] only when it matches the
//! pattern for its declared [`FieldKind`]; anything else is `Null`.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use serde_json::Value;

static INTEGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+$").expect("Invalid integer pattern"));
static DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("Invalid decimal pattern"));
static CONFIDENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)%?").expect("Invalid confidence pattern"));

/// Scale used for the derived confidence percentage
const CONFIDENCE_SCALE: u32 = 2;

/// Declared type of an extracted column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Bool,
    Integer,
    /// Fixed-point number rounded to `scale` decimal places
    Decimal { scale: u32 },
    /// Calendar date, `YYYY-MM-DD`
    Date,
    /// Leading numeric score pulled out of free-text confidence
    ConfidencePct,
}

impl FieldKind {
    /// SQLite column type used for this kind
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Date => "TEXT",
            FieldKind::Bool | FieldKind::Integer => "INTEGER",
            FieldKind::Decimal { .. } | FieldKind::ConfidencePct => "REAL",
        }
    }
}

/// A typed, nullable extracted value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// The value as SQLite stores it; used to compare against persisted columns.
    pub fn to_sql_value(&self) -> SqlValue {
        match self {
            FieldValue::Null => SqlValue::Null,
            FieldValue::Text(s) => SqlValue::Text(s.clone()),
            FieldValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
            FieldValue::Integer(i) => SqlValue::Integer(*i),
            FieldValue::Decimal(f) => SqlValue::Real(*f),
            FieldValue::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(self.to_sql_value()))
    }
}

/// Coerce an optional raw value to `kind`. `None` and JSON `null` give `Null`.
pub fn coerce(raw: Option<&Value>, kind: FieldKind) -> FieldValue {
    let Some(raw) = raw else {
        return FieldValue::Null;
    };

    let coerced = match kind {
        FieldKind::Text => raw.as_str().map(|s| FieldValue::Text(s.to_string())),
        FieldKind::Bool => raw.as_bool().map(FieldValue::Bool),
        FieldKind::Integer => coerce_integer(raw).map(FieldValue::Integer),
        FieldKind::Decimal { scale } => coerce_decimal(raw)
            .map(|v| round_to(v, scale))
            .filter(|v| v.is_finite())
            .map(FieldValue::Decimal),
        FieldKind::Date => raw.as_str().and_then(parse_date).map(FieldValue::Date),
        FieldKind::ConfidencePct => confidence_pct(raw)
            .map(|v| round_to(v, CONFIDENCE_SCALE))
            .filter(|v| v.is_finite())
            .map(FieldValue::Decimal),
    };

    coerced.unwrap_or(FieldValue::Null)
}

fn coerce_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            let in_range = f >= i64::MIN as f64 && f <= i64::MAX as f64;
            (f.is_finite() && f.fract() == 0.0 && in_range).then_some(f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            if INTEGER_RE.is_match(s) {
                s.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

fn coerce_decimal(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if !DECIMAL_RE.is_match(s) {
                return None;
            }
            s.parse().ok()?
        }
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let head = s.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Pull the first numeric token (optionally followed by `%`) out of confidence text.
///
/// `"85% confidence - strong setup"` gives 85, `"0% confidence - Data Unavailable"`
/// gives 0, text without digits gives `None`. A bare JSON number is taken as-is.
pub fn confidence_pct(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => CONFIDENCE_RE
            .captures(s)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok()),
        _ => None,
    }
}

fn round_to(value: f64, scale: u32) -> f64 {
    let factor = 10f64.powi(scale as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_requires_string() {
        assert_eq!(
            coerce(Some(&json!("LONG")), FieldKind::Text),
            FieldValue::Text("LONG".to_string())
        );
        assert_eq!(coerce(Some(&json!(42)), FieldKind::Text), FieldValue::Null);
        assert_eq!(coerce(None, FieldKind::Text), FieldValue::Null);
        assert_eq!(coerce(Some(&Value::Null), FieldKind::Text), FieldValue::Null);
    }

    #[test]
    fn test_bool_only_native() {
        assert_eq!(coerce(Some(&json!(true)), FieldKind::Bool), FieldValue::Bool(true));
        assert_eq!(coerce(Some(&json!("true")), FieldKind::Bool), FieldValue::Null);
        assert_eq!(coerce(Some(&json!(1)), FieldKind::Bool), FieldValue::Null);
    }

    #[test]
    fn test_integer_patterns() {
        assert_eq!(coerce(Some(&json!(12)), FieldKind::Integer), FieldValue::Integer(12));
        assert_eq!(coerce(Some(&json!("40")), FieldKind::Integer), FieldValue::Integer(40));
        assert_eq!(coerce(Some(&json!(" -3 ")), FieldKind::Integer), FieldValue::Integer(-3));
        assert_eq!(coerce(Some(&json!(100.0)), FieldKind::Integer), FieldValue::Integer(100));
        assert_eq!(coerce(Some(&json!(2.5)), FieldKind::Integer), FieldValue::Null);
        assert_eq!(coerce(Some(&json!("12 contracts")), FieldKind::Integer), FieldValue::Null);
        assert_eq!(coerce(Some(&json!("N/A")), FieldKind::Integer), FieldValue::Null);
    }

    #[test]
    fn test_decimal_patterns_and_scale() {
        let kind = FieldKind::Decimal { scale: 2 };
        assert_eq!(coerce(Some(&json!(10.456)), kind), FieldValue::Decimal(10.46));
        assert_eq!(coerce(Some(&json!("7.5")), kind), FieldValue::Decimal(7.5));
        assert_eq!(coerce(Some(&json!("$1,200")), kind), FieldValue::Null);
        assert_eq!(coerce(Some(&json!("Data unavailable")), kind), FieldValue::Null);
        assert_eq!(coerce(Some(&json!(true)), kind), FieldValue::Null);
    }

    #[test]
    fn test_overflow_on_rounding_is_null() {
        let price = FieldKind::Decimal { scale: 4 };
        assert_eq!(coerce(Some(&json!(1.7e308)), price), FieldValue::Null);
        assert_eq!(coerce(Some(&json!(-1.7e308)), price), FieldValue::Null);

        let huge = format!("{}% confidence", "9".repeat(400));
        assert_eq!(coerce(Some(&json!(huge)), FieldKind::ConfidencePct), FieldValue::Null);
        assert_eq!(coerce(Some(&json!(1.7e308)), FieldKind::ConfidencePct), FieldValue::Null);
    }

    #[test]
    fn test_zero_is_not_null() {
        let kind = FieldKind::Decimal { scale: 4 };
        assert_eq!(coerce(Some(&json!(0)), kind), FieldValue::Decimal(0.0));
        assert_eq!(coerce(Some(&json!("0")), FieldKind::Integer), FieldValue::Integer(0));
    }

    #[test]
    fn test_date_parsing() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 17).unwrap();
        assert_eq!(
            coerce(Some(&json!("2025-01-17")), FieldKind::Date),
            FieldValue::Date(expected)
        );
        assert_eq!(
            coerce(Some(&json!("2025-01-17T00:00:00Z")), FieldKind::Date),
            FieldValue::Date(expected)
        );
        assert_eq!(coerce(Some(&json!("next friday")), FieldKind::Date), FieldValue::Null);
        assert_eq!(coerce(Some(&json!("2025-13-01")), FieldKind::Date), FieldValue::Null);
    }

    #[test]
    fn test_confidence_extraction() {
        let kind = FieldKind::ConfidencePct;
        assert_eq!(
            coerce(Some(&json!("85% confidence - strong setup")), kind),
            FieldValue::Decimal(85.0)
        );
        assert_eq!(
            coerce(Some(&json!("0% confidence - Data Unavailable")), kind),
            FieldValue::Decimal(0.0)
        );
        assert_eq!(coerce(Some(&json!("62.5%")), kind), FieldValue::Decimal(62.5));
        assert_eq!(coerce(Some(&json!("High confidence")), kind), FieldValue::Null);
        assert_eq!(coerce(Some(&json!(70)), kind), FieldValue::Decimal(70.0));
        assert_eq!(coerce(Some(&json!("")), kind), FieldValue::Null);
    }

    #[test]
    fn test_sql_value_mapping() {
        assert_eq!(FieldValue::Bool(true).to_sql_value(), SqlValue::Integer(1));
        assert_eq!(
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()).to_sql_value(),
            SqlValue::Text("2024-06-21".to_string())
        );
        assert_eq!(FieldValue::Null.to_sql_value(), SqlValue::Null);
    }
}
