// src/tree/compare.rs

//! Payload coercion for comparison operators and value modifiers.
//!
//! Two payloads are compared in the first domain both convert into:
//! numeric, then temporal, then boolean, falling back to their text form.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::types::{Logical, Operator, ValueKind};

/// Numeric view of a payload. Numeric strings count.
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Temporal view of a payload: RFC 3339, `YYYY-MM-DD HH:MM:SS` or a plain date.
pub fn to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let Value::String(s) = value else {
        return None;
    };
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" => Some(true),
            "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Order two payloads using the first domain both fit into.
pub fn order(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (to_f64(a), to_f64(b)) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (to_datetime(a), to_datetime(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (to_bool(a), to_bool(b)) {
        return Some(x.cmp(&y));
    }
    Some(to_text(a).cmp(&to_text(b)))
}

/// Apply a comparison operator to one pair. `None` for non-comparison
/// operators or incomparable numbers (NaN).
pub fn compare_pair(op: Operator, a: &Value, b: &Value) -> Option<bool> {
    let ordering = order(a, b)?;
    let decided = match op {
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        _ => return None,
    };
    Some(decided)
}

/// Chain `op` across all payloads left to right: `a op b` and `b op c` ...
///
/// Unknown while any payload is missing.
pub fn compare_all(op: Operator, payloads: &[Option<Value>]) -> Logical {
    let mut values = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match payload {
            Some(v) => values.push(v),
            None => return Logical::Unknown,
        }
    }
    if values.len() < 2 {
        return Logical::Unknown;
    }
    let mut outcome = true;
    for pair in values.windows(2) {
        match compare_pair(op, pair[0], pair[1]) {
            Some(true) => {}
            Some(false) => outcome = false,
            None => return Logical::Unknown,
        }
    }
    Logical::from_bool(outcome)
}

/// Convert a payload for a value modifier. `None` when it does not convert.
pub fn convert(kind: ValueKind, value: &Value) -> Option<Value> {
    match kind {
        ValueKind::Int => to_f64(value)
            .or_else(|| to_bool(value).map(|b| if b { 1.0 } else { 0.0 }))
            .map(|f| Value::from(f.trunc() as i64)),
        ValueKind::Float => to_f64(value)
            .or_else(|| to_bool(value).map(|b| if b { 1.0 } else { 0.0 }))
            .map(Value::from),
        ValueKind::Bool => to_bool(value).or_else(|| to_f64(value).map(|f| f != 0.0)).map(Value::Bool),
        ValueKind::Text => Some(Value::String(to_text(value))),
        ValueKind::Datetime => to_datetime(value).map(|dt| Value::String(dt.to_rfc3339())),
    }
}
