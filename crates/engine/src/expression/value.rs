//! Literal values and the loose comparison rules applied to them.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::lexer::Comparator;

static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("numeric pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// JSON array or object.
    Json(Value),
}

impl Operand {
    pub(crate) fn from_quoted(text: &str) -> Self {
        Operand::Str(text.to_owned())
    }

    pub(crate) fn from_bare(text: &str) -> Self {
        if NUMERIC.is_match(text) {
            if let Ok(n) = text.parse::<f64>() {
                return Operand::Number(n);
            }
        }
        match text {
            "true" => return Operand::Bool(true),
            "false" => return Operand::Bool(false),
            "null" | "undefined" => return Operand::Null,
            _ => {}
        }
        if text.starts_with('[') || text.starts_with('{') {
            if let Ok(value @ (Value::Array(_) | Value::Object(_))) = serde_json::from_str::<Value>(text) {
                return Operand::Json(value);
            }
        }
        Operand::Str(text.to_owned())
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Operand::Null => false,
            Operand::Bool(b) => *b,
            Operand::Number(n) => *n != 0.0 && !n.is_nan(),
            Operand::Str(s) => !s.is_empty(),
            Operand::Json(_) => true,
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Operand::Null => 0.0,
            Operand::Bool(b) => f64::from(u8::from(*b)),
            Operand::Number(n) => *n,
            Operand::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Operand::Json(_) => self.to_primitive().to_number(),
        }
    }

    /// Arrays become their comma-joined elements, objects an opaque string.
    fn to_primitive(&self) -> Operand {
        match self {
            Operand::Json(Value::Array(items)) => Operand::Str(
                items
                    .iter()
                    .map(|v| match v {
                        Value::Null => String::new(),
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Operand::Json(_) => Operand::Str("[object Object]".into()),
            other => other.clone(),
        }
    }
}

/// Loose equality: numbers, numeric strings and booleans compare by value;
/// `null` only equals `null`; arrays/objects compare structurally with each
/// other and through their primitive form otherwise.
fn loose_eq(left: &Operand, right: &Operand) -> bool {
    use Operand::*;

    match (left, right) {
        (Null, Null) => true,
        (Null, _) | (_, Null) => false,
        (Bool(a), Bool(b)) => a == b,
        (Number(a), Number(b)) => a == b,
        (Str(a), Str(b)) => a == b,
        (Json(a), Json(b)) => a == b,
        (Bool(_), _) => loose_eq(&Number(left.to_number()), right),
        (_, Bool(_)) => loose_eq(left, &Number(right.to_number())),
        (Number(a), Str(_)) => *a == right.to_number(),
        (Str(_), Number(b)) => left.to_number() == *b,
        (Json(_), _) => loose_eq(&left.to_primitive(), right),
        (_, Json(_)) => loose_eq(left, &right.to_primitive()),
    }
}

fn ordering(op: Comparator, left: &Operand, right: &Operand) -> bool {
    let (l, r) = (left.to_primitive(), right.to_primitive());
    let ord = match (&l, &r) {
        (Operand::Str(a), Operand::Str(b)) => Some(a.cmp(b)),
        // NaN yields `None`, which compares false on every side.
        _ => l.to_number().partial_cmp(&r.to_number()),
    };

    match (op, ord) {
        (_, None) => false,
        (Comparator::Gt, Some(o)) => o == Ordering::Greater,
        (Comparator::Lt, Some(o)) => o == Ordering::Less,
        (Comparator::Ge, Some(o)) => o != Ordering::Less,
        (Comparator::Le, Some(o)) => o != Ordering::Greater,
        (Comparator::Eq, Some(o)) => o == Ordering::Equal,
        (Comparator::Ne, Some(o)) => o != Ordering::Equal,
    }
}

pub(crate) fn compare(op: Comparator, left: &Operand, right: &Operand) -> bool {
    match op {
        Comparator::Eq => loose_eq(left, right),
        Comparator::Ne => !loose_eq(left, right),
        Comparator::Gt | Comparator::Lt | Comparator::Ge | Comparator::Le => ordering(op, left, right),
    }
}
