//! Validation of a field's final value against its [`ValidationRule`].

use crate::error::FieldError;
use crate::types::ValidationRule;
use regex::Regex;
use serde_json::Value;

/// Check `value` (absent when `None`) against `rule`.
///
/// Rules run in order: required, type, pattern, min/max. Every violation is
/// collected into a single `ValidationFailed`.
pub fn validate(value: Option<&Value>, rule: &ValidationRule) -> Result<(), FieldError> {
    let Some(value) = value else {
        return if rule.required { Err(required()) } else { Ok(()) };
    };
    if value.is_null() && rule.required {
        return Err(required());
    }

    let mut reasons = Vec::new();

    if let Some(expected) = rule.value_type {
        if !expected.matches(value) {
            reasons.push(format!("expected {}, got {}", expected, type_name(value)));
        }
    }

    if let Some(pattern) = &rule.pattern {
        if let Value::String(s) = value {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(s) => {}
                Ok(_) => reasons.push(format!("does not match pattern '{}'", pattern)),
                Err(e) => reasons.push(format!("invalid pattern '{}': {}", pattern, e)),
            }
        }
    }

    if let Some(measure) = measure(value) {
        if let Some(min) = rule.min {
            if measure.amount < min {
                reasons.push(format!("{} {} is below minimum {}", measure.label, measure.amount, min));
            }
        }
        if let Some(max) = rule.max {
            if measure.amount > max {
                reasons.push(format!("{} {} is above maximum {}", measure.label, measure.amount, max));
            }
        }
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(FieldError::ValidationFailed { reasons })
    }
}

fn required() -> FieldError {
    FieldError::ValidationFailed {
        reasons: vec!["value is required".to_string()],
    }
}

struct Measure {
    label: &'static str,
    amount: f64,
}

/// What min/max compare against: the number itself, or a length.
fn measure(value: &Value) -> Option<Measure> {
    match value {
        Value::Number(n) => n.as_f64().map(|amount| Measure {
            label: "value",
            amount,
        }),
        Value::String(s) => Some(Measure {
            label: "length",
            amount: s.chars().count() as f64,
        }),
        Value::Array(items) => Some(Measure {
            label: "length",
            amount: items.len() as f64,
        }),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
