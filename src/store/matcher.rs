use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::{compare_values, StoreError};

/// Evaluates a native filter document against a stored document.
pub(crate) fn matches(doc: &Value, filter: &Value) -> Result<bool, StoreError> {
    let conditions = match filter {
        Value::Null => return Ok(true),
        Value::Object(obj) => obj,
        _ => return Err(StoreError::Malformed("filter must be an object".into())),
    };

    for (key, condition) in conditions {
        let ok = if key == "$and" {
            let parts = condition
                .as_array()
                .ok_or_else(|| StoreError::Malformed("$and requires an array".into()))?;
            let mut all = true;
            for part in parts {
                if !matches(doc, part)? {
                    all = false;
                    break;
                }
            }
            all
        } else if key.starts_with('$') {
            return Err(StoreError::UnsupportedOperator(key.clone()));
        } else {
            field_matches(doc.get(key), condition)?
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> Result<bool, StoreError> {
    match condition {
        Value::Object(ops) if is_operator_object(ops) => {
            for (op, operand) in ops {
                if !apply_operator(op, actual, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        expected => Ok(equals(actual, expected)),
    }
}

fn is_operator_object(obj: &Map<String, Value>) -> bool {
    !obj.is_empty() && obj.keys().all(|k| k.starts_with('$'))
}

fn apply_operator(op: &str, actual: Option<&Value>, operand: &Value) -> Result<bool, StoreError> {
    let ordered = |want: &[Ordering]| match actual {
        Some(v) if comparable(v, operand) => want.contains(&compare_values(Some(v), Some(operand))),
        _ => false,
    };
    Ok(match op {
        "$eq" => equals(actual, operand),
        "$ne" => !equals(actual, operand),
        "$gt" => ordered(&[Ordering::Greater]),
        "$gte" => ordered(&[Ordering::Greater, Ordering::Equal]),
        "$lt" => ordered(&[Ordering::Less]),
        "$lte" => ordered(&[Ordering::Less, Ordering::Equal]),
        other => return Err(StoreError::UnsupportedOperator(other.to_string())),
    })
}

fn comparable(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) | (Value::Bool(_), Value::Bool(_))
    )
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) | (Some(Value::Null), Value::Null) => true,
        (None, _) => false,
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(a), b) => a == b,
    }
}
