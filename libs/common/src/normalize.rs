//! Normalization of inbound payloads before typed decoding.
//!
//! Document stores hand out MongoDB extended JSON (`{"$oid": ..}`,
//! `{"$date": ..}`, `{"$numberLong": ..}`). Everything that crosses from the
//! wire into a typed model goes through [`normalize`] exactly once, so the
//! models themselves only ever see plain strings and numbers.

use chrono::DateTime;
use serde_json::{Map, Number, Value};

/// Recursively unwrap extended-JSON wrappers into plain JSON values.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(unwrapped) = unwrap_extended(&map) {
                return unwrapped;
            }
            Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn unwrap_extended(map: &Map<String, Value>) -> Option<Value> {
    if map.len() != 1 {
        return None;
    }
    let (key, inner) = map.iter().next()?;
    match (key.as_str(), inner) {
        ("$oid", Value::String(id)) => Some(Value::String(id.clone())),
        ("$date", date) => Some(normalize_date(date)),
        ("$numberLong", Value::String(raw)) => Some(
            raw.parse::<i64>()
                .map(|n| Value::Number(Number::from(n)))
                .unwrap_or_else(|_| Value::String(raw.clone())),
        ),
        _ => None,
    }
}

fn normalize_date(date: &Value) -> Value {
    let millis = match date {
        Value::String(s) => return Value::String(s.clone()),
        Value::Number(n) => n.as_i64(),
        Value::Object(inner) => inner
            .get("$numberLong")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<i64>().ok()),
        _ => None,
    };

    match millis.and_then(DateTime::from_timestamp_millis) {
        Some(dt) => Value::String(dt.to_rfc3339()),
        None => date.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_object_ids() {
        let raw = json!({ "_id": { "$oid": "65f0c0ffee" }, "chat": { "$oid": "c1" } });
        assert_eq!(normalize(raw), json!({ "_id": "65f0c0ffee", "chat": "c1" }));
    }

    #[test]
    fn unwraps_dates_in_all_shapes() {
        let raw = json!([
            { "$date": "2024-03-01T10:00:00Z" },
            { "$date": 0 },
            { "$date": { "$numberLong": "1000" } },
        ]);
        let out = normalize(raw);
        assert_eq!(out[0], "2024-03-01T10:00:00Z");
        assert_eq!(out[1], "1970-01-01T00:00:00+00:00");
        assert_eq!(out[2], "1970-01-01T00:00:01+00:00");
    }

    #[test]
    fn unwraps_number_long() {
        assert_eq!(normalize(json!({ "$numberLong": "42" })), json!(42));
    }

    #[test]
    fn leaves_plain_objects_alone() {
        let raw = json!({ "sender": { "_id": "u1", "username": "ana" }, "read": false });
        assert_eq!(normalize(raw.clone()), raw);
    }

    #[test]
    fn recurses_through_nested_arrays() {
        let raw = json!({ "readBy": [{ "$oid": "u1" }, { "$oid": "u2" }] });
        assert_eq!(normalize(raw), json!({ "readBy": ["u1", "u2"] }));
    }
}
