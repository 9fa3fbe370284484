// Canonical payload domain model
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One normalized telemetry snapshot.
///
/// The underlying document is schema-stable for the canonical fields
/// (`timestamp`, `dashboard`, `systemStatus`, `cellVoltages`,
/// `temperatures`) while unrecognized upstream fields ride along
/// unchanged. Accessors return `None` for anything a degraded payload
/// did not carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalPayload(Value);

impl CanonicalPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn timestamp_ms(&self) -> Option<i64> {
        self.0.get("timestamp").and_then(Value::as_i64)
    }

    pub fn dashboard(&self) -> Option<&Map<String, Value>> {
        self.0.get("dashboard").and_then(Value::as_object)
    }

    pub fn dashboard_field(&self, key: &str) -> Option<&Value> {
        self.dashboard().and_then(|d| d.get(key))
    }

    pub fn system_status(&self) -> Option<&Map<String, Value>> {
        self.0.get("systemStatus").and_then(Value::as_object)
    }

    pub fn cell_voltages(&self) -> Option<&[Value]> {
        self.0
            .get("cellVoltages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    pub fn temperatures(&self) -> Option<&[Value]> {
        self.0
            .get("temperatures")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }
}

/// Leading numeric token of a JSON value.
///
/// Numbers pass through; strings are scanned from the front
/// (`"48.32V"` yields `48.32`). Anything else is `None` — a missing
/// reading stays missing instead of turning into zero.
pub fn parse_leading_num(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_leading_token(s),
        _ => None,
    }
}

/// Strict numeric parse: the whole value must be a number.
pub fn parse_num_strict(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// JSON truthiness, for upstream fault flags that are not always booleans.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_leading_token(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '-' | '+' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            '0'..='9' => {}
            _ => break,
        }
        end = i + c.len_utf8();
    }
    s[..end].parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leading_num_with_unit_suffix() {
        assert_eq!(parse_leading_num(&json!("48.32V")), Some(48.32));
        assert_eq!(parse_leading_num(&json!("-12.50A")), Some(-12.5));
        assert_eq!(parse_leading_num(&json!(85)), Some(85.0));
        assert_eq!(parse_leading_num(&json!(3.65)), Some(3.65));
    }

    #[test]
    fn test_parse_leading_num_rejects_non_numeric() {
        assert_eq!(parse_leading_num(&json!("charging")), None);
        assert_eq!(parse_leading_num(&json!("V48")), None);
        assert_eq!(parse_leading_num(&Value::Null), None);
        assert_eq!(parse_leading_num(&json!({"value": 1})), None);
        assert_eq!(parse_leading_num(&json!(".")), None);
    }

    #[test]
    fn test_parse_num_strict() {
        assert_eq!(parse_num_strict(&json!("85")), Some(85.0));
        assert_eq!(parse_num_strict(&json!(" 85.4 ")), Some(85.4));
        assert_eq!(parse_num_strict(&json!("85%")), None);
        assert_eq!(parse_num_strict(&json!(true)), None);
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn test_accessors_on_degraded_payload() {
        let payload = CanonicalPayload::new(json!("not an object"));
        assert_eq!(payload.timestamp_ms(), None);
        assert!(payload.dashboard().is_none());
        assert!(payload.cell_voltages().is_none());
    }
}
