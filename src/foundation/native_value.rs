use serde::{Deserialize, Serialize};

use super::command::TargetId;
use super::native_string::NativeString;

/// Tagged value exchanged between script, the binding layer and the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(NativeString),
    /// Serialized JSON for structured values the binding does not interpret.
    Json(String),
    /// Reference to a native node in the same surface.
    Node(TargetId),
    /// Style declaration owned by the element with this target id.
    Style(TargetId),
}

impl Default for NativeValue {
    fn default() -> Self {
        Self::Null
    }
}

impl NativeValue {
    pub fn string(value: impl Into<NativeString>) -> Self {
        Self::String(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_native_string(&self) -> Option<&NativeString> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<TargetId> {
        match self {
            Self::Node(target) => Some(*target),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Int64(value) if *value >= 0 => usize::try_from(*value).ok(),
            Self::Float64(value) if *value >= 0.0 && value.is_finite() => Some(*value as usize),
            _ => None,
        }
    }

    /// String form used when a value is mirrored to the host. `Null` marshals
    /// to the empty string.
    pub fn to_native_string(&self) -> NativeString {
        match self {
            Self::Null => NativeString::new(),
            Self::Bool(value) => NativeString::from(if *value { "true" } else { "false" }),
            Self::Int64(value) => NativeString::from(value.to_string()),
            Self::Float64(value) => NativeString::from(format_number(*value)),
            Self::String(value) => value.clone(),
            Self::Json(raw) => NativeString::from(raw.as_str()),
            Self::Node(target) => NativeString::from(target.to_string()),
            Self::Style(_) => NativeString::from("[object CSSStyleDeclaration]"),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        return String::from("NaN");
    }
    if value.is_infinite() {
        return String::from(if value > 0.0 { "Infinity" } else { "-Infinity" });
    }
    if value.fract() == 0.0 && value.abs() < 1e21 {
        return format!("{}", value as i64);
    }
    value.to_string()
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        Self::String(NativeString::from(value))
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        Self::String(NativeString::from(value))
    }
}

impl From<NativeString> for NativeValue {
    fn from(value: NativeString) -> Self {
        Self::String(value)
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_marshal_like_script() {
        assert_eq!(NativeValue::Float64(2.0).to_native_string(), "2");
        assert_eq!(NativeValue::Float64(1.5).to_native_string(), "1.5");
        assert_eq!(NativeValue::Float64(f64::NAN).to_native_string(), "NaN");
        assert_eq!(NativeValue::Null.to_native_string(), "");
    }

    #[test]
    fn json_shape_is_tagged() {
        let encoded = serde_json::to_string(&NativeValue::from("hi")).unwrap();
        assert_eq!(encoded, r#"{"type":"string","value":"hi"}"#);
        let decoded: NativeValue = serde_json::from_str(r#"{"type":"null"}"#).unwrap();
        assert!(decoded.is_null());
    }
}
