use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }

    /// Narrative truthiness: nil, false, zero and the empty string are false.
    /// Containers are true even when empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0 && !value.is_nan(),
            Self::String(value) => !value.is_empty(),
            Self::Array(_) | Self::Map(_) => true,
        }
    }

    /// Text used when a value is spliced into passage content.
    pub fn to_text(&self) -> String {
        match self {
            Self::Nil => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => number_to_text(*value),
            Self::String(value) => value.clone(),
            Self::Array(values) => values
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(", "),
            Self::Map(values) => {
                let entries = values
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value.to_text()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", entries)
            }
        }
    }
}

pub fn number_to_text(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn truthiness_matches_narrative_rules() {
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Nil.is_truthy());
        assert!(Value::Map(BTreeMap::new()).is_truthy());
        assert!(Value::Array(Vec::new()).is_truthy());
        assert!(Value::Number(-2.5).is_truthy());
        assert!(Value::from("x").is_truthy());
    }

    #[test]
    fn text_rendering_drops_integral_fraction() {
        assert_eq!(Value::Number(3.0).to_text(), "3");
        assert_eq!(Value::Number(2.5).to_text(), "2.5");
        assert_eq!(Value::Nil.to_text(), "");
        assert_eq!(
            Value::Array(vec![Value::from(1i64), Value::from("a")]).to_text(),
            "1, a"
        );
    }

    #[test]
    fn json_shape_is_untagged() {
        let value: Value = serde_json::from_str(r#"{"a":[1,true,null,"s"]}"#).expect("parse");
        let Value::Map(entries) = &value else {
            panic!("expected map");
        };
        assert_eq!(
            entries.get("a"),
            Some(&Value::Array(vec![
                Value::Number(1.0),
                Value::Bool(true),
                Value::Nil,
                Value::from("s"),
            ]))
        );
        assert_eq!(
            serde_json::to_string(&value).expect("encode"),
            r#"{"a":[1.0,true,null,"s"]}"#
        );
    }
}
