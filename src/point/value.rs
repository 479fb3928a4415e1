//! Dynamic value model shared by points and scripts.
//!
//! Every value flowing through a script or stored in a point field is a
//! [`Value`]; its dynamic type is a [`DType`]. `Invalid` and `Void` never
//! appear as stored values, they only describe the outcome of an evaluation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Closed set of dynamic types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Invalid,
    Void,
    Nil,
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::Invalid => "invalid",
            DType::Void => "void",
            DType::Nil => "nil",
            DType::Bool => "bool",
            DType::Int => "int",
            DType::Float => "float",
            DType::String => "str",
            DType::List => "list",
            DType::Map => "map",
        }
    }

    /// List or Map
    pub fn is_composite(self) -> bool {
        matches!(self, DType::List | DType::Map)
    }

    /// Whether this type describes "no usable value"
    pub fn is_empty(self) -> bool {
        matches!(self, DType::Invalid | DType::Void | DType::Nil)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Dynamic type of this value
    pub fn dtype(&self) -> DType {
        match self {
            Value::Nil => DType::Nil,
            Value::Bool(_) => DType::Bool,
            Value::Int(_) => DType::Int,
            Value::Float(_) => DType::Float,
            Value::String(_) => DType::String,
            Value::List(_) => DType::List,
            Value::Map(_) => DType::Map,
        }
    }

    /// Classify a raw JSON value.
    ///
    /// Unsigned integers beyond `i64::MAX` have no representation and classify
    /// as `Invalid`, as does any composite containing such a value.
    pub fn from_json(raw: &serde_json::Value) -> (Value, DType) {
        match raw {
            serde_json::Value::Null => (Value::Nil, DType::Nil),
            serde_json::Value::Bool(b) => (Value::Bool(*b), DType::Bool),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    (Value::Int(i), DType::Int)
                } else if n.is_u64() {
                    (Value::Nil, DType::Invalid)
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_finite() => (Value::Float(f), DType::Float),
                        _ => (Value::Nil, DType::Invalid),
                    }
                }
            }
            serde_json::Value::String(s) => (Value::String(s.clone()), DType::String),
            serde_json::Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    let (v, t) = Value::from_json(item);
                    if t == DType::Invalid {
                        return (Value::Nil, DType::Invalid);
                    }
                    list.push(v);
                }
                (Value::List(list), DType::List)
            }
            serde_json::Value::Object(obj) => {
                let mut map = BTreeMap::new();
                for (k, item) in obj {
                    let (v, t) = Value::from_json(item);
                    if t == DType::Invalid {
                        return (Value::Nil, DType::Invalid);
                    }
                    map.insert(k.clone(), v);
                }
                (Value::Map(map), DType::Map)
            }
        }
    }

    /// Convert into a JSON value. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Compact JSON encoding
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    /// String form used when a value must live in a tag.
    ///
    /// Composites are JSON encoded, nil is the empty string.
    pub fn to_tag_string(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => self.to_json_string(),
            other => other.to_string(),
        }
    }

    /// Truthiness used by conditions
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Numeric view; bools count as 0/1
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Integer view; floats truncate, bools count as 0/1
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::List(_) | Value::Map(_) => f.write_str(&self.to_json_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => serializer.collect_seq(items),
            Value::Map(map) => serializer.collect_map(map),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        match Value::from_json(&raw) {
            (_, DType::Invalid) => Err(serde::de::Error::custom(format!(
                "unsupported value: {}",
                raw
            ))),
            (v, _) => Ok(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_scalars() {
        assert_eq!(Value::from_json(&json!(null)).1, DType::Nil);
        assert_eq!(Value::from_json(&json!(true)).1, DType::Bool);
        assert_eq!(Value::from_json(&json!(42)), (Value::Int(42), DType::Int));
        assert_eq!(Value::from_json(&json!(1.5)), (Value::Float(1.5), DType::Float));
        assert_eq!(Value::from_json(&json!("a")).1, DType::String);
    }

    #[test]
    fn test_classify_unrepresentable_is_invalid() {
        assert_eq!(Value::from_json(&json!(u64::MAX)).1, DType::Invalid);
        assert_eq!(Value::from_json(&json!([1, u64::MAX])).1, DType::Invalid);
    }

    #[test]
    fn test_classify_composites() {
        let (v, t) = Value::from_json(&json!({"a": [1, "x"], "b": null}));
        assert_eq!(t, DType::Map);
        let Value::Map(map) = v else { panic!("expected map") };
        assert_eq!(
            map.get("a"),
            Some(&Value::List(vec![Value::Int(1), Value::from("x")]))
        );
    }

    #[test]
    fn test_tag_string() {
        assert_eq!(Value::Nil.to_tag_string(), "");
        assert_eq!(Value::Int(3).to_tag_string(), "3");
        assert_eq!(Value::Bool(true).to_tag_string(), "true");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_tag_string(),
            "[1,2]"
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }

    #[test]
    fn test_serde_roundtrip_through_json() {
        let v = Value::Map(BTreeMap::from([
            ("n".to_string(), Value::Int(1)),
            ("s".to_string(), Value::from("x")),
        ]));
        let text = serde_json::to_string(&v).unwrap();
        assert_eq!(text, r#"{"n":1,"s":"x"}"#);
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, v);
    }
}
