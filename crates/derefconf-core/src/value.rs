//! Configuration value types
//!
//! A single tagged type covers raw data handed to the builder and values
//! read back from a tree. Scalars (null, bool, int, float, string) pass
//! through unchanged, sequences and mappings are raw nested data, and
//! `Node` is a built child of the configuration tree.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::node::ConfigNode;

/// A configuration value that may contain unresolved tokens
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value (may contain tokens like ${db/host})
    String(String),
    /// Sequence of values
    Sequence(Vec<Value>),
    /// Mapping of string keys to values
    Mapping(IndexMap<String, Value>),
    /// A nested node of a built tree
    Node(Arc<ConfigNode>),
}

impl Value {
    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if this value is a nested node
    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    /// Scalars are everything a token can be substituted with
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_)
        )
    }

    /// Get as boolean if this is a Bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float or Integer
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as str if this is a String
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as slice if this is a Sequence
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Get as mapping if this is a Mapping
    pub fn as_mapping(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Get the nested node if this is a Node
    pub fn as_node(&self) -> Option<&Arc<ConfigNode>> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// The text a token is replaced with, for scalar values only
    pub fn to_token_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Null | Value::Bool(_) | Value::Integer(_) | Value::Float(_) => {
                Some(self.to_string())
            }
            Value::Sequence(_) | Value::Mapping(_) | Value::Node(_) => None,
        }
    }

    /// Returns the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Node(_) => "node",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Sequence(seq) => {
                write!(f, "[")?;
                for (i, v) in seq.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Mapping(map) => write_entries(f, map),
            Value::Node(node) => write_entries(f, node.raw_entries()),
        }
    }
}

fn write_entries(f: &mut fmt::Formatter<'_>, map: &IndexMap<String, Value>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", k, v)?;
    }
    write!(f, "}}")
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Sequence(seq) => serializer.collect_seq(seq),
            Value::Mapping(map) => serializer.collect_map(map),
            Value::Node(node) => node.as_ref().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Accepts any self-describing data (JSON, YAML) as raw configuration
struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a configuration value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        // Out-of-range integers degrade to floats rather than failing
        Ok(i64::try_from(v)
            .map(Value::Integer)
            .unwrap_or(Value::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Value, A::Error> {
        let mut entries = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            entries.insert(key, value);
        }
        Ok(Value::Mapping(entries))
    }
}

// Convenient From implementations
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Mapping(m)
    }
}

impl From<Arc<ConfigNode>> for Value {
    fn from(node: Arc<ConfigNode>) -> Self {
        Value::Node(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_from_json() {
        let value: Value = serde_json::from_str(
            r#"{"db": {"host": "localhost", "port": 5432, "ssl": true}, "ratio": 0.5, "tags": ["a", null]}"#,
        )
        .unwrap();

        let map = value.as_mapping().unwrap();
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["db", "ratio", "tags"]);

        let db = map["db"].as_mapping().unwrap();
        assert_eq!(db["host"].as_str(), Some("localhost"));
        assert_eq!(db["port"].as_i64(), Some(5432));
        assert_eq!(db["ssl"].as_bool(), Some(true));
        assert_eq!(map["ratio"].as_f64(), Some(0.5));
        assert_eq!(
            map["tags"],
            Value::Sequence(vec![Value::from("a"), Value::Null])
        );
    }

    #[test]
    fn test_deserialize_from_yaml_keeps_order() {
        let value: Value = serde_yaml::from_str("zeta: 1\nalpha: 2\nmid: ${alpha}\n").unwrap();
        let keys: Vec<_> = value.as_mapping().unwrap().keys().cloned().collect();

        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(value.as_mapping().unwrap()["mid"].as_str(), Some("${alpha}"));
    }

    #[test]
    fn test_serialize_to_json() {
        let mut map = IndexMap::new();
        map.insert("name".to_string(), Value::from("app"));
        map.insert("workers".to_string(), Value::from(4));
        map.insert("hosts".to_string(), Value::from(vec!["a", "b"]));

        let json = serde_json::to_string(&Value::Mapping(map)).unwrap();
        assert_eq!(json, r#"{"name":"app","workers":4,"hosts":["a","b"]}"#);
    }

    #[test]
    fn test_token_string_only_for_scalars() {
        assert_eq!(Value::from("x").to_token_string(), Some("x".into()));
        assert_eq!(Value::from(42).to_token_string(), Some("42".into()));
        assert_eq!(Value::from(2.5).to_token_string(), Some("2.5".into()));
        assert_eq!(Value::from(false).to_token_string(), Some("false".into()));
        assert_eq!(Value::Null.to_token_string(), Some("null".into()));
        assert_eq!(Value::Sequence(vec![]).to_token_string(), None);
        assert_eq!(Value::Mapping(IndexMap::new()).to_token_string(), None);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(42).as_i64(), Some(42));
        assert_eq!(Value::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::Integer(42).as_f64(), Some(42.0));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert!(Value::Null.is_null());
        assert!(Value::from("s").is_scalar());
        assert!(!Value::Sequence(vec![]).is_scalar());
    }

    #[test]
    fn test_display() {
        let value: Value = serde_json::from_str(r#"{"a": [1, 2], "b": {"c": "d"}}"#).unwrap();
        assert_eq!(value.to_string(), "{a: [1, 2], b: {c: d}}");
    }
}
