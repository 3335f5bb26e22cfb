//! Dotted lookup keys.
//!
//! A key such as `database.hosts.0` names a root value (`database`) and a path
//! into it. The root always identifies a top-level value; the remaining
//! segments are used to dig into that value once it has been found.

mod parser;

pub use parser::parse_segments;

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Key syntax errors, detected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key '{key}' contains an empty segment")]
    EmptyKeySegment { key: String },

    #[error("key '{key}' has an unterminated quote")]
    UnterminatedQuote { key: String },

    #[error("key '{key}' must start with a name, not an index")]
    FirstSegmentIsIndex { key: String },
}

/// Digging reached a value that cannot be navigated by the next segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot dig into {found} using segment '{segment}' of key '{key}'")]
pub struct DigMismatch {
    pub key: String,
    pub segment: String,
    pub found: &'static str,
}

/// One segment of a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Name(String),
    Index(usize),
}

impl Segment {
    /// The segment as a mapping key. Indexes become their decimal form.
    pub fn as_map_key(&self) -> String {
        match self {
            Segment::Name(name) => name.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(name) => f.write_str(name),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// A parsed lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    source: String,
    segments: Vec<Segment>,
}

impl Key {
    /// Parse a key string.
    ///
    /// `.` separates segments unless it appears between matching single or
    /// double quotes. Unquoted segments made only of digits become indexes;
    /// the first segment may never be an index.
    pub fn parse(source: &str) -> Result<Self, KeyError> {
        let segments = parse_segments(source)?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The string this key was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root name. Always present.
    pub fn root(&self) -> &str {
        match &self.segments[0] {
            Segment::Name(name) => name,
            // parse_segments never produces a leading index
            Segment::Index(_) => "",
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments after the root.
    pub fn path(&self) -> &[Segment] {
        &self.segments[1..]
    }

    /// True when the key is just a root name.
    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Walk segments 2..n through `value`.
    ///
    /// Returns `Ok(None)` when a mapping lacks the entry, an index is out of
    /// range, or a `null` is reached. Reaching any other scalar before the
    /// path is exhausted is a [`DigMismatch`].
    pub fn dig(&self, value: &Value) -> Result<Option<Value>, DigMismatch> {
        let mut current = value;
        for segment in self.path() {
            let next = match (current, segment) {
                (Value::Array(items), Segment::Index(index)) => items.get(*index),
                (Value::Array(_), Segment::Name(_)) => None,
                (Value::Object(map), segment) => map.get(&segment.as_map_key()),
                (Value::Null, _) => None,
                (scalar, segment) => {
                    return Err(DigMismatch {
                        key: self.source.clone(),
                        segment: segment.to_string(),
                        found: kind_name(scalar),
                    })
                }
            };
            match next {
                Some(found) => current = found,
                None => return Ok(None),
            }
        }
        Ok(Some(current.clone()))
    }

    /// Wrap `value` so that digging this key into the result yields `value`.
    ///
    /// The root segment is not materialized.
    pub fn bury(&self, value: Value) -> Value {
        self.path().iter().rev().fold(value, |inner, segment| {
            let mut map = Map::new();
            map.insert(segment.as_map_key(), inner);
            Value::Object(map)
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::parse(s)
    }
}

/// Short name of a value's kind, for diagnostics.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "hash",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bury_nested() {
        let key = Key::parse("a.b.c").unwrap();
        assert_eq!(key.bury(json!("x")), json!({"b": {"c": "x"}}));
    }

    #[test]
    fn test_bury_index_segment() {
        let key = Key::parse("a.3").unwrap();
        assert_eq!(key.bury(json!("x")), json!({"3": "x"}));
    }

    #[test]
    fn test_bury_root_only() {
        let key = Key::parse("a").unwrap();
        assert_eq!(key.bury(json!("x")), json!("x"));
    }

    #[test]
    fn test_dig_reverses_bury() {
        for source in ["a.b.c", "a.3", "a.'x.y'.2.z"] {
            let key = Key::parse(source).unwrap();
            let buried = key.bury(json!({"leaf": true}));
            assert_eq!(key.dig(&buried).unwrap(), Some(json!({"leaf": true})), "{}", source);
        }
    }

    #[test]
    fn test_dig_array_and_map() {
        let value = json!({"hosts": [{"name": "db1"}, {"name": "db2"}]});
        let key = Key::parse("database.hosts.1.name").unwrap();
        assert_eq!(key.dig(&value).unwrap(), Some(json!("db2")));
    }

    #[test]
    fn test_dig_missing_is_not_found() {
        let value = json!({"hosts": ["db1"]});
        assert_eq!(Key::parse("x.hosts.4").unwrap().dig(&value).unwrap(), None);
        assert_eq!(Key::parse("x.ports").unwrap().dig(&value).unwrap(), None);
        assert_eq!(Key::parse("x.hosts.name").unwrap().dig(&value).unwrap(), None);
    }

    #[test]
    fn test_dig_through_null_is_not_found() {
        let value = json!({"a": null});
        assert_eq!(Key::parse("x.a.b").unwrap().dig(&value).unwrap(), None);
    }

    #[test]
    fn test_dig_through_scalar_is_mismatch() {
        let value = json!({"a": "text"});
        let err = Key::parse("x.a.b").unwrap().dig(&value).unwrap_err();
        assert_eq!(err.segment, "b");
        assert_eq!(err.found, "string");
    }

    #[test]
    fn test_dig_root_only_returns_value() {
        let value = json!([1, 2]);
        assert_eq!(Key::parse("a").unwrap().dig(&value).unwrap(), Some(json!([1, 2])));
    }

    #[test]
    fn test_root_and_path() {
        let key = Key::parse("a.b.0").unwrap();
        assert_eq!(key.root(), "a");
        assert_eq!(
            key.path(),
            &[Segment::Name("b".to_string()), Segment::Index(0)]
        );
        assert!(!key.is_root());
        assert_eq!(key.to_string(), "a.b.0");
    }
}
