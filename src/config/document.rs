//! Structured document loading
//!
//! Hierarchy configs and data files may be YAML, JSON or TOML. All three are
//! converted to `serde_json::Value`.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::error::ConfigError;

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
    Toml,
}

impl DocumentFormat {
    /// Format implied by a file extension. Anything unknown is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Read and parse a document.
pub fn read_document(path: &Path, format: DocumentFormat) -> Result<Value, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    parse_document(path, &contents, format)
}

/// Parse document text. `path` is only used in error messages.
pub fn parse_document(
    path: &Path,
    contents: &str,
    format: DocumentFormat,
) -> Result<Value, ConfigError> {
    let parse_error = |message: String| ConfigError::ParseError {
        path: path.display().to_string(),
        message,
    };
    match format {
        DocumentFormat::Yaml => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(contents).map_err(|e| parse_error(e.to_string()))?;
            Ok(yaml_to_json(yaml))
        }
        DocumentFormat::Json => {
            serde_json::from_str(contents).map_err(|e| parse_error(e.to_string()))
        }
        DocumentFormat::Toml => {
            let toml: toml::Value =
                toml::from_str(contents).map_err(|e| parse_error(e.to_string()))?;
            Ok(toml_to_json(toml))
        }
    }
}

/// Convert a YAML value. Non-string keys are stringified, tags dropped.
pub fn yaml_to_json(yaml: serde_yaml::Value) -> Value {
    match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(yaml_key(key), yaml_to_json(value));
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match yaml_to_json(key) {
        Value::String(s) => s,
        Value::Null => "~".to_string(),
        other => other.to_string(),
    }
}

/// Convert a TOML value. Datetimes become strings.
pub fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            let map: Map<String, Value> =
                table.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect();
            Value::Object(map)
        }
    }
}

/// A hierarchy config file as written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    pub version: Option<u64>,
    pub defaults: Option<DefaultsDocument>,
    pub hierarchy: Option<Vec<EntryDocument>>,
    pub default_hierarchy: Option<Vec<EntryDocument>>,
}

/// The `defaults` section: function, datadir and options only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsDocument {
    pub datadir: Option<String>,
    pub data_hash: Option<String>,
    pub data_dig: Option<String>,
    pub lookup_key: Option<String>,
    pub options: Option<Map<String, Value>>,
}

/// One hierarchy entry as written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryDocument {
    pub name: Option<String>,
    pub datadir: Option<String>,
    pub data_hash: Option<String>,
    pub data_dig: Option<String>,
    pub lookup_key: Option<String>,
    pub options: Option<Map<String, Value>>,
    pub path: Option<String>,
    pub paths: Option<Vec<String>>,
    pub glob: Option<String>,
    pub globs: Option<Vec<String>>,
    pub uri: Option<String>,
    pub uris: Option<Vec<String>>,
    pub mapped_paths: Option<Vec<String>>,
}

impl ConfigDocument {
    /// Deserialize from an already parsed value.
    pub fn from_value(path: &Path, value: Value) -> Result<Self, ConfigError> {
        // An empty file is an empty config
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_yaml_non_string_keys() {
        let value =
            parse_document(Path::new("t.yaml"), "1: one\ntrue: yes\n", DocumentFormat::Yaml)
                .unwrap();
        assert_eq!(value, json!({"1": "one", "true": "yes"}));
    }

    #[test]
    fn test_yaml_tag_unwrapped() {
        let value =
            parse_document(Path::new("t.yaml"), "a: !secret hidden\n", DocumentFormat::Yaml)
                .unwrap();
        assert_eq!(value, json!({"a": "hidden"}));
    }

    #[test]
    fn test_parse_error_names_path() {
        let err = parse_document(Path::new("bad.json"), "{", DocumentFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref path, .. } if path == "bad.json"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(DocumentFormat::from_path(Path::new("hiera.yaml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("hiera.yml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("hiera.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("hiera.toml")), DocumentFormat::Toml);
    }

    #[test]
    fn test_config_document_rejects_unknown_field() {
        let value = json!({"version": 5, "hierarchy": [{"name": "x", "pathz": "a.yaml"}]});
        assert!(ConfigDocument::from_value(Path::new("hiera.yaml"), value).is_err());
    }

    #[test]
    fn test_defaults_reject_locations() {
        let value = json!({"defaults": {"path": "a.yaml"}});
        assert!(ConfigDocument::from_value(Path::new("hiera.yaml"), value).is_err());
    }
}
