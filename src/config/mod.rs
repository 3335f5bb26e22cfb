//! Hierarchy configuration
//!
//! A hierarchy config declares, in order, the data sources searched for a
//! key:
//! 1. `defaults`: function, datadir and options inherited by every entry
//! 2. `hierarchy`: the entries searched first
//! 3. `default_hierarchy`: entries searched only when `hierarchy` finds nothing
//!
//! A missing config file yields the built-in defaults.

mod defaults;
pub mod document;
mod entry;
mod location;
mod resolved;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub use defaults::BuiltinDefaults;
pub use document::DocumentFormat;
pub use entry::{Entry, FunctionRef, ResolvedEntry, DEFAULT_DATADIR};
pub use location::{Location, ResolvedLocation};
pub use resolved::ResolvedConfig;

use crate::error::ConfigError;
use document::{read_document, ConfigDocument, EntryDocument};

/// Reserved key holding per-key lookup options.
pub const LOOKUP_OPTIONS: &str = "lookup_options";

/// The only supported config version.
pub const CONFIG_VERSION: u64 = 5;

/// Identifies a resolved config: its file plus the module it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    pub path: PathBuf,
    pub module: Option<String>,
}

impl ConfigKey {
    pub fn global(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            module: None,
        }
    }

    pub fn module(path: impl Into<PathBuf>, module: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            module: Some(module.into()),
        }
    }
}

/// A parsed, not yet resolved, hierarchy config.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    path: PathBuf,
    /// Directory relative datadirs are taken from
    root: PathBuf,
    defaults: Entry,
    hierarchy: Vec<Entry>,
    default_hierarchy: Vec<Entry>,
}

impl Config {
    /// Load the config at `path`. A missing file yields the built-in defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No hierarchy config, using built-in defaults");
            return Self::from_document(path, ConfigDocument::default());
        }
        let value = read_document(path, DocumentFormat::from_path(path))?;
        Self::from_document(path, ConfigDocument::from_value(path, value)?)
    }

    /// Build a config from a parsed document. `path` names the file the
    /// document came from.
    pub fn from_document(path: &Path, doc: ConfigDocument) -> Result<Self, ConfigError> {
        if let Some(version) = doc.version {
            if version != CONFIG_VERSION {
                return Err(ConfigError::UnsupportedVersion(version));
            }
        }

        let builtin = BuiltinDefaults::default();
        let defaults = match doc.defaults {
            Some(declared) => builtin.complete(Entry::from_defaults(declared)?),
            None => builtin.defaults_entry(),
        };
        let hierarchy = match doc.hierarchy {
            Some(entries) => parse_entries(entries)?,
            None => builtin.hierarchy(),
        };
        let default_hierarchy = parse_entries(doc.default_hierarchy.unwrap_or_default())?;

        Ok(Self {
            path: path.to_path_buf(),
            root: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            defaults,
            hierarchy,
            default_hierarchy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn defaults(&self) -> &Entry {
        &self.defaults
    }

    pub fn hierarchy(&self) -> &[Entry] {
        &self.hierarchy
    }

    pub fn default_hierarchy(&self) -> &[Entry] {
        &self.default_hierarchy
    }
}

/// Entry names must be unique within one list.
fn parse_entries(docs: Vec<EntryDocument>) -> Result<Vec<Entry>, ConfigError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(docs.len());
    for doc in docs {
        let entry = Entry::from_document(doc)?;
        if !seen.insert(entry.name().to_string()) {
            return Err(ConfigError::DuplicateEntryName(entry.name().to_string()));
        }
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("hiera.yaml")).unwrap();
        assert_eq!(config.root(), dir.path());
        assert_eq!(config.defaults().datadir(), Some("data"));
        assert_eq!(config.hierarchy().len(), 1);
        assert_eq!(config.hierarchy()[0].name(), "Common");
        assert!(config.default_hierarchy().is_empty());
    }

    #[test]
    fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hiera.yaml");
        fs::write(
            &path,
            r#"
version: 5
defaults:
  datadir: hieradata
hierarchy:
  - name: Nodes
    path: "nodes/%{host}.yaml"
  - name: Common
    path: common.yaml
default_hierarchy:
  - name: Fallback
    path: fallback.yaml
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.defaults().datadir(), Some("hieradata"));
        assert_eq!(
            config.defaults().function().map(|f| f.name.as_str()),
            Some("yaml_data")
        );
        let names: Vec<&str> = config.hierarchy().iter().map(Entry::name).collect();
        assert_eq!(names, vec!["Nodes", "Common"]);
        assert_eq!(config.default_hierarchy()[0].name(), "Fallback");
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hiera.toml");
        fs::write(
            &path,
            "version = 5\n[[hierarchy]]\nname = \"Common\"\npath = \"common.toml\"\ndata_hash = \"toml_data\"\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.hierarchy()[0].function().map(|f| f.to_string()),
            Some("data_hash function 'toml_data'".to_string())
        );
    }

    #[test]
    fn test_unsupported_version() {
        let doc = ConfigDocument {
            version: Some(3),
            ..ConfigDocument::default()
        };
        assert_eq!(
            Config::from_document(Path::new("hiera.yaml"), doc).unwrap_err(),
            ConfigError::UnsupportedVersion(3)
        );
    }

    #[test]
    fn test_duplicate_entry_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hiera.yaml");
        fs::write(
            &path,
            "hierarchy:\n  - name: A\n    path: a.yaml\n  - name: A\n    path: b.yaml\n",
        )
        .unwrap();
        assert_eq!(
            Config::load(&path).unwrap_err(),
            ConfigError::DuplicateEntryName("A".to_string())
        );
    }

    #[test]
    fn test_empty_file_is_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hiera.yaml");
        fs::write(&path, "").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.hierarchy()[0].name(), "Common");
    }
}
