//! Session settings
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! config = "hiera.yaml"
//!
//! [modules]
//! ntp = "modules/ntp"
//!
//! [variables]
//! environment = "production"
//! ```
//!
//! Relative paths are taken from the settings file's directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::document::{read_document, DocumentFormat};
use crate::error::ConfigError;

/// Default name of the global hierarchy config.
pub const DEFAULT_CONFIG_FILE: &str = "hiera.yaml";

/// Name of a module's hierarchy config, inside the module directory.
pub const MODULE_CONFIG_FILE: &str = "hiera.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Global hierarchy config
    pub config: PathBuf,
    /// Module name to module directory
    pub modules: BTreeMap<String, PathBuf>,
    /// Top scope variables
    pub variables: Map<String, Value>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG_FILE),
            modules: BTreeMap::new(),
            variables: Map::new(),
        }
    }
}

impl SessionSettings {
    /// Settings for the global config at `config`.
    pub fn new(config: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
            ..Self::default()
        }
    }

    pub fn with_module(mut self, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.modules.insert(name.into(), dir.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let value = read_document(path, DocumentFormat::Toml)?;
        let settings: Self = serde_json::from_value(value).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let base = path.parent().unwrap_or(Path::new(""));
        Ok(settings.relative_to(base))
    }

    /// Take relative paths from `base`.
    pub fn relative_to(mut self, base: &Path) -> Self {
        self.config = base.join(&self.config);
        for dir in self.modules.values_mut() {
            *dir = base.join(&*dir);
        }
        self
    }

    /// Hierarchy config of a registered module.
    pub fn module_config(&self, module: &str) -> Option<PathBuf> {
        self.modules
            .get(module)
            .map(|dir| dir.join(MODULE_CONFIG_FILE))
    }
}
