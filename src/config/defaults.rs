//! Built-in hierarchy defaults
//!
//! Used for whatever a hierarchy config leaves out, and as the whole config
//! when no config file exists.

use serde::{Deserialize, Serialize};

use crate::function::FunctionKind;

use super::entry::{Entry, FunctionRef};
use super::location::Location;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Data directory, relative to the config file (default: "data")
    pub datadir: String,

    /// data_hash function of the defaults section (default: "yaml_data")
    pub data_hash: String,

    /// Name of the single default hierarchy entry (default: "Common")
    pub entry_name: String,

    /// Path of the single default hierarchy entry (default: "common.yaml")
    pub entry_path: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            datadir: "data".to_string(),
            data_hash: "yaml_data".to_string(),
            entry_name: "Common".to_string(),
            entry_path: "common.yaml".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// The `defaults` section.
    pub fn defaults_entry(&self) -> Entry {
        Entry::new("defaults")
            .with_datadir(self.datadir.clone())
            .with_function(FunctionRef::new(FunctionKind::DataHash, self.data_hash.clone()))
    }

    /// The `hierarchy` section.
    pub fn hierarchy(&self) -> Vec<Entry> {
        vec![Entry::new(self.entry_name.clone())
            .with_locations(vec![Location::Path(self.entry_path.clone())])]
    }

    /// Fill the parts of a declared `defaults` section that it leaves out.
    pub(crate) fn complete(&self, declared: Entry) -> Entry {
        let defaults = self.defaults_entry();
        let mut entry = Entry::new(declared.name());
        if let Some(datadir) = declared.datadir().or(defaults.datadir()) {
            entry = entry.with_datadir(datadir);
        }
        if let Some(function) = declared.function().or(defaults.function()) {
            entry = entry.with_function(function.clone());
        }
        if let Some(options) = declared.options() {
            entry = entry.with_options(options.clone());
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        let entry = defaults.defaults_entry();
        assert_eq!(entry.datadir(), Some("data"));
        assert_eq!(
            entry.function(),
            Some(&FunctionRef::new(FunctionKind::DataHash, "yaml_data"))
        );
    }

    #[test]
    fn test_hierarchy() {
        let hierarchy = BuiltinDefaults::default().hierarchy();
        assert_eq!(hierarchy.len(), 1);
        assert_eq!(hierarchy[0].name(), "Common");
        assert_eq!(
            hierarchy[0].locations(),
            Some(&[Location::Path("common.yaml".to_string())][..])
        );
    }

    #[test]
    fn test_complete_keeps_declared_function() {
        let declared = Entry::new("defaults")
            .with_function(FunctionRef::new(FunctionKind::DataHash, "json_data"));
        let entry = BuiltinDefaults::default().complete(declared);
        assert_eq!(entry.datadir(), Some("data"));
        assert_eq!(entry.function().map(|f| f.name.as_str()), Some("json_data"));
    }
}
