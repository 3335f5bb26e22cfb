//! Hierarchy entries
//!
//! An [`Entry`] is one level of the hierarchy as declared. Resolving it
//! against the config's defaults and the current scope builds a new
//! [`ResolvedEntry`]; the declared entry is never modified.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};
use crate::function::FunctionKind;
use crate::interpolate::{interpolate, interpolate_string};
use crate::invocation::Invocation;

use super::document::{DefaultsDocument, EntryDocument};
use super::location::{Location, ResolvedLocation};

/// Option names an entry may not use; they name locations.
const RESERVED_OPTIONS: &[&str] = &["path", "uri"];

/// Datadir used when neither the entry nor the defaults name one.
pub const DEFAULT_DATADIR: &str = "data";

/// The function an entry delegates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub kind: FunctionKind,
    pub name: String,
}

impl FunctionRef {
    pub fn new(kind: FunctionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// At most one of the three function keys may be set.
    fn from_fields(
        entry: &str,
        data_hash: Option<String>,
        data_dig: Option<String>,
        lookup_key: Option<String>,
    ) -> std::result::Result<Option<Self>, ConfigError> {
        let declared: Vec<FunctionRef> = [
            (FunctionKind::DataHash, data_hash),
            (FunctionKind::DataDig, data_dig),
            (FunctionKind::LookupKey, lookup_key),
        ]
        .into_iter()
        .filter_map(|(kind, name)| name.map(|name| FunctionRef::new(kind, name)))
        .collect();

        if declared.len() > 1 {
            return Err(ConfigError::MultipleFunctionKinds {
                entry: entry.to_string(),
            });
        }
        Ok(declared.into_iter().next())
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} function '{}'", self.kind, self.name)
    }
}

/// A hierarchy entry (or the `defaults` section) as declared.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    name: String,
    datadir: Option<String>,
    function: Option<FunctionRef>,
    options: Option<Map<String, Value>>,
    locations: Option<Vec<Location>>,
}

impl Entry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datadir: None,
            function: None,
            options: None,
            locations: None,
        }
    }

    pub fn with_datadir(mut self, datadir: impl Into<String>) -> Self {
        self.datadir = Some(datadir.into());
        self
    }

    pub fn with_function(mut self, function: FunctionRef) -> Self {
        self.function = Some(function);
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = Some(locations);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> Option<&FunctionRef> {
        self.function.as_ref()
    }

    pub fn datadir(&self) -> Option<&str> {
        self.datadir.as_deref()
    }

    pub fn options(&self) -> Option<&Map<String, Value>> {
        self.options.as_ref()
    }

    pub fn locations(&self) -> Option<&[Location]> {
        self.locations.as_deref()
    }

    pub(crate) fn from_document(doc: EntryDocument) -> std::result::Result<Self, ConfigError> {
        let name = doc.name.ok_or(ConfigError::MissingEntryName)?;
        let function = FunctionRef::from_fields(&name, doc.data_hash, doc.data_dig, doc.lookup_key)?;
        if let Some(options) = &doc.options {
            check_options(&name, options)?;
        }

        let mut kinds = Vec::new();
        if let Some(path) = doc.path {
            kinds.push(vec![Location::Path(path)]);
        }
        if let Some(paths) = doc.paths {
            kinds.push(paths.into_iter().map(Location::Path).collect());
        }
        if let Some(glob) = doc.glob {
            kinds.push(vec![Location::Glob(glob)]);
        }
        if let Some(globs) = doc.globs {
            kinds.push(globs.into_iter().map(Location::Glob).collect());
        }
        if let Some(uri) = doc.uri {
            kinds.push(vec![Location::Uri(uri)]);
        }
        if let Some(uris) = doc.uris {
            kinds.push(uris.into_iter().map(Location::Uri).collect());
        }
        if let Some(mapped) = doc.mapped_paths {
            kinds.push(vec![Location::mapped_paths(&name, mapped)?]);
        }
        if kinds.len() > 1 {
            return Err(ConfigError::MultipleLocationKinds { entry: name });
        }

        Ok(Self {
            datadir: doc.datadir,
            function,
            options: doc.options,
            locations: kinds.pop(),
            name,
        })
    }

    pub(crate) fn from_defaults(doc: DefaultsDocument) -> std::result::Result<Self, ConfigError> {
        let name = "defaults";
        let function = FunctionRef::from_fields(name, doc.data_hash, doc.data_dig, doc.lookup_key)?;
        if let Some(options) = &doc.options {
            check_options(name, options)?;
        }
        Ok(Self {
            name: name.to_string(),
            datadir: doc.datadir,
            function,
            options: doc.options,
            locations: None,
        })
    }

    /// Fill unset fields from `defaults`, interpolate, and expand locations.
    ///
    /// Function name, datadir and options are interpolated without method
    /// syntax. A relative datadir is taken from `root`.
    pub(crate) fn resolve(
        &self,
        defaults: &Entry,
        root: &Path,
        invocation: &mut Invocation<'_>,
    ) -> Result<ResolvedEntry> {
        let function = self
            .function
            .as_ref()
            .or(defaults.function.as_ref())
            .ok_or_else(|| ConfigError::MissingFunction {
                entry: self.name.clone(),
            })?;
        let function = FunctionRef::new(
            function.kind,
            interpolate_string(invocation, &function.name, false)?,
        );

        let datadir = self
            .datadir
            .as_deref()
            .or(defaults.datadir.as_deref())
            .unwrap_or(DEFAULT_DATADIR);
        let datadir = root.join(interpolate_string(invocation, datadir, false)?);

        let options = match self.options.as_ref().or(defaults.options.as_ref()) {
            Some(options) => {
                let value = Value::Object(options.clone());
                match interpolate(invocation, &value, false)?.into_owned() {
                    Value::Object(options) => options,
                    _ => Map::new(),
                }
            }
            None => Map::new(),
        };

        let locations = match &self.locations {
            None => None,
            Some(locations) => {
                let mut resolved = Vec::new();
                for location in locations {
                    resolved.extend(location.resolve(invocation, &datadir)?);
                }
                Some(resolved)
            }
        };

        Ok(ResolvedEntry {
            name: self.name.clone(),
            function,
            datadir,
            options,
            locations,
        })
    }
}

fn check_options(entry: &str, options: &Map<String, Value>) -> std::result::Result<(), ConfigError> {
    match RESERVED_OPTIONS.iter().find(|o| options.contains_key(**o)) {
        Some(option) => Err(ConfigError::ReservedOption {
            entry: entry.to_string(),
            option: option.to_string(),
        }),
        None => Ok(()),
    }
}

/// An entry with defaults applied, interpolated, and with concrete locations.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    name: String,
    function: FunctionRef,
    datadir: PathBuf,
    options: Map<String, Value>,
    locations: Option<Vec<ResolvedLocation>>,
}

impl ResolvedEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> &FunctionRef {
        &self.function
    }

    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// `None` when the entry declares no locations. `Some(&[])` when it
    /// declares some that matched nothing.
    pub fn locations(&self) -> Option<&[ResolvedLocation]> {
        self.locations.as_deref()
    }
}
