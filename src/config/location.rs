//! Entry locations
//!
//! Where a provider reads its data. Declared locations are expanded against
//! the entry's datadir and the current scope into zero or more concrete
//! [`ResolvedLocation`]s.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use hiera_key::Key;
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{ConfigError, Result};
use crate::interpolate::interpolate_string;
use crate::invocation::Invocation;

/// A declared location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// File path relative to the datadir
    Path(String),
    /// Glob pattern relative to the datadir
    Glob(String),
    /// Opaque URI, passed to the function as is
    Uri(String),
    /// One path per element of the scope variable `source`, with the element
    /// bound to `key` while `template` is interpolated
    MappedPaths {
        source: String,
        key: String,
        template: String,
    },
}

impl Location {
    /// Build a mapped paths location from `[source, key, template]`.
    pub(crate) fn mapped_paths(
        entry: &str,
        parts: Vec<String>,
    ) -> std::result::Result<Self, ConfigError> {
        match <[String; 3]>::try_from(parts) {
            Ok([source, key, template]) => Ok(Self::MappedPaths {
                source,
                key,
                template,
            }),
            Err(_) => Err(ConfigError::InvalidMappedPaths {
                entry: entry.to_string(),
            }),
        }
    }

    /// Expand against `datadir` and the invocation's scope.
    pub(crate) fn resolve(
        &self,
        invocation: &mut Invocation<'_>,
        datadir: &Path,
    ) -> Result<Vec<ResolvedLocation>> {
        match self {
            Self::Path(original) => {
                let relative = interpolate_string(invocation, original, false)?;
                Ok(vec![ResolvedLocation::path(original, datadir.join(relative))])
            }
            Self::Glob(original) => {
                let pattern = interpolate_string(invocation, original, false)?;
                Ok(expand_glob(datadir, &pattern)?
                    .into_iter()
                    .map(|path| ResolvedLocation::path(original, path))
                    .collect())
            }
            Self::Uri(original) => Ok(vec![ResolvedLocation::Uri {
                original: original.clone(),
                uri: interpolate_string(invocation, original, false)?,
            }]),
            Self::MappedPaths {
                source,
                key,
                template,
            } => {
                let mut locations = Vec::new();
                for element in mapped_elements(invocation, source)? {
                    let relative = invocation.with_scope_var(key, element, |invocation| {
                        interpolate_string(invocation, template, false)
                    })?;
                    locations.push(ResolvedLocation::path(template, datadir.join(relative)));
                }
                Ok(locations)
            }
        }
    }
}

/// Values of the mapped paths source variable. A hash yields `[key, value]`
/// pairs; a scalar yields itself; an absent variable yields nothing.
fn mapped_elements(invocation: &mut Invocation<'_>, source: &str) -> Result<Vec<Value>> {
    let key = Key::parse(source)?;
    let Some(root) = invocation.scope().get(key.root()) else {
        return Ok(Vec::new());
    };
    Ok(match key.dig(root)? {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
            .collect(),
        Some(scalar) => vec![scalar],
    })
}

/// Files under `datadir` matching `pattern`, sorted.
fn expand_glob(datadir: &Path, pattern: &str) -> std::result::Result<Vec<PathBuf>, ConfigError> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| ConfigError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?
        .compile_matcher();

    let mut paths: Vec<PathBuf> = WalkDir::new(datadir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .strip_prefix(datadir)
                .map(|relative| matcher.is_match(relative))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    Ok(paths)
}

/// A concrete location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLocation {
    Path {
        /// Declared form, before interpolation and expansion
        original: String,
        path: PathBuf,
        exists: bool,
    },
    Uri {
        original: String,
        uri: String,
    },
}

impl ResolvedLocation {
    fn path(original: &str, path: PathBuf) -> Self {
        let exists = path.is_file();
        Self::Path {
            original: original.to_string(),
            path,
            exists,
        }
    }

    /// URIs always exist.
    pub fn exists(&self) -> bool {
        match self {
            Self::Path { exists, .. } => *exists,
            Self::Uri { .. } => true,
        }
    }

    pub fn original(&self) -> &str {
        match self {
            Self::Path { original, .. } | Self::Uri { original, .. } => original,
        }
    }
}

impl fmt::Display for ResolvedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path { path, .. } => write!(f, "{}", path.display()),
            Self::Uri { uri, .. } => f.write_str(uri),
        }
    }
}
