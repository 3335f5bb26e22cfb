//! Resolved hierarchy configs
//!
//! A [`ResolvedConfig`] is a config turned into executable form: one data
//! provider per entry plus the `lookup_options` found across the hierarchy.
//! Resolved configs are cached per session and shared between invocations.

use std::path::{Path, PathBuf};

use hiera_key::{kind_name, Key};
use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};
use crate::explain::ExplainNode;
use crate::invocation::Invocation;
use crate::merge::{deep_merge, DeepOptions, MergeStrategy};
use crate::provider::DataProvider;

use super::{Config, Entry, LOOKUP_OPTIONS};

/// Executable form of a hierarchy config.
#[derive(Debug)]
pub struct ResolvedConfig {
    path: PathBuf,
    module: Option<String>,
    providers: Vec<DataProvider>,
    default_providers: Vec<DataProvider>,
    lookup_options: Map<String, Value>,
    /// `^regex` keys of `lookup_options`, in declaration order
    patterns: Vec<(Regex, Map<String, Value>)>,
}

impl ResolvedConfig {
    /// Resolve every entry of `config` and collect its `lookup_options`.
    pub(crate) fn resolve(
        config: &Config,
        module: Option<&str>,
        invocation: &mut Invocation<'_>,
    ) -> Result<Self> {
        let defaults = config.defaults();
        let providers = build_providers(config.hierarchy(), defaults, config.root(), invocation)?;
        let default_providers =
            build_providers(config.default_hierarchy(), defaults, config.root(), invocation)?;

        let label = config.path().display().to_string();
        let (lookup_options, patterns) = invocation.for_lookup_options(|invocation| {
            invocation.explain_scope(
                || ExplainNode::LookupOptions {
                    config: label.clone(),
                },
                |invocation| {
                    let mut options = find_lookup_options(&providers, invocation)?;
                    let fallback = find_lookup_options(&default_providers, invocation)?;
                    // Regular hierarchy wins over the default hierarchy
                    options = match (options, fallback) {
                        (Some(regular), Some(fallback)) => {
                            Some(deep_merge(regular, fallback, &DeepOptions::default()).0)
                        }
                        (regular, fallback) => regular.or(fallback),
                    };
                    split_lookup_options(options)
                },
            )
        })?;

        tracing::debug!(
            config = %config.path().display(),
            module = module.unwrap_or(""),
            entries = providers.len(),
            default_entries = default_providers.len(),
            lookup_options = lookup_options.len() + patterns.len(),
            "Resolved hierarchy config"
        );

        Ok(Self {
            path: config.path().to_path_buf(),
            module: module.map(str::to_string),
            providers,
            default_providers,
            lookup_options,
            patterns,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn providers(&self) -> &[DataProvider] {
        &self.providers
    }

    pub fn default_providers(&self) -> &[DataProvider] {
        &self.default_providers
    }

    /// Search the hierarchy, then the default hierarchy if nothing was found.
    pub fn lookup(
        &self,
        key: &Key,
        invocation: &mut Invocation<'_>,
        strategy: &MergeStrategy,
    ) -> Result<Option<Value>> {
        let found = strategy.lookup(&self.providers, invocation, |invocation, provider| {
            provider.lookup(key, invocation, strategy)
        })?;
        if found.is_some() || self.default_providers.is_empty() {
            return Ok(found);
        }
        strategy.lookup(&self.default_providers, invocation, |invocation, provider| {
            provider.lookup(key, invocation, strategy)
        })
    }

    /// Options for a root key. An exact entry wins over `^regex` entries;
    /// among patterns the first match wins.
    pub fn lookup_options_for(&self, root: &str) -> Option<&Map<String, Value>> {
        self.lookup_options.get(root).and_then(Value::as_object).or_else(|| {
            self.patterns
                .iter()
                .find(|(pattern, _)| pattern.is_match(root))
                .map(|(_, options)| options)
        })
    }
}

fn build_providers(
    entries: &[Entry],
    defaults: &Entry,
    root: &Path,
    invocation: &mut Invocation<'_>,
) -> Result<Vec<DataProvider>> {
    let loader = invocation.session().loader();
    let mut providers = Vec::with_capacity(entries.len());
    for entry in entries {
        let resolved = entry.resolve(defaults, root, invocation)?;
        let function = loader.resolve(resolved.function().kind, &resolved.function().name)?;
        providers.push(DataProvider::new(resolved, function));
    }
    Ok(providers)
}

/// Deep merge of `lookup_options` across `providers`.
fn find_lookup_options(
    providers: &[DataProvider],
    invocation: &mut Invocation<'_>,
) -> Result<Option<Value>> {
    if providers.is_empty() {
        return Ok(None);
    }
    let key = Key::parse(LOOKUP_OPTIONS)?;
    let strategy = MergeStrategy::deep();
    strategy.lookup(providers, invocation, |invocation, provider| {
        provider.lookup(&key, invocation, &strategy)
    })
}

type SplitOptions = (Map<String, Value>, Vec<(Regex, Map<String, Value>)>);

fn split_lookup_options(options: Option<Value>) -> Result<SplitOptions> {
    let options = match options {
        None | Some(Value::Null) => return Ok((Map::new(), Vec::new())),
        Some(Value::Object(options)) => options,
        Some(other) => return Err(ConfigError::InvalidLookupOptions(kind_name(&other)).into()),
    };

    let mut exact = Map::new();
    let mut patterns = Vec::new();
    for (name, value) in options {
        let entry = match value {
            Value::Object(entry) => entry,
            other => {
                tracing::warn!(
                    key = %name,
                    found = kind_name(&other),
                    "Ignoring non-hash lookup_options entry"
                );
                continue;
            }
        };
        if name.starts_with('^') {
            let pattern = Regex::new(&name).map_err(|e| ConfigError::InvalidPattern {
                pattern: name.clone(),
                message: e.to_string(),
            })?;
            patterns.push((pattern, entry));
        } else {
            exact.insert(name, Value::Object(entry));
        }
    }
    Ok((exact, patterns))
}
