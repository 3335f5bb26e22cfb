//! Data providers
//!
//! One provider per resolved hierarchy entry. The provider calls the entry's
//! function once per location (or once without a location when the entry
//! declares none), interpolates what it gets back and reports each step to the
//! invocation's explainer.

pub(crate) mod builtin;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use hiera_key::Key;
use serde_json::{Map, Value};

use crate::config::{ResolvedEntry, ResolvedLocation, LOOKUP_OPTIONS};
use crate::error::Result;
use crate::explain::{ExplainEvent, ExplainNode};
use crate::function::{DataDigFn, DataHashFn, Function, LookupKeyFn};
use crate::interpolate::interpolate;
use crate::invocation::Invocation;
use crate::merge::MergeStrategy;

/// What a provider function sees while it runs.
pub struct ProviderContext<'a, 's> {
    invocation: &'a mut Invocation<'s>,
    entry: &'a ResolvedEntry,
    location: Option<&'a ResolvedLocation>,
    cache: &'a Mutex<Map<String, Value>>,
}

impl<'a, 's> ProviderContext<'a, 's> {
    /// Name of the hierarchy entry being searched.
    pub fn entry_name(&self) -> &str {
        self.entry.name()
    }

    /// The entry's resolved options.
    pub fn options(&self) -> &Map<String, Value> {
        self.entry.options()
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.entry.options().get(name)
    }

    /// The location being searched, if the entry declares locations.
    pub fn location(&self) -> Option<&ResolvedLocation> {
        self.location
    }

    /// Interpolate a value against the current invocation.
    pub fn interpolate(&mut self, value: &Value) -> Result<Value> {
        Ok(interpolate(self.invocation, value, true)?.into_owned())
    }

    /// Add a message to the explain output. `message` only runs when
    /// explaining.
    pub fn explain<F>(&mut self, message: F)
    where
        F: FnOnce() -> String,
    {
        self.invocation
            .report(|| ExplainEvent::Text { message: message() });
    }

    /// Cache a value for later calls of this entry's function. Returns the
    /// previous value.
    pub fn cache(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.lock_cache().insert(key.into(), value)
    }

    /// Cache every entry of `values`.
    pub fn cache_all(&self, values: Map<String, Value>) {
        self.lock_cache().extend(values);
    }

    pub fn cached_value(&self, key: &str) -> Option<Value> {
        self.lock_cache().get(key).cloned()
    }

    /// Visit every cached entry.
    pub fn cached_entries<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &Value),
    {
        for (key, value) in self.lock_cache().iter() {
            visit(key, value);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Provider for a `data_hash` entry. Hashes are loaded at most once per location.
pub struct DataHashProvider {
    entry: Arc<ResolvedEntry>,
    function: DataHashFn,
    cache: Mutex<Map<String, Value>>,
    hashes: RwLock<HashMap<String, Arc<Map<String, Value>>>>,
}

/// Provider for a `data_dig` entry.
pub struct DataDigProvider {
    entry: Arc<ResolvedEntry>,
    function: DataDigFn,
    cache: Mutex<Map<String, Value>>,
}

/// Provider for a `lookup_key` entry.
pub struct LookupKeyProvider {
    entry: Arc<ResolvedEntry>,
    function: LookupKeyFn,
    cache: Mutex<Map<String, Value>>,
}

/// A data provider bound to one resolved hierarchy entry.
pub enum DataProvider {
    DataHash(DataHashProvider),
    DataDig(DataDigProvider),
    LookupKey(LookupKeyProvider),
}

impl std::fmt::Debug for DataProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProvider")
            .field("entry", &self.entry().name())
            .field("function", &self.entry().function().to_string())
            .finish()
    }
}

impl DataProvider {
    pub fn new(entry: ResolvedEntry, function: Function) -> Self {
        let entry = Arc::new(entry);
        let cache = Mutex::new(Map::new());
        match function {
            Function::DataHash(function) => Self::DataHash(DataHashProvider {
                entry,
                function,
                cache,
                hashes: RwLock::new(HashMap::new()),
            }),
            Function::DataDig(function) => Self::DataDig(DataDigProvider {
                entry,
                function,
                cache,
            }),
            Function::LookupKey(function) => Self::LookupKey(LookupKeyProvider {
                entry,
                function,
                cache,
            }),
        }
    }

    pub fn entry(&self) -> &ResolvedEntry {
        match self {
            Self::DataHash(p) => &p.entry,
            Self::DataDig(p) => &p.entry,
            Self::LookupKey(p) => &p.entry,
        }
    }

    /// Look up `key` in this entry, merging across its locations with `merge`.
    ///
    /// An entry without configured locations is asked once with no location.
    /// An entry whose locations resolved to nothing finds nothing.
    pub fn lookup(
        &self,
        key: &Key,
        invocation: &mut Invocation<'_>,
        merge: &MergeStrategy,
    ) -> Result<Option<Value>> {
        let entry = self.entry();
        invocation.explain_scope(
            || ExplainNode::Provider {
                entry: entry.name().to_string(),
                function: entry.function().to_string(),
            },
            |invocation| match entry.locations() {
                None => self.lookup_at(key, invocation, None),
                Some(locations) => merge.lookup(locations, invocation, |invocation, location| {
                    invocation.explain_scope(
                        || ExplainNode::Location {
                            location: location.to_string(),
                        },
                        |invocation| {
                            if !location.exists() {
                                invocation.report(|| ExplainEvent::LocationNotFound);
                                return Ok(None);
                            }
                            self.lookup_at(key, invocation, Some(location))
                        },
                    )
                }),
            },
        )
    }

    fn lookup_at(
        &self,
        key: &Key,
        invocation: &mut Invocation<'_>,
        location: Option<&ResolvedLocation>,
    ) -> Result<Option<Value>> {
        let raw = match self {
            Self::DataHash(p) => p.lookup(key.root(), invocation, location)?,
            Self::DataDig(p) => {
                let mut ctx = p.context(invocation, location);
                (p.function)(&mut ctx, key)?.map(|value| key.bury(value))
            }
            Self::LookupKey(p) => {
                let mut ctx = p.context(invocation, location);
                (p.function)(&mut ctx, key.root())?
            }
        };

        let Some(raw) = raw else {
            invocation.report_not_found(key.root());
            return Ok(None);
        };
        // lookup_options are consumed as written
        let value = if key.root() == LOOKUP_OPTIONS {
            raw
        } else {
            interpolate(invocation, &raw, true)?.into_owned()
        };
        invocation.report_found(key.root(), &value);
        Ok(Some(value))
    }
}

impl DataHashProvider {
    fn lookup(
        &self,
        root: &str,
        invocation: &mut Invocation<'_>,
        location: Option<&ResolvedLocation>,
    ) -> Result<Option<Value>> {
        let hash = self.hash(invocation, location)?;
        Ok(hash.get(root).cloned())
    }

    /// The hash for a location, calling the function on first use.
    fn hash(
        &self,
        invocation: &mut Invocation<'_>,
        location: Option<&ResolvedLocation>,
    ) -> Result<Arc<Map<String, Value>>> {
        let slot = location.map(|l| l.to_string()).unwrap_or_default();
        if let Some(hash) = self
            .hashes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot)
        {
            return Ok(Arc::clone(hash));
        }

        let mut ctx = ProviderContext {
            invocation,
            entry: &self.entry,
            location,
            cache: &self.cache,
        };
        let hash = Arc::new((self.function)(&mut ctx)?);
        tracing::debug!(
            entry = %self.entry.name(),
            location = %slot,
            keys = hash.len(),
            "Loaded data hash"
        );
        self.hashes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot, Arc::clone(&hash));
        Ok(hash)
    }
}

impl DataDigProvider {
    fn context<'a, 's>(
        &'a self,
        invocation: &'a mut Invocation<'s>,
        location: Option<&'a ResolvedLocation>,
    ) -> ProviderContext<'a, 's> {
        ProviderContext {
            invocation,
            entry: &self.entry,
            location,
            cache: &self.cache,
        }
    }
}

impl LookupKeyProvider {
    fn context<'a, 's>(
        &'a self,
        invocation: &'a mut Invocation<'s>,
        location: Option<&'a ResolvedLocation>,
    ) -> ProviderContext<'a, 's> {
        ProviderContext {
            invocation,
            entry: &self.entry,
            location,
            cache: &self.cache,
        }
    }
}
