//! Data provider functions
//!
//! A hierarchy entry names a function of one of three kinds. The
//! [`FunctionLoader`] capability turns (kind, name) into a callable; the
//! in-process [`FunctionRegistry`] is the default loader and comes with the
//! built-in functions registered.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use hiera_key::Key;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LookupError, Result};
use crate::provider::{builtin, ProviderContext};

/// The three shapes a data provider function can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Returns a whole hash; keys are looked up in it
    DataHash,
    /// Digs the full key itself
    DataDig,
    /// Resolves a root key name
    LookupKey,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 3] = [Self::DataHash, Self::DataDig, Self::LookupKey];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataHash => "data_hash",
            Self::DataDig => "data_dig",
            Self::LookupKey => "lookup_key",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type DataHashFn =
    Arc<dyn Fn(&mut ProviderContext<'_, '_>) -> Result<Map<String, Value>> + Send + Sync>;
pub type DataDigFn =
    Arc<dyn Fn(&mut ProviderContext<'_, '_>, &Key) -> Result<Option<Value>> + Send + Sync>;
pub type LookupKeyFn =
    Arc<dyn Fn(&mut ProviderContext<'_, '_>, &str) -> Result<Option<Value>> + Send + Sync>;

/// A resolved data provider function.
#[derive(Clone)]
pub enum Function {
    DataHash(DataHashFn),
    DataDig(DataDigFn),
    LookupKey(LookupKeyFn),
}

impl Function {
    pub fn kind(&self) -> FunctionKind {
        match self {
            Self::DataHash(_) => FunctionKind::DataHash,
            Self::DataDig(_) => FunctionKind::DataDig,
            Self::LookupKey(_) => FunctionKind::LookupKey,
        }
    }

    pub fn data_hash<F>(f: F) -> Self
    where
        F: Fn(&mut ProviderContext<'_, '_>) -> Result<Map<String, Value>> + Send + Sync + 'static,
    {
        Self::DataHash(Arc::new(f))
    }

    pub fn data_dig<F>(f: F) -> Self
    where
        F: Fn(&mut ProviderContext<'_, '_>, &Key) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        Self::DataDig(Arc::new(f))
    }

    pub fn lookup_key<F>(f: F) -> Self
    where
        F: Fn(&mut ProviderContext<'_, '_>, &str) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        Self::LookupKey(Arc::new(f))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.kind())
    }
}

/// Capability that resolves function names for hierarchy entries.
///
/// Resolving the same name twice must yield the same function (an
/// implementation backed by external processes must not spawn twice).
pub trait FunctionLoader: Send + Sync {
    fn resolve(&self, kind: FunctionKind, name: &str) -> Result<Function>;

    /// Called once when the session ends. Release anything backing the
    /// resolved functions.
    fn shutdown(&self) {}
}

/// In-process function registry.
pub struct FunctionRegistry {
    functions: RwLock<HashMap<(FunctionKind, String), Function>>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with the built-in functions: `yaml_data`, `json_data`,
    /// `toml_data` (data_hash) and `environment` (lookup_key).
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register("yaml_data", Function::data_hash(builtin::yaml_data));
        registry.register("json_data", Function::data_hash(builtin::json_data));
        registry.register("toml_data", Function::data_hash(builtin::toml_data));
        registry.register("environment", Function::lookup_key(builtin::environment));
        registry
    }

    /// Register (or replace) a function under `name`.
    pub fn register(&self, name: impl Into<String>, function: Function) {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((function.kind(), name.into()), function);
    }

    pub fn contains(&self, kind: FunctionKind, name: &str) -> bool {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&(kind, name.to_string()))
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionLoader for FunctionRegistry {
    fn resolve(&self, kind: FunctionKind, name: &str) -> Result<Function> {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| LookupError::UnknownFunction {
                kind: kind.to_string(),
                name: name.to_string(),
            })
    }
}
