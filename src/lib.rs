//! Hierarchical data lookup
//!
//! Resolves a dotted key to a value by searching an ordered hierarchy of
//! data providers, merging what each level holds according to a merge
//! strategy, and interpolating `%{...}` expressions against the variable
//! scope and other keys.

pub mod config;
pub mod error;
pub mod explain;
pub mod function;
pub mod interpolate;
pub mod invocation;
pub mod merge;
pub mod provider;
pub mod scope;
pub mod session;
pub mod settings;

pub use hiera_cache::SharedCache;
pub use hiera_key::{DigMismatch, Key, KeyError, Segment};

pub use config::{
    Config, ConfigKey, Entry, FunctionRef, Location, ResolvedConfig, ResolvedEntry,
    ResolvedLocation, LOOKUP_OPTIONS,
};
pub use error::{ConfigError, LookupError, Result};
pub use explain::{ExplainEvent, ExplainNode, Explainer};
pub use function::{Function, FunctionKind, FunctionLoader, FunctionRegistry};
pub use invocation::{Invocation, LookupParams, ValueType};
pub use merge::{DeepOptions, MergeStrategy};
pub use provider::{DataProvider, ProviderContext};
pub use scope::Scope;
pub use session::{Session, TopProvider};
pub use settings::SessionSettings;
