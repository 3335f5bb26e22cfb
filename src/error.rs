//! Error types for lookups and hierarchy configuration.

use hiera_key::{DigMismatch, KeyError};
use thiserror::Error;

/// Errors detected while loading or resolving a hierarchy configuration.
///
/// All of these abort the lookup before any data provider is consulted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error in {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("unsupported hierarchy config version {0}, expected 5")]
    UnsupportedVersion(u64),

    #[error("hierarchy entry is missing a name")]
    MissingEntryName,

    #[error("hierarchy entry name '{0}' is used more than once")]
    DuplicateEntryName(String),

    #[error("hierarchy entry '{entry}' declares more than one of data_hash, data_dig, lookup_key")]
    MultipleFunctionKinds { entry: String },

    #[error("hierarchy entry '{entry}' has no data_hash, data_dig or lookup_key function")]
    MissingFunction { entry: String },

    #[error("hierarchy entry '{entry}' declares more than one of path(s), glob(s), uri(s), mapped_paths")]
    MultipleLocationKinds { entry: String },

    #[error("hierarchy entry '{entry}' uses reserved option '{option}'")]
    ReservedOption { entry: String, option: String },

    #[error("hierarchy entry '{entry}' has malformed mapped_paths: expected [source, key, template]")]
    InvalidMappedPaths { entry: String },

    #[error("invalid glob '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("invalid lookup_options pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("lookup_options must be a hash, got {0}")]
    InvalidLookupOptions(&'static str),
}

/// Errors produced by a lookup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Dig(#[from] DigMismatch),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown interpolation method '{0}'")]
    UnknownInterpolationMethod(String),

    #[error("interpolation method syntax is not allowed here: '{0}'")]
    MethodSyntaxNotAllowed(String),

    #[error("'alias' interpolation must be the entire string, got '{0}'")]
    AliasNotEntireString(String),

    #[error("recursive lookup detected in [{}]", .stack.join(", "))]
    RecursiveLookupDetected { stack: Vec<String> },

    #[error("lookup() did not find a value for the name '{0}'")]
    NameNotFound(String),

    #[error("lookup() did not find a value for any of the names [{}]", .0.join(", "))]
    NotAnyNameFound(Vec<String>),

    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("unknown merge strategy '{0}'")]
    UnknownMergeStrategy(String),

    #[error("invalid options for merge strategy '{strategy}': {reason}")]
    InvalidMergeOptions { strategy: String, reason: String },

    #[error("merge strategy '{strategy}' cannot merge a {found}")]
    MergeTypeMismatch { strategy: String, found: &'static str },

    #[error("value for '{key}' is a {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: String,
        found: &'static str,
    },

    #[error("unknown {kind} function '{name}'")]
    UnknownFunction { kind: String, name: String },

    #[error("function '{name}' failed: {message}")]
    Function { name: String, message: String },
}

impl LookupError {
    /// True for the expected "nothing found" outcomes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NameNotFound(_) | Self::NotAnyNameFound(_))
    }

    /// Build a provider function failure.
    pub fn function(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Function {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = LookupError> = std::result::Result<T, E>;
