//! Per-call lookup context
//!
//! An [`Invocation`] carries everything one top-level lookup needs:
//! - the recursion guard (names currently being resolved)
//! - the active variable scope
//! - the redaction flag
//! - the optional explain recorder and its visibility mode
//! - the configs already resolved during this call
//!
//! Every mode is entered through a scoped helper that restores the previous
//! state when the closure returns, whether it succeeded or not.

use std::collections::HashMap;
use std::sync::Arc;

use hiera_key::{kind_name, Key};
use serde_json::{Map, Value};

use crate::config::{Config, ConfigKey, ResolvedConfig, LOOKUP_OPTIONS};
use crate::error::{LookupError, Result};
use crate::explain::{ExplainEvent, ExplainNode, Explainer};
use crate::interpolate::interpolate as interpolate_value;
use crate::merge::MergeStrategy;
use crate::scope::Scope;
use crate::session::{Session, TopProvider, ValueKey};

/// Placeholder logged instead of values while redaction is active.
const REDACTED_LOG: &str = "[redacted]";

/// Which explain events are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationMode {
    /// Ordinary data lookups
    Data,
    /// Collecting `lookup_options` for a config
    LookupOptions,
    /// Resolving hierarchy entries; never explained
    ConfigResolution,
}

/// Asserted type of a lookup result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueType {
    #[default]
    Any,
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Hash,
}

impl ValueType {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_f64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Hash => value.is_object(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Array => "Array",
            Self::Hash => "Hash",
        }
    }

    fn check(&self, key: &str, value: &Value) -> Result<()> {
        if self.accepts(value) {
            return Ok(());
        }
        Err(LookupError::TypeMismatch {
            key: key.to_string(),
            expected: self.name().to_string(),
            found: kind_name(value),
        })
    }
}

/// Options of a top-level lookup.
#[derive(Debug, Clone, Default)]
pub struct LookupParams {
    /// Merge strategy; `None` defers to `lookup_options`, then `first`
    pub merge: Option<MergeStrategy>,
    pub value_type: ValueType,
    /// Returned when nothing is found. `Some(Value::Null)` is an explicit
    /// null default, unlike `None`.
    pub default_value: Option<Value>,
    /// Values returned as is, before any hierarchy search
    pub override_values: Map<String, Value>,
    /// Per-name defaults, consulted before `default_value`
    pub default_values: Map<String, Value>,
}

impl LookupParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = Some(merge);
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_override(mut self, name: impl Into<String>, value: Value) -> Self {
        self.override_values.insert(name.into(), value);
        self
    }

    pub fn with_default_for(mut self, name: impl Into<String>, value: Value) -> Self {
        self.default_values.insert(name.into(), value);
        self
    }
}

/// Context of one top-level lookup call.
pub struct Invocation<'s> {
    session: &'s Session,
    name_stack: Vec<String>,
    scope: Scope,
    redacted: bool,
    explainer: Option<Explainer>,
    mode: InvocationMode,
    configs: HashMap<ConfigKey, Arc<ResolvedConfig>>,
}

impl<'s> Invocation<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            name_stack: Vec::new(),
            scope: session.scope().clone(),
            redacted: false,
            explainer: None,
            mode: InvocationMode::Data,
            configs: HashMap::new(),
        }
    }

    /// Record an explain tree for every lookup made through this invocation.
    pub fn with_explainer(mut self, explainer: Explainer) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn explainer(&self) -> Option<&Explainer> {
        self.explainer.as_ref()
    }

    pub fn take_explainer(&mut self) -> Option<Explainer> {
        self.explainer.take()
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_redacted(&self) -> bool {
        self.redacted
    }

    /// Look up the first of `names` that has a value.
    ///
    /// Per name, an override wins over the hierarchy. When no name is found,
    /// `default_values` are tried in the same order, then `default_value`.
    pub fn lookup(&mut self, names: &[&str], params: &LookupParams) -> Result<Value> {
        let keys = names
            .iter()
            .map(|name| Key::parse(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut found = None;
        for key in &keys {
            if let Some(value) = params.override_values.get(key.source()) {
                found = Some((key.source(), value.clone()));
                break;
            }
            if let Some(value) = self.lookup_key(key, params.merge.as_ref())? {
                found = Some((key.source(), value));
                break;
            }
        }
        if found.is_none() {
            found = keys.iter().find_map(|key| {
                params
                    .default_values
                    .get(key.source())
                    .map(|value| (key.source(), value.clone()))
            });
        }

        let (name, value) = match (found, &params.default_value) {
            (Some(found), _) => found,
            (None, Some(default)) => (names.first().copied().unwrap_or(""), default.clone()),
            (None, None) => {
                return Err(match names {
                    [name] => LookupError::NameNotFound(name.to_string()),
                    _ => LookupError::NotAnyNameFound(
                        names.iter().map(|n| n.to_string()).collect(),
                    ),
                })
            }
        };
        params.value_type.check(name, &value)?;
        Ok(value)
    }

    /// Look up one key: search the root, then dig the rest of the key.
    ///
    /// `None` means not found. Also used for nested lookups started by
    /// interpolation.
    pub fn lookup_key(
        &mut self,
        key: &Key,
        merge: Option<&MergeStrategy>,
    ) -> Result<Option<Value>> {
        if key.root() == LOOKUP_OPTIONS {
            return Err(LookupError::InvalidKey {
                key: key.source().to_string(),
                reason: format!("'{}' is reserved", LOOKUP_OPTIONS),
            });
        }

        self.guarded(key.source(), |invocation| {
            // Sensitivity found during the search lasts until this key is done
            let redacted = invocation.redacted;
            let result = invocation.explain_scope(
                || ExplainNode::Lookup {
                    key: key.source().to_string(),
                },
                |invocation| {
                    let value = match invocation.lookup_root(key, merge)? {
                        Some(root) => key.dig(&root)?,
                        None => None,
                    };
                    match &value {
                        Some(found) => {
                            let redacted = invocation.redacted;
                            invocation.report(move || ExplainEvent::Result {
                                value: (!redacted).then(|| found.clone()),
                            });
                        }
                        None => invocation.report_not_found(key.source()),
                    }
                    Ok(value)
                },
            );
            invocation.redacted = redacted;
            result
        })
    }

    /// Redact found values until the key being looked up is done.
    pub(crate) fn redact_current_lookup(&mut self) {
        self.redacted = true;
    }

    /// Ask the top provider for the value of the key's root.
    ///
    /// Top-level lookups in the session scope without an explainer share the
    /// session's result cache. Nested lookups always compute.
    fn lookup_root(&mut self, key: &Key, merge: Option<&MergeStrategy>) -> Result<Option<Value>> {
        let session = self.session;
        let cacheable = self.name_stack.len() == 1
            && self.explainer.is_none()
            && self.scope.same_chain(session.scope());
        if !cacheable {
            return self.search_top(key, merge);
        }

        let cache_key = ValueKey {
            key: key.source().to_string(),
            merge: merge.cloned(),
        };
        session
            .values()
            .get_or_try_insert_with(cache_key, || self.search_top(key, merge))
    }

    fn search_top(&mut self, key: &Key, merge: Option<&MergeStrategy>) -> Result<Option<Value>> {
        let session = self.session;
        match session.top_provider() {
            TopProvider::Config => crate::session::lookup_in_hierarchy(self, key, merge),
            TopProvider::Custom(provider) => {
                let strategy = merge.cloned().unwrap_or_default();
                provider(self, key, &strategy)
            }
        }
    }

    /// Interpolate a value in this invocation's scope.
    pub fn interpolate(&mut self, value: &Value) -> Result<Value> {
        Ok(interpolate_value(self, value, true)?.into_owned())
    }

    /// Run `f` with `name` bound to `value` on top of the current scope.
    pub fn with_scope_var<R, F>(&mut self, name: &str, value: Value, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let nested = self.scope.with_var(name, value);
        let parent = std::mem::replace(&mut self.scope, nested);
        let result = f(self);
        self.scope = parent;
        result
    }

    /// Run `f` with found values redacted from logs and explain output.
    pub fn with_redaction<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let previous = std::mem::replace(&mut self.redacted, true);
        let result = f(self);
        self.redacted = previous;
        result
    }

    /// Run `f` with `name` on the recursion guard stack.
    pub(crate) fn guarded<R, F>(&mut self, name: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        if self.name_stack.iter().any(|active| active == name) {
            let mut stack = self.name_stack.clone();
            stack.push(name.to_string());
            tracing::debug!(stack = ?stack, "Recursive lookup detected");
            return Err(LookupError::RecursiveLookupDetected { stack });
        }
        self.name_stack.push(name.to_string());
        let result = f(self);
        self.name_stack.pop();
        result
    }

    pub(crate) fn for_config_resolution<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.with_mode(InvocationMode::ConfigResolution, f)
    }

    pub(crate) fn for_lookup_options<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.with_mode(InvocationMode::LookupOptions, f)
    }

    pub(crate) fn for_data<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.with_mode(InvocationMode::Data, f)
    }

    fn with_mode<R, F>(&mut self, mode: InvocationMode, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let previous = std::mem::replace(&mut self.mode, mode);
        let result = f(self);
        self.mode = previous;
        result
    }

    /// Whether explain events are recorded in the current mode.
    pub fn explaining(&self) -> bool {
        match (&self.explainer, self.mode) {
            (None, _) | (Some(_), InvocationMode::ConfigResolution) => false,
            (Some(explainer), InvocationMode::LookupOptions) => explainer.records_options(),
            (Some(explainer), InvocationMode::Data) => explainer.records_data(),
        }
    }

    /// Run `f` inside an explain node. `node` only runs when explaining.
    pub(crate) fn explain_scope<R, N, F>(&mut self, node: N, f: F) -> R
    where
        N: FnOnce() -> ExplainNode,
        F: FnOnce(&mut Self) -> R,
    {
        let pushed = match (self.explaining(), self.explainer.as_mut()) {
            (true, Some(explainer)) => {
                explainer.push(node());
                true
            }
            _ => false,
        };
        let result = f(self);
        if pushed {
            if let Some(explainer) = self.explainer.as_mut() {
                explainer.pop();
            }
        }
        result
    }

    /// Record an event in the current explain node. `event` only runs when
    /// explaining.
    pub(crate) fn report<F>(&mut self, event: F)
    where
        F: FnOnce() -> ExplainEvent,
    {
        if !self.explaining() {
            return;
        }
        if let Some(explainer) = self.explainer.as_mut() {
            explainer.event(event());
        }
    }

    pub(crate) fn report_found(&mut self, key: &str, value: &Value) {
        let redacted = self.redacted;
        tracing::trace!(
            key,
            value = %LoggedValue { value, redacted },
            "Found key"
        );
        self.report(move || ExplainEvent::Found {
            key: key.to_string(),
            value: (!redacted).then(|| value.clone()),
        });
    }

    pub(crate) fn report_not_found(&mut self, key: &str) {
        tracing::trace!(key, "Key not found");
        self.report(|| ExplainEvent::NotFound {
            key: key.to_string(),
        });
    }

    pub(crate) fn report_merged(&mut self, value: &Value) {
        let redacted = self.redacted;
        self.report(move || ExplainEvent::Merged {
            value: (!redacted).then(|| value.clone()),
        });
    }

    /// The resolved config for `key`, resolving it on first use in the session.
    pub(crate) fn resolved_config(&mut self, key: &ConfigKey) -> Result<Arc<ResolvedConfig>> {
        if let Some(resolved) = self.configs.get(key) {
            return Ok(Arc::clone(resolved));
        }
        let session = self.session;
        let resolved = session.configs().get_or_try_insert_with(key.clone(), || {
            let config = Config::load(&key.path)?;
            let resolved = self.for_config_resolution(|invocation| {
                ResolvedConfig::resolve(&config, key.module.as_deref(), invocation)
            })?;
            Ok::<_, LookupError>(Arc::new(resolved))
        })?;
        self.configs.insert(key.clone(), Arc::clone(&resolved));
        Ok(resolved)
    }
}

/// Log form of a found value.
struct LoggedValue<'a> {
    value: &'a Value,
    redacted: bool,
}

impl std::fmt::Display for LoggedValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.redacted {
            f.write_str(REDACTED_LOG)
        } else {
            write!(f, "{}", self.value)
        }
    }
}
