//! Lookup sessions
//!
//! A [`Session`] owns everything shared by concurrent lookups: the settings
//! and top scope, the function loader, the top provider, and two
//! single-flight caches (resolved configs and top-level results). Each lookup
//! runs in its own [`Invocation`] borrowed from the session.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hiera_cache::SharedCache;
use hiera_key::Key;
use serde_json::{Map, Value};

use crate::config::{ConfigKey, ResolvedConfig};
use crate::error::Result;
use crate::explain::ExplainNode;
use crate::function::{FunctionLoader, FunctionRegistry};
use crate::invocation::{Invocation, LookupParams};
use crate::merge::{deep_merge, DeepOptions, MergeStrategy};
use crate::scope::Scope;
use crate::settings::SessionSettings;

/// Value of `convert_to` that turns on redaction.
const SENSITIVE: &str = "Sensitive";

pub type TopProviderFn = Arc<
    dyn Fn(&mut Invocation<'_>, &Key, &MergeStrategy) -> Result<Option<Value>> + Send + Sync,
>;

/// Source of the value for a key's root.
#[derive(Clone, Default)]
pub enum TopProvider {
    /// Search the global hierarchy, plus the module hierarchy for
    /// `<module>::` keys
    #[default]
    Config,
    Custom(TopProviderFn),
}

impl TopProvider {
    pub fn custom<F>(provider: F) -> Self
    where
        F: Fn(&mut Invocation<'_>, &Key, &MergeStrategy) -> Result<Option<Value>>
            + Send
            + Sync
            + 'static,
    {
        Self::Custom(Arc::new(provider))
    }
}

impl std::fmt::Debug for TopProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => f.write_str("TopProvider::Config"),
            Self::Custom(_) => f.write_str("TopProvider::Custom"),
        }
    }
}

/// Result cache key: the full key and the requested merge strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ValueKey {
    pub key: String,
    pub merge: Option<MergeStrategy>,
}

/// Shared state of concurrent lookups.
pub struct Session {
    settings: SessionSettings,
    scope: Scope,
    loader: Arc<dyn FunctionLoader>,
    top: TopProvider,
    configs: SharedCache<ConfigKey, Arc<ResolvedConfig>>,
    values: SharedCache<ValueKey, Option<Value>>,
    closed: AtomicBool,
}

impl Session {
    /// A session with the built-in functions.
    pub fn new(settings: SessionSettings) -> Self {
        let scope = Scope::new(settings.variables.clone());
        Self {
            settings,
            scope,
            loader: Arc::new(FunctionRegistry::with_builtins()),
            top: TopProvider::Config,
            configs: SharedCache::new(),
            values: SharedCache::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn FunctionLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_top_provider(mut self, top: TopProvider) -> Self {
        self.top = top;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn loader(&self) -> &dyn FunctionLoader {
        self.loader.as_ref()
    }

    pub fn top_provider(&self) -> &TopProvider {
        &self.top
    }

    /// A fresh invocation for one lookup call.
    pub fn invocation(&self) -> Invocation<'_> {
        Invocation::new(self)
    }

    /// Look up a single name in a fresh invocation.
    pub fn lookup(&self, name: &str, params: &LookupParams) -> Result<Value> {
        self.invocation().lookup(&[name], params)
    }

    /// End the session. The loader is shut down once; later calls do nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(
            configs = self.configs.len(),
            values = self.values.len(),
            "Closing lookup session"
        );
        self.values.clear();
        self.configs.clear();
        self.loader.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn configs(&self) -> &SharedCache<ConfigKey, Arc<ResolvedConfig>> {
        &self.configs
    }

    pub(crate) fn values(&self) -> &SharedCache<ValueKey, Option<Value>> {
        &self.values
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .field("top", &self.top)
            .field("configs", &self.configs.len())
            .field("values", &self.values.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One hierarchy searched for a key.
struct Layer {
    name: String,
    config: Arc<ResolvedConfig>,
}

/// Search the global hierarchy, then the module hierarchy of `<module>::`
/// keys.
///
/// Without a requested strategy the root's `lookup_options` decide, then
/// `first`.
pub(crate) fn lookup_in_hierarchy(
    invocation: &mut Invocation<'_>,
    key: &Key,
    merge: Option<&MergeStrategy>,
) -> Result<Option<Value>> {
    let session = invocation.session();
    let mut layers = vec![Layer {
        name: "Global".to_string(),
        config: invocation.resolved_config(&ConfigKey::global(&session.settings.config))?,
    }];
    if let Some((module, _)) = key.root().split_once("::") {
        if let Some(path) = session.settings.module_config(module) {
            layers.push(Layer {
                name: format!("Module \"{}\"", module),
                config: invocation.resolved_config(&ConfigKey::module(path, module))?,
            });
        }
    }

    let options = merged_lookup_options(&layers, key.root());
    let strategy = match (merge, options.get("merge")) {
        (Some(requested), _) => requested.clone(),
        (None, Some(configured)) => MergeStrategy::from_value(configured)?,
        (None, None) => MergeStrategy::First,
    };

    if options.get("convert_to").and_then(Value::as_str) == Some(SENSITIVE) {
        invocation.redact_current_lookup();
    }
    search_layers(invocation, &layers, key, &strategy)
}

fn search_layers(
    invocation: &mut Invocation<'_>,
    layers: &[Layer],
    key: &Key,
    strategy: &MergeStrategy,
) -> Result<Option<Value>> {
    strategy.lookup(layers, invocation, |invocation, layer| {
        invocation.explain_scope(
            || ExplainNode::Layer {
                name: layer.name.clone(),
            },
            |invocation| layer.config.lookup(key, invocation, strategy),
        )
    })
}

/// `lookup_options` for `root` across layers; earlier layers win.
fn merged_lookup_options(layers: &[Layer], root: &str) -> Map<String, Value> {
    let merged = layers
        .iter()
        .filter_map(|layer| layer.config.lookup_options_for(root))
        .map(|options| Value::Object(options.clone()))
        .reduce(|earlier, later| deep_merge(earlier, later, &DeepOptions::default()).0);
    match merged {
        Some(Value::Object(options)) => options,
        _ => Map::new(),
    }
}
