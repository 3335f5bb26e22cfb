//! Built-in provider functions

use std::path::Path;

use hiera_key::kind_name;
use serde_json::{Map, Value};

use crate::config::document::{read_document, DocumentFormat};
use crate::config::ResolvedLocation;
use crate::error::{LookupError, Result};

use super::ProviderContext;

/// Prefix of keys resolved by the `environment` function.
const ENV_PREFIX: &str = "env::";

pub(crate) fn yaml_data(ctx: &mut ProviderContext<'_, '_>) -> Result<Map<String, Value>> {
    file_data(ctx, "yaml_data", DocumentFormat::Yaml)
}

pub(crate) fn json_data(ctx: &mut ProviderContext<'_, '_>) -> Result<Map<String, Value>> {
    file_data(ctx, "json_data", DocumentFormat::Json)
}

pub(crate) fn toml_data(ctx: &mut ProviderContext<'_, '_>) -> Result<Map<String, Value>> {
    file_data(ctx, "toml_data", DocumentFormat::Toml)
}

/// `env::NAME` resolves to the process environment variable `NAME`.
pub(crate) fn environment(
    ctx: &mut ProviderContext<'_, '_>,
    root: &str,
) -> Result<Option<Value>> {
    let Some(name) = root.strip_prefix(ENV_PREFIX) else {
        return Ok(None);
    };
    let value = std::env::var(name).ok();
    if value.is_none() {
        ctx.explain(|| format!("Environment variable '{}' is not set", name));
    }
    Ok(value.map(Value::String))
}

fn file_data(
    ctx: &mut ProviderContext<'_, '_>,
    function: &str,
    format: DocumentFormat,
) -> Result<Map<String, Value>> {
    let path = match ctx.location() {
        Some(ResolvedLocation::Path { path, .. }) => path.clone(),
        Some(other) => {
            return Err(LookupError::function(
                function,
                format!("only file paths are supported, got {}", other),
            ))
        }
        None => {
            return Err(LookupError::function(
                function,
                format!("hierarchy entry '{}' has no path", ctx.entry_name()),
            ))
        }
    };
    load_hash(function, &path, format)
}

fn load_hash(function: &str, path: &Path, format: DocumentFormat) -> Result<Map<String, Value>> {
    let document = read_document(path, format).map_err(|e| LookupError::function(function, e))?;
    match document {
        Value::Object(map) => Ok(map),
        // An empty document is an empty hash
        Value::Null => Ok(Map::new()),
        other => Err(LookupError::function(
            function,
            format!("{} must contain a hash, got {}", path.display(), kind_name(&other)),
        )),
    }
}
