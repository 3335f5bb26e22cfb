//! String interpolation
//!
//! Resolves `%{expression}` occurrences inside strings, arrays and hashes.
//! Supported expressions:
//! - `%{name.path}`: scope variable (same as `scope("name.path")`)
//! - `%{scope("name")}`: scope variable
//! - `%{lookup("key")}` / `%{hiera("key")}`: nested lookup, result as text
//! - `%{alias("key")}`: nested lookup, result keeps its type; must be the
//!   whole string
//! - `%{literal("text")}`: the text itself
//!
//! Values without interpolation are returned borrowed, so unchanged
//! containers are never rebuilt.

use std::borrow::Cow;
use std::sync::OnceLock;

use hiera_key::Key;
use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::error::{LookupError, Result};
use crate::explain::ExplainNode;
use crate::invocation::Invocation;

/// Expressions that interpolate to the empty string.
const EMPTY_EXPRESSIONS: &[&str] = &["", "::", "''", "\"\""];

fn expression_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%\{([^}]*)\}").expect("valid interpolation pattern"))
}

fn method_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^(\w+)\((?:"([^"]*)"|'([^']*)')\)$"#).expect("valid method pattern")
    })
}

/// A parsed `%{...}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expression<'a> {
    Empty,
    Scope(&'a str),
    Lookup(&'a str),
    Alias(&'a str),
    Literal(&'a str),
}

impl<'a> Expression<'a> {
    fn parse(text: &'a str, allow_methods: bool) -> Result<Self> {
        let text = text.trim();
        if EMPTY_EXPRESSIONS.contains(&text) {
            return Ok(Self::Empty);
        }
        let Some(captures) = method_pattern().captures(text) else {
            return Ok(Self::Scope(text));
        };
        if !allow_methods {
            return Err(LookupError::MethodSyntaxNotAllowed(text.to_string()));
        }

        let method = captures.get(1).map_or("", |m| m.as_str());
        let argument = captures
            .get(2)
            .or_else(|| captures.get(3))
            .map_or("", |m| m.as_str());
        match method {
            "scope" => Ok(Self::Scope(argument)),
            "lookup" | "hiera" => Ok(Self::Lookup(argument)),
            "alias" => Ok(Self::Alias(argument)),
            "literal" => Ok(Self::Literal(argument)),
            other => Err(LookupError::UnknownInterpolationMethod(other.to_string())),
        }
    }
}

/// Interpolate a value. Containers are walked recursively.
pub fn interpolate<'v>(
    invocation: &mut Invocation<'_>,
    value: &'v Value,
    allow_methods: bool,
) -> Result<Cow<'v, Value>> {
    match value {
        Value::String(text) => Ok(match interpolate_text(invocation, text, allow_methods)? {
            Some(replaced) => Cow::Owned(replaced),
            None => Cow::Borrowed(value),
        }),
        Value::Array(items) => {
            let results = items
                .iter()
                .map(|item| interpolate(invocation, item, allow_methods))
                .collect::<Result<Vec<_>>>()?;
            if results.iter().all(|r| matches!(r, Cow::Borrowed(_))) {
                return Ok(Cow::Borrowed(value));
            }
            Ok(Cow::Owned(Value::Array(
                results.into_iter().map(Cow::into_owned).collect(),
            )))
        }
        Value::Object(map) => {
            let mut changed = false;
            let mut entries = Vec::with_capacity(map.len());
            for (key, item) in map {
                let new_key = interpolate_text(invocation, key, allow_methods)?;
                let new_item = interpolate(invocation, item, allow_methods)?;
                changed |= new_key.is_some() || matches!(new_item, Cow::Owned(_));
                entries.push((new_key, key, new_item));
            }
            if !changed {
                return Ok(Cow::Borrowed(value));
            }
            let mut rebuilt = Map::with_capacity(entries.len());
            for (new_key, key, item) in entries {
                let key = match new_key {
                    Some(replaced) => value_to_text(&replaced),
                    None => key.clone(),
                };
                rebuilt.insert(key, item.into_owned());
            }
            Ok(Cow::Owned(Value::Object(rebuilt)))
        }
        _ => Ok(Cow::Borrowed(value)),
    }
}

/// Interpolate a string and render the result as text.
pub fn interpolate_string(
    invocation: &mut Invocation<'_>,
    text: &str,
    allow_methods: bool,
) -> Result<String> {
    Ok(match interpolate_text(invocation, text, allow_methods)? {
        Some(value) => value_to_text(&value),
        None => text.to_string(),
    })
}

/// Returns `None` when the text has nothing to interpolate.
fn interpolate_text(
    invocation: &mut Invocation<'_>,
    text: &str,
    allow_methods: bool,
) -> Result<Option<Value>> {
    if !text.contains("%{") {
        return Ok(None);
    }

    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    let mut replaced = false;
    for captures in expression_pattern().captures_iter(text) {
        let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let expression = Expression::parse(inner.as_str(), allow_methods)?;

        if let Expression::Alias(_) = expression {
            if whole.start() != 0 || whole.end() != text.len() {
                return Err(LookupError::AliasNotEntireString(text.to_string()));
            }
        }

        let resolved = if expression == Expression::Empty {
            Value::String(String::new())
        } else {
            invocation.explain_scope(
                || ExplainNode::Interpolate {
                    expression: inner.as_str().trim().to_string(),
                },
                |invocation| resolve(invocation, &expression, allow_methods),
            )?
        };

        // alias is the entire string, and keeps its type
        if let Expression::Alias(_) = expression {
            return Ok(Some(resolved));
        }

        output.push_str(&text[last..whole.start()]);
        output.push_str(&value_to_text(&resolved));
        last = whole.end();
        replaced = true;
    }

    if !replaced {
        return Ok(None);
    }
    output.push_str(&text[last..]);
    Ok(Some(Value::String(output)))
}

fn resolve(
    invocation: &mut Invocation<'_>,
    expression: &Expression<'_>,
    allow_methods: bool,
) -> Result<Value> {
    let empty = || Value::String(String::new());
    match *expression {
        Expression::Empty => Ok(empty()),
        Expression::Literal(text) => Ok(Value::String(text.to_string())),
        Expression::Scope(name) => {
            let key = Key::parse(name)?;
            let Some(root) = invocation.scope().get(key.root()).cloned() else {
                return Ok(empty());
            };
            let root = invocation.guarded(&format!("scope:{}", key.root()), |invocation| {
                Ok(interpolate(invocation, &root, allow_methods)?.into_owned())
            })?;
            Ok(key.dig(&root)?.unwrap_or_else(empty))
        }
        Expression::Lookup(name) | Expression::Alias(name) => {
            let key = Key::parse(name)?;
            Ok(invocation.lookup_key(&key, None)?.unwrap_or_else(empty))
        }
    }
}

/// Text form of an interpolated value.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
