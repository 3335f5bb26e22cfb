//! Merge strategies
//!
//! Combines the values found at several hierarchy levels into one. Candidates
//! are always visited in hierarchy order and earlier (higher precedence)
//! candidates win on conflict:
//! - `first`: the first value found, no merging
//! - `unique`: union of flattened arrays, first-seen order
//! - `hash`: union of hashes, earlier keys win
//! - `deep`: recursive union of hashes and arrays, earlier scalars win

use std::cmp::Ordering;

use hiera_key::kind_name;
use serde_json::{Map, Value};

use crate::error::{LookupError, Result};
use crate::explain::ExplainNode;
use crate::invocation::Invocation;

/// Options accepted by the `deep` strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeepOptions {
    /// Sort arrays produced by merging
    pub sort_merged_arrays: bool,
    /// Deep merge hashes found at the same index of two arrays
    pub merge_hash_arrays: bool,
}

/// How values from several hierarchy levels are combined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    #[default]
    First,
    Unique,
    Hash,
    Deep(DeepOptions),
}

impl MergeStrategy {
    /// Strategy by name, without options.
    pub fn named(name: &str) -> Result<Self> {
        Self::with_options(name, &Map::new())
    }

    /// Strategy by name with strategy-specific options.
    ///
    /// Only `deep` accepts options.
    pub fn with_options(name: &str, options: &Map<String, Value>) -> Result<Self> {
        let strategy = match name {
            "first" => Self::First,
            "unique" => Self::Unique,
            "hash" => Self::Hash,
            "deep" => return Ok(Self::Deep(parse_deep_options(options)?)),
            _ => return Err(LookupError::UnknownMergeStrategy(name.to_string())),
        };
        if let Some(option) = options.keys().next() {
            return Err(LookupError::InvalidMergeOptions {
                strategy: name.to_string(),
                reason: format!("does not accept options, got '{}'", option),
            });
        }
        Ok(strategy)
    }

    /// Strategy from a `merge` value: a name or `{strategy: <name>, <options>}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(name) => Self::named(name),
            Value::Object(map) => {
                let Some(Value::String(name)) = map.get("strategy") else {
                    return Err(LookupError::InvalidMergeOptions {
                        strategy: "?".to_string(),
                        reason: "missing 'strategy' name".to_string(),
                    });
                };
                let mut options = map.clone();
                options.remove("strategy");
                Self::with_options(name, &options)
            }
            other => Err(LookupError::InvalidMergeOptions {
                strategy: "?".to_string(),
                reason: format!("expected a name or a hash, got {}", kind_name(other)),
            }),
        }
    }

    pub fn deep() -> Self {
        Self::Deep(DeepOptions::default())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Unique => "unique",
            Self::Hash => "hash",
            Self::Deep(_) => "deep",
        }
    }

    /// Look up each candidate in order and merge what is found.
    ///
    /// `first` stops at the first hit. Other strategies visit every candidate;
    /// with two or more candidates the merge is recorded as an explain scope.
    pub fn lookup<'s, T, F>(
        &self,
        candidates: &[T],
        invocation: &mut Invocation<'s>,
        mut lookup_one: F,
    ) -> Result<Option<Value>>
    where
        F: FnMut(&mut Invocation<'s>, &T) -> Result<Option<Value>>,
    {
        if let Self::First = self {
            for candidate in candidates {
                if let Some(value) = lookup_one(invocation, candidate)? {
                    return Ok(Some(value));
                }
            }
            return Ok(None);
        }

        if let [single] = candidates {
            return lookup_one(invocation, single)?
                .map(|value| self.normalize(value))
                .transpose();
        }

        invocation.explain_scope(
            || ExplainNode::Merge {
                strategy: self.name().to_string(),
            },
            |invocation| {
                let mut merged: Option<Value> = None;
                let mut changed = false;
                for candidate in candidates {
                    let Some(value) = lookup_one(invocation, candidate)? else {
                        continue;
                    };
                    let value = self.normalize(value)?;
                    merged = Some(match merged {
                        None => value,
                        Some(earlier) => {
                            let (result, did_merge) = self.merge(earlier, value);
                            changed |= did_merge;
                            result
                        }
                    });
                }
                if changed {
                    if let Some(value) = &merged {
                        invocation.report_merged(value);
                    }
                }
                Ok(merged)
            },
        )
    }

    /// Per-candidate preparation before merging.
    fn normalize(&self, value: Value) -> Result<Value> {
        match self {
            Self::Unique => {
                let mut flat = Vec::new();
                flatten_into(value, &mut flat);
                Ok(Value::Array(flat))
            }
            Self::Hash if !value.is_object() => Err(LookupError::MergeTypeMismatch {
                strategy: self.name().to_string(),
                found: kind_name(&value),
            }),
            _ => Ok(value),
        }
    }

    /// Merge a later candidate into the earlier result.
    ///
    /// Returns the result and whether it differs from `earlier`.
    fn merge(&self, earlier: Value, later: Value) -> (Value, bool) {
        match self {
            Self::First => (earlier, false),
            Self::Unique => match (earlier, later) {
                (Value::Array(mut items), Value::Array(more)) => {
                    let changed = union_into(&mut items, more);
                    (Value::Array(items), changed)
                }
                (earlier, _) => (earlier, false),
            },
            Self::Hash => match (earlier, later) {
                (Value::Object(mut base), Value::Object(overlay)) => {
                    let mut changed = false;
                    for (key, value) in overlay {
                        if !base.contains_key(&key) {
                            base.insert(key, value);
                            changed = true;
                        }
                    }
                    (Value::Object(base), changed)
                }
                (earlier, _) => (earlier, false),
            },
            Self::Deep(options) => deep_merge(earlier, later, options),
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_deep_options(options: &Map<String, Value>) -> Result<DeepOptions> {
    let mut deep = DeepOptions::default();
    for (name, value) in options {
        let flag = match name.as_str() {
            "sort_merged_arrays" => &mut deep.sort_merged_arrays,
            "merge_hash_arrays" => &mut deep.merge_hash_arrays,
            _ => {
                return Err(LookupError::InvalidMergeOptions {
                    strategy: "deep".to_string(),
                    reason: format!("unknown option '{}'", name),
                })
            }
        };
        *flag = value.as_bool().ok_or_else(|| LookupError::InvalidMergeOptions {
            strategy: "deep".to_string(),
            reason: format!("option '{}' must be a boolean", name),
        })?;
    }
    Ok(deep)
}

/// Deep merge two values, `earlier` taking precedence.
///
/// Merge semantics:
/// - Hashes: merged by key (recursive), keys unique to either side kept
/// - Arrays: union, deduplicated by equality (elements are not merged unless
///   `merge_hash_arrays` is set)
/// - Scalars and mismatched kinds: `earlier` wins
pub fn deep_merge(earlier: Value, later: Value, options: &DeepOptions) -> (Value, bool) {
    match (earlier, later) {
        // Both hashes: merge key by key, keeping earlier key order
        (Value::Object(mut base), Value::Object(overlay)) => {
            let mut changed = false;
            for (key, later_value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => {
                        let (merged, did_merge) =
                            deep_merge(std::mem::take(existing), later_value, options);
                        *existing = merged;
                        changed |= did_merge;
                    }
                    None => {
                        base.insert(key, later_value);
                        changed = true;
                    }
                }
            }
            (Value::Object(base), changed)
        }

        // Both arrays: union
        (Value::Array(mut base), Value::Array(overlay)) => {
            let mut changed = false;
            let mut rest = Vec::new();
            for (index, item) in overlay.into_iter().enumerate() {
                match base.get_mut(index) {
                    Some(existing)
                        if options.merge_hash_arrays && existing.is_object() && item.is_object() =>
                    {
                        let (merged, did_merge) =
                            deep_merge(std::mem::take(existing), item, options);
                        *existing = merged;
                        changed |= did_merge;
                    }
                    _ => rest.push(item),
                }
            }
            changed |= union_into(&mut base, rest);
            if options.sort_merged_arrays {
                base.sort_by(compare_values);
            }
            (Value::Array(base), changed)
        }

        // Scalars and any other case: earlier wins
        (earlier, _) => (earlier, false),
    }
}

fn flatten_into(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => {
            if !out.contains(&other) {
                out.push(other);
            }
        }
    }
}

/// Append the items of `more` that `items` lacks. Returns true if any were added.
fn union_into(items: &mut Vec<Value>, more: Vec<Value>) -> bool {
    let before = items.len();
    for item in more {
        if !items.contains(&item) {
            items.push(item);
        }
    }
    items.len() != before
}

/// Total order used by `sort_merged_arrays`: numbers, then strings, then
/// everything else by its JSON text.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            _ => 2,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn merge_all(strategy: &MergeStrategy, values: Vec<Value>) -> Value {
        let mut iter = values.into_iter().map(|v| strategy.normalize(v).unwrap());
        let first = iter.next().unwrap();
        iter.fold(first, |acc, v| strategy.merge(acc, v).0)
    }

    #[test]
    fn test_named() {
        assert_eq!(MergeStrategy::named("first").unwrap(), MergeStrategy::First);
        assert_eq!(MergeStrategy::named("deep").unwrap(), MergeStrategy::deep());
        assert!(matches!(
            MergeStrategy::named("shallow"),
            Err(LookupError::UnknownMergeStrategy(_))
        ));
    }

    #[test]
    fn test_options_only_for_deep() {
        let Value::Object(options) = json!({"sort_merged_arrays": true}) else {
            unreachable!()
        };
        assert!(matches!(
            MergeStrategy::with_options("hash", &options),
            Err(LookupError::InvalidMergeOptions { .. })
        ));
        assert_eq!(
            MergeStrategy::with_options("deep", &options).unwrap(),
            MergeStrategy::Deep(DeepOptions {
                sort_merged_arrays: true,
                merge_hash_arrays: false,
            })
        );
    }

    #[test]
    fn test_from_value() {
        assert_eq!(
            MergeStrategy::from_value(&json!("unique")).unwrap(),
            MergeStrategy::Unique
        );
        assert_eq!(
            MergeStrategy::from_value(&json!({"strategy": "deep", "merge_hash_arrays": true}))
                .unwrap(),
            MergeStrategy::Deep(DeepOptions {
                sort_merged_arrays: false,
                merge_hash_arrays: true,
            })
        );
        assert!(MergeStrategy::from_value(&json!({"strategy": "deep", "bogus": true})).is_err());
        assert!(MergeStrategy::from_value(&json!({"merge_hash_arrays": true})).is_err());
        assert!(MergeStrategy::from_value(&json!(3)).is_err());
    }

    #[test]
    fn test_hash_earlier_wins() {
        let result = merge_all(
            &MergeStrategy::Hash,
            vec![json!({"a": 1, "b": 2}), json!({"b": 3, "c": 4})],
        );
        assert_eq!(result, json!({"a": 1, "b": 2, "c": 4}));
    }

    #[test]
    fn test_hash_is_shallow() {
        let result = merge_all(
            &MergeStrategy::Hash,
            vec![json!({"x": {"a": 1}}), json!({"x": {"b": 2}})],
        );
        assert_eq!(result, json!({"x": {"a": 1}}));
    }

    #[test]
    fn test_hash_rejects_non_hash() {
        assert!(matches!(
            MergeStrategy::Hash.normalize(json!([1])),
            Err(LookupError::MergeTypeMismatch { found: "array", .. })
        ));
    }

    #[test]
    fn test_deep_nested() {
        let result = merge_all(
            &MergeStrategy::deep(),
            vec![
                json!({"one": 1, "three": {"a": "A", "c": "C"}}),
                json!({"two": "two", "three": {"a": "A", "b": "B"}}),
            ],
        );
        assert_eq!(
            result,
            json!({"one": 1, "two": "two", "three": {"a": "A", "c": "C", "b": "B"}})
        );
    }

    #[test]
    fn test_deep_arrays_union() {
        let (result, changed) = deep_merge(
            json!({"list": [1, 2]}),
            json!({"list": [2, 3]}),
            &DeepOptions::default(),
        );
        assert!(changed);
        assert_eq!(result, json!({"list": [1, 2, 3]}));
    }

    #[test]
    fn test_deep_mismatch_earlier_wins() {
        let (result, changed) =
            deep_merge(json!({"a": "text"}), json!({"a": {"b": 1}}), &DeepOptions::default());
        assert!(!changed);
        assert_eq!(result, json!({"a": "text"}));
    }

    #[test]
    fn test_deep_unchanged_flag() {
        let (_, changed) = deep_merge(json!({"a": 1}), json!({"a": 2}), &DeepOptions::default());
        assert!(!changed);
    }

    #[test]
    fn test_deep_sort_merged_arrays() {
        let options = DeepOptions {
            sort_merged_arrays: true,
            merge_hash_arrays: false,
        };
        let (result, _) = deep_merge(json!(["b", "c"]), json!(["a"]), &options);
        assert_eq!(result, json!(["a", "b", "c"]));
    }

    #[test]
    fn test_deep_merge_hash_arrays() {
        let options = DeepOptions {
            sort_merged_arrays: false,
            merge_hash_arrays: true,
        };
        let (result, _) = deep_merge(
            json!([{"name": "a", "port": 1}]),
            json!([{"name": "b", "tls": true}, "extra"]),
            &options,
        );
        assert_eq!(result, json!([{"name": "a", "port": 1, "tls": true}, "extra"]));
    }

    #[test]
    fn test_unique_flattens_and_dedups() {
        let result = merge_all(
            &MergeStrategy::Unique,
            vec![json!(["one", "two"]), json!(["two", "three"])],
        );
        assert_eq!(result, json!(["one", "two", "three"]));

        let result = merge_all(&MergeStrategy::Unique, vec![json!("a"), json!([["b", "a"], "c"])]);
        assert_eq!(result, json!(["a", "b", "c"]));
    }
}
