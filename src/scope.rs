//! Variable scope
//!
//! A scope is an immutable chain of frames, innermost first. The root frame
//! holds the session variables; each further frame binds one variable and
//! defers everything else to its parent.

use std::sync::Arc;

use serde_json::{Map, Value};

#[derive(Debug)]
enum Frame {
    Root(Map<String, Value>),
    Var {
        name: String,
        value: Value,
        parent: Scope,
    },
}

/// Cheaply clonable handle to a scope chain.
#[derive(Debug, Clone)]
pub struct Scope(Arc<Frame>);

impl Scope {
    pub fn new(variables: Map<String, Value>) -> Self {
        Self(Arc::new(Frame::Root(variables)))
    }

    pub fn empty() -> Self {
        Self::new(Map::new())
    }

    /// A new scope with `name` bound to `value` on top of this one.
    pub fn with_var(&self, name: impl Into<String>, value: Value) -> Self {
        Self(Arc::new(Frame::Var {
            name: name.into(),
            value,
            parent: self.clone(),
        }))
    }

    /// True when both handles point at the same frame.
    pub fn same_chain(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Look a variable up, innermost frame first.
    ///
    /// A leading `::` (top scope marker) is ignored.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.strip_prefix("::").unwrap_or(name);
        let mut frame: &Frame = self.0.as_ref();
        loop {
            match frame {
                Frame::Root(variables) => return variables.get(name),
                Frame::Var {
                    name: bound,
                    value,
                    parent,
                } => {
                    if bound == name {
                        return Some(value);
                    }
                    frame = parent.0.as_ref();
                }
            }
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> Scope {
        let Value::Object(vars) = json!({"env": "prod", "role": "web"}) else {
            unreachable!()
        };
        Scope::new(vars)
    }

    #[test]
    fn test_root_lookup() {
        let scope = root();
        assert_eq!(scope.get("env"), Some(&json!("prod")));
        assert_eq!(scope.get("::env"), Some(&json!("prod")));
        assert_eq!(scope.get("missing"), None);
    }

    #[test]
    fn test_var_shadows_and_falls_through() {
        let scope = root().with_var("env", json!("dev")).with_var("item", json!(3));
        assert_eq!(scope.get("env"), Some(&json!("dev")));
        assert_eq!(scope.get("item"), Some(&json!(3)));
        assert_eq!(scope.get("role"), Some(&json!("web")));
    }

    #[test]
    fn test_parent_unchanged() {
        let parent = root();
        let _child = parent.with_var("env", json!("dev"));
        assert_eq!(parent.get("env"), Some(&json!("prod")));
    }
}
