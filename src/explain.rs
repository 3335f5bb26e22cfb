//! Explain output for lookups
//!
//! An [`Explainer`] records every search, merge, provider, location and
//! interpolation step of a lookup as a tree. It renders both as indented
//! human-readable text and as structured JSON for diagnostics.

use serde::Serialize;
use serde_json::{json, Value};

/// Text shown instead of a value while redaction is active.
pub const REDACTED: &str = "[value redacted]";

/// A scope in the explain tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExplainNode {
    /// Top-level or nested search for a key
    Lookup { key: String },
    /// Search for the reserved `lookup_options` key while resolving a config
    LookupOptions { config: String },
    /// Merge over several candidates
    Merge { strategy: String },
    /// Global or module hierarchy
    Layer { name: String },
    /// One hierarchy entry
    Provider { entry: String, function: String },
    /// One resolved location of a hierarchy entry
    Location { location: String },
    /// Interpolation of an expression
    Interpolate { expression: String },
}

/// Something that happened inside a scope.
///
/// A `value` of `None` means the value was redacted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExplainEvent {
    Found { key: String, value: Option<Value> },
    NotFound { key: String },
    LocationNotFound,
    Merged { value: Option<Value> },
    Result { value: Option<Value> },
    Text { message: String },
}

#[derive(Debug)]
struct TreeNode {
    node: ExplainNode,
    events: Vec<ExplainEvent>,
    children: Vec<usize>,
}

/// Explain tree builder.
#[derive(Debug, Default)]
pub struct Explainer {
    /// Also record lookup_options resolution
    options: bool,
    /// Record only lookup_options resolution
    only_options: bool,
    nodes: Vec<TreeNode>,
    roots: Vec<usize>,
    stack: Vec<usize>,
    /// Events reported outside of any scope
    loose: Vec<ExplainEvent>,
}

impl Explainer {
    pub fn new(options: bool, only_options: bool) -> Self {
        Self {
            options: options || only_options,
            only_options,
            ..Self::default()
        }
    }

    /// Whether lookup_options resolution is recorded.
    pub fn records_options(&self) -> bool {
        self.options
    }

    /// Whether ordinary data lookups are recorded.
    pub fn records_data(&self) -> bool {
        !self.only_options
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.loose.is_empty()
    }

    pub(crate) fn push(&mut self, node: ExplainNode) {
        let index = self.nodes.len();
        self.nodes.push(TreeNode {
            node,
            events: Vec::new(),
            children: Vec::new(),
        });
        match self.stack.last() {
            Some(&parent) => self.nodes[parent].children.push(index),
            None => self.roots.push(index),
        }
        self.stack.push(index);
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop();
    }

    pub(crate) fn event(&mut self, event: ExplainEvent) {
        match self.stack.last() {
            Some(&current) => self.nodes[current].events.push(event),
            None => self.loose.push(event),
        }
    }

    /// Render the tree as indented text.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for event in &self.loose {
            lines.push(event_line(event));
        }
        for &root in &self.roots {
            self.render_node(root, 0, &mut lines);
        }
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    fn render_node(&self, index: usize, depth: usize, lines: &mut Vec<String>) {
        let node = &self.nodes[index];
        let indent = "  ".repeat(depth);
        lines.push(format!("{}{}", indent, node_line(&node.node)));
        for &child in &node.children {
            self.render_node(child, depth + 1, lines);
        }
        for event in &node.events {
            lines.push(format!("{}  {}", indent, event_line(event)));
        }
    }

    /// The tree as a JSON value.
    pub fn to_value(&self) -> Value {
        let roots: Vec<Value> = self.roots.iter().map(|&i| self.node_value(i)).collect();
        json!({
            "events": self.loose,
            "nodes": roots,
        })
    }

    fn node_value(&self, index: usize) -> Value {
        let node = &self.nodes[index];
        let mut value = serde_json::to_value(&node.node).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert(
                "events".to_string(),
                serde_json::to_value(&node.events).unwrap_or(Value::Null),
            );
            map.insert(
                "children".to_string(),
                Value::Array(node.children.iter().map(|&c| self.node_value(c)).collect()),
            );
        }
        value
    }
}

impl std::fmt::Display for Explainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

fn node_line(node: &ExplainNode) -> String {
    match node {
        ExplainNode::Lookup { key } => format!("Searching for \"{}\"", key),
        ExplainNode::LookupOptions { config } => {
            format!("Resolving lookup_options of \"{}\"", config)
        }
        ExplainNode::Merge { strategy } => format!("Merge strategy \"{}\"", strategy),
        ExplainNode::Layer { name } => format!("{} layer", name),
        ExplainNode::Provider { entry, function } => {
            format!("Hierarchy entry \"{}\" ({})", entry, function)
        }
        ExplainNode::Location { location } => format!("Location \"{}\"", location),
        ExplainNode::Interpolate { expression } => {
            format!("Interpolation \"%{{{}}}\"", expression)
        }
    }
}

fn event_line(event: &ExplainEvent) -> String {
    match event {
        ExplainEvent::Found { key, value } => {
            format!("Found key: \"{}\" value: {}", key, shown(value))
        }
        ExplainEvent::NotFound { key } => format!("No such key: \"{}\"", key),
        ExplainEvent::LocationNotFound => "Location not found".to_string(),
        ExplainEvent::Merged { value } => format!("Merged result: {}", shown(value)),
        ExplainEvent::Result { value } => format!("Result: {}", shown(value)),
        ExplainEvent::Text { message } => message.clone(),
    }
}

fn shown(value: &Option<Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => REDACTED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Explainer {
        let mut explainer = Explainer::new(false, false);
        explainer.push(ExplainNode::Lookup { key: "a".into() });
        explainer.push(ExplainNode::Provider {
            entry: "Common".into(),
            function: "data_hash function 'yaml_data'".into(),
        });
        explainer.event(ExplainEvent::Found {
            key: "a".into(),
            value: Some(json!("x")),
        });
        explainer.pop();
        explainer.event(ExplainEvent::Result { value: None });
        explainer.pop();
        explainer
    }

    #[test]
    fn test_render_nested() {
        let text = sample().render();
        assert_eq!(
            text,
            "Searching for \"a\"\n\
             \x20 Hierarchy entry \"Common\" (data_hash function 'yaml_data')\n\
             \x20   Found key: \"a\" value: \"x\"\n\
             \x20 Result: [value redacted]\n"
        );
    }

    #[test]
    fn test_to_value_structure() {
        let value = sample().to_value();
        let root = &value["nodes"][0];
        assert_eq!(root["type"], "lookup");
        assert_eq!(root["key"], "a");
        assert_eq!(root["children"][0]["type"], "provider");
        assert_eq!(root["children"][0]["events"][0]["event"], "found");
        assert_eq!(root["events"][0]["value"], Value::Null);
    }

    #[test]
    fn test_flags() {
        assert!(Explainer::new(false, false).records_data());
        let only = Explainer::new(false, true);
        assert!(only.records_options());
        assert!(!only.records_data());
    }
}
