//! Integration Tests: explain output
//!
//! The explain tree narrates each search, merge, provider, location and
//! interpolation step, redacts sensitive values, and can include or isolate
//! lookup_options resolution.

mod fixtures;

use fixtures::{two_level_hierarchy, Hierarchy};
use hiera_lookup::{Explainer, LookupParams, MergeStrategy, Session};
use serde_json::json;

fn explain(session: &Session, name: &str, params: &LookupParams, explainer: Explainer) -> Explainer {
    let mut invocation = session.invocation().with_explainer(explainer);
    // Not-found lookups are still explained
    let _ = invocation.lookup(&[name], params);
    invocation.take_explainer().expect("explainer attached")
}

// === Rendering ===

#[test]
fn test_render_first_lookup() {
    let fixture = two_level_hierarchy();
    let session = fixture.session();
    let text = explain(
        &session,
        "hash.a",
        &LookupParams::new(),
        Explainer::new(false, false),
    )
    .render();

    assert!(text.starts_with("Searching for \"hash.a\""), "{}", text);
    assert!(text.contains("Global layer"));
    assert!(text.contains("Hierarchy entry \"First\" (data_hash function 'yaml_data')"));
    assert!(text.contains("first.yaml"));
    assert!(text.contains("Found key: \"hash\""));
    assert!(text.contains("Result: \"first value of a\""));
    // first stops at the first level
    assert!(!text.contains("Hierarchy entry \"Second\""));
}

#[test]
fn test_render_not_found() {
    let fixture = two_level_hierarchy();
    let session = fixture.session();
    let text = explain(
        &session,
        "hash.b",
        &LookupParams::new(),
        Explainer::new(false, false),
    )
    .render();
    assert!(text.contains("No such key: \"hash.b\""), "{}", text);
}

#[test]
fn test_render_merge() {
    let fixture = two_level_hierarchy();
    let session = fixture.session();
    let params = LookupParams::new().with_merge(MergeStrategy::deep());
    let text = explain(&session, "hash", &params, Explainer::new(false, false)).render();

    assert!(text.contains("Merge strategy \"deep\""), "{}", text);
    assert!(text.contains("Hierarchy entry \"Second\""));
    assert!(text.contains("Merged result:"));
    assert!(text.contains("second value of b"));
}

#[test]
fn test_missing_location_reported() {
    let fixture = Hierarchy::new(
        "version: 5\nhierarchy:\n  - name: Layers\n    paths: [missing.yaml, common.yaml]\n",
    );
    fixture.write("data/common.yaml", "a: 1\n");
    let session = fixture.session();
    let text = explain(&session, "a", &LookupParams::new(), Explainer::new(false, false)).render();
    assert!(text.contains("Location not found"), "{}", text);
}

#[test]
fn test_interpolation_is_explained() {
    let fixture = Hierarchy::new("version: 5\n");
    fixture.write("data/common.yaml", "a: \"%{lookup('b')}\"\nb: bee\n");
    let session = fixture.session();
    let text = explain(&session, "a", &LookupParams::new(), Explainer::new(false, false)).render();
    assert!(text.contains("Interpolation \"%{lookup('b')}\""), "{}", text);
    assert!(text.contains("Searching for \"b\""));
}

// === Structured Output ===

#[test]
fn test_to_value() {
    let fixture = two_level_hierarchy();
    let session = fixture.session();
    let value = explain(
        &session,
        "hash.a",
        &LookupParams::new(),
        Explainer::new(false, false),
    )
    .to_value();

    let root = &value["nodes"][0];
    assert_eq!(root["type"], json!("lookup"));
    assert_eq!(root["key"], json!("hash.a"));
    assert_eq!(root["children"][0]["type"], json!("layer"));
    let events = root["events"].as_array().unwrap();
    assert_eq!(
        events.last().unwrap(),
        &json!({"event": "result", "value": "first value of a"})
    );
}

// === Redaction ===

#[test]
fn test_sensitive_values_redacted() {
    let fixture = Hierarchy::new("version: 5\n");
    fixture.write(
        "data/common.yaml",
        "lookup_options:\n  db_password:\n    convert_to: Sensitive\ndb_password: hunter2\n",
    );
    let session = fixture.session();
    let mut invocation = session
        .invocation()
        .with_explainer(Explainer::new(false, false));

    // The caller still gets the value
    let value = invocation.lookup(&["db_password"], &LookupParams::new()).unwrap();
    assert_eq!(value, json!("hunter2"));

    let text = invocation.take_explainer().unwrap().render();
    assert!(!text.contains("hunter2"), "{}", text);
    assert!(text.contains("[value redacted]"));
}

// === lookup_options Visibility ===

#[test]
fn test_lookup_options_hidden_by_default() {
    let fixture = Hierarchy::new("version: 5\n");
    fixture.write(
        "data/common.yaml",
        "lookup_options:\n  a:\n    merge: unique\na: [1]\n",
    );
    let session = fixture.session();
    let text = explain(&session, "a", &LookupParams::new(), Explainer::new(false, false)).render();
    assert!(!text.contains("Resolving lookup_options"), "{}", text);
}

#[test]
fn test_lookup_options_recorded_on_request() {
    let fixture = Hierarchy::new("version: 5\n");
    fixture.write(
        "data/common.yaml",
        "lookup_options:\n  a:\n    merge: unique\na: [1]\n",
    );
    let session = fixture.session();
    let text = explain(&session, "a", &LookupParams::new(), Explainer::new(true, false)).render();
    assert!(text.contains("Resolving lookup_options"), "{}", text);
    assert!(text.contains("Found key: \"lookup_options\""));
    assert!(text.contains("Searching for \"a\""));
}

#[test]
fn test_only_lookup_options() {
    let fixture = Hierarchy::new("version: 5\n");
    fixture.write(
        "data/common.yaml",
        "lookup_options:\n  a:\n    merge: unique\na: [1]\n",
    );
    let session = fixture.session();
    let text = explain(&session, "a", &LookupParams::new(), Explainer::new(false, true)).render();
    assert!(text.contains("Resolving lookup_options"), "{}", text);
    assert!(!text.contains("Searching for \"a\""));
}
