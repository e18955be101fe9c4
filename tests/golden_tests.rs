//! Golden Tests for Schema Synthesis
//!
//! Fixture schemas run through the open-map rewrite and full synthesis.

use kind_schemas::error::SchemaError;
use kind_schemas::schema::{synthesize, synthesize_node, SchemaNode, SchemaTree};
use serde_json::{json, Value};

fn node(fixture: &str) -> SchemaNode {
    let value: Value = serde_json::from_str(fixture).unwrap();
    SchemaNode::from_value(&value).unwrap()
}

fn tree(fixture: &str) -> SchemaTree {
    let value: Value = serde_json::from_str(fixture).unwrap();
    SchemaTree::from_json(&value).unwrap()
}

fn rewrite(node: &SchemaNode) -> Value {
    synthesize_node(node).unwrap().to_value()
}

// =============================================================================
// Open-Map Rewrite
// =============================================================================

#[test]
fn test_open_map_elimination() {
    let out = rewrite(&node(include_str!("fixtures/open_map.json")));
    assert_eq!(out, json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true }));
    assert!(out.get("additionalProperties").is_none());
}

#[test]
fn test_open_map_with_shape_preserved() {
    let out = rewrite(&node(include_str!("fixtures/open_map_shaped.json")));
    assert_eq!(out["additionalProperties"]["properties"]["baz"], json!({ "type": "string" }));
    assert_eq!(out["properties"]["bar"], json!({ "type": "string" }));
    assert!(out.get("x-kubernetes-preserve-unknown-fields").is_none());
}

#[test]
fn test_rewrite_is_idempotent() {
    for fixture in [
        include_str!("fixtures/open_map.json"),
        include_str!("fixtures/open_map_shaped.json"),
    ] {
        let once = rewrite(&node(fixture));
        let twice = rewrite(&SchemaNode::from_value(&once).unwrap());
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }
}

#[test]
fn test_synthesis_is_idempotent() {
    let first = synthesize(&tree(include_str!("fixtures/with_metadata.json")), "Dashboard", "v1").unwrap();
    let reparsed = SchemaTree::single("Dashboard", SchemaNode::from_value(&first.schema.to_openapi()).unwrap());
    let second = synthesize(&reparsed, "Dashboard", "v1").unwrap();
    assert_eq!(
        serde_json::to_string(&first.schema).unwrap(),
        serde_json::to_string(&second.schema).unwrap()
    );
}

#[test]
fn test_open_map_through_reference() {
    let first = synthesize(&tree(include_str!("fixtures/open_map_ref.json")), "Widget", "v1").unwrap();
    let doc = first.schema.to_openapi();
    let labels = &doc["properties"]["spec"]["properties"]["labels"];

    assert_eq!(labels, &json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true }));
    assert!(labels.get("additionalProperties").is_none());

    let twice = rewrite(&SchemaNode::from_value(&doc).unwrap());
    assert_eq!(twice["properties"]["spec"]["properties"]["labels"], *labels);

    let reparsed = SchemaTree::single("Widget", SchemaNode::from_value(&doc).unwrap());
    let second = synthesize(&reparsed, "Widget", "v1").unwrap();
    assert_eq!(
        serde_json::to_string(&first.schema).unwrap(),
        serde_json::to_string(&second.schema).unwrap()
    );
}

// =============================================================================
// Full Synthesis
// =============================================================================

#[test]
fn test_metadata_elision() {
    let out = synthesize(&tree(include_str!("fixtures/with_metadata.json")), "Dashboard", "v1").unwrap();
    let doc = out.schema.to_openapi();

    assert!(doc["properties"].get("metadata").is_none());
    assert_eq!(doc["required"], json!(["spec"]));
    assert_eq!(out.root, "Dashboard");
    assert_eq!(out.subresources, vec!["status"]);
}

#[test]
fn test_references_expanded_and_rewritten() {
    let out = synthesize(&tree(include_str!("fixtures/with_metadata.json")), "Dashboard", "v1").unwrap();
    let spec = &out.schema.to_openapi()["properties"]["spec"];

    assert_eq!(spec["required"], json!(["title"]));
    assert_eq!(spec["properties"]["title"]["description"], "Display title");
    assert_eq!(
        spec["properties"]["options"],
        json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true })
    );
    assert_eq!(
        spec["properties"]["panels"]["items"]["properties"]["config"],
        json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true })
    );
    assert!(out.open_map_fallbacks.is_empty());
}

#[test]
fn test_self_reference_falls_back_to_open_map() {
    let out = synthesize(&tree(include_str!("fixtures/self_recursive.json")), "Folder", "v1").unwrap();
    let spec = &out.schema.to_openapi()["properties"]["spec"];

    assert_eq!(spec["properties"]["name"], json!({ "type": "string" }));
    assert_eq!(
        spec["properties"]["children"]["items"],
        json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true })
    );
    assert_eq!(out.open_map_fallbacks, vec!["Tree"]);
}

#[test]
fn test_ambiguous_roots() {
    match synthesize(&tree(include_str!("fixtures/ambiguous_roots.json")), "Dashboard", "v1") {
        Err(SchemaError::AmbiguousRootSchema { kind, version, roots }) => {
            assert_eq!(kind, "Dashboard");
            assert_eq!(version, "v1");
            assert_eq!(roots, vec!["Dashboard", "Playlist"]);
        }
        other => panic!("Expected AmbiguousRootSchema, got {:?}", other),
    }
}

#[test]
fn test_empty_tree_has_no_root() {
    assert!(matches!(
        synthesize(&SchemaTree::default(), "Dashboard", "v1"),
        Err(SchemaError::SchemaNotFound { .. })
    ));
}

#[test]
fn test_synthesized_schema_validates_instances() {
    let out = synthesize(&tree(include_str!("fixtures/with_metadata.json")), "Dashboard", "v1").unwrap();

    let valid = json!({
        "spec": {
            "title": "Overview",
            "options": { "anything": { "goes": [1, 2, 3] } },
            "panels": [{ "kind": "graph", "config": { "x": 1 } }]
        }
    });
    assert!(out.schema.validate(&valid).is_ok());

    let invalid = json!({ "spec": { "panels": [] } });
    let errors = out.schema.validate(&invalid).unwrap_err();
    assert!(!errors.is_empty());
}
