//! Open-Schema Synthesizer
//!
//! Rewrites a schema tree into a validation schema the hosting platform
//! accepts:
//!
//! 1. References are expanded and exactly one root component is elected.
//! 2. The top-level `metadata` property is removed; the platform supplies it.
//! 3. Every remaining property is rewritten post-order. An unconstrained
//!    `additionalProperties` cannot be expressed by the target format, so it
//!    is dropped and the object gets `x-kubernetes-preserve-unknown-fields`.
//!    A map with a concrete value shape keeps that shape.
//! 4. Root properties other than `spec` are reported as subresources.

use serde::Serialize;

use super::flatten::flatten;
use super::validation::{ValidationArray, ValidationNode, ValidationObject, ValidationScalar, ValidationSchema};
use super::{AdditionalProperties, SchemaNode, SchemaTree};
use crate::error::SchemaError;

/// Property of the root that holds user-declared desired state
pub const SPEC_PROPERTY: &str = "spec";

/// Property of the root owned by the platform
pub const METADATA_PROPERTY: &str = "metadata";

/// Result of synthesizing one kind version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedSchema {
    /// Root component the schema was built from
    pub root: String,
    pub schema: ValidationSchema,
    /// Root properties served as subresources (everything except `spec`)
    pub subresources: Vec<String>,
    /// Components whose recursion was cut off with an open object
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub open_map_fallbacks: Vec<String>,
}

/// Synthesize the validation schema of one kind version
pub fn synthesize(tree: &SchemaTree, kind: &str, version: &str) -> Result<SynthesizedSchema, SchemaError> {
    let flat = flatten(tree, kind, version)?;

    let mut root = match synthesize_node(&flat.node)? {
        ValidationNode::Object(obj) => obj,
        _ => {
            return Err(SchemaError::InvalidFormat {
                path: format!("#/components/schemas/{}", flat.root),
                reason: format!("{}/{}: root schema must be an object", kind, version),
            })
        }
    };

    root.properties.remove(METADATA_PROPERTY);
    root.required.retain(|r| r != METADATA_PROPERTY);

    let subresources = root
        .properties
        .keys()
        .filter(|name| name.as_str() != SPEC_PROPERTY)
        .cloned()
        .collect();

    Ok(SynthesizedSchema {
        root: flat.root,
        schema: ValidationSchema { root },
        subresources,
        open_map_fallbacks: flat.cycles,
    })
}

/// Apply the open-map rewrite to a self-contained node
pub fn synthesize_node(node: &SchemaNode) -> Result<ValidationNode, SchemaError> {
    match node {
        SchemaNode::Object(obj) => {
            let mut out = ValidationObject {
                properties: Default::default(),
                required: obj.required.clone(),
                additional_properties: None,
                preserve_unknown_fields: obj.preserve_unknown_fields,
                annotations: obj.annotations.clone(),
            };
            for (name, child) in &obj.properties {
                out.properties.insert(name.clone(), synthesize_node(child)?);
            }
            match &obj.additional_properties {
                None => {}
                Some(AdditionalProperties::Unconstrained) => out.preserve_unknown_fields = true,
                // An untyped shape reached through a reference is just as open.
                Some(AdditionalProperties::Schema(shape)) if is_untyped(shape) => {
                    out.preserve_unknown_fields = true
                }
                Some(AdditionalProperties::Schema(shape)) => {
                    out.additional_properties = Some(Box::new(synthesize_node(shape)?));
                }
            }
            Ok(ValidationNode::Object(out))
        }
        SchemaNode::Array(arr) => {
            let items = match &arr.items {
                Some(items) => Some(Box::new(synthesize_node(items)?)),
                None => None,
            };
            Ok(ValidationNode::Array(ValidationArray {
                items,
                annotations: arr.annotations.clone(),
            }))
        }
        SchemaNode::Scalar(scalar) => Ok(ValidationNode::Scalar(ValidationScalar {
            kind: scalar.kind,
            annotations: scalar.annotations.clone(),
        })),
        SchemaNode::Reference(name) => Err(SchemaError::UnresolvedReference {
            reference: name.clone(),
        }),
    }
}

fn is_untyped(node: &SchemaNode) -> bool {
    matches!(node, SchemaNode::Scalar(scalar) if scalar.kind.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rewrite(value: serde_json::Value) -> serde_json::Value {
        synthesize_node(&SchemaNode::from_value(&value).unwrap())
            .unwrap()
            .to_value()
    }

    #[test]
    fn test_open_map_elimination() {
        assert_eq!(
            rewrite(json!({ "type": "object", "additionalProperties": {} })),
            json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true })
        );
    }

    #[test]
    fn test_open_map_in_array_items() {
        assert_eq!(
            rewrite(json!({
                "type": "array",
                "items": { "type": "object", "additionalProperties": true }
            })),
            json!({
                "type": "array",
                "items": { "type": "object", "x-kubernetes-preserve-unknown-fields": true }
            })
        );
    }

    #[test]
    fn test_scalar_map_untouched() {
        let input = json!({ "type": "object", "additionalProperties": { "type": "integer" } });
        assert_eq!(rewrite(input.clone()), input);
    }

    #[test]
    fn test_nested_open_map_inside_typed_map() {
        assert_eq!(
            rewrite(json!({
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "properties": { "meta": { "type": "object", "additionalProperties": {} } }
                }
            })),
            json!({
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "properties": { "meta": { "type": "object", "x-kubernetes-preserve-unknown-fields": true } }
                }
            })
        );
    }

    #[test]
    fn test_untyped_referenced_map_value_is_open() {
        let tree = SchemaTree::from_json(&json!({ "components": { "schemas": {
            "Issue": { "type": "object", "properties": {
                "spec": { "type": "object", "additionalProperties": { "$ref": "#/components/schemas/Any" } }
            } },
            "Any": { "description": "anything" }
        } } }))
        .unwrap();
        let out = synthesize(&tree, "Issue", "v1").unwrap();
        assert_eq!(
            out.schema.to_openapi()["properties"]["spec"],
            json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true })
        );
    }

    #[test]
    fn test_reference_left_in_node() {
        let node = SchemaNode::reference("Spec");
        assert!(matches!(
            synthesize_node(&node),
            Err(SchemaError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_root_must_be_object() {
        let tree = SchemaTree::single("Issue", SchemaNode::scalar(crate::schema::ScalarKind::String));
        assert!(matches!(
            synthesize(&tree, "Issue", "v1"),
            Err(SchemaError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_subresources_and_metadata() {
        let tree = SchemaTree::from_json(&json!({ "components": { "schemas": { "Issue": {
            "type": "object",
            "required": ["metadata", "spec"],
            "properties": {
                "metadata": { "type": "object" },
                "spec": { "type": "object" },
                "status": { "type": "object" },
                "scale": { "type": "object" }
            }
        } } } }))
        .unwrap();
        let out = synthesize(&tree, "Issue", "v1").unwrap();
        assert!(!out.schema.properties().contains_key("metadata"));
        assert_eq!(out.schema.root.required, vec!["spec"]);
        assert_eq!(out.subresources, vec!["scale", "status"]);
        assert_eq!(out.root, "Issue");
    }
}
