//! Validation Schema
//!
//! Output of the synthesizer. Unlike [`SchemaNode`](super::SchemaNode) there
//! is no reference variant: a validation schema is always self-contained.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{required_value, write_annotations, Annotations, ScalarKind, PRESERVE_UNKNOWN_FIELDS};
use crate::error::SchemaError;

/// Root fields every stored object carries regardless of its schema
pub const TYPE_META_FIELDS: &[&str] = &["apiVersion", "kind", "metadata"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationObject {
    pub properties: BTreeMap<String, ValidationNode>,
    pub required: Vec<String>,
    /// Concrete shape of map values, when the object is a typed map
    pub additional_properties: Option<Box<ValidationNode>>,
    pub preserve_unknown_fields: bool,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationArray {
    pub items: Option<Box<ValidationNode>>,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationScalar {
    pub kind: Option<ScalarKind>,
    pub annotations: Annotations,
}

/// A node of a synthesized validation schema
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationNode {
    Object(ValidationObject),
    Array(ValidationArray),
    Scalar(ValidationScalar),
}

impl ValidationNode {
    pub fn to_value(&self) -> Value {
        match self {
            ValidationNode::Object(obj) => {
                let mut map = Map::new();
                map.insert("type".into(), Value::String("object".into()));
                if !obj.properties.is_empty() {
                    map.insert("properties".into(), properties_value(&obj.properties));
                }
                if !obj.required.is_empty() {
                    map.insert("required".into(), required_value(&obj.required));
                }
                if let Some(ap) = &obj.additional_properties {
                    map.insert("additionalProperties".into(), ap.to_value());
                }
                if obj.preserve_unknown_fields {
                    map.insert(PRESERVE_UNKNOWN_FIELDS.into(), Value::Bool(true));
                }
                write_annotations(&mut map, &obj.annotations);
                Value::Object(map)
            }
            ValidationNode::Array(arr) => {
                let mut map = Map::new();
                map.insert("type".into(), Value::String("array".into()));
                if let Some(items) = &arr.items {
                    map.insert("items".into(), items.to_value());
                }
                write_annotations(&mut map, &arr.annotations);
                Value::Object(map)
            }
            ValidationNode::Scalar(scalar) => {
                let mut map = Map::new();
                if let Some(kind) = scalar.kind {
                    map.insert("type".into(), Value::String(kind.as_str().into()));
                }
                write_annotations(&mut map, &scalar.annotations);
                Value::Object(map)
            }
        }
    }

    /// Drop fields of `value` this schema does not declare.
    ///
    /// Objects marked with preserve-unknown-fields keep everything; typed maps
    /// keep every key and prune each value against the map's value shape.
    pub fn prune(&self, value: &mut Value) {
        match (self, value) {
            (ValidationNode::Object(obj), Value::Object(map)) => obj.prune_map(map, &[]),
            (ValidationNode::Array(arr), Value::Array(items)) => {
                if let Some(schema) = &arr.items {
                    for item in items {
                        schema.prune(item);
                    }
                }
            }
            _ => {}
        }
    }

    /// Resolve a dotted field path (`spec.title`) to the node describing it
    pub fn lookup(&self, path: &str) -> Option<&ValidationNode> {
        let mut current = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                ValidationNode::Object(obj) => obj.properties.get(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl ValidationObject {
    fn prune_map(&self, map: &mut Map<String, Value>, keep: &[&str]) {
        if let Some(ap) = &self.additional_properties {
            for (key, child) in map.iter_mut() {
                match self.properties.get(key) {
                    Some(schema) => schema.prune(child),
                    None => ap.prune(child),
                }
            }
            return;
        }

        if !self.preserve_unknown_fields {
            map.retain(|key, _| self.properties.contains_key(key) || keep.contains(&key.as_str()));
        }
        for (key, child) in map.iter_mut() {
            if let Some(schema) = self.properties.get(key) {
                schema.prune(child);
            }
        }
    }
}

impl Serialize for ValidationNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn properties_value(properties: &BTreeMap<String, ValidationNode>) -> Value {
    Value::Object(
        properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect(),
    )
}

// =============================================================================
// Validation Schema
// =============================================================================

/// Synthesized schema for one full resource version.
///
/// Never contains a top-level `metadata` property.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationSchema {
    pub root: ValidationObject,
}

impl ValidationSchema {
    pub fn properties(&self) -> &BTreeMap<String, ValidationNode> {
        &self.root.properties
    }

    /// The `properties` document embedded under `openAPIV3Schema`
    pub fn properties_value(&self) -> Value {
        properties_value(&self.root.properties)
    }

    /// Full `openAPIV3Schema` document for a CRD version
    pub fn to_openapi(&self) -> Value {
        let mut map = Map::new();
        map.insert("properties".into(), self.properties_value());
        if self.root.properties.contains_key("spec") {
            map.insert("required".into(), required_value(&["spec".to_string()]));
        }
        map.insert("type".into(), Value::String("object".into()));
        if self.root.preserve_unknown_fields {
            map.insert(PRESERVE_UNKNOWN_FIELDS.into(), Value::Bool(true));
        }
        Value::Object(map)
    }

    /// Node for a dotted field path, with or without the leading dot
    pub fn lookup(&self, path: &str) -> Option<&ValidationNode> {
        let path = path.trim_start_matches('.');
        let (first, rest) = path.split_once('.').unwrap_or((path, ""));
        self.root.properties.get(first)?.lookup(rest)
    }

    /// Prune a full object. Type metadata fields always survive.
    pub fn prune(&self, object: &mut Value) {
        if let Value::Object(map) = object {
            self.root.prune_map(map, TYPE_META_FIELDS);
        }
    }

    /// Compile into an instance validator
    pub fn compile(&self) -> Result<jsonschema::JSONSchema, SchemaError> {
        let document = self.to_openapi();
        jsonschema::JSONSchema::compile(&document).map_err(|e| SchemaError::InvalidFormat {
            path: "#".into(),
            reason: e.to_string(),
        })
    }

    /// Validate an instance, collecting every violation
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<String>> {
        let compiled = self.compile().map_err(|e| vec![e.to_string()])?;
        // The error iterator borrows `compiled`; collect before it drops.
        let result = match compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors.map(|e| format!("{}: {}", e.instance_path, e)).collect()),
        };
        result
    }
}

impl Serialize for ValidationSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_openapi().serialize(serializer)
    }
}
