//! Schema Tree
//!
//! The in-memory shape of one version of one kind. Nodes form a closed
//! tagged union so every pass over the tree matches exhaustively:
//!
//! - `Object`: named properties plus an optional `additionalProperties` map shape
//! - `Array`: optional item schema
//! - `Scalar`: string/integer/number/boolean, or untyped
//! - `Reference`: `$ref` to another named component of the same tree
//!
//! Keywords the compiler does not interpret (format, enum, pattern, bounds,
//! defaults, compositions) ride along untouched in [`Annotations::extra`].

pub mod flatten;
pub mod synth;
pub mod validation;

pub use flatten::{flatten, Flattened};
pub use synth::{synthesize, synthesize_node, SynthesizedSchema};
pub use validation::{ValidationArray, ValidationNode, ValidationObject, ValidationScalar, ValidationSchema};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::SchemaError;

/// Vendor marker for an object accepting arbitrary nested fields
pub const PRESERVE_UNKNOWN_FIELDS: &str = "x-kubernetes-preserve-unknown-fields";

const REF_PREFIXES: &[&str] = &["#/components/schemas/", "#/definitions/", "#/$defs/"];

// =============================================================================
// Nodes
// =============================================================================

/// JSON scalar type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ScalarKind {
    pub fn from_json_type(type_str: &str) -> Option<Self> {
        match type_str {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// Keywords carried through unchanged
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotations {
    pub description: Option<String>,
    pub nullable: bool,
    pub extra: BTreeMap<String, Value>,
}

/// The `additionalProperties` of an object
#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
    /// `true` or a schema with no type or shape constraints
    Unconstrained,
    /// A concrete value shape
    Schema(Box<SchemaNode>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectNode {
    pub properties: BTreeMap<String, SchemaNode>,
    pub required: Vec<String>,
    pub additional_properties: Option<AdditionalProperties>,
    pub preserve_unknown_fields: bool,
    pub annotations: Annotations,
}

impl ObjectNode {
    /// An object accepting any fields
    pub fn open() -> Self {
        Self {
            preserve_unknown_fields: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayNode {
    pub items: Option<Box<SchemaNode>>,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScalarNode {
    /// `None` when the schema declares no type
    pub kind: Option<ScalarKind>,
    pub annotations: Annotations,
}

/// A node of the schema tree
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Object(ObjectNode),
    Array(ArrayNode),
    Scalar(ScalarNode),
    /// Name of the referenced component
    Reference(String),
}

impl SchemaNode {
    pub fn scalar(kind: ScalarKind) -> Self {
        SchemaNode::Scalar(ScalarNode {
            kind: Some(kind),
            annotations: Annotations::default(),
        })
    }

    pub fn reference(name: impl Into<String>) -> Self {
        SchemaNode::Reference(name.into())
    }

    /// Parse a JSON (OpenAPI v3 subset) schema
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        parse_node(value, "#")
    }

    /// Render back to JSON
    pub fn to_value(&self) -> Value {
        match self {
            SchemaNode::Reference(name) => {
                let mut map = Map::new();
                map.insert("$ref".into(), Value::String(format!("{}{}", REF_PREFIXES[0], name)));
                Value::Object(map)
            }
            SchemaNode::Object(obj) => {
                let mut map = Map::new();
                map.insert("type".into(), Value::String("object".into()));
                if !obj.properties.is_empty() {
                    let props = obj
                        .properties
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_value()))
                        .collect();
                    map.insert("properties".into(), Value::Object(props));
                }
                if !obj.required.is_empty() {
                    map.insert("required".into(), required_value(&obj.required));
                }
                match &obj.additional_properties {
                    None => {}
                    Some(AdditionalProperties::Unconstrained) => {
                        map.insert("additionalProperties".into(), Value::Object(Map::new()));
                    }
                    Some(AdditionalProperties::Schema(node)) => {
                        map.insert("additionalProperties".into(), node.to_value());
                    }
                }
                if obj.preserve_unknown_fields {
                    map.insert(PRESERVE_UNKNOWN_FIELDS.into(), Value::Bool(true));
                }
                write_annotations(&mut map, &obj.annotations);
                Value::Object(map)
            }
            SchemaNode::Array(arr) => {
                let mut map = Map::new();
                map.insert("type".into(), Value::String("array".into()));
                if let Some(items) = &arr.items {
                    map.insert("items".into(), items.to_value());
                }
                write_annotations(&mut map, &arr.annotations);
                Value::Object(map)
            }
            SchemaNode::Scalar(scalar) => {
                let mut map = Map::new();
                if let Some(kind) = scalar.kind {
                    map.insert("type".into(), Value::String(kind.as_str().into()));
                }
                write_annotations(&mut map, &scalar.annotations);
                Value::Object(map)
            }
        }
    }

    /// Names of components this node references, directly or in descendants
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_references(self, &mut out);
        out
    }
}

fn collect_references<'a>(node: &'a SchemaNode, out: &mut Vec<&'a str>) {
    match node {
        SchemaNode::Reference(name) => out.push(name),
        SchemaNode::Object(obj) => {
            for child in obj.properties.values() {
                collect_references(child, out);
            }
            if let Some(AdditionalProperties::Schema(node)) = &obj.additional_properties {
                collect_references(node, out);
            }
        }
        SchemaNode::Array(arr) => {
            if let Some(items) = &arr.items {
                collect_references(items, out);
            }
        }
        SchemaNode::Scalar(_) => {}
    }
}

pub(crate) fn required_value(required: &[String]) -> Value {
    Value::Array(required.iter().cloned().map(Value::String).collect())
}

pub(crate) fn write_annotations(map: &mut Map<String, Value>, annotations: &Annotations) {
    if let Some(description) = &annotations.description {
        map.insert("description".into(), Value::String(description.clone()));
    }
    if annotations.nullable {
        map.insert("nullable".into(), Value::Bool(true));
    }
    for (k, v) in &annotations.extra {
        map.insert(k.clone(), v.clone());
    }
}

// =============================================================================
// Parsing
// =============================================================================

fn invalid(path: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidFormat {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn reference_name(reference: &str) -> &str {
    REF_PREFIXES
        .iter()
        .find_map(|p| reference.strip_prefix(p))
        .unwrap_or(reference)
}

/// No type, no shape: the schema admits any value
fn is_unconstrained(map: &Map<String, Value>) -> bool {
    !["type", "properties", "items", "additionalProperties", "$ref"]
        .iter()
        .any(|k| map.contains_key(*k))
}

fn parse_node(value: &Value, path: &str) -> Result<SchemaNode, SchemaError> {
    let map = match value {
        Value::Object(map) => map,
        Value::Bool(true) => return Ok(SchemaNode::Scalar(ScalarNode::default())),
        other => return Err(invalid(path, format!("expected a schema object, got {}", other))),
    };

    if let Some(reference) = map.get("$ref") {
        let reference = reference
            .as_str()
            .ok_or_else(|| invalid(path, "$ref must be a string"))?;
        return Ok(SchemaNode::Reference(reference_name(reference).to_string()));
    }

    let type_name = match map.get("type") {
        None => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(other) => return Err(invalid(path, format!("unsupported type declaration {}", other))),
    };

    let mut annotations = Annotations {
        description: map.get("description").and_then(|d| d.as_str()).map(String::from),
        nullable: map.get("nullable").and_then(|n| n.as_bool()).unwrap_or(false),
        extra: BTreeMap::new(),
    };

    let kind = match type_name {
        Some("object") => NodeKind::Object,
        Some("array") => NodeKind::Array,
        Some(other) => match ScalarKind::from_json_type(other) {
            Some(kind) => NodeKind::Scalar(Some(kind)),
            None => return Err(invalid(path, format!("unknown type {}", other))),
        },
        None if map.contains_key("properties")
            || map.contains_key("additionalProperties")
            || map.contains_key(PRESERVE_UNKNOWN_FIELDS) =>
        {
            NodeKind::Object
        }
        None if map.contains_key("items") => NodeKind::Array,
        None => NodeKind::Scalar(None),
    };

    let consumed: &[&str] = match kind {
        NodeKind::Object => &[
            "type",
            "description",
            "nullable",
            "properties",
            "required",
            "additionalProperties",
            PRESERVE_UNKNOWN_FIELDS,
        ],
        NodeKind::Array => &["type", "description", "nullable", "items"],
        NodeKind::Scalar(_) => &["type", "description", "nullable"],
    };
    for (k, v) in map {
        if !consumed.contains(&k.as_str()) {
            annotations.extra.insert(k.clone(), v.clone());
        }
    }

    match kind {
        NodeKind::Object => {
            let mut properties = BTreeMap::new();
            if let Some(props) = map.get("properties") {
                let props = props
                    .as_object()
                    .ok_or_else(|| invalid(path, "properties must be an object"))?;
                for (name, prop) in props {
                    let child = parse_node(prop, &format!("{}/properties/{}", path, name))?;
                    properties.insert(name.clone(), child);
                }
            }

            let required = match map.get("required") {
                None => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|r| r.as_str().map(String::from))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| invalid(path, "required must list strings"))?,
                Some(_) => return Err(invalid(path, "required must be an array")),
            };

            let additional_properties = match map.get("additionalProperties") {
                None | Some(Value::Bool(false)) => None,
                Some(Value::Bool(true)) => Some(AdditionalProperties::Unconstrained),
                Some(Value::Object(ap)) if is_unconstrained(ap) => {
                    Some(AdditionalProperties::Unconstrained)
                }
                Some(ap) => Some(AdditionalProperties::Schema(Box::new(parse_node(
                    ap,
                    &format!("{}/additionalProperties", path),
                )?))),
            };

            Ok(SchemaNode::Object(ObjectNode {
                properties,
                required,
                additional_properties,
                preserve_unknown_fields: map
                    .get(PRESERVE_UNKNOWN_FIELDS)
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                annotations,
            }))
        }
        NodeKind::Array => {
            let items = match map.get("items") {
                None => None,
                Some(items) => Some(Box::new(parse_node(items, &format!("{}/items", path))?)),
            };
            Ok(SchemaNode::Array(ArrayNode { items, annotations }))
        }
        NodeKind::Scalar(kind) => Ok(SchemaNode::Scalar(ScalarNode { kind, annotations })),
    }
}

enum NodeKind {
    Object,
    Array,
    Scalar(Option<ScalarKind>),
}

// =============================================================================
// Schema Tree
// =============================================================================

/// Named schema components for one kind version.
///
/// JSON form follows OpenAPI: `{"components": {"schemas": {"Name": {...}}}}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct SchemaTree {
    pub components: BTreeMap<String, SchemaNode>,
}

impl SchemaTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree with a single component
    pub fn single(name: impl Into<String>, node: SchemaNode) -> Self {
        let mut tree = Self::new();
        tree.components.insert(name.into(), node);
        tree
    }

    pub fn with_component(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
        self.components.insert(name.into(), node);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.components.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Parse the OpenAPI components form
    pub fn from_json(value: &Value) -> Result<Self, SchemaError> {
        let schemas = match value.get("components").and_then(|c| c.get("schemas")) {
            Some(Value::Object(schemas)) => schemas,
            Some(_) => return Err(invalid("#/components/schemas", "must be an object")),
            None if value.as_object().map(|m| m.is_empty()).unwrap_or(false) => {
                return Ok(Self::default())
            }
            None => return Err(invalid("#", "missing components.schemas")),
        };

        let mut components = BTreeMap::new();
        for (name, schema) in schemas {
            let node = parse_node(schema, &format!("{}{}", REF_PREFIXES[0], name))?;
            components.insert(name.clone(), node);
        }
        Ok(Self { components })
    }

    pub fn to_json(&self) -> Value {
        let schemas: Map<String, Value> = self
            .components
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect();
        serde_json::json!({ "components": { "schemas": schemas } })
    }
}

impl TryFrom<Value> for SchemaTree {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

impl From<SchemaTree> for Value {
    fn from(tree: SchemaTree) -> Self {
        tree.to_json()
    }
}
