//! Reference Expansion
//!
//! Expands every `$ref` of a tree into one self-contained document rooted at
//! the single component nobody else references. A reference back into a
//! component that is still being expanded closes a cycle; it is replaced by
//! an open object (`x-kubernetes-preserve-unknown-fields: true`) instead of
//! being followed again.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use super::{AdditionalProperties, ArrayNode, ObjectNode, SchemaNode, SchemaTree};
use crate::error::SchemaError;

/// A tree with all references expanded
#[derive(Debug, Clone, PartialEq)]
pub struct Flattened {
    /// Name of the root component
    pub root: String,
    /// Root node, free of `Reference` nodes
    pub node: SchemaNode,
    /// Components whose re-entry was cut off, in encounter order
    pub cycles: Vec<String>,
}

/// Components not referenced by any other component. Self-references don't count.
pub fn root_components(tree: &SchemaTree) -> Vec<&str> {
    let mut referenced = BTreeSet::new();
    for (name, node) in &tree.components {
        for target in node.references() {
            if target != name.as_str() {
                referenced.insert(target);
            }
        }
    }
    tree.components
        .keys()
        .map(String::as_str)
        .filter(|name| !referenced.contains(name))
        .collect()
}

/// Expand references and elect the root component
pub fn flatten(tree: &SchemaTree, kind: &str, version: &str) -> Result<Flattened, SchemaError> {
    let roots = root_components(tree);
    let root = match roots.as_slice() {
        [] => {
            return Err(SchemaError::SchemaNotFound {
                kind: kind.to_string(),
                version: version.to_string(),
            })
        }
        [root] => root.to_string(),
        _ => {
            return Err(SchemaError::AmbiguousRootSchema {
                kind: kind.to_string(),
                version: version.to_string(),
                roots: roots.iter().map(|r| r.to_string()).collect(),
            })
        }
    };

    let mut expander = Expander {
        tree,
        stack: vec![root.clone()],
        cycles: Vec::new(),
        expanded: HashMap::new(),
    };
    // The root was found among the tree's own keys.
    let node = match tree.get(&root) {
        Some(node) => expander.expand(node)?,
        None => return Err(SchemaError::UnresolvedReference { reference: root }),
    };

    if !expander.cycles.is_empty() {
        warn!(
            kind,
            version,
            cycles = ?expander.cycles,
            "recursive schema references replaced by open objects"
        );
    }

    Ok(Flattened {
        root,
        node,
        cycles: expander.cycles,
    })
}

struct Expander<'a> {
    tree: &'a SchemaTree,
    /// Components currently being expanded, outermost first
    stack: Vec<String>,
    cycles: Vec<String>,
    /// Components whose expansion hit no cycle; identical wherever referenced
    expanded: HashMap<String, SchemaNode>,
}

impl Expander<'_> {
    fn expand(&mut self, node: &SchemaNode) -> Result<SchemaNode, SchemaError> {
        match node {
            SchemaNode::Reference(name) => {
                let target = self.tree.get(name).ok_or_else(|| SchemaError::UnresolvedReference {
                    reference: name.clone(),
                })?;
                if self.stack.iter().any(|s| s == name) {
                    self.cycles.push(name.clone());
                    return Ok(SchemaNode::Object(ObjectNode::open()));
                }
                if let Some(done) = self.expanded.get(name) {
                    return Ok(done.clone());
                }
                let cycles_before = self.cycles.len();
                self.stack.push(name.clone());
                let expanded = self.expand(target);
                self.stack.pop();
                let expanded = expanded?;
                if self.cycles.len() == cycles_before {
                    self.expanded.insert(name.clone(), expanded.clone());
                }
                Ok(expanded)
            }
            SchemaNode::Object(obj) => {
                let mut properties = obj.properties.clone();
                for (name, child) in &obj.properties {
                    properties.insert(name.clone(), self.expand(child)?);
                }
                let additional_properties = match &obj.additional_properties {
                    Some(AdditionalProperties::Schema(inner)) => {
                        Some(AdditionalProperties::Schema(Box::new(self.expand(inner)?)))
                    }
                    other => other.clone(),
                };
                Ok(SchemaNode::Object(ObjectNode {
                    properties,
                    additional_properties,
                    ..obj.clone()
                }))
            }
            SchemaNode::Array(arr) => {
                let items = match &arr.items {
                    Some(items) => Some(Box::new(self.expand(items)?)),
                    None => None,
                };
                Ok(SchemaNode::Array(ArrayNode {
                    items,
                    annotations: arr.annotations.clone(),
                }))
            }
            SchemaNode::Scalar(_) => Ok(node.clone()),
        }
    }
}
