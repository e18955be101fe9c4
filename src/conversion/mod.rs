//! Version Graph & Hub Conversion Wiring
//!
//! Every kind has exactly one hub version. Each other version gets two
//! directed routes, `v -> hub` and `hub -> v`, so any pair of versions
//! converts in at most two hops. The hub is the last declared version unless
//! one is named explicitly.
//!
//! Routes are edges of a `petgraph` digraph whose nodes are version names.

pub mod convert;

pub use convert::{
    gvk_of, Codec, ConversionRegistry, Converter, GroupVersionKind, JsonCodec, PassthroughConverter,
    RawObject, RegistrationReport, SchemaCodec,
};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

use crate::error::VersionGraphError;
use crate::kind::{AppManifest, KindDefinition};
use crate::version::highest_priority;

/// Direction of a route relative to the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    ToHub,
    FromHub,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToHub => write!(f, "to-hub"),
            Direction::FromHub => write!(f, "from-hub"),
        }
    }
}

/// A single conversion hop. Derived from the graph, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversionRoute {
    pub from: String,
    pub to: String,
    pub direction: Direction,
}

/// Hub, routes and client priority for one kind
#[derive(Debug, Clone)]
pub struct VersionGraph {
    pub group: String,
    pub kind: String,
    pub hub: String,
    /// Whether the kind declares custom conversion (identical across versions)
    pub conversion: bool,
    /// Versions presented to version-agnostic clients, preferred first
    pub priority: Vec<String>,
    graph: DiGraph<String, Direction>,
    nodes: HashMap<String, NodeIndex>,
}

impl VersionGraph {
    /// Declared versions in declaration order
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.priority.iter().rev().map(String::as_str)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.nodes.contains_key(version)
    }

    /// All registered routes, non-hub versions in declaration order
    pub fn routes(&self) -> Vec<ConversionRoute> {
        let mut routes: Vec<ConversionRoute> = self
            .graph
            .edge_references()
            .map(|e| ConversionRoute {
                from: self.graph[e.source()].clone(),
                to: self.graph[e.target()].clone(),
                direction: *e.weight(),
            })
            .collect();
        let order: HashMap<&str, usize> = self.versions().enumerate().map(|(i, v)| (v, i)).collect();
        routes.sort_by_key(|r| {
            let spoke = match r.direction {
                Direction::ToHub => &r.from,
                Direction::FromHub => &r.to,
            };
            (order.get(spoke.as_str()).copied(), r.direction == Direction::FromHub)
        });
        routes
    }

    fn route(&self, from: &str, to: &str) -> Option<ConversionRoute> {
        let a = *self.nodes.get(from)?;
        let b = *self.nodes.get(to)?;
        let edge = self.graph.find_edge(a, b)?;
        Some(ConversionRoute {
            from: from.to_string(),
            to: to.to_string(),
            direction: self.graph[edge],
        })
    }

    /// Hops converting `from` into `to`; empty when they are the same version
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<ConversionRoute>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(Vec::new());
        }
        if from == self.hub || to == self.hub {
            return self.route(from, to).map(|r| vec![r]);
        }
        Some(vec![self.route(from, &self.hub)?, self.route(&self.hub, to)?])
    }
}

/// Elect the hub and derive routes for one kind
pub fn wire_versions(kind: &KindDefinition, preferred: Option<&str>) -> Result<VersionGraph, VersionGraphError> {
    let first = kind.versions.first().ok_or_else(|| VersionGraphError::NoVersions {
        group: kind.group.clone(),
        kind: kind.kind.clone(),
    })?;

    let mut seen = HashSet::new();
    for v in &kind.versions {
        if !seen.insert(v.name.as_str()) {
            return Err(VersionGraphError::DuplicateVersion {
                group: kind.group.clone(),
                kind: kind.kind.clone(),
                version: v.name.clone(),
            });
        }
        if v.conversion != first.conversion {
            return Err(VersionGraphError::ConversionMismatch {
                group: kind.group.clone(),
                kind: kind.kind.clone(),
                first: first.name.clone(),
                first_enabled: first.conversion,
                second: v.name.clone(),
                second_enabled: v.conversion,
            });
        }
    }

    let hub = match preferred.or(kind.preferred_version.as_deref()) {
        Some(p) if seen.contains(p) => p.to_string(),
        Some(p) => {
            return Err(VersionGraphError::PreferredVersionNotFound {
                group: kind.group.clone(),
                kind: kind.kind.clone(),
                version: p.to_string(),
            })
        }
        None => {
            let last = kind.versions.last().unwrap_or(first);
            let best = highest_priority(kind.versions.iter().map(|v| v.name.as_str()));
            if best != Some(last.name.as_str()) {
                warn!(
                    group = %kind.group,
                    kind = %kind.kind,
                    hub = %last.name,
                    highest = ?best,
                    "hub elected by declaration order is not the highest priority version"
                );
            }
            last.name.clone()
        }
    };

    let mut graph = DiGraph::with_capacity(kind.versions.len(), kind.versions.len() * 2);
    let mut nodes = HashMap::with_capacity(kind.versions.len());
    for v in &kind.versions {
        nodes.insert(v.name.clone(), graph.add_node(v.name.clone()));
    }
    let hub_idx = nodes[&hub];
    for v in &kind.versions {
        if v.name == hub {
            continue;
        }
        let idx = nodes[&v.name];
        graph.add_edge(idx, hub_idx, Direction::ToHub);
        graph.add_edge(hub_idx, idx, Direction::FromHub);
    }

    let priority = kind.versions.iter().rev().map(|v| v.name.clone()).collect();

    debug!(group = %kind.group, kind = %kind.kind, %hub, "wired version graph");

    Ok(VersionGraph {
        group: kind.group.clone(),
        kind: kind.kind.clone(),
        hub,
        conversion: first.conversion,
        priority,
        graph,
        nodes,
    })
}

/// Merge kind definitions sharing `(group, kind)`, keeping first-seen order
pub fn group_kinds<'a>(kinds: impl IntoIterator<Item = &'a KindDefinition>) -> Vec<KindDefinition> {
    let mut out: Vec<KindDefinition> = Vec::new();
    for kind in kinds {
        match out
            .iter_mut()
            .find(|k| k.group == kind.group && k.kind == kind.kind)
        {
            Some(existing) => {
                existing.versions.extend(kind.versions.iter().cloned());
                if existing.preferred_version.is_none() {
                    existing.preferred_version = kind.preferred_version.clone();
                }
            }
            None => out.push(kind.clone()),
        }
    }
    out
}

/// Wire every kind group of a manifest. Failures are per kind group.
pub fn wire_manifest(
    manifest: &AppManifest,
    preferred: &HashMap<String, String>,
) -> Vec<(String, Result<VersionGraph, VersionGraphError>)> {
    group_kinds(&manifest.kinds)
        .iter()
        .map(|kind| {
            let graph = wire_versions(kind, preferred.get(&kind.kind).map(String::as_str));
            (kind.kind.clone(), graph)
        })
        .collect()
}
