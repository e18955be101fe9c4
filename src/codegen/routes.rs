//! Conversion routing summary
//!
//! A single `conversions.<ext>` document listing, for every kind of every
//! input manifest, its hub, client priority order and registered routes.

use serde::Serialize;
use std::collections::HashMap;

use super::{Artifact, Encoding, ManyToOne};
use crate::conversion::{wire_manifest, ConversionRoute, VersionGraph};
use crate::error::Result;
use crate::kind::AppManifest;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindRoutes {
    pub app: String,
    pub group: String,
    pub kind: String,
    pub hub: String,
    pub conversion: bool,
    pub priority: Vec<String>,
    pub routes: Vec<ConversionRoute>,
}

impl KindRoutes {
    fn from_graph(app: &str, graph: &VersionGraph) -> Self {
        Self {
            app: app.to_string(),
            group: graph.group.clone(),
            kind: graph.kind.clone(),
            hub: graph.hub.clone(),
            conversion: graph.conversion,
            priority: graph.priority.clone(),
            routes: graph.routes(),
        }
    }
}

/// Emits one routing summary covering every input manifest
pub struct RoutesGenerator {
    encoding: Encoding,
    preferred: HashMap<String, String>,
}

impl RoutesGenerator {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            preferred: HashMap::new(),
        }
    }

    pub fn with_preferred(mut self, preferred: HashMap<String, String>) -> Self {
        self.preferred = preferred;
        self
    }

    /// Wire every kind; the first inconsistent kind fails the whole summary
    pub fn build(&self, manifests: &[&AppManifest]) -> Result<Vec<KindRoutes>> {
        let mut out = Vec::new();
        for manifest in manifests {
            for (_, graph) in wire_manifest(manifest, &self.preferred) {
                out.push(KindRoutes::from_graph(&manifest.app_name, &graph?));
            }
        }
        Ok(out)
    }
}

impl ManyToOne<AppManifest> for RoutesGenerator {
    fn name(&self) -> &str {
        "routes"
    }

    fn generate(&self, manifests: &[&AppManifest]) -> Result<Option<Artifact>> {
        if manifests.is_empty() {
            return Ok(None);
        }
        let routes = self.build(manifests)?;
        let path = format!("conversions.{}", self.encoding.extension());
        Ok(Some(Artifact::new(path, self.encoding.encode(&routes)?)))
    }
}
