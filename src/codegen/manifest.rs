//! App manifest document generator

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::{Artifact, Encoding, OneToOne};
use crate::cache::ManifestCache;
use crate::conversion::{group_kinds, wire_versions};
use crate::error::Result;
use crate::kind::{AdmissionCapabilities, AppManifest, Scope};

pub const DEFAULT_MANIFEST_API_VERSION: &str = "apps.kindgen.dev/v1alpha1";
pub const MANIFEST_KIND: &str = "AppManifest";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMetadata,
    pub spec: ManifestSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestMetadata {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSpec {
    pub app_name: String,
    pub group: String,
    pub kinds: Vec<ManifestKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestKind {
    pub kind: String,
    pub scope: Scope,
    pub conversion: bool,
    pub versions: Vec<ManifestVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVersion {
    pub name: String,
    pub schema: Value,
    pub selectable_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission: Option<AdmissionCapabilities>,
}

/// Emits `manifests/<appName>.<ext>` from the cached manifest view
pub struct ManifestGenerator {
    cache: Arc<ManifestCache>,
    encoding: Encoding,
    api_version: String,
}

impl ManifestGenerator {
    pub fn new(cache: Arc<ManifestCache>, encoding: Encoding) -> Self {
        Self {
            cache,
            encoding,
            api_version: DEFAULT_MANIFEST_API_VERSION.to_string(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn build(&self, manifest: &AppManifest) -> Result<ManifestDocument> {
        let view = self.cache.manifest(manifest, true)?;

        let mut kinds = Vec::new();
        for kind in group_kinds(&view.kinds) {
            let conversion = wire_versions(&kind, None)?.conversion;

            let mut versions = Vec::new();
            for version in &kind.versions {
                let schema = match view.schema(&kind.kind, &version.name) {
                    Some(Ok(synth)) => synth.schema.properties_value(),
                    Some(Err(e)) => return Err(e.clone().into()),
                    None => Value::Null,
                };
                versions.push(ManifestVersion {
                    name: version.name.clone(),
                    schema,
                    selectable_fields: version.selectable_fields.clone(),
                    admission: (!version.admission.is_empty()).then(|| version.admission.clone()),
                });
            }

            kinds.push(ManifestKind {
                kind: kind.kind.clone(),
                scope: kind.scope,
                conversion,
                versions,
            });
        }

        Ok(ManifestDocument {
            api_version: self.api_version.clone(),
            kind: MANIFEST_KIND.to_string(),
            metadata: ManifestMetadata {
                name: view.app_name.clone(),
            },
            spec: ManifestSpec {
                app_name: view.app_name.clone(),
                group: view.group.clone(),
                kinds,
            },
        })
    }
}

impl OneToOne<AppManifest> for ManifestGenerator {
    fn name(&self) -> &str {
        "manifest"
    }

    fn generate(&self, manifest: &AppManifest) -> Result<Option<Artifact>> {
        let document = self.build(manifest)?;
        let path = format!("manifests/{}.{}", manifest.app_name, self.encoding.extension());
        Ok(Some(Artifact::new(path, self.encoding.encode(&document)?)))
    }
}
