//! CustomResourceDefinition generator
//!
//! One CRD per kind, built from the `apiextensions.k8s.io/v1` types. The hub
//! version is the storage version; every version embeds its synthesized
//! schema under `openAPIV3Schema`.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceColumnDefinition, CustomResourceConversion, CustomResourceDefinition,
    CustomResourceDefinitionNames, CustomResourceDefinitionSpec, CustomResourceDefinitionVersion,
    CustomResourceSubresourceStatus, CustomResourceSubresources, CustomResourceValidation, JSONSchemaProps,
    SelectableField,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{Artifact, Encoding, OneToMany};
use crate::cache::ManifestCache;
use crate::conversion::{group_kinds, wire_versions};
use crate::error::{Result, SchemaError};
use crate::kind::{AppManifest, KindDefinition, PrinterColumn};
use crate::schema::{SynthesizedSchema, ValidationNode};

/// Root property served as the `status` subresource
pub const STATUS_SUBRESOURCE: &str = "status";

/// Conversion strategy of a CRD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStrategy {
    None,
    Webhook,
}

impl ConversionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStrategy::None => "None",
            ConversionStrategy::Webhook => "Webhook",
        }
    }
}

fn printer_column(column: &PrinterColumn) -> CustomResourceColumnDefinition {
    CustomResourceColumnDefinition {
        name: column.name.clone(),
        json_path: column.json_path.clone(),
        type_: column.column_type.clone(),
        description: column.description.clone(),
        format: column.format.clone(),
        priority: column.priority,
    }
}

/// Only `status` has a schema-free subresource form in a CRD
fn subresources(synth: &SynthesizedSchema, kind: &str, version: &str) -> Option<CustomResourceSubresources> {
    let mut out = CustomResourceSubresources::default();
    for name in &synth.subresources {
        if name == STATUS_SUBRESOURCE {
            out.status = Some(CustomResourceSubresourceStatus(Value::Object(Map::new())));
        } else {
            debug!(kind, version, property = %name, "root property has no CRD subresource form");
        }
    }
    out.status.is_some().then_some(out)
}

/// Check a selectable field path against a synthesized schema
pub fn check_selectable_field(
    schema: &SynthesizedSchema,
    kind: &str,
    version: &str,
    field: &str,
) -> std::result::Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidSelectableField {
        kind: kind.to_string(),
        version: version.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    };
    if !field.starts_with('.') {
        return Err(invalid("path must start with '.'"));
    }
    match schema.schema.lookup(field) {
        Some(ValidationNode::Scalar(_)) => Ok(()),
        Some(_) => Err(invalid("field is not a scalar")),
        None => Err(invalid("field not found in schema")),
    }
}

/// Emits `crd/<plural>.<group>.<ext>` per kind
pub struct CrdGenerator {
    cache: Arc<ManifestCache>,
    encoding: Encoding,
    preferred: HashMap<String, String>,
}

impl CrdGenerator {
    pub fn new(cache: Arc<ManifestCache>, encoding: Encoding) -> Self {
        Self {
            cache,
            encoding,
            preferred: HashMap::new(),
        }
    }

    /// Per-kind hub overrides (`Kind -> version`)
    pub fn with_preferred(mut self, preferred: HashMap<String, String>) -> Self {
        self.preferred = preferred;
        self
    }

    /// Build the CRD of one kind of `manifest`
    pub fn build(&self, manifest: &AppManifest, kind: &KindDefinition) -> Result<CustomResourceDefinition> {
        let graph = wire_versions(kind, self.preferred.get(&kind.kind).map(String::as_str))?;

        let mut versions = Vec::with_capacity(kind.versions.len());
        for version in &kind.versions {
            let synth = self.cache.kind_version_schema(manifest, &kind.kind, &version.name)?;

            for field in &version.selectable_fields {
                check_selectable_field(&synth, &kind.kind, &version.name, field)?;
            }

            let schema: JSONSchemaProps = serde_json::from_value(synth.schema.to_openapi())?;
            let selectable_fields: Vec<SelectableField> = version
                .selectable_fields
                .iter()
                .map(|f| SelectableField { json_path: f.clone() })
                .collect();
            let printer_columns: Vec<CustomResourceColumnDefinition> =
                version.printer_columns.iter().map(printer_column).collect();

            versions.push(CustomResourceDefinitionVersion {
                name: version.name.clone(),
                served: version.served,
                storage: version.name == graph.hub,
                schema: Some(CustomResourceValidation {
                    open_api_v3_schema: Some(schema),
                }),
                subresources: subresources(&synth, &kind.kind, &version.name),
                selectable_fields: (!selectable_fields.is_empty()).then_some(selectable_fields),
                additional_printer_columns: (!printer_columns.is_empty()).then_some(printer_columns),
                ..Default::default()
            });
        }

        let strategy = if graph.conversion {
            ConversionStrategy::Webhook
        } else {
            ConversionStrategy::None
        };

        Ok(CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some(kind.crd_name()),
                ..Default::default()
            },
            spec: CustomResourceDefinitionSpec {
                group: kind.group.clone(),
                scope: kind.scope.to_string(),
                names: CustomResourceDefinitionNames {
                    kind: kind.kind.clone(),
                    list_kind: Some(format!("{}List", kind.kind)),
                    plural: kind.plural_name(),
                    singular: Some(kind.kind.to_lowercase()),
                    ..Default::default()
                },
                versions,
                conversion: Some(CustomResourceConversion {
                    strategy: strategy.as_str().to_string(),
                    webhook: None,
                }),
                ..Default::default()
            },
            status: None,
        })
    }
}

impl OneToMany<AppManifest> for CrdGenerator {
    fn name(&self) -> &str {
        "crd"
    }

    fn generate(&self, manifest: &AppManifest) -> Result<Vec<Artifact>> {
        let mut out = Vec::new();
        for kind in group_kinds(&manifest.kinds) {
            let crd = self.build(manifest, &kind)?;
            let path = format!("crd/{}.{}", kind.crd_name(), self.encoding.extension());
            out.push(Artifact::new(path, self.encoding.encode(&crd)?));
        }
        Ok(out)
    }
}
