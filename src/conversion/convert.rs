//! Request-time Conversion
//!
//! Each route hop encodes the source object with its version's codec, hands
//! the bytes to a [`Converter`], and decodes the result with the destination
//! version's codec. The default converter only re-stamps `apiVersion` and
//! `kind`; kind-specific field mapping plugs in through the same two-method
//! contract.
//!
//! A kind must be registered before any object of it can be converted.

pub use kube::core::GroupVersionKind;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{wire_versions, Direction, VersionGraph};
use crate::cache::ManifestCache;
use crate::error::{ConversionError, Error};
use crate::kind::AppManifest;
use crate::schema::ValidationSchema;

// =============================================================================
// Type Metadata
// =============================================================================

/// Read `apiVersion` and `kind` from an object
pub fn gvk_of(object: &Value) -> Result<GroupVersionKind, ConversionError> {
    let api_version = object
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or(ConversionError::MissingTypeMeta("apiVersion"))?;
    let kind = object
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or(ConversionError::MissingTypeMeta("kind"))?;
    let (group, version) = api_version.rsplit_once('/').unwrap_or(("", api_version));
    Ok(GroupVersionKind::gvk(group, version, kind))
}

fn with_version(gvk: &GroupVersionKind, version: &str) -> GroupVersionKind {
    GroupVersionKind::gvk(&gvk.group, version, &gvk.kind)
}

/// Encoded object in flight between two versions
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub gvk: GroupVersionKind,
    pub bytes: Vec<u8>,
}

// =============================================================================
// Codecs
// =============================================================================

/// Wire encoding of one version
pub trait Codec: Send + Sync {
    fn encode(&self, object: &Value) -> Result<Vec<u8>, ConversionError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, ConversionError>;
}

/// Plain JSON, no schema awareness
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, object: &Value) -> Result<Vec<u8>, ConversionError> {
        serde_json::to_vec(object).map_err(|e| ConversionError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, ConversionError> {
        serde_json::from_slice(bytes).map_err(|e| ConversionError::Codec(e.to_string()))
    }
}

/// JSON that drops fields the version's schema does not declare on decode
#[derive(Debug, Clone)]
pub struct SchemaCodec {
    schema: Arc<ValidationSchema>,
}

impl SchemaCodec {
    pub fn new(schema: Arc<ValidationSchema>) -> Self {
        Self { schema }
    }
}

impl Codec for SchemaCodec {
    fn encode(&self, object: &Value) -> Result<Vec<u8>, ConversionError> {
        JsonCodec.encode(object)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, ConversionError> {
        let mut object = JsonCodec.decode(bytes)?;
        self.schema.prune(&mut object);
        Ok(object)
    }
}

// =============================================================================
// Converters
// =============================================================================

/// Kind-specific conversion between a version and the hub
pub trait Converter: Send + Sync {
    /// Convert `src` (a non-hub version) into the hub version `dst`
    fn to_hub(&self, src: &RawObject, dst: &GroupVersionKind) -> Result<Vec<u8>, ConversionError>;
    /// Convert `src` (the hub version) into the version `dst`
    fn from_hub(&self, src: &RawObject, dst: &GroupVersionKind) -> Result<Vec<u8>, ConversionError>;
}

/// Re-stamps group/version/kind without touching any other field
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughConverter;

impl PassthroughConverter {
    fn restamp(src: &RawObject, dst: &GroupVersionKind) -> Result<Vec<u8>, ConversionError> {
        let mut object = JsonCodec.decode(&src.bytes)?;
        let map = object
            .as_object_mut()
            .ok_or_else(|| ConversionError::Converter(format!("{} {} is not an object", src.gvk.api_version(), src.gvk.kind)))?;
        map.insert("apiVersion".into(), Value::String(dst.api_version()));
        map.insert("kind".into(), Value::String(dst.kind.clone()));
        JsonCodec.encode(&object)
    }
}

impl Converter for PassthroughConverter {
    fn to_hub(&self, src: &RawObject, dst: &GroupVersionKind) -> Result<Vec<u8>, ConversionError> {
        Self::restamp(src, dst)
    }

    fn from_hub(&self, src: &RawObject, dst: &GroupVersionKind) -> Result<Vec<u8>, ConversionError> {
        Self::restamp(src, dst)
    }
}

// =============================================================================
// Registry
// =============================================================================

struct KindConversion {
    graph: VersionGraph,
    codecs: HashMap<String, Arc<dyn Codec>>,
    converter: Arc<dyn Converter>,
}

impl KindConversion {
    fn codec(&self, version: &str) -> Arc<dyn Codec> {
        self.codecs
            .get(version)
            .cloned()
            .unwrap_or_else(|| Arc::new(JsonCodec))
    }
}

/// Outcome of registering a whole manifest
#[derive(Debug, Default)]
pub struct RegistrationReport {
    /// Kinds registered, in manifest order
    pub registered: Vec<String>,
    /// Kinds skipped, with the error that prevented registration
    pub failed: Vec<(String, Error)>,
}

impl RegistrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runtime scheme holding hubs, routes and codecs of registered kinds
#[derive(Default)]
pub struct ConversionRegistry {
    kinds: HashMap<(String, String), KindConversion>,
}

impl ConversionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind with the passthrough converter
    pub fn register(&mut self, graph: VersionGraph, codecs: HashMap<String, Arc<dyn Codec>>) {
        self.register_with(graph, codecs, Arc::new(PassthroughConverter));
    }

    /// Register a kind with a custom converter. Versions without a codec use plain JSON.
    pub fn register_with(
        &mut self,
        graph: VersionGraph,
        codecs: HashMap<String, Arc<dyn Codec>>,
        converter: Arc<dyn Converter>,
    ) {
        debug!(group = %graph.group, kind = %graph.kind, hub = %graph.hub, "registered conversion");
        self.kinds.insert(
            (graph.group.clone(), graph.kind.clone()),
            KindConversion {
                graph,
                codecs,
                converter,
            },
        );
    }

    /// Wire and register every kind of a manifest, with schema-pruning codecs.
    ///
    /// A kind is registered whole or not at all.
    pub fn register_manifest(
        &mut self,
        manifest: &AppManifest,
        cache: &ManifestCache,
        preferred: &HashMap<String, String>,
        converters: &HashMap<String, Arc<dyn Converter>>,
    ) -> RegistrationReport {
        let mut report = RegistrationReport::default();

        for kind in super::group_kinds(&manifest.kinds) {
            let graph = match wire_versions(&kind, preferred.get(&kind.kind).map(String::as_str)) {
                Ok(graph) => graph,
                Err(e) => {
                    report.failed.push((kind.kind.clone(), e.into()));
                    continue;
                }
            };

            let mut codecs: HashMap<String, Arc<dyn Codec>> = HashMap::new();
            let mut failure = None;
            for version in &kind.versions {
                match cache.kind_version_schema(manifest, &kind.kind, &version.name) {
                    Ok(synth) => {
                        let schema = Arc::new(synth.schema.clone());
                        codecs.insert(version.name.clone(), Arc::new(SchemaCodec::new(schema)));
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failure {
                report.failed.push((kind.kind.clone(), e));
                continue;
            }

            let converter = converters
                .get(&kind.kind)
                .cloned()
                .unwrap_or_else(|| Arc::new(PassthroughConverter));
            report.registered.push(kind.kind.clone());
            self.register_with(graph, codecs, converter);
        }

        report
    }

    pub fn graph(&self, group: &str, kind: &str) -> Option<&VersionGraph> {
        self.kinds
            .get(&(group.to_string(), kind.to_string()))
            .map(|k| &k.graph)
    }

    /// Hub version of a registered kind
    pub fn hub(&self, group: &str, kind: &str) -> Option<&str> {
        self.graph(group, kind).map(|g| g.hub.as_str())
    }

    /// Convert an object into `version` of its own kind
    pub fn convert(&self, object: &Value, version: &str) -> Result<Value, ConversionError> {
        let gvk = gvk_of(object)?;
        let entry = self
            .kinds
            .get(&(gvk.group.clone(), gvk.kind.clone()))
            .ok_or_else(|| ConversionError::NotRegistered {
                group: gvk.group.clone(),
                kind: gvk.kind.clone(),
            })?;

        for v in [gvk.version.as_str(), version] {
            if !entry.graph.contains(v) {
                return Err(ConversionError::UnknownVersion {
                    kind: gvk.kind.clone(),
                    version: v.to_string(),
                });
            }
        }

        let path = entry
            .graph
            .path(&gvk.version, version)
            .ok_or_else(|| ConversionError::Converter(format!("no route from {} to {}", gvk.version, version)))?;

        let mut current = object.clone();
        let mut current_gvk = gvk;
        for route in path {
            let src = RawObject {
                bytes: entry.codec(&route.from).encode(&current)?,
                gvk: current_gvk.clone(),
            };
            let dst = with_version(&current_gvk, &route.to);
            let bytes = match route.direction {
                Direction::ToHub => entry.converter.to_hub(&src, &dst)?,
                Direction::FromHub => entry.converter.from_hub(&src, &dst)?,
            };
            current = entry.codec(&route.to).decode(&bytes)?;
            current_gvk = dst;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{KindDefinition, KindVersion};
    use crate::schema::SchemaTree;
    use serde_json::json;

    fn graph(versions: &[&str]) -> VersionGraph {
        let kind = KindDefinition::new(
            "issues.example.dev",
            "Issue",
            versions
                .iter()
                .map(|v| KindVersion::new(*v, SchemaTree::default()))
                .collect(),
        );
        wire_versions(&kind, None).unwrap()
    }

    #[test]
    fn test_gvk_of_object() {
        let gvk = gvk_of(&json!({
            "apiVersion": "issues.example.dev/v1",
            "kind": "Issue"
        }))
        .unwrap();
        assert_eq!(gvk, GroupVersionKind::gvk("issues.example.dev", "v1", "Issue"));
        assert_eq!(gvk.api_version(), "issues.example.dev/v1");
        assert_eq!(with_version(&gvk, "v2").api_version(), "issues.example.dev/v2");

        let core = gvk_of(&json!({ "apiVersion": "v1", "kind": "Pod" })).unwrap();
        assert_eq!(core.group, "");
        assert_eq!(core.api_version(), "v1");

        assert_eq!(
            gvk_of(&json!({ "kind": "Issue" })),
            Err(ConversionError::MissingTypeMeta("apiVersion"))
        );
    }

    #[test]
    fn test_passthrough_restamps_only() {
        let mut registry = ConversionRegistry::new();
        registry.register(graph(&["v1", "v2"]), HashMap::new());

        let out = registry
            .convert(
                &json!({
                    "apiVersion": "issues.example.dev/v1",
                    "kind": "Issue",
                    "spec": { "title": "hello", "anything": [1, 2] }
                }),
                "v2",
            )
            .unwrap();
        assert_eq!(out, json!({
            "apiVersion": "issues.example.dev/v2",
            "kind": "Issue",
            "spec": { "title": "hello", "anything": [1, 2] }
        }));
    }

    #[test]
    fn test_same_version_is_identity() {
        let mut registry = ConversionRegistry::new();
        registry.register(graph(&["v1", "v2"]), HashMap::new());
        let object = json!({ "apiVersion": "issues.example.dev/v2", "kind": "Issue", "spec": {} });
        assert_eq!(registry.convert(&object, "v2").unwrap(), object);
    }

    #[test]
    fn test_unregistered_and_unknown() {
        let mut registry = ConversionRegistry::new();
        let object = json!({ "apiVersion": "issues.example.dev/v1", "kind": "Issue" });
        assert!(matches!(
            registry.convert(&object, "v2"),
            Err(ConversionError::NotRegistered { .. })
        ));

        registry.register(graph(&["v1", "v2"]), HashMap::new());
        assert_eq!(
            registry.convert(&object, "v3"),
            Err(ConversionError::UnknownVersion { kind: "Issue".into(), version: "v3".into() })
        );
        assert_eq!(registry.hub("issues.example.dev", "Issue"), Some("v2"));
    }

    struct RenameTitle;

    impl Converter for RenameTitle {
        fn to_hub(&self, src: &RawObject, dst: &GroupVersionKind) -> Result<Vec<u8>, ConversionError> {
            let mut obj = JsonCodec.decode(&src.bytes)?;
            if let Some(title) = obj["spec"].as_object_mut().and_then(|s| s.remove("name")) {
                obj["spec"]["title"] = title;
            }
            obj["apiVersion"] = json!(dst.api_version());
            JsonCodec.encode(&obj)
        }

        fn from_hub(&self, src: &RawObject, dst: &GroupVersionKind) -> Result<Vec<u8>, ConversionError> {
            let mut obj = JsonCodec.decode(&src.bytes)?;
            if let Some(title) = obj["spec"].as_object_mut().and_then(|s| s.remove("title")) {
                obj["spec"]["name"] = title;
            }
            obj["apiVersion"] = json!(dst.api_version());
            JsonCodec.encode(&obj)
        }
    }

    #[test]
    fn test_custom_converter_between_spokes() {
        let mut registry = ConversionRegistry::new();
        registry.register_with(graph(&["v1alpha1", "v1beta1", "v1"]), HashMap::new(), Arc::new(RenameTitle));

        // v1alpha1 -> v1 renames name to title, v1 -> v1beta1 renames it back.
        let out = registry
            .convert(
                &json!({ "apiVersion": "issues.example.dev/v1alpha1", "kind": "Issue", "spec": { "name": "x" } }),
                "v1",
            )
            .unwrap();
        assert_eq!(out["spec"], json!({ "title": "x" }));

        let out = registry
            .convert(
                &json!({ "apiVersion": "issues.example.dev/v1alpha1", "kind": "Issue", "spec": { "name": "x" } }),
                "v1beta1",
            )
            .unwrap();
        assert_eq!(out["apiVersion"], "issues.example.dev/v1beta1");
        assert_eq!(out["spec"], json!({ "name": "x" }));
    }
}
