//! Generator pipeline end to end

use std::sync::Arc;

use kind_schemas::codegen::{
    filter, Artifact, ArtifactWriter, CrdGenerator, FsWriter, Generator, KindSelector, ManifestGenerator,
    MemoryWriter, OneToOne, Pipeline, RoutesGenerator,
};
use kind_schemas::error::{Error, GeneratorError, SchemaError};
use kind_schemas::{AppManifest, ArtifactSet, Encoding, KindDefinition, KindVersion, ManifestCache, SchemaTree};
use serde_json::{json, Value};
use tempfile::TempDir;

fn tree() -> SchemaTree {
    SchemaTree::from_json(&json!({ "components": { "schemas": { "Issue": {
        "type": "object",
        "properties": {
            "metadata": { "type": "object" },
            "spec": {
                "type": "object",
                "properties": { "title": { "type": "string" } },
                "additionalProperties": {}
            },
            "status": { "type": "object" }
        }
    } } } }))
    .unwrap()
}

fn tracker() -> AppManifest {
    AppManifest::new(
        "tracker",
        "tracker.example.dev",
        vec![
            KindDefinition::new(
                "tracker.example.dev",
                "Issue",
                vec![
                    KindVersion::new("v1alpha1", tree()),
                    KindVersion::new("v1beta1", tree()),
                    KindVersion::new("v1", tree()),
                ],
            ),
            KindDefinition::new("tracker.example.dev", "Board", vec![KindVersion::new("v1", tree())]),
        ],
    )
}

fn standard_pipeline(cache: Arc<ManifestCache>) -> Pipeline<AppManifest> {
    Pipeline::new()
        .with(Generator::one_to_many(CrdGenerator::new(cache.clone(), Encoding::Json)))
        .with(Generator::one_to_one(ManifestGenerator::new(cache, Encoding::Json)))
        .with(Generator::many_to_one(RoutesGenerator::new(Encoding::Json)))
}

/// Writer that records whether it was ever called
#[derive(Default)]
struct RecordingWriter {
    calls: usize,
    paths: Vec<String>,
}

impl ArtifactWriter for RecordingWriter {
    fn write(&mut self, artifacts: &ArtifactSet) -> kind_schemas::Result<()> {
        self.calls += 1;
        self.paths.extend(artifacts.iter().map(|a| a.path.clone()));
        Ok(())
    }
}

struct Failing;

impl OneToOne<AppManifest> for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn generate(&self, manifest: &AppManifest) -> kind_schemas::Result<Option<Artifact>> {
        Err(SchemaError::KindVersionNotFound {
            kind: manifest.app_name.clone(),
            version: "v0".into(),
        }
        .into())
    }
}

// =============================================================================
// Commit Semantics
// =============================================================================

#[test]
fn test_all_or_nothing_commit() {
    let cache = Arc::new(ManifestCache::new());
    let pipeline = Pipeline::new()
        .with(Generator::one_to_many(CrdGenerator::new(cache, Encoding::Json)))
        .with(Generator::one_to_one(Failing));

    let mut writer = RecordingWriter::default();
    let err = pipeline.run_and_commit(&[tracker()], &mut writer).unwrap_err();

    match err {
        Error::Generator(GeneratorError::Failed { generator, source }) => {
            assert_eq!(generator, "failing");
            assert!(matches!(*source, Error::Schema(SchemaError::KindVersionNotFound { .. })));
        }
        other => panic!("Expected GeneratorError::Failed, got {:?}", other),
    }
    assert_eq!(writer.calls, 0);
    assert!(writer.paths.is_empty());
}

#[test]
fn test_failed_run_leaves_no_files() {
    let temp = TempDir::new().unwrap();
    let cache = Arc::new(ManifestCache::new());
    let pipeline = standard_pipeline(cache).with(Generator::one_to_one(Failing));

    let mut writer = FsWriter::new(temp.path().join("out")).with_checksums(true);
    assert!(pipeline.run_and_commit(&[tracker()], &mut writer).is_err());
    assert!(!temp.path().join("out").exists());
}

#[test]
fn test_successful_run_writes_everything() {
    let temp = TempDir::new().unwrap();
    let cache = Arc::new(ManifestCache::new());
    let pipeline = standard_pipeline(cache.clone());

    let mut writer = FsWriter::new(temp.path()).with_checksums(true);
    let set = pipeline.run_and_commit(&[tracker()], &mut writer).unwrap();

    let mut paths: Vec<&str> = set.iter().map(|a| a.path.as_str()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "conversions.json",
            "crd/boards.tracker.example.dev.json",
            "crd/issues.tracker.example.dev.json",
            "manifests/tracker.json",
        ]
    );
    for path in &paths {
        assert!(temp.path().join(path).exists(), "missing {}", path);
    }
    assert!(temp.path().join("checksums.sha256").exists());

    // Every kind version synthesized exactly once across all generators.
    assert_eq!(cache.stats().schema_builds, 4);
    assert_eq!(cache.stats().manifest_builds, 1);
}

// =============================================================================
// CRD Output
// =============================================================================

#[test]
fn test_exactly_one_storage_version_per_kind() {
    let set = standard_pipeline(Arc::new(ManifestCache::new()))
        .run(&[tracker()])
        .unwrap();

    for artifact in set.iter().filter(|a| a.path.starts_with("crd/")) {
        let crd: Value = serde_json::from_slice(&artifact.data).unwrap();
        let versions = crd["spec"]["versions"].as_array().unwrap();
        let storage: Vec<&str> = versions
            .iter()
            .filter(|v| v["storage"] == json!(true))
            .map(|v| v["name"].as_str().unwrap())
            .collect();
        assert_eq!(storage, vec!["v1"], "{}", artifact.path);
        for version in versions {
            assert!(version["schema"]["openAPIV3Schema"]["properties"].get("metadata").is_none());
            assert_eq!(version["subresources"], json!({ "status": {} }));
        }
    }

    let issue: Value = serde_json::from_slice(&set.get("crd/issues.tracker.example.dev.json").unwrap().data).unwrap();
    assert_eq!(issue["spec"]["versions"].as_array().unwrap().len(), 3);
    assert_eq!(
        issue["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]["spec"],
        json!({
            "type": "object",
            "properties": { "title": { "type": "string" } },
            "x-kubernetes-preserve-unknown-fields": true
        })
    );
}

#[test]
fn test_kind_split_across_definitions() {
    let manifest = AppManifest::new(
        "tracker",
        "tracker.example.dev",
        vec![
            KindDefinition::new("tracker.example.dev", "Issue", vec![KindVersion::new("v1", tree())]),
            KindDefinition::new("tracker.example.dev", "Issue", vec![KindVersion::new("v2", tree())]),
        ],
    );
    let generator = CrdGenerator::new(Arc::new(ManifestCache::new()), Encoding::Json);
    let set = Pipeline::new()
        .with(Generator::one_to_many(generator))
        .run(&[manifest])
        .unwrap();

    assert_eq!(set.len(), 1);
    let crd: Value = serde_json::from_slice(&set.get("crd/issues.tracker.example.dev.json").unwrap().data).unwrap();
    let names: Vec<&str> = crd["spec"]["versions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["v1", "v2"]);
    assert_eq!(crd["spec"]["versions"][1]["storage"], json!(true));
}

#[test]
fn test_routes_summary() {
    let set = standard_pipeline(Arc::new(ManifestCache::new()))
        .run(&[tracker()])
        .unwrap();
    let routes: Value = serde_json::from_slice(&set.get("conversions.json").unwrap().data).unwrap();

    assert_eq!(routes[0]["kind"], "Issue");
    assert_eq!(routes[0]["priority"], json!(["v1", "v1beta1", "v1alpha1"]));
    assert_eq!(routes[0]["routes"].as_array().unwrap().len(), 4);
    assert_eq!(set.get("conversions.json").unwrap().generators, vec!["routes"]);
}

// =============================================================================
// Filtering
// =============================================================================

#[test]
fn test_filtered_generator_is_transparent() {
    let selector = KindSelector::parse("Board").unwrap();
    let cache = Arc::new(ManifestCache::new());
    let other = AppManifest::new(
        "other",
        "other.example.dev",
        vec![KindDefinition::new("other.example.dev", "Widget", vec![KindVersion::new("v1", tree())])],
    );

    let filtered = filter(
        Generator::one_to_many(CrdGenerator::new(cache, Encoding::Json)),
        move |m: &AppManifest| selector.matches_manifest(m),
    );
    assert_eq!(filtered.name(), "crd");

    let mut writer = MemoryWriter::new();
    let set = Pipeline::new()
        .with(filtered)
        .run_and_commit(&[tracker(), other], &mut writer)
        .unwrap();

    assert_eq!(set.len(), 2);
    assert!(writer.files.contains_key("crd/issues.tracker.example.dev.json"));
    assert!(!writer.files.keys().any(|p| p.contains("widgets")));
    assert!(set.iter().all(|a| a.generators == vec!["crd"]));
}

#[test]
fn test_collision_between_generators() {
    struct Overwrite;
    impl OneToOne<AppManifest> for Overwrite {
        fn name(&self) -> &str {
            "overwrite"
        }
        fn generate(&self, _: &AppManifest) -> kind_schemas::Result<Option<Artifact>> {
            Ok(Some(Artifact::new("conversions.json", b"{}".to_vec())))
        }
    }

    let err = standard_pipeline(Arc::new(ManifestCache::new()))
        .with(Generator::one_to_one(Overwrite))
        .run(&[tracker()])
        .unwrap_err();
    match err {
        GeneratorError::PathCollision { path, generators } => {
            assert_eq!(path, "conversions.json");
            assert_eq!(generators, vec!["routes", "overwrite"]);
        }
        other => panic!("Expected PathCollision, got {:?}", other),
    }
}

#[test]
fn test_yaml_encoding() {
    let cache = Arc::new(ManifestCache::new());
    let set = Pipeline::new()
        .with(Generator::one_to_one(ManifestGenerator::new(cache, Encoding::Yaml)))
        .run(&[tracker()])
        .unwrap();

    let artifact = set.get("manifests/tracker.yaml").unwrap();
    let doc: Value = serde_yaml::from_slice(&artifact.data).unwrap();
    assert_eq!(doc["kind"], "AppManifest");
    assert_eq!(doc["spec"]["kinds"][0]["versions"].as_array().unwrap().len(), 3);
}
