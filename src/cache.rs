//! Manifest Derivation Cache
//!
//! Memoizes, per app name, the derived manifest views (with and without
//! schema trees) and the synthesized schema of every (version, kind) pair.
//!
//! A single mutex guards both lookup and build-on-miss, so a build runs at
//! most once per key no matter how many callers race for it. Failed manifest
//! builds are never stored; the next request starts over.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{ManifestBuildError, Result, SchemaError};
use crate::kind::{AppManifest, KindDefinition};
use crate::schema::{synthesize, SchemaTree, SynthesizedSchema};

/// Cache key of one synthesized schema: (version, kind)
pub type SchemaKey = (String, String);

/// Derived snapshot of an app manifest
#[derive(Debug, Clone)]
pub struct ManifestView {
    pub app_name: String,
    /// Resolved manifest group
    pub group: String,
    /// Kinds in declaration order. Schema trees are empty when built without schemas.
    pub kinds: Vec<KindDefinition>,
    pub includes_schemas: bool,
    /// Synthesis outcome per (version, kind); empty without schemas
    pub schemas: BTreeMap<SchemaKey, std::result::Result<Arc<SynthesizedSchema>, SchemaError>>,
}

impl ManifestView {
    pub fn schema(&self, kind: &str, version: &str) -> Option<&std::result::Result<Arc<SynthesizedSchema>, SchemaError>> {
        self.schemas.get(&(version.to_string(), kind.to_string()))
    }

    /// Every synthesis failure, in key order
    pub fn schema_errors(&self) -> Vec<&SchemaError> {
        self.schemas.values().filter_map(|r| r.as_ref().err()).collect()
    }
}

/// Build counters, for diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub manifest_builds: usize,
    pub schema_builds: usize,
}

#[derive(Default)]
struct CacheEntry {
    with_schemas: Option<Arc<ManifestView>>,
    without_schemas: Option<Arc<ManifestView>>,
    schemas: HashMap<SchemaKey, Arc<SynthesizedSchema>>,
}

/// Process-lifetime cache of derived manifest artifacts
#[derive(Default)]
pub struct ManifestCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    manifest_builds: AtomicUsize,
    schema_builds: AtomicUsize,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            manifest_builds: self.manifest_builds.load(Ordering::SeqCst),
            schema_builds: self.schema_builds.load(Ordering::SeqCst),
        }
    }

    /// Number of cached app names
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Derived view of a manifest, built on first request per app name
    pub fn manifest(&self, manifest: &AppManifest, include_schemas: bool) -> std::result::Result<Arc<ManifestView>, ManifestBuildError> {
        let mut entries = self.lock();

        if let Some(entry) = entries.get(&manifest.app_name) {
            let cached = if include_schemas {
                &entry.with_schemas
            } else {
                &entry.without_schemas
            };
            if let Some(view) = cached {
                debug!(app = %manifest.app_name, include_schemas, "manifest cache hit");
                return Ok(view.clone());
            }
        }

        debug!(app = %manifest.app_name, include_schemas, "manifest cache miss");
        let group = manifest.resolve_group()?;
        self.manifest_builds.fetch_add(1, Ordering::SeqCst);

        let entry = entries.entry(manifest.app_name.clone()).or_default();
        let view = Arc::new(self.build_view(manifest, group, include_schemas, &mut entry.schemas));
        if include_schemas {
            entry.with_schemas = Some(view.clone());
        } else {
            entry.without_schemas = Some(view.clone());
        }
        Ok(view)
    }

    /// Synthesized schema of one kind version, built on first access
    pub fn kind_version_schema(&self, manifest: &AppManifest, kind: &str, version: &str) -> Result<Arc<SynthesizedSchema>> {
        let mut entries = self.lock();
        let key = (version.to_string(), kind.to_string());

        if let Some(schema) = entries
            .get(&manifest.app_name)
            .and_then(|entry| entry.schemas.get(&key))
        {
            debug!(app = %manifest.app_name, kind, version, "schema cache hit");
            return Ok(schema.clone());
        }

        manifest.resolve_group()?;
        let tree = manifest
            .kind_version(kind, version)
            .map(|v| &v.schema)
            .ok_or_else(|| SchemaError::KindVersionNotFound {
                kind: kind.to_string(),
                version: version.to_string(),
            })?;

        debug!(app = %manifest.app_name, kind, version, "schema cache miss");
        let schema = Arc::new(self.synthesize_counted(tree, kind, version)?);
        entries
            .entry(manifest.app_name.clone())
            .or_default()
            .schemas
            .insert(key, schema.clone());
        Ok(schema)
    }

    fn synthesize_counted(&self, tree: &SchemaTree, kind: &str, version: &str) -> std::result::Result<SynthesizedSchema, SchemaError> {
        self.schema_builds.fetch_add(1, Ordering::SeqCst);
        synthesize(tree, kind, version)
    }

    fn build_view(
        &self,
        manifest: &AppManifest,
        group: String,
        include_schemas: bool,
        memo: &mut HashMap<SchemaKey, Arc<SynthesizedSchema>>,
    ) -> ManifestView {
        let mut schemas = BTreeMap::new();
        let mut kinds = manifest.kinds.clone();

        for kind in &mut kinds {
            for version in &mut kind.versions {
                if !include_schemas {
                    version.schema = SchemaTree::default();
                    continue;
                }
                let key = (version.name.clone(), kind.kind.clone());
                let outcome = match memo.get(&key) {
                    Some(schema) => Ok(schema.clone()),
                    None => match self.synthesize_counted(&version.schema, &kind.kind, &version.name) {
                        Ok(schema) => {
                            let schema = Arc::new(schema);
                            memo.insert(key.clone(), schema.clone());
                            Ok(schema)
                        }
                        Err(e) => Err(e),
                    },
                };
                schemas.insert(key, outcome);
            }
        }

        ManifestView {
            app_name: manifest.app_name.clone(),
            group,
            kinds,
            includes_schemas: include_schemas,
            schemas,
        }
    }
}
