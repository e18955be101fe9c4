//! Generator Pipeline
//!
//! Generators ("jennies") transform inputs into artifacts in one of three
//! shapes:
//! - `OneToOne`: one input -> at most one artifact
//! - `OneToMany`: one input -> zero or more artifacts
//! - `ManyToOne`: every input -> one artifact (e.g. a combined router file)
//!
//! A [`Pipeline`] runs its generators sequentially over the full input set
//! and accumulates artifacts in memory. Any failure aborts the run and
//! nothing is written; only a fully successful batch reaches an
//! [`ArtifactWriter`].

pub mod crd;
pub mod manifest;
pub mod routes;
pub mod select;
pub mod writer;

pub use crd::CrdGenerator;
pub use manifest::ManifestGenerator;
pub use routes::RoutesGenerator;
pub use select::KindSelector;
pub use writer::{ArtifactWriter, FsWriter, MemoryWriter};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::error::{GeneratorError, Result};

// =============================================================================
// Encoding
// =============================================================================

/// Serialization format of generated documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Json,
    Yaml,
}

impl Encoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Yaml => "yaml",
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> std::result::Result<Vec<u8>, GeneratorError> {
        match self {
            Encoding::Json => {
                let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| GeneratorError::Encode(e.to_string()))?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            Encoding::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| GeneratorError::Encode(e.to_string())),
        }
    }
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" => Ok(Encoding::Json),
            "yaml" | "yml" => Ok(Encoding::Yaml),
            other => Err(format!("unknown encoding {}", other)),
        }
    }
}

// =============================================================================
// Artifacts
// =============================================================================

/// A generated file
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Output path relative to the output root
    pub path: String,
    pub data: Vec<u8>,
    pub checksum: Checksum,
    /// Generators that produced this exact content at this path
    pub generators: Vec<String>,
}

impl Artifact {
    pub fn new(path: impl Into<String>, data: Vec<u8>) -> Self {
        let checksum = Checksum::from_bytes(&data);
        Self {
            path: path.into(),
            data,
            checksum,
            generators: Vec::new(),
        }
    }
}

/// What to do when two generators produce different content at one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail the run
    #[default]
    Error,
    /// Keep the first artifact and record the collision
    Warn,
}

/// Two or more generators claiming one path with different content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub path: String,
    pub generators: Vec<String>,
}

/// Artifacts accumulated by one run, in production order
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
    index: HashMap<String, usize>,
    collisions: Vec<Collision>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    pub fn get(&self, path: &str) -> Option<&Artifact> {
        self.index.get(path).map(|&i| &self.artifacts[i])
    }

    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Add an artifact. Identical content at a known path only merges provenance.
    pub fn insert(&mut self, artifact: Artifact, policy: CollisionPolicy) -> std::result::Result<(), GeneratorError> {
        let Some(&i) = self.index.get(&artifact.path) else {
            self.index.insert(artifact.path.clone(), self.artifacts.len());
            self.artifacts.push(artifact);
            return Ok(());
        };

        let existing = &mut self.artifacts[i];
        if existing.checksum == artifact.checksum {
            for name in artifact.generators {
                if !existing.generators.contains(&name) {
                    existing.generators.push(name);
                }
            }
            debug!(path = %existing.path, generators = ?existing.generators, "merged identical artifact");
            return Ok(());
        }

        let mut generators = existing.generators.clone();
        generators.extend(artifact.generators);
        match policy {
            CollisionPolicy::Error => Err(GeneratorError::PathCollision {
                path: artifact.path,
                generators,
            }),
            CollisionPolicy::Warn => {
                warn!(path = %artifact.path, ?generators, "path collision, keeping first artifact");
                self.collisions.push(Collision {
                    path: artifact.path,
                    generators,
                });
                Ok(())
            }
        }
    }
}

// =============================================================================
// Generators
// =============================================================================

/// One input, at most one artifact
pub trait OneToOne<I>: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, input: &I) -> Result<Option<Artifact>>;
}

/// One input, any number of artifacts
pub trait OneToMany<I>: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, input: &I) -> Result<Vec<Artifact>>;
}

/// All inputs, one artifact
pub trait ManyToOne<I>: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, inputs: &[&I]) -> Result<Option<Artifact>>;
}

/// The shape of a generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    OneToOne,
    OneToMany,
    ManyToOne,
}

/// A named transform from inputs to artifacts
pub enum Generator<I> {
    OneToOne(Box<dyn OneToOne<I>>),
    OneToMany(Box<dyn OneToMany<I>>),
    ManyToOne(Box<dyn ManyToOne<I>>),
}

impl<I> Generator<I> {
    pub fn one_to_one(generator: impl OneToOne<I> + 'static) -> Self {
        Generator::OneToOne(Box::new(generator))
    }

    pub fn one_to_many(generator: impl OneToMany<I> + 'static) -> Self {
        Generator::OneToMany(Box::new(generator))
    }

    pub fn many_to_one(generator: impl ManyToOne<I> + 'static) -> Self {
        Generator::ManyToOne(Box::new(generator))
    }

    pub fn name(&self) -> &str {
        match self {
            Generator::OneToOne(g) => g.name(),
            Generator::OneToMany(g) => g.name(),
            Generator::ManyToOne(g) => g.name(),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Generator::OneToOne(_) => Shape::OneToOne,
            Generator::OneToMany(_) => Shape::OneToMany,
            Generator::ManyToOne(_) => Shape::ManyToOne,
        }
    }

    /// Run against every input, stamping provenance on each artifact
    fn execute(&self, inputs: &[I]) -> Result<Vec<Artifact>> {
        let mut out = Vec::new();
        match self {
            Generator::OneToOne(g) => {
                for input in inputs {
                    out.extend(g.generate(input)?);
                }
            }
            Generator::OneToMany(g) => {
                for input in inputs {
                    out.extend(g.generate(input)?);
                }
            }
            Generator::ManyToOne(g) => {
                let refs: Vec<&I> = inputs.iter().collect();
                out.extend(g.generate(&refs)?);
            }
        }
        for artifact in &mut out {
            artifact.generators = vec![self.name().to_string()];
        }
        Ok(out)
    }
}

// =============================================================================
// Filtering
// =============================================================================

struct Filtered<G: ?Sized, P> {
    inner: Box<G>,
    predicate: P,
}

impl<I, P> OneToOne<I> for Filtered<dyn OneToOne<I>, P>
where
    P: Fn(&I) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn generate(&self, input: &I) -> Result<Option<Artifact>> {
        if (self.predicate)(input) {
            self.inner.generate(input)
        } else {
            Ok(None)
        }
    }
}

impl<I, P> OneToMany<I> for Filtered<dyn OneToMany<I>, P>
where
    P: Fn(&I) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn generate(&self, input: &I) -> Result<Vec<Artifact>> {
        if (self.predicate)(input) {
            self.inner.generate(input)
        } else {
            Ok(Vec::new())
        }
    }
}

impl<I, P> ManyToOne<I> for Filtered<dyn ManyToOne<I>, P>
where
    P: Fn(&I) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn generate(&self, inputs: &[&I]) -> Result<Option<Artifact>> {
        let kept: Vec<&I> = inputs.iter().copied().filter(|i| (self.predicate)(*i)).collect();
        self.inner.generate(&kept)
    }
}

/// Skip inputs failing `predicate`. Name and shape are preserved.
pub fn filter<I, P>(generator: Generator<I>, predicate: P) -> Generator<I>
where
    I: 'static,
    P: Fn(&I) -> bool + Send + Sync + 'static,
{
    match generator {
        Generator::OneToOne(inner) => Generator::OneToOne(Box::new(Filtered { inner, predicate })),
        Generator::OneToMany(inner) => Generator::OneToMany(Box::new(Filtered { inner, predicate })),
        Generator::ManyToOne(inner) => Generator::ManyToOne(Box::new(Filtered { inner, predicate })),
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Cooperative cancellation, checked between generators
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An ordered batch of generators sharing one input type
pub struct Pipeline<I> {
    generators: Vec<Generator<I>>,
    collision_policy: CollisionPolicy,
    cancel: Option<CancelFlag>,
}

impl<I> Default for Pipeline<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Pipeline<I> {
    pub fn new() -> Self {
        Self {
            generators: Vec::new(),
            collision_policy: CollisionPolicy::default(),
            cancel: None,
        }
    }

    pub fn with(mut self, generator: Generator<I>) -> Self {
        self.generators.push(generator);
        self
    }

    pub fn push(&mut self, generator: Generator<I>) {
        self.generators.push(generator);
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Generator names in run order
    pub fn names(&self) -> Vec<&str> {
        self.generators.iter().map(|g| g.name()).collect()
    }

    /// Run every generator; the first failure aborts the whole batch
    pub fn run(&self, inputs: &[I]) -> std::result::Result<ArtifactSet, GeneratorError> {
        let mut set = ArtifactSet::new();
        for generator in &self.generators {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                return Err(GeneratorError::Cancelled {
                    generator: generator.name().to_string(),
                });
            }

            debug!(generator = generator.name(), shape = ?generator.shape(), inputs = inputs.len(), "running generator");
            let artifacts = generator.execute(inputs).map_err(|e| GeneratorError::Failed {
                generator: generator.name().to_string(),
                source: Box::new(e),
            })?;
            for artifact in artifacts {
                set.insert(artifact, self.collision_policy)?;
            }
        }
        info!(generators = self.generators.len(), artifacts = set.len(), "generation complete");
        Ok(set)
    }

    /// Run, then hand the complete set to `writer`. Nothing is written on failure.
    pub fn run_and_commit(&self, inputs: &[I], writer: &mut dyn ArtifactWriter) -> Result<ArtifactSet> {
        let set = self.run(inputs)?;
        writer.write(&set)?;
        info!(artifacts = set.len(), "artifacts committed");
        Ok(set)
    }
}

/// Run a batch of generators with the default collision policy
pub fn run<I>(generators: Vec<Generator<I>>, inputs: &[I]) -> std::result::Result<ArtifactSet, GeneratorError> {
    Pipeline {
        generators,
        collision_policy: CollisionPolicy::default(),
        cancel: None,
    }
    .run(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    impl OneToOne<String> for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn generate(&self, input: &String) -> Result<Option<Artifact>> {
            Ok(Some(Artifact::new(format!("{}.txt", input), input.as_bytes().to_vec())))
        }
    }

    struct Join;

    impl ManyToOne<String> for Join {
        fn name(&self) -> &str {
            "join"
        }

        fn generate(&self, inputs: &[&String]) -> Result<Option<Artifact>> {
            let joined: Vec<&str> = inputs.iter().map(|s| s.as_str()).collect();
            Ok(Some(Artifact::new("all.txt", joined.join(",").into_bytes())))
        }
    }

    fn inputs() -> Vec<String> {
        vec!["a".into(), "bb".into(), "ccc".into()]
    }

    #[test]
    fn test_one_to_one_stamps_provenance() {
        let set = run(vec![Generator::one_to_one(Echo("echo"))], &inputs()).unwrap();
        assert_eq!(set.len(), 3);
        let a = set.get("a.txt").unwrap();
        assert_eq!(a.data, b"a");
        assert_eq!(a.generators, vec!["echo"]);
    }

    #[test]
    fn test_filter_preserves_name_and_shape() {
        let filtered = filter(Generator::one_to_one(Echo("echo")), |s: &String| s.len() > 1);
        assert_eq!(filtered.name(), "echo");
        assert_eq!(filtered.shape(), Shape::OneToOne);

        let set = run(vec![filtered], &inputs()).unwrap();
        assert!(set.get("a.txt").is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_filter_many_to_one() {
        let filtered = filter(Generator::many_to_one(Join), |s: &String| s != "bb");
        assert_eq!(filtered.shape(), Shape::ManyToOne);
        let set = run(vec![filtered], &inputs()).unwrap();
        assert_eq!(set.get("all.txt").unwrap().data, b"a,ccc");
    }

    #[test]
    fn test_identical_content_merges_provenance() {
        let set = run(
            vec![Generator::one_to_one(Echo("first")), Generator::one_to_one(Echo("second"))],
            &inputs(),
        )
        .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get("bb.txt").unwrap().generators, vec!["first", "second"]);
        assert!(set.collisions().is_empty());
    }

    #[test]
    fn test_collision_policies() {
        struct Clash;
        impl ManyToOne<String> for Clash {
            fn name(&self) -> &str {
                "clash"
            }
            fn generate(&self, _: &[&String]) -> Result<Option<Artifact>> {
                Ok(Some(Artifact::new("a.txt", b"different".to_vec())))
            }
        }

        let err = run(
            vec![Generator::one_to_one(Echo("echo")), Generator::many_to_one(Clash)],
            &inputs(),
        )
        .unwrap_err();
        match err {
            GeneratorError::PathCollision { path, generators } => {
                assert_eq!(path, "a.txt");
                assert_eq!(generators, vec!["echo", "clash"]);
            }
            other => panic!("Expected PathCollision, got {:?}", other),
        }

        let set = Pipeline::new()
            .with(Generator::one_to_one(Echo("echo")))
            .with(Generator::many_to_one(Clash))
            .with_collision_policy(CollisionPolicy::Warn)
            .run(&inputs())
            .unwrap();
        assert_eq!(set.get("a.txt").unwrap().data, b"a");
        assert_eq!(set.collisions().len(), 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = Pipeline::new()
            .with(Generator::one_to_one(Echo("echo")))
            .with_cancel(cancel)
            .run(&inputs())
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Cancelled { .. }));
    }

    #[test]
    fn test_encoding() {
        let value = serde_json::json!({ "kind": "Issue" });
        assert_eq!(Encoding::Json.encode(&value).unwrap(), b"{\n  \"kind\": \"Issue\"\n}\n");
        assert_eq!(Encoding::Yaml.encode(&value).unwrap(), b"kind: Issue\n");
        assert_eq!("yml".parse::<Encoding>().unwrap(), Encoding::Yaml);
        assert!("toml".parse::<Encoding>().is_err());
    }
}
