//! Error types for the kind schema compiler

use thiserror::Error;

/// Result type for crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed, ambiguous or unresolvable schema.
///
/// Fatal to a single kind-version, never to its siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{kind}/{version}: schema has more than one root component: {}", roots.join(", "))]
    AmbiguousRootSchema {
        kind: String,
        version: String,
        roots: Vec<String>,
    },

    #[error("{kind}/{version}: schema has no root component")]
    SchemaNotFound { kind: String, version: String },

    #[error("Unresolved schema reference: {reference}")]
    UnresolvedReference { reference: String },

    #[error("Invalid schema at {path}: {reason}")]
    InvalidFormat { path: String, reason: String },

    #[error("Kind version not found: {kind}/{version}")]
    KindVersionNotFound { kind: String, version: String },

    #[error("{kind}/{version}: invalid selectable field {field}: {reason}")]
    InvalidSelectableField {
        kind: String,
        version: String,
        field: String,
        reason: String,
    },
}

/// Inconsistent version set for one kind. Fatal to that kind's wiring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionGraphError {
    #[error("{group}/{kind}: kind declares no versions")]
    NoVersions { group: String, kind: String },

    #[error("{group}/{kind}: version {version} declared more than once")]
    DuplicateVersion {
        group: String,
        kind: String,
        version: String,
    },

    #[error("{group}/{kind}: conversion flag differs between {first} ({first_enabled}) and {second} ({second_enabled})")]
    ConversionMismatch {
        group: String,
        kind: String,
        first: String,
        first_enabled: bool,
        second: String,
        second_enabled: bool,
    },

    #[error("{group}/{kind}: preferred version {version} is not declared")]
    PreferredVersionNotFound {
        group: String,
        kind: String,
        version: String,
    },
}

/// Manifest-level inconsistency. Never cached; the next access retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestBuildError {
    #[error("Manifest has an empty app name")]
    EmptyAppName,

    #[error("{app}: kind {kind} has an empty group")]
    EmptyGroup { app: String, kind: String },

    #[error("{app}: kind {kind} is in group {found}, manifest group is {expected}")]
    GroupMismatch {
        app: String,
        kind: String,
        expected: String,
        found: String,
    },

    #[error("{app}: no group declared and no kinds to derive one from")]
    NoGroup { app: String },
}

/// Failure inside a generator batch. Aborts the whole run.
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Generator {generator} failed: {source}")]
    Failed {
        generator: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Path {path} claimed by multiple generators: {}", generators.join(", "))]
    PathCollision {
        path: String,
        generators: Vec<String>,
    },

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Run cancelled before generator {generator}")]
    Cancelled { generator: String },
}

/// Request-time conversion failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Kind {group}/{kind} is not registered for conversion")]
    NotRegistered { group: String, kind: String },

    #[error("Kind {kind} has no version {version}")]
    UnknownVersion { kind: String, version: String },

    #[error("Object is missing {0}")]
    MissingTypeMeta(&'static str),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Converter error: {0}")]
    Converter(String),
}

/// Crate-level error
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    VersionGraph(#[from] VersionGraphError),

    #[error(transparent)]
    ManifestBuild(#[from] ManifestBuildError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
