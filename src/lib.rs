//! Kind Schemas
//!
//! A multi-version schema compiler and hub-conversion engine for platform
//! resource kinds.
//!
//! ## Features
//!
//! - **Open-Schema Synthesis**: Schema trees become validation schemas; open maps
//!   are rewritten to `x-kubernetes-preserve-unknown-fields`
//! - **Hub Conversion**: One hub version per kind, two-hop routes between any pair
//! - **Derivation Cache**: Per-app memoization with build-once guarantees
//! - **Generator Pipeline**: Named generators, all-or-nothing commits, SHA256 provenance
//!
//! ## Architecture
//!
//! ```text
//! SchemaTree ──> synthesize ──> ValidationSchema ──┐
//!      │              ▲                             ├──> Pipeline ──> ArtifactWriter
//!      │        ManifestCache                       │
//!      └──> wire_versions ──> VersionGraph ─────────┘
//!                                  │
//!                                  └──> ConversionRegistry (runtime)
//! ```

pub mod cache;
pub mod checksum;
pub mod codegen;
pub mod config;
pub mod conversion;
pub mod error;
pub mod kind;
pub mod schema;
pub mod version;

pub use cache::{CacheStats, ManifestCache, ManifestView};
pub use checksum::Checksum;
pub use codegen::{filter, Artifact, ArtifactSet, CollisionPolicy, Encoding, Generator, Pipeline};
pub use config::CodegenConfig;
pub use conversion::{wire_versions, ConversionRegistry, ConversionRoute, Direction, VersionGraph};
pub use error::{Error, Result};
pub use kind::{AppManifest, KindDefinition, KindVersion, Scope};
pub use schema::{synthesize, SchemaNode, SchemaTree, SynthesizedSchema, ValidationSchema};
pub use version::KubeVersion;
