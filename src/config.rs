//! Configuration management for the kind code generator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (kindgen.toml)
//! - Environment variables (KINDGEN__*)
//!
//! ## Example config file (kindgen.toml):
//! ```toml
//! [output]
//! dir = "./generated"
//! encoding = "yaml"
//! path_prefix = "deploy"
//! write_checksums = true
//!
//! [manifest]
//! api_version = "apps.kindgen.dev/v1alpha1"
//!
//! [pipeline]
//! collision_policy = "warn"
//!
//! [[conversion.preferred]]
//! kind = "Issue"
//! version = "v1"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::codegen::manifest::DEFAULT_MANIFEST_API_VERSION;
use crate::codegen::{CollisionPolicy, Encoding};

/// Main configuration for code generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodegenConfig {
    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// App manifest document settings
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Pipeline behavior
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Hub overrides
    #[serde(default)]
    pub conversion: ConversionConfig,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory generated files are written under
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Document encoding
    #[serde(default)]
    pub encoding: Encoding,

    /// Extra path segment between the output dir and every artifact
    #[serde(default)]
    pub path_prefix: String,

    /// Write checksums.sha256 next to the artifacts
    #[serde(default = "default_true")]
    pub write_checksums: bool,
}

/// Manifest document configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// apiVersion stamped on emitted AppManifest documents
    #[serde(default = "default_manifest_api_version")]
    pub api_version: String,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// What to do when generators disagree on one path
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
}

/// Conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConversionConfig {
    /// Hub version overrides
    #[serde(default)]
    pub preferred: Vec<PreferredVersion>,
}

/// Hub version for one kind. Kept as a list entry so kind names keep their case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredVersion {
    pub kind: String,
    pub version: String,
}

impl ConversionConfig {
    /// Overrides keyed by kind name; later entries win
    pub fn preferred_map(&self) -> HashMap<String, String> {
        self.preferred
            .iter()
            .map(|p| (p.kind.clone(), p.version.clone()))
            .collect()
    }
}

// Default value functions
fn default_output_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_true() -> bool {
    true
}

fn default_manifest_api_version() -> String {
    DEFAULT_MANIFEST_API_VERSION.to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            encoding: Encoding::default(),
            path_prefix: String::new(),
            write_checksums: true,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            api_version: default_manifest_api_version(),
        }
    }
}

impl CodegenConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["kindgen.toml", ".kindgen.toml", "config/kindgen.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(dirs) = directories::ProjectDirs::from("dev", "kindgen", "kindgen") {
            let xdg_config = dirs.config_dir().join("kindgen.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // KINDGEN__OUTPUT__ENCODING=yaml and friends
        builder = builder.add_source(
            Environment::with_prefix("KINDGEN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Output directory, resolved against the working directory
    pub fn output_dir(&self) -> PathBuf {
        if self.output.dir.is_absolute() {
            self.output.dir.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.output.dir)
        }
    }
}
