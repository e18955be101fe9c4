//! Artifact sinks
//!
//! A writer only ever receives a complete, successful [`ArtifactSet`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::ArtifactSet;
use crate::error::Result;

/// Name of the checksum listing written next to the artifacts
pub const CHECKSUMS_FILE: &str = "checksums.sha256";

/// Destination of a finished generation run
pub trait ArtifactWriter {
    fn write(&mut self, artifacts: &ArtifactSet) -> Result<()>;
}

/// Keeps artifacts in memory, keyed by path
#[derive(Debug, Default)]
pub struct MemoryWriter {
    pub files: BTreeMap<String, Vec<u8>>,
    /// Number of committed batches
    pub commits: usize,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactWriter for MemoryWriter {
    fn write(&mut self, artifacts: &ArtifactSet) -> Result<()> {
        for artifact in artifacts.iter() {
            self.files.insert(artifact.path.clone(), artifact.data.clone());
        }
        self.commits += 1;
        Ok(())
    }
}

/// Writes artifacts under a root directory
#[derive(Debug, Clone)]
pub struct FsWriter {
    root: PathBuf,
    prefix: String,
    write_checksums: bool,
}

impl FsWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: String::new(),
            write_checksums: false,
        }
    }

    /// Place every artifact under `prefix` inside the root
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    fn relative(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    /// Also write `checksums.sha256` listing every artifact
    pub fn with_checksums(mut self, enabled: bool) -> Self {
        self.write_checksums = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactWriter for FsWriter {
    fn write(&mut self, artifacts: &ArtifactSet) -> Result<()> {
        fs::create_dir_all(&self.root)?;

        for artifact in artifacts.iter() {
            let path = self.root.join(self.relative(&artifact.path));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &artifact.data)?;
            debug!(path = %path.display(), checksum = %artifact.checksum, "wrote artifact");
        }

        if self.write_checksums {
            let mut lines: Vec<String> = artifacts
                .iter()
                .map(|a| format!("{}  {}", a.checksum, self.relative(&a.path)))
                .collect();
            lines.sort();
            let mut content = lines.join("\n");
            content.push('\n');
            fs::write(self.root.join(CHECKSUMS_FILE), content)?;
        }

        info!(root = %self.root.display(), artifacts = artifacts.len(), "wrote artifacts");
        Ok(())
    }
}
