//! Kind selectors
//!
//! A selector is a comma-separated list of patterns. Each pattern is either
//! `Kind` or `group/Kind`; `*` matches any run of characters. An empty
//! selector or `*` selects everything.

use regex::Regex;

use crate::kind::{AppManifest, KindDefinition};

#[derive(Debug, Clone)]
struct Pattern {
    group: Option<Regex>,
    kind: Regex,
}

/// Parsed selector string
#[derive(Debug, Clone)]
pub struct KindSelector {
    source: String,
    patterns: Vec<Pattern>,
}

fn glob(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Regex::new(&format!("^{}$", escaped.join(".*")))
}

impl KindSelector {
    pub fn parse(selector: &str) -> Result<Self, regex::Error> {
        let mut patterns = Vec::new();
        for part in selector.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let pattern = match part.rsplit_once('/') {
                Some((group, kind)) => Pattern {
                    group: Some(glob(group)?),
                    kind: glob(kind)?,
                },
                None => Pattern {
                    group: None,
                    kind: glob(part)?,
                },
            };
            patterns.push(pattern);
        }
        Ok(Self {
            source: selector.to_string(),
            patterns,
        })
    }

    /// Selector matching every kind
    pub fn all() -> Self {
        Self {
            source: "*".to_string(),
            patterns: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, kind: &KindDefinition) -> bool {
        self.patterns.is_empty()
            || self.patterns.iter().any(|p| {
                p.kind.is_match(&kind.kind) && p.group.as_ref().map_or(true, |g| g.is_match(&kind.group))
            })
    }

    /// True if any kind of the manifest is selected; usable as a generator filter
    pub fn matches_manifest(&self, manifest: &AppManifest) -> bool {
        manifest.kinds.iter().any(|k| self.matches(k))
    }

    /// Copy of the manifest keeping only selected kinds
    pub fn select_manifest(&self, manifest: &AppManifest) -> AppManifest {
        AppManifest {
            app_name: manifest.app_name.clone(),
            group: manifest.group.clone(),
            kinds: manifest
                .kinds
                .iter()
                .filter(|k| self.matches(k))
                .cloned()
                .collect(),
        }
    }
}

impl Default for KindSelector {
    fn default() -> Self {
        Self::all()
    }
}

impl std::str::FromStr for KindSelector {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
