//! Kubernetes-style version names
//!
//! Kind versions are named `v<major>`, `v<major>beta<minor>` or
//! `v<major>alpha<minor>`. The platform orders them GA first, then beta, then
//! alpha, higher numbers first within each level. Names that do not follow
//! the convention sort after all well-formed names, lexically.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^v([1-9][0-9]*)(?:(alpha|beta)([1-9][0-9]*))?$").unwrap())
}

/// Stability level of a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
    Alpha,
    Beta,
    Stable,
}

/// A parsed version name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KubeVersion {
    pub major: u32,
    pub stability: Stability,
    /// Pre-release number (0 for stable versions)
    pub minor: u32,
}

impl KubeVersion {
    /// Parse a version name such as `v1beta2`
    pub fn parse(name: &str) -> Option<Self> {
        let caps = version_pattern().captures(name)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let (stability, minor) = match caps.get(2).map(|m| m.as_str()) {
            Some("alpha") => (Stability::Alpha, caps.get(3)?.as_str().parse().ok()?),
            Some("beta") => (Stability::Beta, caps.get(3)?.as_str().parse().ok()?),
            _ => (Stability::Stable, 0),
        };
        Some(Self { major, stability, minor })
    }
}

impl fmt::Display for KubeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stability {
            Stability::Stable => write!(f, "v{}", self.major),
            Stability::Beta => write!(f, "v{}beta{}", self.major, self.minor),
            Stability::Alpha => write!(f, "v{}alpha{}", self.major, self.minor),
        }
    }
}

impl PartialOrd for KubeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Greater means higher priority.
impl Ord for KubeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stability
            .cmp(&other.stability)
            .then(self.major.cmp(&other.major))
            .then(self.minor.cmp(&other.minor))
    }
}

/// Compare two version names by platform priority, highest first.
pub fn priority_cmp(a: &str, b: &str) -> Ordering {
    match (KubeVersion::parse(a), KubeVersion::parse(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// The name with the highest platform priority
pub fn highest_priority<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    names.into_iter().min_by(|a, b| priority_cmp(a, b))
}
