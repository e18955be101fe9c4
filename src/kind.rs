//! Kind and manifest definitions
//!
//! These are handed to the compiler already parsed and validated. They are
//! serde-deserializable so tooling can load pre-parsed definitions from
//! JSON or YAML files.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ManifestBuildError;
use crate::schema::SchemaTree;

/// Whether a kind lives in a namespace or at cluster level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Scope {
    Cluster,
    #[default]
    Namespaced,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => write!(f, "Cluster"),
            Scope::Namespaced => write!(f, "Namespaced"),
        }
    }
}

/// Extra column shown when listing a kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterColumn {
    pub name: String,
    pub json_path: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

/// Which code generation targets a kind version participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenFlags {
    #[serde(default = "default_true")]
    pub backend: bool,
    #[serde(default = "default_true")]
    pub frontend: bool,
}

impl Default for CodegenFlags {
    fn default() -> Self {
        Self {
            backend: true,
            frontend: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Admission operation a capability applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdmissionOperation {
    #[serde(rename = "CREATE")]
    Create,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "CONNECT")]
    Connect,
    #[serde(rename = "*")]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AdmissionCapability {
    #[serde(default)]
    pub operations: Vec<AdmissionOperation>,
}

impl AdmissionCapability {
    fn covers(&self, op: AdmissionOperation) -> bool {
        self.operations
            .iter()
            .any(|o| *o == op || *o == AdmissionOperation::All)
    }
}

/// Admission hooks a kind version supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AdmissionCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<AdmissionCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<AdmissionCapability>,
}

impl AdmissionCapabilities {
    pub fn supports_validation(&self) -> bool {
        self.validation.is_some()
    }

    pub fn supports_mutation(&self) -> bool {
        self.mutation.is_some()
    }

    /// True if any capability handles CONNECT
    pub fn supports_connect(&self) -> bool {
        [&self.validation, &self.mutation]
            .into_iter()
            .flatten()
            .any(|c| c.covers(AdmissionOperation::Connect))
    }

    pub fn is_empty(&self) -> bool {
        self.validation.is_none() && self.mutation.is_none()
    }
}

/// One version of a kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindVersion {
    /// Version name (e.g., "v1beta1")
    pub name: String,
    /// Shape of the resource at this version
    #[serde(default)]
    pub schema: SchemaTree,
    /// Field paths exposed for server-side list filtering (e.g., ".spec.title")
    #[serde(default)]
    pub selectable_fields: Vec<String>,
    #[serde(default)]
    pub printer_columns: Vec<PrinterColumn>,
    #[serde(default)]
    pub codegen: CodegenFlags,
    #[serde(default)]
    pub admission: AdmissionCapabilities,
    /// Must agree across every version of the kind
    #[serde(default)]
    pub conversion: bool,
    #[serde(default = "default_true")]
    pub served: bool,
}

impl KindVersion {
    pub fn new(name: impl Into<String>, schema: SchemaTree) -> Self {
        Self {
            name: name.into(),
            schema,
            selectable_fields: Vec::new(),
            printer_columns: Vec::new(),
            codegen: CodegenFlags::default(),
            admission: AdmissionCapabilities::default(),
            conversion: false,
            served: true,
        }
    }

    pub fn with_conversion(mut self, enabled: bool) -> Self {
        self.conversion = enabled;
        self
    }
}

/// A resource kind with all of its declared versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindDefinition {
    pub group: String,
    pub kind: String,
    #[serde(default)]
    pub scope: Scope,
    /// Lowercase identifier used for file names; derived from `kind` if empty
    #[serde(default)]
    pub machine_name: String,
    /// Plural resource name; derived from `kind` if empty
    #[serde(default)]
    pub plural: String,
    /// Declaration order matters: the last version is the default hub
    pub versions: Vec<KindVersion>,
    /// Explicit hub version, overriding declaration order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_version: Option<String>,
}

impl KindDefinition {
    pub fn new(group: impl Into<String>, kind: impl Into<String>, versions: Vec<KindVersion>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            scope: Scope::default(),
            machine_name: String::new(),
            plural: String::new(),
            versions,
            preferred_version: None,
        }
    }

    pub fn machine_name(&self) -> String {
        if self.machine_name.is_empty() {
            self.kind.to_lowercase()
        } else {
            self.machine_name.clone()
        }
    }

    pub fn plural_name(&self) -> String {
        if self.plural.is_empty() {
            format!("{}s", self.kind.to_lowercase())
        } else {
            self.plural.clone()
        }
    }

    /// Name of the CRD for this kind (`<plural>.<group>`)
    pub fn crd_name(&self) -> String {
        format!("{}.{}", self.plural_name(), self.group)
    }

    pub fn version(&self, name: &str) -> Option<&KindVersion> {
        self.versions.iter().find(|v| v.name == name)
    }

    /// Conversion flag of the first version; callers needing consistency use the version graph
    pub fn conversion(&self) -> bool {
        self.versions.first().map(|v| v.conversion).unwrap_or(false)
    }
}

/// An app and the kinds it owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub app_name: String,
    /// Manifest group; derived from the first kind when empty
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub kinds: Vec<KindDefinition>,
}

impl AppManifest {
    pub fn new(app_name: impl Into<String>, group: impl Into<String>, kinds: Vec<KindDefinition>) -> Self {
        Self {
            app_name: app_name.into(),
            group: group.into(),
            kinds,
        }
    }

    /// Resolve the manifest group and check every kind agrees with it
    pub fn resolve_group(&self) -> Result<String, ManifestBuildError> {
        if self.app_name.is_empty() {
            return Err(ManifestBuildError::EmptyAppName);
        }

        let group = if !self.group.is_empty() {
            self.group.clone()
        } else {
            match self.kinds.first() {
                Some(first) if first.group.is_empty() => {
                    return Err(ManifestBuildError::EmptyGroup {
                        app: self.app_name.clone(),
                        kind: first.kind.clone(),
                    })
                }
                Some(first) => first.group.clone(),
                None => {
                    return Err(ManifestBuildError::NoGroup {
                        app: self.app_name.clone(),
                    })
                }
            }
        };

        for kind in &self.kinds {
            if kind.group.is_empty() {
                return Err(ManifestBuildError::EmptyGroup {
                    app: self.app_name.clone(),
                    kind: kind.kind.clone(),
                });
            }
            if kind.group != group {
                return Err(ManifestBuildError::GroupMismatch {
                    app: self.app_name.clone(),
                    kind: kind.kind.clone(),
                    expected: group,
                    found: kind.group.clone(),
                });
            }
        }

        Ok(group)
    }

    pub fn kind(&self, name: &str) -> Option<&KindDefinition> {
        self.kinds.iter().find(|k| k.kind == name)
    }

    /// A version of a kind, searching every definition of that kind
    pub fn kind_version(&self, kind: &str, version: &str) -> Option<&KindVersion> {
        self.kinds
            .iter()
            .filter(|k| k.kind == kind)
            .find_map(|k| k.version(version))
    }
}
