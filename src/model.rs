use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Kind of cluster object a harvest works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Secret,
    ConfigMap,
    Deployment,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 3] = [
        ObjectKind::Secret,
        ObjectKind::ConfigMap,
        ObjectKind::Deployment,
    ];

    /// Resource name used by the listing command (`kubectl get <resource>`).
    pub fn resource(&self) -> &'static str {
        match self {
            ObjectKind::Secret => "secrets",
            ObjectKind::ConfigMap => "configmaps",
            ObjectKind::Deployment => "deployments",
        }
    }

    /// Suffix of the manifest file name: `<name>-<suffix>.yaml`.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            ObjectKind::Secret => "secret",
            ObjectKind::ConfigMap => "configmap",
            ObjectKind::Deployment => "deployment",
        }
    }

    /// Value of the `kind` field in a manifest of this kind.
    pub fn manifest_kind(&self) -> &'static str {
        match self {
            ObjectKind::Secret => "Secret",
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::Deployment => "Deployment",
        }
    }

    pub fn from_manifest_kind(kind: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.manifest_kind() == kind)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

#[derive(Error, Debug)]
#[error("Unknown object kind '{0}', expected one of: secrets, configmaps, deployments")]
pub struct UnknownKind(pub String);

impl FromStr for ObjectKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secret" | "secrets" => Ok(ObjectKind::Secret),
            "configmap" | "configmaps" | "cm" => Ok(ObjectKind::ConfigMap),
            "deployment" | "deployments" | "deploy" => Ok(ObjectKind::Deployment),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// Object identifier exactly as printed by a name-only listing,
/// e.g. `secret/db-creds`. Used verbatim as the fetch key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectName(String);

impl ObjectName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits name-only listing output into one token per line.
    ///
    /// Surrounding whitespace of the whole output is dropped; inner lines are
    /// kept as-is so blank entries still reach the exclusion filter.
    pub fn parse_listing(output: &str) -> Vec<ObjectName> {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        trimmed.split('\n').map(ObjectName::new).collect()
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unparsed single-object manifest as returned by the cluster tool.
///
/// Still carries every cluster-assigned field; it lives only until the
/// sanitizer has projected it.
#[derive(Debug, Clone)]
pub struct RawManifest {
    pub name: ObjectName,
    pub body: String,
}

impl RawManifest {
    pub fn new(name: ObjectName, body: impl Into<String>) -> Self {
        Self {
            name,
            body: body.into(),
        }
    }
}

/// Minimal re-appliable manifest.
///
/// Fields are declared in alphabetical order so the serialized document keeps
/// a stable key order: apiVersion, binaryData, data, kind, metadata, spec,
/// stringData, type. Absent payload fields are not written at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedManifest {
    pub api_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    pub kind: String,

    pub metadata: ObjectMetadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_data: Option<Value>,

    /// Secret type (`Opaque`, `kubernetes.io/tls`, ...). Secret-only.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

impl SanitizedManifest {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn object_kind(&self) -> Option<ObjectKind> {
        ObjectKind::from_manifest_kind(&self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub name: String,
}

/// Explicit target of a list/fetch/apply call.
///
/// Passed to every tool operation instead of relying on whatever namespace the
/// tool currently has active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// Kubeconfig context; `None` uses the tool's current context.
    pub context: Option<String>,
    pub namespace: String,
}

impl Scope {
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            context: None,
            namespace: namespace.into(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A cluster the tool can be pointed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTarget {
    pub name: String,
    /// Kubeconfig context selected with `config use-context` when no login
    /// command is configured.
    pub context: Option<String>,
    /// Login command (program followed by its arguments).
    pub login: Vec<String>,
}

/// Inputs of one harvest. Read-only while the harvest runs.
#[derive(Debug, Clone)]
pub struct HarvestContext {
    pub scope: Scope,
    pub output_dir: PathBuf,
    pub kind: ObjectKind,
}

impl HarvestContext {
    pub fn new(scope: Scope, kind: ObjectKind, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            scope,
            output_dir: output_dir.into(),
            kind,
        }
    }

    /// `<root>/<namespace>-<resource>`, e.g. `~/lion-secrets`.
    pub fn default_output_dir(root: &Path, namespace: &str, kind: ObjectKind) -> PathBuf {
        root.join(format!("{}-{}", namespace, kind.resource()))
    }
}
