use crate::model::{ClusterTarget, ObjectKind, ObjectName, RawManifest, Scope};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Failed to switch to namespace '{namespace}': {message}")]
    Namespace { namespace: String, message: String },
    #[error("Failed to switch to cluster '{cluster}': {message}")]
    Cluster { cluster: String, message: String },
    #[error("Unknown cluster '{0}'")]
    UnknownCluster(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ListError {
    #[error("There is no {resource} object in namespace '{namespace}'")]
    Empty { resource: String, namespace: String },
    #[error("Listing {resource} in namespace '{namespace}' failed: {message}")]
    CommandFailed {
        resource: String,
        namespace: String,
        message: String,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ListError {
    pub fn empty(kind: ObjectKind, scope: &Scope) -> Self {
        ListError::Empty {
            resource: kind.resource().to_string(),
            namespace: scope.namespace.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Fetching '{name}' failed: {message}")]
    CommandFailed { name: String, message: String },
    #[error("Fetching '{name}' returned output that is not UTF-8")]
    InvalidOutput { name: String },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Applying manifests from '{}' failed: {message}", dir.display())]
    CommandFailed { dir: PathBuf, message: String },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Blocking calls into the cluster control-plane tool.
///
/// Every object-level call takes an explicit [`Scope`]; implementations must
/// not depend on namespace state left behind by an earlier call.
#[async_trait]
pub trait ClusterTool: Send + Sync {
    /// Returns the identifier of the tool (e.g. "kubectl").
    fn tool_id(&self) -> &str;

    /// Points the tool at another cluster.
    async fn switch_cluster(&self, cluster: &ClusterTarget) -> Result<(), ContextError>;

    /// Makes the namespace of `scope` usable for the calls that follow.
    /// A failure here invalidates the whole harvest.
    async fn switch_namespace(&self, scope: &Scope) -> Result<(), ContextError>;

    /// Lists object names of `kind`. An empty listing is an error.
    async fn list_objects(
        &self,
        scope: &Scope,
        kind: ObjectKind,
    ) -> Result<Vec<ObjectName>, ListError>;

    /// Fetches the full manifest of one object.
    async fn fetch_manifest(
        &self,
        scope: &Scope,
        name: &ObjectName,
    ) -> Result<RawManifest, FetchError>;

    /// Applies every manifest file found in `dir`.
    async fn apply_dir(&self, scope: &Scope, dir: &Path) -> Result<(), ApplyError>;
}
