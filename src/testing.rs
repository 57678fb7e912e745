//! In-memory [`ClusterTool`] used by the pipeline and migration tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::model::{
    ClusterTarget, ObjectKind, ObjectName, RawManifest, SanitizedManifest, Scope,
};
use crate::traits::{ApplyError, ClusterTool, ContextError, FetchError, ListError};

pub(crate) fn secret_body(name: &str, namespace: &str) -> String {
    format!(
        r#"apiVersion: v1
data:
  password: cGFzcw==
kind: Secret
metadata:
  creationTimestamp: "2023-04-01T10:00:00Z"
  name: {name}
  namespace: {namespace}
  resourceVersion: "4242"
  uid: 0c7d8f4e-1111-2222-3333-444455556666
type: Opaque
"#
    )
}

pub(crate) fn config_map_body(name: &str, namespace: &str) -> String {
    format!(
        r#"apiVersion: v1
data:
  LOG_LEVEL: info
kind: ConfigMap
metadata:
  name: {name}
  namespace: {namespace}
  resourceVersion: "17"
"#
    )
}

#[derive(Default)]
pub(crate) struct MockTool {
    objects: Mutex<HashMap<String, Vec<(ObjectName, String)>>>,
    clusters: HashSet<String>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub active_cluster: Mutex<Option<String>>,
    pub applied: Mutex<Vec<(Scope, PathBuf)>>,
    pub fetch_calls: AtomicUsize,
    pub finished_fetches: AtomicUsize,
}

impl MockTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(self, namespace: &str) -> Self {
        self.objects
            .lock()
            .unwrap()
            .entry(namespace.to_string())
            .or_default();
        self
    }

    pub fn with_object(self, namespace: &str, name: &str, body: String) -> Self {
        self.objects
            .lock()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .push((ObjectName::new(name), body));
        self
    }

    pub fn with_cluster(mut self, cluster: &str) -> Self {
        self.clusters.insert(cluster.to_string());
        self
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn slow(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn names_in(&self, namespace: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .get(namespace)
            .map(|objects| objects.iter().map(|(n, _)| n.to_string()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ClusterTool for MockTool {
    fn tool_id(&self) -> &str {
        "mock"
    }

    async fn switch_cluster(&self, cluster: &ClusterTarget) -> Result<(), ContextError> {
        if !self.clusters.contains(&cluster.name) {
            return Err(ContextError::Cluster {
                cluster: cluster.name.clone(),
                message: "login failed".to_string(),
            });
        }
        *self.active_cluster.lock().unwrap() = Some(cluster.name.clone());
        Ok(())
    }

    async fn switch_namespace(&self, scope: &Scope) -> Result<(), ContextError> {
        if self.objects.lock().unwrap().contains_key(&scope.namespace) {
            Ok(())
        } else {
            Err(ContextError::Namespace {
                namespace: scope.namespace.clone(),
                message: "not found".to_string(),
            })
        }
    }

    async fn list_objects(
        &self,
        scope: &Scope,
        kind: ObjectKind,
    ) -> Result<Vec<ObjectName>, ListError> {
        let prefix = format!("{}/", kind.file_suffix());
        let names: Vec<ObjectName> = self
            .objects
            .lock()
            .unwrap()
            .get(&scope.namespace)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(n, _)| n.as_str().starts_with(&prefix))
                    .map(|(n, _)| n.clone())
                    .collect()
            })
            .unwrap_or_default();

        if names.is_empty() {
            return Err(ListError::empty(kind, scope));
        }
        Ok(names)
    }

    async fn fetch_manifest(
        &self,
        scope: &Scope,
        name: &ObjectName,
    ) -> Result<RawManifest, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(name.as_str()) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(name.as_str()) {
            return Err(FetchError::CommandFailed {
                name: name.to_string(),
                message: "exit status: 1".to_string(),
            });
        }

        let body = self
            .objects
            .lock()
            .unwrap()
            .get(&scope.namespace)
            .and_then(|objects| objects.iter().find(|(n, _)| n == name))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| FetchError::CommandFailed {
                name: name.to_string(),
                message: "NotFound".to_string(),
            })?;

        self.finished_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(RawManifest::new(name.clone(), body))
    }

    async fn apply_dir(&self, scope: &Scope, dir: &Path) -> Result<(), ApplyError> {
        let mut applied = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let text = std::fs::read_to_string(entry?.path())?;
            let manifest: SanitizedManifest =
                serde_yaml::from_str(&text).map_err(|e| ApplyError::CommandFailed {
                    dir: dir.to_path_buf(),
                    message: e.to_string(),
                })?;
            let suffix = manifest
                .object_kind()
                .map(|k| k.file_suffix())
                .unwrap_or("unknown");
            applied.push((
                ObjectName::new(format!("{}/{}", suffix, manifest.name())),
                text,
            ));
        }

        self.objects
            .lock()
            .unwrap()
            .entry(scope.namespace.clone())
            .or_default()
            .extend(applied);
        self.applied
            .lock()
            .unwrap()
            .push((scope.clone(), dir.to_path_buf()));
        Ok(())
    }
}
