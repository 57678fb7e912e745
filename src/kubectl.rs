//! [`ClusterTool`] backed by the `kubectl` command line.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::model::{ClusterTarget, ObjectKind, ObjectName, RawManifest, Scope};
use crate::traits::{ApplyError, ClusterTool, ContextError, FetchError, ListError};

/// What `switch_namespace` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamespaceMode {
    /// Check that the namespace exists; nothing is mutated.
    #[default]
    Verify,
    /// `kubectl config set-context --current --namespace <ns>`. Mutates the
    /// shared kubeconfig.
    Activate,
}

/// How a listing that exits non-zero is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListFailurePolicy {
    /// Non-zero exit is a [`ListError`] even if names were printed.
    #[default]
    Strict,
    /// Exit status is ignored; only empty output is an error.
    Lenient,
}

#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: PathBuf,
    base_args: Vec<String>,
    namespace_mode: NamespaceMode,
    list_failure: ListFailurePolicy,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl Kubectl {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            base_args: Vec::new(),
            namespace_mode: NamespaceMode::default(),
            list_failure: ListFailurePolicy::default(),
        }
    }

    /// Arguments placed before every subcommand (e.g. `--kubeconfig <path>`).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_namespace_mode(mut self, mode: NamespaceMode) -> Self {
        self.namespace_mode = mode;
        self
    }

    pub fn with_list_failure(mut self, policy: ListFailurePolicy) -> Self {
        self.list_failure = policy;
        self
    }

    async fn run(&self, args: &[String]) -> std::io::Result<Output> {
        debug!(binary = %self.binary.display(), args = ?args, "Running command");
        Command::new(&self.binary)
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }
}

/// `args` followed by the scope flags.
fn scoped(scope: &Scope, args: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    out.push("--namespace".to_string());
    out.push(scope.namespace.clone());
    if let Some(context) = &scope.context {
        out.push("--context".to_string());
        out.push(context.clone());
    }
    out
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        output.status.to_string()
    } else {
        format!("{}: {}", output.status, stderr)
    }
}

#[async_trait]
impl ClusterTool for Kubectl {
    fn tool_id(&self) -> &str {
        "kubectl"
    }

    async fn switch_cluster(&self, cluster: &ClusterTarget) -> Result<(), ContextError> {
        info!(cluster = %cluster.name, "Switching cluster");

        let output = match (cluster.login.split_first(), &cluster.context) {
            (Some((program, args)), _) => {
                Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .kill_on_drop(true)
                    .output()
                    .await?
            }
            (None, Some(context)) => {
                self.run(&[
                    "config".to_string(),
                    "use-context".to_string(),
                    context.clone(),
                ])
                .await?
            }
            (None, None) => {
                return Err(ContextError::Cluster {
                    cluster: cluster.name.clone(),
                    message: "neither a login command nor a context is configured".to_string(),
                })
            }
        };

        if !output.status.success() {
            return Err(ContextError::Cluster {
                cluster: cluster.name.clone(),
                message: failure_message(&output),
            });
        }
        Ok(())
    }

    async fn switch_namespace(&self, scope: &Scope) -> Result<(), ContextError> {
        let args = match self.namespace_mode {
            NamespaceMode::Verify => {
                let mut args = vec![
                    "get".to_string(),
                    "namespace".to_string(),
                    scope.namespace.clone(),
                    "-o".to_string(),
                    "name".to_string(),
                ];
                if let Some(context) = &scope.context {
                    args.push("--context".to_string());
                    args.push(context.clone());
                }
                args
            }
            NamespaceMode::Activate => {
                let mut args = vec!["config".to_string(), "set-context".to_string()];
                match &scope.context {
                    Some(context) => args.push(context.clone()),
                    None => args.push("--current".to_string()),
                }
                args.push("--namespace".to_string());
                args.push(scope.namespace.clone());
                args
            }
        };

        let output = self.run(&args).await?;
        if !output.status.success() {
            return Err(ContextError::Namespace {
                namespace: scope.namespace.clone(),
                message: failure_message(&output),
            });
        }
        Ok(())
    }

    async fn list_objects(
        &self,
        scope: &Scope,
        kind: ObjectKind,
    ) -> Result<Vec<ObjectName>, ListError> {
        let output = self
            .run(&scoped(scope, &["get", kind.resource(), "-o", "name"]))
            .await?;

        if !output.status.success() {
            match self.list_failure {
                ListFailurePolicy::Strict => {
                    return Err(ListError::CommandFailed {
                        resource: kind.resource().to_string(),
                        namespace: scope.namespace.clone(),
                        message: failure_message(&output),
                    })
                }
                ListFailurePolicy::Lenient => {
                    warn!(
                        resource = kind.resource(),
                        error = %failure_message(&output),
                        "Listing exited with an error, using its output anyway"
                    );
                }
            }
        }

        let names = ObjectName::parse_listing(&String::from_utf8_lossy(&output.stdout));
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
        let output = self
            .run(&scoped(scope, &["get", name.as_str(), "-o", "yaml"]))
            .await?;

        if !output.status.success() {
            return Err(FetchError::CommandFailed {
                name: name.to_string(),
                message: failure_message(&output),
            });
        }

        let body = String::from_utf8(output.stdout).map_err(|_| FetchError::InvalidOutput {
            name: name.to_string(),
        })?;
        Ok(RawManifest::new(name.clone(), body))
    }

    async fn apply_dir(&self, scope: &Scope, dir: &Path) -> Result<(), ApplyError> {
        let dir_arg = dir.to_string_lossy();
        info!(dir = %dir.display(), namespace = %scope.namespace, "Applying manifests");

        let output = self
            .run(&scoped(scope, &["apply", "-f", dir_arg.as_ref()]))
            .await?;
        if !output.status.success() {
            return Err(ApplyError::CommandFailed {
                dir: dir.to_path_buf(),
                message: failure_message(&output),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(output = %stdout.trim(), "Applied");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const FAKE_KUBECTL: &str = r#"
echo "$*" >> "$(dirname "$0")/calls.log"
case "$*" in
  "get namespace lion -o name"*) echo "namespace/lion" ;;
  "get namespace"*) echo 'Error from server (NotFound): namespaces "ghost" not found' >&2; exit 1 ;;
  "config set-context"*) echo "Context modified." ;;
  "config use-context prod"*) echo "Switched." ;;
  "get secrets -o name --namespace lion"*) printf 'secret/default-token-abc\nsecret/db-creds\n' ;;
  "get secrets -o name --namespace empty"*) ;;
  "get configmaps -o name"*) printf 'configmap/app\n'; echo "partial failure" >&2; exit 1 ;;
  "get secret/db-creds -o yaml"*)
    cat <<'EOF'
apiVersion: v1
data:
  password: cGFzcw==
kind: Secret
metadata:
  name: db-creds
  namespace: lion
type: Opaque
EOF
    ;;
  "apply -f"*) echo "secret/db-creds configured" ;;
  *) echo "unexpected: $*" >&2; exit 1 ;;
esac
"#;

    struct Fake {
        dir: tempfile::TempDir,
        kubectl: Kubectl,
    }

    impl Fake {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("kubectl.sh");
            std::fs::write(&script, FAKE_KUBECTL).unwrap();
            let kubectl = Kubectl::new("sh").with_args([script.to_string_lossy().to_string()]);
            Self { dir, kubectl }
        }

        fn calls(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_verify_namespace() {
        let fake = Fake::new();
        fake.kubectl
            .switch_namespace(&Scope::namespace("lion"))
            .await
            .unwrap();

        let err = fake
            .kubectl
            .switch_namespace(&Scope::namespace("ghost"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NotFound"));
    }

    #[tokio::test]
    async fn test_activate_namespace() {
        let fake = Fake::new();
        let kubectl = fake.kubectl.clone().with_namespace_mode(NamespaceMode::Activate);

        kubectl
            .switch_namespace(&Scope::namespace("lion"))
            .await
            .unwrap();
        assert_eq!(
            fake.calls(),
            vec!["config set-context --current --namespace lion".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_objects() {
        let fake = Fake::new();
        let names = fake
            .kubectl
            .list_objects(&Scope::namespace("lion"), ObjectKind::Secret)
            .await
            .unwrap();
        assert_eq!(
            names,
            vec![
                ObjectName::new("secret/default-token-abc"),
                ObjectName::new("secret/db-creds")
            ]
        );

        let err = fake
            .kubectl
            .list_objects(&Scope::namespace("empty"), ObjectKind::Secret)
            .await
            .unwrap_err();
        assert!(matches!(err, ListError::Empty { .. }));
    }

    #[tokio::test]
    async fn test_list_failure_policy() {
        let fake = Fake::new();
        let scope = Scope::namespace("lion");

        let err = fake
            .kubectl
            .list_objects(&scope, ObjectKind::ConfigMap)
            .await
            .unwrap_err();
        match err {
            ListError::CommandFailed { message, .. } => assert!(message.contains("partial failure")),
            other => panic!("unexpected error: {}", other),
        }

        let names = fake
            .kubectl
            .clone()
            .with_list_failure(ListFailurePolicy::Lenient)
            .list_objects(&scope, ObjectKind::ConfigMap)
            .await
            .unwrap();
        assert_eq!(names, vec![ObjectName::new("configmap/app")]);
    }

    #[tokio::test]
    async fn test_fetch_manifest() {
        let fake = Fake::new();
        let scope = Scope::namespace("lion").with_context("prod");

        let raw = fake
            .kubectl
            .fetch_manifest(&scope, &ObjectName::new("secret/db-creds"))
            .await
            .unwrap();
        assert!(raw.body.contains("name: db-creds"));
        assert_eq!(
            fake.calls(),
            vec!["get secret/db-creds -o yaml --namespace lion --context prod".to_string()]
        );

        let err = fake
            .kubectl
            .fetch_manifest(&scope, &ObjectName::new("secret/missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_switch_cluster() {
        let fake = Fake::new();

        let by_context = ClusterTarget {
            name: "eks-prod".to_string(),
            context: Some("prod".to_string()),
            login: Vec::new(),
        };
        fake.kubectl.switch_cluster(&by_context).await.unwrap();

        let by_login = ClusterTarget {
            name: "kops-stage".to_string(),
            context: None,
            login: vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
        };
        let err = fake.kubectl.switch_cluster(&by_login).await.unwrap_err();
        assert!(matches!(err, ContextError::Cluster { .. }));

        let unconfigured = ClusterTarget {
            name: "nowhere".to_string(),
            context: None,
            login: Vec::new(),
        };
        assert!(fake.kubectl.switch_cluster(&unconfigured).await.is_err());
    }

    #[tokio::test]
    async fn test_apply_dir() {
        let fake = Fake::new();
        fake.kubectl
            .apply_dir(&Scope::namespace("tiger"), Path::new("/tmp/lion-secrets"))
            .await
            .unwrap();
        assert_eq!(
            fake.calls(),
            vec!["apply -f /tmp/lion-secrets --namespace tiger".to_string()]
        );
    }
}
