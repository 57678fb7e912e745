//! Harvester configuration file.
//!
//! ```yaml
//! kubectl:
//!   binary: /usr/local/bin/kubectl
//!   args: ["--kubeconfig", "/home/neo/.kube/config"]
//! concurrency: 8
//! fetch_timeout_secs: 300
//! namespace_mode: verify
//! list_failure: strict
//! exclusions: ["sh.helm.release"]
//! clusters:
//!   kops-prod:
//!     login: ["login_prod"]
//!   eks-stage:
//!     context: arn:aws:eks:us-east-1:123456789012:cluster/stage
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::harvest::filter::ExclusionPolicy;
use crate::harvest::pipeline::{HarvestPipeline, DEFAULT_CONCURRENCY, DEFAULT_UNIT_TIMEOUT};
use crate::kubectl::{Kubectl, ListFailurePolicy, NamespaceMode};
use crate::model::ClusterTarget;
use crate::traits::{ClusterTool, ContextError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    pub kubectl: KubectlConfig,
    pub concurrency: usize,
    /// Per-object timeout in seconds; 0 disables it.
    pub fetch_timeout_secs: u64,
    pub namespace_mode: NamespaceMode,
    pub list_failure: ListFailurePolicy,
    /// Name fragments excluded on top of the built-in blocklist.
    pub exclusions: Vec<String>,
    /// Parent of default output directories. Falls back to `$HOME`.
    pub output_root: Option<PathBuf>,
    pub clusters: BTreeMap<String, ClusterConfig>,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            kubectl: KubectlConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout_secs: DEFAULT_UNIT_TIMEOUT.as_secs(),
            namespace_mode: NamespaceMode::default(),
            list_failure: ListFailurePolicy::default(),
            exclusions: Vec::new(),
            output_root: None,
            clusters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubectlConfig {
    pub binary: PathBuf,
    pub args: Vec<String>,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("kubectl"),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub context: Option<String>,
    pub login: Vec<String>,
}

impl HarvesterConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        // An empty file is a valid, all-default config.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        for (name, cluster) in &self.clusters {
            if cluster.login.is_empty() && cluster.context.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "cluster '{}' needs a login command or a context",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        match self.fetch_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn exclusion_policy(&self) -> ExclusionPolicy {
        ExclusionPolicy::new().with_patterns(self.exclusions.iter().cloned())
    }

    pub fn cluster(&self, name: &str) -> Result<ClusterTarget, ContextError> {
        self.clusters
            .get(name)
            .map(|cluster| ClusterTarget {
                name: name.to_string(),
                context: cluster.context.clone(),
                login: cluster.login.clone(),
            })
            .ok_or_else(|| ContextError::UnknownCluster(name.to_string()))
    }

    pub fn kubectl(&self) -> Kubectl {
        Kubectl::new(&self.kubectl.binary)
            .with_args(self.kubectl.args.iter().cloned())
            .with_namespace_mode(self.namespace_mode)
            .with_list_failure(self.list_failure)
    }

    pub fn pipeline<T>(&self, tool: Arc<T>) -> HarvestPipeline<T>
    where
        T: ClusterTool + 'static,
    {
        HarvestPipeline::new(tool)
            .with_concurrency(self.concurrency)
            .with_timeout(self.fetch_timeout())
            .with_exclusions(self.exclusion_policy())
    }
}
