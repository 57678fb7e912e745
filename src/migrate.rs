//! Namespace-to-namespace (and cluster-to-cluster) migration.
//!
//! A migration harvests one kind from the source namespace into a work
//! directory, points the tool at the target, applies the directory there and
//! finally removes it. Nothing is rolled back: objects applied before a
//! failure stay applied.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::harvest::pipeline::{HarvestPipeline, HarvestResult, PipelineError};
use crate::model::{ClusterTarget, HarvestContext, ObjectKind, ObjectName, Scope};
use crate::traits::{ApplyError, ClusterTool, ContextError, ListError};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Harvest(#[from] PipelineError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    List(#[from] ListError),
    #[error(
        "Work directory '{}' is not empty; remove it or choose another one",
        path.display()
    )]
    WorkDirNotEmpty { path: PathBuf },
    #[error("Failed to inspect work directory '{}': {source}", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to remove work directory '{}': {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One side of a migration.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Cluster to switch to first; `None` keeps the current one.
    pub cluster: Option<ClusterTarget>,
    pub scope: Scope,
}

impl Endpoint {
    pub fn new(scope: Scope) -> Self {
        Self {
            cluster: None,
            scope,
        }
    }

    pub fn on_cluster(mut self, cluster: ClusterTarget) -> Self {
        self.cluster = Some(cluster);
        self
    }
}

#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub kind: ObjectKind,
    pub source: Endpoint,
    pub target: Endpoint,
    /// Directory the harvested manifests are written to before applying.
    /// Must be absent or empty.
    pub work_dir: PathBuf,
    /// Keep `work_dir` after a successful apply.
    pub keep_manifests: bool,
}

#[derive(Debug, Serialize)]
pub struct MigrationReport {
    pub harvest: HarvestResult,
    /// `None` when the harvest produced no manifest and nothing was applied
    pub applied_dir: Option<PathBuf>,
    /// Objects of the migrated kind present in the target afterwards
    pub target_objects: Vec<ObjectName>,
    pub cleaned: bool,
}

/// Runs [`MigrationPlan`]s with a shared [`HarvestPipeline`], so the source
/// side uses exactly the same exclusion policy as a plain harvest.
pub struct Migration<T: ClusterTool> {
    pipeline: HarvestPipeline<T>,
}

impl<T> Migration<T>
where
    T: ClusterTool + 'static,
{
    pub fn new(pipeline: HarvestPipeline<T>) -> Self {
        Self { pipeline }
    }

    #[instrument(skip_all, fields(
        kind = %plan.kind,
        from = %plan.source.scope.namespace,
        to = %plan.target.scope.namespace,
    ))]
    pub async fn run(&self, plan: MigrationPlan) -> Result<MigrationReport, MigrationError> {
        let tool = self.pipeline.tool();
        ensure_empty(&plan.work_dir).await?;

        if let Some(cluster) = &plan.source.cluster {
            tool.switch_cluster(cluster).await?;
        }

        let harvest = self
            .pipeline
            .execute(HarvestContext::new(
                plan.source.scope.clone(),
                plan.kind,
                &plan.work_dir,
            ))
            .await?;

        if let Some(cluster) = &plan.target.cluster {
            tool.switch_cluster(cluster).await?;
        }
        tool.switch_namespace(&plan.target.scope).await?;

        let applied_dir = if harvest.files.is_empty() {
            warn!("Nothing left to apply after exclusions");
            None
        } else {
            info!(
                manifests = harvest.files.len(),
                "Applying manifests into {}", plan.target.scope.namespace
            );
            tool.apply_dir(&plan.target.scope, &plan.work_dir).await?;
            Some(plan.work_dir.clone())
        };

        let cleaned = if plan.keep_manifests {
            false
        } else {
            info!(dir = %plan.work_dir.display(), "Removing manifests");
            tokio::fs::remove_dir_all(&plan.work_dir)
                .await
                .map_err(|source| MigrationError::Cleanup {
                    path: plan.work_dir.clone(),
                    source,
                })?;
            true
        };

        let target_objects = match tool.list_objects(&plan.target.scope, plan.kind).await {
            Ok(names) => names,
            Err(ListError::Empty { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            objects = target_objects.len(),
            "{} available in {}", plan.kind, plan.target.scope.namespace
        );

        Ok(MigrationReport {
            harvest,
            applied_dir,
            target_objects,
            cleaned,
        })
    }
}

/// Errors unless `dir` is absent or empty.
async fn ensure_empty(dir: &Path) -> Result<(), MigrationError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(MigrationError::WorkDir {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    let first = entries
        .next_entry()
        .await
        .map_err(|source| MigrationError::WorkDir {
            path: dir.to_path_buf(),
            source,
        })?;
    match first {
        Some(_) => Err(MigrationError::WorkDirNotEmpty {
            path: dir.to_path_buf(),
        }),
        None => Ok(()),
    }
}
