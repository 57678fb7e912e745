//! Namespace-scoped harvest orchestrator.
//!
//! This module provides the [`HarvestPipeline`] coordinator that drives one
//! harvest through its states (Idle → NamespaceSwitched → Listed → Harvesting
//! → Done) with:
//! - A sequential switch → list → filter phase
//! - A bounded fetch → sanitize → write fan-out via [`HarvesterExecutor`]
//! - Fail-fast cancellation: the first failing object aborts the harvest
//! - Structured logging via `tracing`

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument};

use crate::executor::{ExecutorError, HarvesterExecutor};
use crate::harvest::filter::ExclusionPolicy;
use crate::harvest::sanitize::ManifestSanitizer;
use crate::harvest::traits::{HarvestStage, ParseError, WriteError};
use crate::harvest::writer::ManifestWriter;
use crate::model::{HarvestContext, ObjectKind, ObjectName, Scope};
use crate::traits::{ClusterTool, ContextError, FetchError, ListError};

/// Default number of objects fetched at the same time.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default limit for a single fetch → sanitize → write unit.
pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Pipeline Types
// ============================================================================

/// Progress of one harvest. Every failure is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HarvestState {
    Idle,
    NamespaceSwitched,
    Listed,
    Harvesting,
    Done,
}

impl HarvestState {
    fn advance(&mut self, next: HarvestState) {
        let previous = *self;
        debug_assert!(next > previous, "harvest state cannot go back");
        debug!(from = ?previous, to = ?next, "Harvest state changed");
        *self = next;
    }
}

/// Complete harvest result with the written files and statistics.
#[derive(Debug, Serialize)]
pub struct HarvestResult {
    /// Directory holding the manifests, ready for `kubectl apply -f`
    pub output_dir: PathBuf,

    /// Written manifest files, in listing order
    pub files: Vec<PathBuf>,

    /// Objects dropped by the exclusion policy
    pub excluded: Vec<ObjectName>,

    /// Final state; always [`HarvestState::Done`]
    pub state: HarvestState,

    /// Timing and counters
    pub stats: HarvestStats,
}

/// Statistics about the harvest operation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct HarvestStats {
    /// Total time spent on entire harvest (milliseconds)
    pub total_duration_ms: u64,

    /// Time spent switching namespace and listing (milliseconds)
    pub listing_duration_ms: u64,

    /// Time spent in the fetch pool (milliseconds)
    pub fetch_duration_ms: u64,

    /// Names returned by the listing
    pub objects_listed: usize,

    /// Names removed by the exclusion policy
    pub objects_excluded: usize,

    /// Manifest files written
    pub manifests_written: usize,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that end a harvest.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Namespace could not be selected
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Listing failed or found nothing
    #[error(transparent)]
    List(#[from] ListError),

    /// An object manifest could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A fetched manifest did not have the expected shape
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A manifest file could not be written
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Unit execution exceeded timeout
    #[error("Stage '{stage}' timed out after {timeout_secs}s for '{object}'")]
    StageTimeout {
        stage: String,
        object: String,
        timeout_secs: u64,
    },

    /// Worker task panicked or the pool shut down
    #[error("Fetch pool failed: {0}")]
    Executor(String),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Harvest orchestrator bound to one [`ClusterTool`].
///
/// # Thread Safety
///
/// Every tool call carries the harvest's [`Scope`]. With a tool that does
/// not mutate its active namespace, harvests of different namespaces may run
/// at the same time.
///
/// # Example
///
/// ```ignore
/// use manifest_harvester::{HarvestContext, HarvestPipeline, Kubectl, ObjectKind, Scope};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = HarvestPipeline::new(Arc::new(Kubectl::default())).with_concurrency(4);
///     let ctx = HarvestContext::new(Scope::namespace("lion"), ObjectKind::Secret, "/tmp/lion-secrets");
///
///     let result = pipeline.execute(ctx).await?;
///     println!("Wrote {} manifests", result.files.len());
///     Ok(())
/// }
/// ```
pub struct HarvestPipeline<T: ClusterTool> {
    tool: Arc<T>,
    exclusions: ExclusionPolicy,
    concurrency: usize,
    unit_timeout: Option<Duration>,
}

impl<T> HarvestPipeline<T>
where
    T: ClusterTool + 'static,
{
    /// Creates a new pipeline around `tool`.
    ///
    /// Default configuration:
    /// - Concurrency: 8 objects
    /// - Timeout: 5 minutes per object
    /// - Exclusions: the default blocklist
    pub fn new(tool: Arc<T>) -> Self {
        Self {
            tool,
            exclusions: ExclusionPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            unit_timeout: Some(DEFAULT_UNIT_TIMEOUT),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the per-object timeout; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionPolicy) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn tool(&self) -> &Arc<T> {
        &self.tool
    }

    pub fn exclusions(&self) -> &ExclusionPolicy {
        &self.exclusions
    }

    /// Runs one harvest to completion.
    ///
    /// Returns only after every launched unit has finished or been
    /// cancelled. On failure, files written before the failure are left in
    /// place.
    ///
    /// # Errors
    ///
    /// Returns the first [`PipelineError`] encountered; no stage is retried
    /// and no object is skipped on error.
    #[instrument(skip(self, ctx), fields(namespace = %ctx.scope.namespace, kind = %ctx.kind))]
    pub async fn execute(&self, ctx: HarvestContext) -> Result<HarvestResult, PipelineError> {
        let start = Instant::now();
        let mut stats = HarvestStats::default();
        let mut state = HarvestState::Idle;

        // ====================================================================
        // Sequential phase: switch → list → filter
        // ====================================================================

        info!("Reading {} from {}", ctx.kind, ctx.scope.namespace);
        self.tool.switch_namespace(&ctx.scope).await?;
        state.advance(HarvestState::NamespaceSwitched);

        let listed = self.tool.list_objects(&ctx.scope, ctx.kind).await?;
        stats.objects_listed = listed.len();
        state.advance(HarvestState::Listed);

        let (selected, excluded) = self.exclusions.partition(listed);
        for name in &excluded {
            debug!(object = %name, "Excluded");
        }
        stats.objects_excluded = excluded.len();
        stats.listing_duration_ms = millis(start.elapsed());

        // ====================================================================
        // Fan-out phase: fetch → sanitize → write per object
        // ====================================================================

        let writer = ManifestWriter::new(&ctx.output_dir);
        writer.prepare()?;
        state.advance(HarvestState::Harvesting);

        let fetch_start = Instant::now();
        let executor = HarvesterExecutor::new(self.concurrency).with_unit_timeout(self.unit_timeout);
        let unit = ObjectUnit {
            tool: Arc::clone(&self.tool),
            scope: ctx.scope.clone(),
            sanitizer: ManifestSanitizer::new().expecting(ctx.kind),
            writer,
            blocking: executor.tracker(),
        };
        let names = selected.clone();

        let files = executor
            .execute_all(selected, move |name| {
                let unit = unit.clone();
                async move { unit.run(name).await }
            })
            .await
            .map_err(|e| unit_failure(e, &names))?;

        stats.fetch_duration_ms = millis(fetch_start.elapsed());
        stats.manifests_written = files.len();
        state.advance(HarvestState::Done);
        stats.total_duration_ms = millis(start.elapsed());

        info!(
            written = stats.manifests_written,
            excluded = stats.objects_excluded,
            duration_ms = stats.total_duration_ms,
            output_dir = %ctx.output_dir.display(),
            "Harvest completed"
        );

        Ok(HarvestResult {
            output_dir: ctx.output_dir,
            files,
            excluded,
            state,
            stats,
        })
    }

    /// Convenience wrapper building the [`HarvestContext`].
    pub async fn harvest(
        &self,
        scope: Scope,
        kind: ObjectKind,
        output_dir: impl Into<PathBuf>,
    ) -> Result<HarvestResult, PipelineError> {
        self.execute(HarvestContext::new(scope, kind, output_dir)).await
    }
}

/// Everything one fetch unit needs, cloned into each spawned task.
struct ObjectUnit<T: ClusterTool> {
    tool: Arc<T>,
    scope: Scope,
    sanitizer: ManifestSanitizer,
    writer: ManifestWriter,
    /// Joined by the executor before it returns.
    blocking: TaskTracker,
}

impl<T: ClusterTool> Clone for ObjectUnit<T> {
    fn clone(&self) -> Self {
        Self {
            tool: Arc::clone(&self.tool),
            scope: self.scope.clone(),
            sanitizer: self.sanitizer,
            writer: self.writer.clone(),
            blocking: self.blocking.clone(),
        }
    }
}

impl<T> ObjectUnit<T>
where
    T: ClusterTool + 'static,
{
    async fn run(self, name: ObjectName) -> Result<PathBuf, PipelineError> {
        info!(object = %name, "Creating manifest");
        let raw = self.tool.fetch_manifest(&self.scope, &name).await?;

        // Parsing and file I/O are blocking; the raw manifest is moved in and
        // dropped once projected. The task keeps running if this unit is
        // cancelled or times out, and the executor waits for it.
        let ObjectUnit {
            sanitizer,
            writer,
            blocking,
            ..
        } = self;
        let path = blocking.spawn_blocking(move || -> Result<PathBuf, PipelineError> {
            let manifest = sanitizer.execute(raw)?;
            debug!(stage = sanitizer.stage_name(), object = %manifest.name(), "Sanitized");
            Ok(writer.execute(manifest)?)
        })
        .await
        .map_err(|e| PipelineError::Executor(format!("Task join error: {}", e)))??;

        debug!(object = %name, path = %path.display(), "Manifest written");
        Ok(path)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn unit_failure(error: ExecutorError<PipelineError>, names: &[ObjectName]) -> PipelineError {
    match error {
        ExecutorError::Unit { source, .. } => source,
        ExecutorError::Timeout {
            index,
            timeout_secs,
        } => PipelineError::StageTimeout {
            stage: "fetch".to_string(),
            object: names
                .get(index)
                .map(ToString::to_string)
                .unwrap_or_default(),
            timeout_secs,
        },
        ExecutorError::Join(message) | ExecutorError::Semaphore(message) => {
            PipelineError::Executor(message)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
