use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

/// Failure of a fan-out run. Only one is ever reported per run.
#[derive(Error, Debug)]
pub enum ExecutorError<E> {
    #[error("{source}")]
    Unit {
        index: usize,
        #[source]
        source: E,
    },
    #[error("Unit {index} timed out after {timeout_secs}s")]
    Timeout { index: usize, timeout_secs: u64 },
    #[error("Task join error: {0}")]
    Join(String),
    #[error("Semaphore error: {0}")]
    Semaphore(String),
}

enum UnitOutcome<O, E> {
    Done(O),
    Failed(E),
    TimedOut,
    Cancelled,
    Closed(String),
}

/// Bounded worker pool for independent units of work.
///
/// At most `concurrency_limit` units hold a permit at the same time. The first
/// failing unit cancels everything that has not finished yet, and the run
/// only returns once every spawned task has been joined. Blocking work a unit
/// starts through [`HarvesterExecutor::tracker`] is waited for as well, even
/// when the unit itself was cancelled or timed out.
pub struct HarvesterExecutor {
    semaphore: Arc<Semaphore>,
    unit_timeout: Option<Duration>,
    tracker: TaskTracker,
}

impl HarvesterExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            unit_timeout: None,
            tracker: TaskTracker::new(),
        }
    }

    /// Limits how long a single unit may run once it holds a permit.
    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Tracker for tasks that outlive a dropped unit future, such as
    /// `spawn_blocking` work.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Runs `work` once per item and waits for all of them.
    ///
    /// Outputs are returned in input order. On failure, the error of the unit
    /// with the lowest input index among those that failed is returned; units
    /// that were cancelled because of it are not reported.
    #[instrument(skip_all, fields(units = items.len()))]
    pub async fn execute_all<I, O, E, F, Fut>(
        &self,
        items: Vec<I>,
        work: F,
    ) -> Result<Vec<O>, ExecutorError<E>>
    where
        I: Send + 'static,
        O: Send + 'static,
        E: std::error::Error + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        let total = items.len();
        let work = Arc::new(work);
        let cancel = CancellationToken::new();
        let mut units = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let work = Arc::clone(&work);
            let semaphore = Arc::clone(&self.semaphore);
            let cancel = cancel.clone();
            let unit_timeout = self.unit_timeout;

            units.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => UnitOutcome::Cancelled,
                    outcome = run_unit(semaphore, unit_timeout, (*work)(item)) => outcome,
                };
                (index, outcome)
            });
        }

        info!(units = total, "Launched units");

        let mut outputs: Vec<Option<O>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut failure: Option<(usize, ExecutorError<E>)> = None;

        while let Some(joined) = units.join_next().await {
            let (index, error) = match joined {
                Ok((index, UnitOutcome::Done(output))) => {
                    outputs[index] = Some(output);
                    continue;
                }
                Ok((index, UnitOutcome::Cancelled)) => {
                    debug!(unit = index, "Unit cancelled");
                    continue;
                }
                Ok((index, UnitOutcome::Failed(source))) => {
                    (index, ExecutorError::Unit { index, source })
                }
                Ok((index, UnitOutcome::TimedOut)) => (
                    index,
                    ExecutorError::Timeout {
                        index,
                        timeout_secs: unit_timeout_secs(self.unit_timeout),
                    },
                ),
                Ok((index, UnitOutcome::Closed(message))) => {
                    (index, ExecutorError::Semaphore(message))
                }
                Err(e) => (usize::MAX, ExecutorError::Join(e.to_string())),
            };

            if !cancel.is_cancelled() {
                warn!(unit = index, error = %error, "Unit failed, cancelling remaining units");
                cancel.cancel();
            }

            match &failure {
                Some((kept, _)) if *kept <= index => {
                    debug!(unit = index, error = %error, "Dropping later failure");
                }
                _ => failure = Some((index, error)),
            }
        }

        self.tracker.close();
        if !self.tracker.is_empty() {
            debug!(tasks = self.tracker.len(), "Waiting for detached tasks");
        }
        self.tracker.wait().await;
        self.tracker.reopen();

        if let Some((_, error)) = failure {
            return Err(error);
        }

        info!(units = total, "All units finished");
        Ok(outputs.into_iter().flatten().collect())
    }
}

async fn run_unit<O, E, Fut>(
    semaphore: Arc<Semaphore>,
    unit_timeout: Option<Duration>,
    unit: Fut,
) -> UnitOutcome<O, E>
where
    Fut: Future<Output = Result<O, E>>,
{
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return UnitOutcome::Closed(e.to_string()),
    };

    let result = match unit_timeout {
        Some(limit) => match tokio::time::timeout(limit, unit).await {
            Ok(result) => result,
            Err(_) => return UnitOutcome::TimedOut,
        },
        None => unit.await,
    };

    match result {
        Ok(output) => UnitOutcome::Done(output),
        Err(e) => UnitOutcome::Failed(e),
    }
}

fn unit_timeout_secs(timeout: Option<Duration>) -> u64 {
    timeout.map(|t| t.as_secs()).unwrap_or_default()
}
