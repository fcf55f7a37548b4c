use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use log::{debug, error, warn};

use crate::error::{CollectError, CollectResult};
use crate::metrics::{METRICS, RuntimeMetrics};

/// Final state of one entity task.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed,
    /// The task returned an error (upstream, store, cache).
    Failed(CollectError),
    /// The task panicked; the payload message is kept for the log.
    Faulted(String),
    Cancelled,
}

/// Runs one entity task and converts every way it can end into a
/// `TaskOutcome`.
///
/// GUARANTEES:
/// - Nothing escapes: errors and panics are contained here and never
///   propagate to sibling tasks or to the orchestrator.
/// - Every outcome is logged with the phase and entity id and counted.
///
pub async fn supervise<F>(phase: &'static str, entity: i64, work: F) -> TaskOutcome
where
    F: Future<Output = CollectResult<()>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(())) => {
            RuntimeMetrics::incr(&METRICS.tasks_completed);
            debug!("[{phase}] game {entity} done");
            TaskOutcome::Completed
        }
        Ok(Err(CollectError::Cancelled)) => {
            RuntimeMetrics::incr(&METRICS.tasks_cancelled);
            debug!("[{phase}] game {entity} cancelled");
            TaskOutcome::Cancelled
        }
        Ok(Err(err)) => {
            RuntimeMetrics::incr(&METRICS.tasks_failed);
            warn!("[{phase}] game {entity} failed: {err}");
            TaskOutcome::Failed(err)
        }
        Err(payload) => {
            RuntimeMetrics::incr(&METRICS.tasks_faulted);
            let msg = panic_message(payload.as_ref());
            error!("[{phase}] game {entity} panicked: {msg}");
            TaskOutcome::Faulted(msg)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ------------------------------------------------------------
// Phase report
// ------------------------------------------------------------

/// Outcome counts of one phase, logged at the phase fence.
#[derive(Debug, Default, Clone)]
pub struct PhaseReport {
    pub phase: &'static str,
    pub completed: usize,
    pub failed: usize,
    pub faulted: usize,
    pub cancelled: usize,
    pub elapsed: Duration,
}

impl PhaseReport {
    pub fn new(phase: &'static str) -> Self {
        Self { phase, ..Default::default() }
    }

    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Faulted(_) => self.faulted += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed + self.faulted + self.cancelled
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} tasks in {:.1?}: done={} failed={} faulted={} cancelled={}",
            self.phase,
            self.total(),
            self.elapsed,
            self.completed,
            self.failed,
            self.faulted,
            self.cancelled,
        )
    }
}
