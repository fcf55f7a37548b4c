use std::future::Future;
use std::sync::Arc;

use log::error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::collector::task::{self, PhaseReport, TaskOutcome};
use crate::error::CollectResult;

/// Bounded worker pool shared by every cycle.
///
/// DESIGN:
/// - At most `size` entity tasks execute at once, across both cycle
///   kinds (they share the same upstream budget).
/// - Submissions beyond the bound are queued, never dropped: each
///   submitted task waits for a slot before running.
/// - Work is grouped in phases; `Phase::join` is the fence that waits
///   for every task of that phase.
///
#[derive(Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Opens a new phase. Tasks submitted to it count toward the pool
    /// bound, and only toward this phase's fence.
    pub fn phase(&self, name: &'static str) -> Phase {
        Phase {
            name,
            slots: self.slots.clone(),
            tasks: JoinSet::new(),
            started: Instant::now(),
        }
    }
}

/// A group of entity tasks joined together.
pub struct Phase {
    name: &'static str,
    slots: Arc<Semaphore>,
    tasks: JoinSet<TaskOutcome>,
    started: Instant,
}

impl Phase {
    /// Queues one entity task. Its outcome is contained by
    /// `task::supervise`.
    pub fn submit<F>(&mut self, entity: i64, work: F)
    where
        F: Future<Output = CollectResult<()>> + Send + 'static,
    {
        let slots = self.slots.clone();
        let phase = self.name;

        self.tasks.spawn(async move {
            // The semaphore is never closed; a failed acquire means the
            // pool is being torn down.
            let Ok(_slot) = slots.acquire_owned().await else {
                return TaskOutcome::Cancelled;
            };
            task::supervise(phase, entity, work).await
        });
    }

    /// Waits until every submitted task has finished.
    pub async fn join(mut self) -> PhaseReport {
        let mut report = PhaseReport::new(self.name);

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                // Panics are caught inside `supervise`; this only
                // happens if the runtime aborts the task.
                Err(e) => {
                    error!("[{}] task join error: {e}", self.name);
                    report.record(&TaskOutcome::Faulted(e.to_string()));
                }
            }
        }

        report.elapsed = self.started.elapsed();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn concurrency_never_exceeds_pool_size() {
        let pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut phase = pool.phase("bound");
        for id in 0..20 {
            let running = running.clone();
            let peak = peak.clone();
            phase.submit(id, async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let report = phase.join().await;
        assert_eq!(report.completed, 20);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panicking_task_does_not_disturb_siblings() {
        let pool = WorkerPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));

        let mut phase = pool.phase("isolation");
        for id in 0..5 {
            let done = done.clone();
            phase.submit(id, async move {
                if id == 2 {
                    panic!("entity {id} exploded");
                }
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let report = phase.join().await;
        assert_eq!(report.total(), 5);
        assert_eq!(report.completed, 4);
        assert_eq!(report.faulted, 1);
        assert_eq!(done.load(Ordering::SeqCst), 4);

        // The pool is still usable after a fault.
        let mut next = pool.phase("after");
        next.submit(9, async { Ok(()) });
        assert_eq!(next.join().await.completed, 1);
    }

    #[tokio::test]
    async fn join_is_a_fence() {
        let pool = WorkerPool::new(4);
        let done = Arc::new(AtomicUsize::new(0));

        let mut phase = pool.phase("fence");
        for id in 0..8 {
            let done = done.clone();
            phase.submit(id, async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        phase.join().await;
        assert_eq!(done.load(Ordering::SeqCst), 8);
    }
}
