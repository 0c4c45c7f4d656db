//! 🧵 Workers: the backbone of bkt, the unsung heroes, the ones who actually
//! do the puts while the Supervisor takes all the credit in the sprint retro.
//!
//! 🚀 This module is the factory floor. A fixed number of workers, one queue
//! of tasks, one queue of outcomes. Tasks wait in line when every worker is
//! busy; nobody hires extra staff on the fly. When the queue closes the
//! workers clock out, and the pool waits at the door until every last one
//! of them has actually left the building. 🦆
//!
//! 🧠 Knowledge graph:
//! - `Worker`: anything that can be `start()`ed into a `JoinHandle`
//! - `TaskHandler<T>`: what a worker does with one task
//! - `WorkerPool::run_all`: feed N tasks, drain exactly N outcomes, join the workers
//! - A failing or panicking task becomes an outcome, never a dead worker or a cancelled sibling

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::ProbeResult;

mod pool_worker;
use pool_worker::PoolWorker;

/// 🏗️ A background worker, that does work. duh.
pub trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify. Okay, we don't trust at all.
    fn start(self) -> JoinHandle<Result<()>>;
}

/// 🔧 The job description handed to every pool worker.
#[async_trait]
pub trait TaskHandler<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    type Output: Send + 'static;

    async fn handle(&self, task: &T) -> ProbeResult<Self::Output>;
}

/// 📬 How one task went, and who ran it.
#[derive(Debug)]
pub struct TaskOutcome<T, O> {
    pub task: T,
    pub worker_id: usize,
    pub result: ProbeResult<O>,
}

/// 🏭 A fixed-size pool. `size` workers, at most `size` tasks running at once.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(size: usize, queue_capacity: usize) -> Self {
        Self {
            size: size.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 🚀 Runs every task on the pool and returns one outcome per task.
    ///
    /// Workers are spawned here and joined here: nobody outlives this call.
    /// `on_settled` sees each outcome the moment it lands, in completion order.
    pub async fn run_all<T, H, F>(
        &self,
        tasks: Vec<T>,
        handler: Arc<H>,
        mut on_settled: F,
    ) -> Result<Vec<TaskOutcome<T, H::Output>>>
    where
        T: Send + Sync + 'static,
        H: TaskHandler<T>,
        F: FnMut(&TaskOutcome<T, H::Output>),
    {
        let total = tasks.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        // -- 👷 no point hiring 30 people to carry 3 boxes
        let worker_count = self.size.min(total);
        let (task_tx, task_rx) = async_channel::bounded::<T>(self.queue_capacity);
        let (outcome_tx, outcome_rx) = async_channel::bounded(self.queue_capacity);

        debug!("🏭 starting {} pool workers for {} tasks", worker_count, total);
        let handles: Vec<JoinHandle<Result<()>>> = (0..worker_count)
            .map(|worker_id| {
                PoolWorker::new(worker_id, task_rx.clone(), outcome_tx.clone(), handler.clone())
                    .start()
            })
            .collect();
        drop(task_rx);
        drop(outcome_tx);

        let feed = async move {
            for task in tasks {
                if task_tx.send(task).await.is_err() {
                    // -- 💀 every worker is gone; nobody left to hand tasks to
                    break;
                }
            }
            // -- 🏁 task_tx drops here, the queue closes, idle workers clock out
        };

        let collect = async {
            let mut outcomes = Vec::with_capacity(total);
            while outcomes.len() < total {
                match outcome_rx.recv().await {
                    Ok(outcome) => {
                        on_settled(&outcome);
                        outcomes.push(outcome);
                    }
                    Err(_) => break,
                }
            }
            outcomes
        };

        let ((), outcomes) = tokio::join!(feed, collect);

        // -- 🚪 the barrier has returned; now, and only now, walk everyone out
        for (worker_id, handle) in handles.into_iter().enumerate() {
            handle
                .await
                .context(format!("💀 pool worker {worker_id} could not be joined"))?
                .context(format!("💀 pool worker {worker_id} stopped with an error"))?;
        }

        if outcomes.len() != total {
            bail!(
                "💀 the pool settled {} of {} tasks before its workers vanished",
                outcomes.len(),
                total
            );
        }
        debug!("🏁 pool drained: {} outcomes, {} workers joined", total, worker_count);
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProbeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 🧪 Sleeps a little, counts how many of its siblings are awake at the same time.
    #[derive(Debug, Default)]
    struct NappingHandler {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_on: Option<u32>,
        panic_on: Option<u32>,
    }

    #[async_trait]
    impl TaskHandler<u32> for NappingHandler {
        type Output = u32;

        async fn handle(&self, task: &u32) -> ProbeResult<u32> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on == Some(*task) {
                panic!("🧪 task {task} panics on purpose");
            }
            if self.fail_on == Some(*task) {
                return Err(ProbeError::InvalidConfig(format!("task {task} says no")));
            }
            Ok(*task * 2)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_no_more_than_pool_size_tasks_run_at_once() {
        let handler = Arc::new(NappingHandler::default());
        let pool = WorkerPool::new(4, 8);

        let outcomes = pool
            .run_all((0..50).collect(), handler.clone(), |_| {})
            .await
            .expect("💀 pool");

        assert_eq!(outcomes.len(), 50);
        assert!(handler.max_in_flight.load(Ordering::SeqCst) <= 4);
        assert!(outcomes.iter().all(|o| o.worker_id < 4));
    }

    #[tokio::test]
    async fn the_one_where_one_failure_does_not_cancel_the_siblings() {
        let handler = Arc::new(NappingHandler {
            fail_on: Some(3),
            ..NappingHandler::default()
        });
        let pool = WorkerPool::new(3, 2);

        let mut settled = 0;
        let outcomes = pool
            .run_all((0..10).collect(), handler, |_| settled += 1)
            .await
            .expect("💀 pool");

        assert_eq!(settled, 10);
        let failures: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task, 3);
        let mut doubled: Vec<u32> = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().copied())
            .collect();
        doubled.sort_unstable();
        assert_eq!(doubled, vec![0, 2, 4, 8, 10, 12, 14, 16, 18]);
    }

    #[tokio::test]
    async fn the_one_where_a_panicking_task_becomes_an_outcome() {
        let handler = Arc::new(NappingHandler {
            panic_on: Some(1),
            ..NappingHandler::default()
        });
        let pool = WorkerPool::new(2, 4);

        let outcomes = pool
            .run_all((0..6).collect(), handler, |_| {})
            .await
            .expect("💀 a panic in one task must not take down the pool");

        assert_eq!(outcomes.len(), 6);
        let panicked = outcomes
            .iter()
            .find(|o| o.task == 1)
            .expect("💀 task 1 vanished");
        assert!(matches!(panicked.result, Err(ProbeError::TaskPanicked { .. })));
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 5);
    }

    #[tokio::test]
    async fn the_one_where_no_tasks_means_no_workers() {
        let pool = WorkerPool::new(30, 64);
        let outcomes = pool
            .run_all(Vec::<u32>::new(), Arc::new(NappingHandler::default()), |_| {})
            .await
            .expect("💀 pool");
        assert!(outcomes.is_empty());
    }

    #[test]
    fn the_one_where_a_zero_sized_pool_still_has_one_worker() {
        assert_eq!(WorkerPool::new(0, 0).size(), 1);
    }
}
