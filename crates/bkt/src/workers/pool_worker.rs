//! 🎬 *[a queue fills with id ranges. somewhere, a worker waits.]*
//!
//! 🧵 The PoolWorker — patient, tireless, and deeply unbothered by the chaos
//! happening in its sibling tasks. It pulls one task, runs it, reports how it
//! went, and pulls the next. A task that errors is reported. A task that
//! panics is caught and reported. The worker itself only stops when the queue
//! closes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_channel::{Receiver, Sender};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{TaskHandler, TaskOutcome, Worker};
use crate::errors::ProbeError;

pub(super) struct PoolWorker<T, H>
where
    T: Send + Sync + 'static,
    H: TaskHandler<T>,
{
    worker_id: usize,
    tasks: Receiver<T>,
    outcomes: Sender<TaskOutcome<T, H::Output>>,
    handler: Arc<H>,
}

impl<T, H> PoolWorker<T, H>
where
    T: Send + Sync + 'static,
    H: TaskHandler<T>,
{
    pub(super) fn new(
        worker_id: usize,
        tasks: Receiver<T>,
        outcomes: Sender<TaskOutcome<T, H::Output>>,
        handler: Arc<H>,
    ) -> Self {
        Self {
            worker_id,
            tasks,
            outcomes,
            handler,
        }
    }
}

impl<T, H> Worker for PoolWorker<T, H>
where
    T: Send + Sync + 'static,
    H: TaskHandler<T>,
{
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("🧵 pool worker {} clocking in", self.worker_id);
            while let Ok(task) = self.tasks.recv().await {
                let result = AssertUnwindSafe(self.handler.handle(&task))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        warn!("💥 pool worker {} caught a panicking task: {}", self.worker_id, message);
                        Err(ProbeError::TaskPanicked {
                            worker_id: self.worker_id,
                            message,
                        })
                    });

                let outcome = TaskOutcome {
                    task,
                    worker_id: self.worker_id,
                    result,
                };
                if self.outcomes.send(outcome).await.is_err() {
                    // -- 🚪 nobody is collecting anymore; no point working for free
                    break;
                }
            }
            debug!("🏁 pool worker {} clocking out: queue closed", self.worker_id);
            Ok(())
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "a panic with a payload that wasn't a string. rude.".to_string()
    }
}
