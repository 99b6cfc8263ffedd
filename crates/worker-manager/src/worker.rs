//! Worker loop
//!
//! A worker repeatedly takes a task from the shared queue, runs the handler
//! (under a deadline when one is configured), reports failures through the
//! sink and marks the task done. Failures never end the loop; only the
//! cancellation token or a closed-and-drained queue does.

use std::any::Any;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::TaskFailure;
use crate::handler::{TaskHandler, TimeoutCallback};
use crate::queue::TaskQueue;
use crate::sink::EventSink;
use crate::stats::{PoolStats, TaskOutcome};

/// One consumer of a [`TaskQueue`]
pub(crate) struct Worker<T> {
    name: String,
    queue: Arc<TaskQueue<T>>,
    handler: TaskHandler<T>,
    timeout: Option<Duration>,
    timeout_cb: Option<TimeoutCallback<T>>,
    sink: Arc<dyn EventSink>,
    stats: Arc<PoolStats>,
    cancel: CancellationToken,
}

impl<T> Worker<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        queue: Arc<TaskQueue<T>>,
        handler: TaskHandler<T>,
        timeout: Option<Duration>,
        timeout_cb: Option<TimeoutCallback<T>>,
        sink: Arc<dyn EventSink>,
        stats: Arc<PoolStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name,
            queue,
            handler,
            timeout,
            timeout_cb,
            sink,
            stats,
            cancel,
        }
    }

    /// Run until cancelled or until the queue is closed and drained
    pub(crate) async fn run(self) {
        debug!(worker = %self.name, "Worker started");

        loop {
            // Cancellation is only observed while idle; a dequeued task always
            // runs to an outcome.
            let task = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(worker = %self.name, "Worker cancelled");
                    break;
                }
                task = self.queue.get() => match task {
                    Ok(task) => task,
                    Err(_) => {
                        debug!(worker = %self.name, "Queue closed, worker exiting");
                        break;
                    }
                },
            };

            let _done = DoneGuard {
                queue: &self.queue,
                worker: &self.name,
            };
            let outcome = self.process(task).await;
            trace!(worker = %self.name, ?outcome, "Task processed");
            self.stats.record(outcome);
        }

        debug!(worker = %self.name, "Worker exited");
    }

    async fn process(&self, task: T) -> TaskOutcome {
        match self.execute(task.clone()).await {
            Ok(()) => TaskOutcome::Completed,
            Err(TaskFailure::Timeout { limit }) => {
                self.sink.warn(&format!(
                    "{}: Timeout processing task {:?}: handler exceeded {:?}",
                    self.name, task, limit
                ));
                self.run_timeout_callback(task).await;
                TaskOutcome::TimedOut
            }
            Err(failure) => {
                self.sink.error(&format!(
                    "{}: Error processing task {:?}: {}",
                    self.name, task, failure
                ));
                TaskOutcome::Failed
            }
        }
    }

    async fn execute(&self, task: T) -> Result<(), TaskFailure> {
        let handler = &self.handler;
        let call = AssertUnwindSafe(async move { handler(task).await }).catch_unwind();

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| TaskFailure::Timeout { limit })?,
            None => call.await,
        };

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TaskFailure::Execution(e)),
            Err(panic) => Err(TaskFailure::Panicked(panic_message(panic.as_ref()))),
        }
    }

    async fn run_timeout_callback(&self, task: T) {
        let Some(callback) = &self.timeout_cb else {
            return;
        };

        let arg = task.clone();
        let result = AssertUnwindSafe(async move { callback(arg).await })
            .catch_unwind()
            .await;

        let cause = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("callback panicked: {}", panic_message(panic.as_ref())),
        };

        self.stats.record_callback_failure();
        self.sink.warn(&format!(
            "{}: Error on timeout callback for task {:?}: {}",
            self.name, task, cause
        ));
    }
}

/// Marks the current task done when dropped, whatever the outcome
struct DoneGuard<'a, T> {
    queue: &'a TaskQueue<T>,
    worker: &'a str,
}

impl<T> Drop for DoneGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.queue.mark_done() {
            error!(worker = %self.worker, "Task completion bookkeeping failed: {}", e);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
