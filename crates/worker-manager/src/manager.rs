//! Worker manager: lifecycle and task submission
//!
//! Owns the task queue and the worker tasks. Shutdown drains the queue
//! before any worker is cancelled, so cancellation only ever reaches idle
//! workers.

use std::fmt::Debug;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::config::WorkerManagerConfig;
use crate::error::{Result, WorkerManagerError};
use crate::handler::{TaskHandler, TimeoutCallback};
use crate::queue::TaskQueue;
use crate::sink::{EventSink, TracingSink};
use crate::stats::{PoolStats, StatsSnapshot};
use crate::status::WorkerManagerStatus;
use crate::worker::Worker;

/// Fixed-size pool of workers draining a bounded queue
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use async_worker_manager::{handler_fn, WorkerManager, WorkerManagerConfig};
///
/// let config = WorkerManagerConfig::new()
///     .with_num_workers(2)
///     .with_queue_size(5);
///
/// let manager = WorkerManager::new(
///     config,
///     handler_fn(|task: String| async move {
///         println!("processing {task}");
///         Ok(())
///     }),
/// )
/// .unwrap();
///
/// manager.start().await.unwrap();
/// for i in 0..5 {
///     manager.handle(format!("task {i}")).await.unwrap();
/// }
/// manager.stop().await;
/// # });
/// ```
pub struct WorkerManager<T> {
    config: WorkerManagerConfig,
    handler: TaskHandler<T>,
    timeout_cb: Option<TimeoutCallback<T>>,
    sink: Arc<dyn EventSink>,
    stats: Arc<PoolStats>,
    status: RwLock<WorkerManagerStatus>,
    queue: RwLock<Option<Arc<TaskQueue<T>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    stop_lock: tokio::sync::Mutex<()>,
}

impl<T> WorkerManager<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    /// Create a manager in the `Init` status
    ///
    /// Fails with [`WorkerManagerError::InvalidConfig`] when the
    /// configuration does not validate.
    pub fn new(config: WorkerManagerConfig, handler: TaskHandler<T>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            handler,
            timeout_cb: None,
            sink: Arc::new(TracingSink),
            stats: Arc::new(PoolStats::new()),
            status: RwLock::new(WorkerManagerStatus::Init),
            queue: RwLock::new(None),
            workers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            stop_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Set the fallback invoked with tasks whose handler timed out
    pub fn with_timeout_callback(mut self, callback: TimeoutCallback<T>) -> Self {
        self.timeout_cb = Some(callback);
        self
    }

    /// Replace the default `tracing` sink
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Create the queue and spawn the workers
    ///
    /// Must be called within a tokio runtime. Fails with
    /// [`WorkerManagerError::InvalidState`] unless the manager is in `Init`.
    #[instrument(
        skip(self),
        fields(num_workers = self.config.num_workers, queue_size = self.config.queue_size)
    )]
    pub async fn start(&self) -> Result<()> {
        let mut status = self.status.write();
        let next = status.transition(WorkerManagerStatus::Started, "start")?;

        let queue = Arc::new(TaskQueue::new(self.config.queue_size)?);
        let timeout = self.config.effective_timeout();

        let mut workers = self.workers.lock();
        for index in 0..self.config.num_workers {
            let name = format!("{}-{}", self.config.worker_prefix, index);
            let span = info_span!("worker", name = %name);
            let worker = Worker::new(
                name,
                Arc::clone(&queue),
                Arc::clone(&self.handler),
                timeout,
                self.timeout_cb.clone(),
                Arc::clone(&self.sink),
                Arc::clone(&self.stats),
                self.cancel.child_token(),
            );
            workers.push(tokio::spawn(worker.run().instrument(span)));
        }
        drop(workers);

        *self.queue.write() = Some(queue);
        *status = next;

        info!(
            num_workers = self.config.num_workers,
            queue_size = self.config.queue_size,
            timeout = ?timeout,
            "Worker manager started"
        );
        Ok(())
    }

    /// Drain the queue, then cancel and await every worker
    ///
    /// A no-op unless the manager is `Started`. Tasks submitted while the
    /// first drain is in progress are processed too. There is no internal
    /// timeout: a handler that never finishes keeps `stop` waiting.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let _stopping = self.stop_lock.lock().await;

        let current = *self.status.read();
        if current != WorkerManagerStatus::Started {
            debug!(status = %current, "Stop requested but manager is not started");
            return;
        }

        let Some(queue) = self.queue.read().clone() else {
            warn!("Manager is started but has no queue");
            return;
        };

        info!(pending = queue.unfinished(), "Draining task queue");
        queue.join().await;

        // Reject new submissions, then drain whatever slipped in before the
        // close so no accepted task is left behind.
        queue.close();
        queue.join().await;

        self.cancel.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for result in join_all(workers).await {
            match result {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("Worker task cancelled"),
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        let mut status = self.status.write();
        match status.transition(WorkerManagerStatus::Stopped, "stop") {
            Ok(next) => *status = next,
            Err(e) => warn!("Unexpected status after drain: {}", e),
        }
        drop(status);

        let stats = self.stats.snapshot();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            timed_out = stats.timed_out,
            "Worker manager stopped"
        );
    }

    /// Submit a task, waiting while the queue is at capacity
    ///
    /// Fails with [`WorkerManagerError::InvalidState`] unless the manager is
    /// `Started`, and with [`WorkerManagerError::Closed`] if the manager
    /// stopped while this call was waiting for space.
    pub async fn handle(&self, task: T) -> Result<()> {
        let queue = self.open_queue("handle")?;
        queue.put(task).await?;
        Ok(())
    }

    /// Submit a task without waiting
    ///
    /// Fails with [`WorkerManagerError::Full`] when the queue is at capacity.
    pub fn handle_nowait(&self, task: T) -> Result<()> {
        let queue = self.open_queue("handle_nowait")?;
        queue.put_nowait(task)?;
        Ok(())
    }
}

impl<T> WorkerManager<T> {
    /// Current lifecycle status
    pub fn status(&self) -> WorkerManagerStatus {
        *self.status.read()
    }

    /// Snapshot of task outcome counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Configuration this manager was built with
    pub fn config(&self) -> &WorkerManagerConfig {
        &self.config
    }

    /// Number of workers spawned by [`start`](Self::start)
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Queue capacity
    pub fn queue_size(&self) -> usize {
        self.config.queue_size
    }

    /// Number of tasks waiting in the queue (0 before `start`)
    pub fn queue_len(&self) -> usize {
        self.queue.read().as_ref().map_or(0, |queue| queue.len())
    }

    fn open_queue(&self, operation: &'static str) -> Result<Arc<TaskQueue<T>>> {
        let status = *self.status.read();
        if !status.accepts_tasks() {
            return Err(WorkerManagerError::invalid_state(operation, status));
        }

        self.queue
            .read()
            .clone()
            .ok_or_else(|| WorkerManagerError::invalid_state(operation, status))
    }
}

impl<T> Drop for WorkerManager<T> {
    fn drop(&mut self) {
        if *self.status.get_mut() == WorkerManagerStatus::Started {
            debug!("Worker manager dropped while started, cancelling workers");
            if let Some(queue) = self.queue.get_mut().as_ref() {
                queue.close();
            }
            self.cancel.cancel();
        }
    }
}

impl<T> Debug for WorkerManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerManager")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("queue_len", &self.queue_len())
            .finish_non_exhaustive()
    }
}
