//! # Async Worker Manager
//!
//! A bounded, in-process task dispatcher: a fixed pool of tokio workers
//! pulling from a shared queue, with an optional per-task deadline, a
//! fallback callback for timed-out tasks, and a shutdown that drains all
//! outstanding work before terminating workers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkerManager                           │
//! │  (lifecycle: Init → Started → Stopped, task submission)     │
//! └─────────────────────────────────────────────────────────────┘
//!          │ handle / handle_nowait
//!          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TaskQueue                              │
//! │  (bounded FIFO, backpressure, unfinished count, join)       │
//! └─────────────────────────────────────────────────────────────┘
//!          │ get
//!          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   Worker 0   │   Worker 1   │   ...   │   Worker N-1         │
//! │  (handler under timeout, fallback, EventSink, mark_done)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use async_worker_manager::prelude::*;
//! use std::time::Duration;
//!
//! let config = WorkerManagerConfig::new()
//!     .with_num_workers(4)
//!     .with_queue_size(64)
//!     .with_timeout(Duration::from_secs(2));
//!
//! let manager = WorkerManager::new(config, handler_fn(|job: Job| async move {
//!     job.run().await
//! }))?
//! .with_timeout_callback(timeout_callback_fn(|job: Job| async move {
//!     job.mark_abandoned().await
//! }));
//!
//! manager.start().await?;
//! manager.handle(job).await?;
//!
//! // Drains the queue, then terminates workers
//! manager.stop().await;
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod manager;
pub mod queue;
pub mod sink;
pub mod stats;
pub mod status;
mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::WorkerManagerConfig;
    pub use crate::error::{Result, WorkerManagerError};
    pub use crate::handler::{
        handler_fn, timeout_callback_fn, HandlerError, HandlerResult, TaskHandler,
        TimeoutCallback,
    };
    pub use crate::manager::WorkerManager;
    pub use crate::sink::{EventSink, TracingSink};
    pub use crate::status::WorkerManagerStatus;
}

// Re-export key types at crate root
pub use config::{WorkerManagerConfig, MAX_QUEUE_SIZE};
pub use error::{GetError, QueueError, TaskFailure, TooManyDone, WorkerManagerError};
pub use handler::{
    handler_fn, timeout_callback_fn, HandlerError, HandlerResult, TaskHandler, TimeoutCallback,
};
pub use manager::WorkerManager;
pub use queue::TaskQueue;
pub use sink::{EventLevel, EventSink, RecordedEvent, RecordingSink, TracingSink};
pub use stats::{PoolStats, StatsSnapshot, TaskOutcome};
pub use status::WorkerManagerStatus;
