//! Error types for the worker manager
//!
//! Lifecycle and submission errors propagate to callers. Per-task failures
//! ([`TaskFailure`]) never leave the worker loop.

use std::time::Duration;

use thiserror::Error;

use crate::status::WorkerManagerStatus;

/// Result type alias for worker manager operations
pub type Result<T> = std::result::Result<T, WorkerManagerError>;

/// Errors surfaced by [`WorkerManager`](crate::WorkerManager)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerManagerError {
    /// Operation not allowed in the current lifecycle status
    #[error("cannot {operation}: worker manager is {status}")]
    InvalidState {
        operation: &'static str,
        status: WorkerManagerStatus,
    },

    /// Non-blocking submission rejected because the queue is at capacity
    #[error("task queue is full")]
    Full,

    /// The queue was closed while the submission was waiting for space
    #[error("task queue is closed")]
    Closed,

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WorkerManagerError {
    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, status: WorkerManagerStatus) -> Self {
        WorkerManagerError::InvalidState { operation, status }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        WorkerManagerError::InvalidConfig(msg.into())
    }
}

/// Enqueue failures; both variants hand the rejected task back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError<T> {
    /// Queue is at capacity
    #[error("queue is full")]
    Full(T),

    /// Queue no longer accepts items
    #[error("queue is closed")]
    Closed(T),
}

impl<T> QueueError<T> {
    /// Recover the rejected task
    pub fn into_inner(self) -> T {
        match self {
            QueueError::Full(task) | QueueError::Closed(task) => task,
        }
    }
}

impl<T> From<QueueError<T>> for WorkerManagerError {
    fn from(err: QueueError<T>) -> Self {
        match err {
            QueueError::Full(_) => WorkerManagerError::Full,
            QueueError::Closed(_) => WorkerManagerError::Closed,
        }
    }
}

/// Dequeue failure: the queue was closed for consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue is closed")]
pub struct GetError;

/// `mark_done` called more times than items were enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("mark_done called too many times")]
pub struct TooManyDone;

/// Why a single task did not complete successfully
///
/// Contained within the worker: logged through the sink and counted, never
/// returned to the submitter.
#[derive(Debug, Error)]
pub enum TaskFailure {
    /// The handler did not finish before the configured deadline
    #[error("handler timed out after {limit:?}")]
    Timeout { limit: Duration },

    /// The handler returned an error
    #[error("handler failed: {0:#}")]
    Execution(anyhow::Error),

    /// The handler panicked
    #[error("handler panicked: {0}")]
    Panicked(String),
}
