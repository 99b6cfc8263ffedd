//! Lifecycle status of a worker manager

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerManagerError};

/// Lifecycle status
///
/// # State Machine
///
/// ```text
/// ┌──────┐   start   ┌─────────┐   stop   ┌─────────┐
/// │ Init │ ────────► │ Started │ ───────► │ Stopped │
/// └──────┘           └─────────┘          └─────────┘
/// ```
///
/// `Stopped` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerManagerStatus {
    /// Constructed, no queue and no workers yet
    #[default]
    Init,
    /// Queue open, workers running
    Started,
    /// Drained and all workers terminated
    Stopped,
}

impl WorkerManagerStatus {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: WorkerManagerStatus) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Started) | (Self::Started, Self::Stopped)
        )
    }

    /// Validate a transition for `operation`, returning the new status
    pub fn transition(self, next: WorkerManagerStatus, operation: &'static str) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(WorkerManagerError::invalid_state(operation, self))
        }
    }

    /// Whether submissions are accepted
    pub fn accepts_tasks(self) -> bool {
        self == Self::Started
    }
}

impl std::fmt::Display for WorkerManagerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
