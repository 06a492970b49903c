//! Task record: the persisted description and status of one retrieval.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::component::Component;
use super::errors::TaskError;
use super::ids::{GroupId, TaskId};
use super::log::{LogMessage, SearchLogRequest};
use super::state::TaskState;

/// Metadata + status of a retrieval task.
///
/// Design:
/// - The in-memory copy owned by the task is authoritative while it runs;
///   the TaskStore holds the durable projection.
/// - All state transitions happen through the `mark_*` methods, which
///   refuse regressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub group_id: GroupId,
    pub component: Component,
    pub request: SearchLogRequest,
    pub state: TaskState,

    pub create_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,

    /// Archive location. Set once the sink exists.
    pub saved_path: Option<PathBuf>,

    /// First failure cause (if any).
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(
        task_id: TaskId,
        group_id: GroupId,
        component: Component,
        request: SearchLogRequest,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            group_id,
            component,
            request,
            state: TaskState::Queued,
            create_time: now,
            start_time: None,
            stop_time: None,
            saved_path: None,
            error: None,
        }
    }

    /// Keep the first error; later ones are usually consequences of it.
    pub fn record_error(&mut self, error: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Mark as running (sink created, stream open).
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        self.transition(TaskState::Running)?;
        self.start_time = Some(now);
        Ok(())
    }

    /// Mark as finished.
    pub fn mark_finished(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        self.transition(TaskState::Finished)?;
        self.stop_time = Some(now);
        Ok(())
    }

    /// Mark as canceled. `saved_path` is left as the last known location so
    /// callers can verify the archive is gone.
    pub fn mark_canceled(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        self.transition(TaskState::Canceled)?;
        self.stop_time = Some(now);
        Ok(())
    }

    fn transition(&mut self, next: TaskState) -> Result<(), TaskError> {
        if !self.state.can_transition_to(next) {
            return Err(TaskError::InvalidOperation(format!(
                "task [{}] cannot move from {:?} to {:?}",
                self.task_id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// One row of a task's preview: the `seq`-th message seen on the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewLine {
    pub task_id: TaskId,
    pub seq: usize,
    pub message: LogMessage,
}
