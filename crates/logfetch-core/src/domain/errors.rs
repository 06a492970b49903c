//! Errors - タスクのエラー型と分類

use super::ids::TaskId;
use crate::ports::StoreError;

/// ErrorKind は TaskError の運用分類
///
/// - Setup: Running 前の失敗（ディレクトリ・ファイル・dial・stream open）
/// - Stream: Running 中の失敗（recv・write・flush）
/// - Cancellation: abort による中断。レコード上は Stream と同じく Canceled になる
/// - InvalidOperation: 起動していない/終了済みのタスクへの操作など
/// - Store: TaskStore の失敗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Setup,
    Stream,
    Cancellation,
    InvalidOperation,
    Store,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("stream failed: {0}")]
    Stream(String),

    #[error("task aborted")]
    Cancelled,

    #[error("task [{0}] is not running")]
    NotRunning(TaskId),

    #[error("task [{0}] not found")]
    NotFound(TaskId),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Filesystem failure outside a running task (group removal).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Setup(_) | TaskError::Io(_) => ErrorKind::Setup,
            TaskError::Stream(_) => ErrorKind::Stream,
            TaskError::Cancelled => ErrorKind::Cancellation,
            TaskError::NotRunning(_) | TaskError::NotFound(_) | TaskError::InvalidOperation(_) => {
                ErrorKind::InvalidOperation
            }
            TaskError::Store(_) => ErrorKind::Store,
        }
    }
}
