//! TaskStore port - タスクレコードとプレビュー行の永続化
//!
//! 実行中のタスクは自身のレコードの唯一の書き手です。
//! 同一レコードへの書き込みの整合性は実装側の責務とします。

use async_trait::async_trait;

use crate::domain::{GroupId, LogMessage, PreviewLine, TaskId, TaskRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Backend(String),
}

/// TaskStore はタスクレコードとプレビューの正本（durable projection）
///
/// # 設計原則
/// - すべての操作は失敗を返す（黙って無視しない）。呼び出し側はタスクのエラーとして扱う
/// - プレビュー行は append 順に保持する
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Removing an absent record is not an error.
    async fn delete_task(&self, task_id: TaskId) -> Result<(), StoreError>;

    async fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError>;

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Records of one group, oldest first.
    async fn list_group(&self, group_id: GroupId) -> Result<Vec<TaskRecord>, StoreError>;

    /// Drops every record of the group together with their preview rows.
    async fn delete_group(&self, group_id: GroupId) -> Result<(), StoreError>;

    async fn append_preview(&self, task_id: TaskId, message: &LogMessage) -> Result<(), StoreError>;

    async fn clear_preview(&self, task_id: TaskId) -> Result<(), StoreError>;

    async fn list_preview(&self, task_id: TaskId) -> Result<Vec<PreviewLine>, StoreError>;
}
