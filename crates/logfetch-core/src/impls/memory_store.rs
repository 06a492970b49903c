//! InMemoryTaskStore - 開発・テスト用の TaskStore
//!
//! tokio::sync::Mutex 1 本で全体を守るシンプルな実装です。
//! 同一レコードへの書き込みはこのロックで直列化されます。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{GroupId, LogMessage, PreviewLine, TaskId, TaskRecord};
use crate::ports::{StoreError, TaskStore};

#[derive(Default)]
struct InMemoryStoreState {
    records: HashMap<TaskId, TaskRecord>,
    previews: HashMap<TaskId, Vec<PreviewLine>>,
}

#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<InMemoryStoreState>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.records.contains_key(&record.task_id) {
            return Err(StoreError::AlreadyExists(record.task_id.to_string()));
        }
        state.records.insert(record.task_id, record.clone());
        Ok(())
    }

    async fn delete_task(&self, task_id: TaskId) -> Result<(), StoreError> {
        self.state.lock().await.records.remove(&task_id);
        Ok(())
    }

    async fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let Some(slot) = state.records.get_mut(&record.task_id) else {
            return Err(StoreError::NotFound(record.task_id.to_string()));
        };
        *slot = record.clone();
        Ok(())
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.state.lock().await.records.get(&task_id).cloned())
    }

    async fn list_group(&self, group_id: GroupId) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut records: Vec<TaskRecord> = state
            .records
            .values()
            .filter(|r| r.group_id == group_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.create_time, r.task_id));
        Ok(records)
    }

    async fn delete_group(&self, group_id: GroupId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let ids: Vec<TaskId> = state
            .records
            .values()
            .filter(|r| r.group_id == group_id)
            .map(|r| r.task_id)
            .collect();
        for id in ids {
            state.records.remove(&id);
            state.previews.remove(&id);
        }
        Ok(())
    }

    async fn append_preview(&self, task_id: TaskId, message: &LogMessage) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let lines = state.previews.entry(task_id).or_default();
        let seq = lines.len();
        lines.push(PreviewLine {
            task_id,
            seq,
            message: message.clone(),
        });
        Ok(())
    }

    async fn clear_preview(&self, task_id: TaskId) -> Result<(), StoreError> {
        self.state.lock().await.previews.remove(&task_id);
        Ok(())
    }

    async fn list_preview(&self, task_id: TaskId) -> Result<Vec<PreviewLine>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .previews
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }
}
