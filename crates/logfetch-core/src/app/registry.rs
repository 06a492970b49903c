//! TaskRegistry - グループ単位のタスク管理
//!
//! 1 回の「N コンポーネントからログを取る」要求を N 個の Task に展開し、
//! 後から (group_id, task_id) で個別に参照・中断・ダウンロードできるようにします。
//!
//! マップは DashMap で守られており、タスク作成とステータス参照が
//! 同時に走っても安全です。登録されたタスクは remove_group() 以外では消えません。

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use tokio::task::JoinHandle;

use super::sink::group_dir;
use super::task::{Task, TaskContext};
use crate::config::FetchConfig;
use crate::domain::{
    Component, GroupId, PreviewLine, SearchLogRequest, TaskError, TaskId, TaskRecord, TaskState,
};
use crate::ports::{Clock, DiagnosticsClient, IdGenerator, SystemClock, TaskStore, UlidGenerator};

pub struct TaskRegistry {
    tasks: DashMap<TaskId, Arc<Task>>,
    /// Task ids per group, in creation order.
    groups: DashMap<GroupId, Vec<TaskId>>,
    /// Groups with a remove_group() in flight. No task may join or start.
    removing: DashSet<GroupId>,
    ids: Arc<dyn IdGenerator>,
    ctx: Arc<TaskContext>,
}

impl TaskRegistry {
    pub fn new(
        config: FetchConfig,
        store: Arc<dyn TaskStore>,
        diagnostics: Arc<dyn DiagnosticsClient>,
    ) -> Self {
        Self::with_clock(config, store, diagnostics, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: FetchConfig,
        store: Arc<dyn TaskStore>,
        diagnostics: Arc<dyn DiagnosticsClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Self {
            tasks: DashMap::new(),
            groups: DashMap::new(),
            removing: DashSet::new(),
            ids,
            ctx: Arc::new(TaskContext {
                store,
                diagnostics,
                clock,
                config,
            }),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.ctx.config
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.ctx.store
    }

    pub fn new_group_id(&self) -> GroupId {
        self.ids.generate_group_id()
    }

    /// Allocate a Queued task and persist its record. Does not start it.
    pub async fn create_task(
        &self,
        component: Component,
        request: SearchLogRequest,
        group_id: GroupId,
    ) -> Result<Arc<Task>, TaskError> {
        self.ensure_not_removing(group_id)?;
        let record = TaskRecord::new(
            self.ids.generate_task_id(),
            group_id,
            component,
            request,
            self.ctx.clock.now(),
        );
        self.ctx.store.create_task(&record).await?;

        let task = Arc::new(Task::new(record, Arc::clone(&self.ctx)));
        self.tasks.insert(task.id(), Arc::clone(&task));
        self.groups.entry(group_id).or_default().push(task.id());

        // remove_group() が途中で始まった場合、そちらのスナップショットに
        // 入ったかどうか分からないので自分で取り消す
        if self.removing.contains(&group_id) {
            task.retire();
            self.forget(group_id, task.id());
            if let Err(e) = self.ctx.store.delete_task(task.id()).await {
                tracing::warn!(task_id = %task.id(), error = %e, "failed to drop record");
            }
            return Err(Self::removing_error(group_id));
        }
        tracing::debug!(task_id = %task.id(), %group_id, "task created");
        Ok(task)
    }

    /// Fan one request out to every component under a fresh group id.
    pub async fn create_group(
        &self,
        components: Vec<Component>,
        request: SearchLogRequest,
    ) -> Result<(GroupId, Vec<Arc<Task>>), TaskError> {
        let group_id = self.new_group_id();
        let mut tasks = Vec::with_capacity(components.len());
        for component in components {
            tasks.push(self.create_task(component, request.clone(), group_id).await?);
        }
        tracing::info!(%group_id, tasks = tasks.len(), "task group created");
        Ok((group_id, tasks))
    }

    pub fn lookup(&self, group_id: GroupId, task_id: TaskId) -> Result<Arc<Task>, TaskError> {
        match self.tasks.get(&task_id) {
            Some(task) if task.group_id() == group_id => Ok(Arc::clone(task.value())),
            _ => Err(TaskError::NotFound(task_id)),
        }
    }

    /// Tasks of a group in creation order. Unknown groups are empty.
    pub fn tasks_in_group(&self, group_id: GroupId) -> Vec<Arc<Task>> {
        // clone the ids first so no shard lock is held while reading `tasks`
        let ids = self
            .groups
            .get(&group_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        ids.iter()
            .filter_map(|id| self.tasks.get(id).map(|t| Arc::clone(t.value())))
            .collect()
    }

    pub async fn list_by_group(&self, group_id: GroupId) -> Vec<TaskRecord> {
        let mut records = Vec::new();
        for task in self.tasks_in_group(group_id) {
            records.push(task.record().await);
        }
        records
    }

    pub fn groups(&self) -> Vec<GroupId> {
        self.groups.iter().map(|entry| *entry.key()).collect()
    }

    pub fn start(&self, task: &Arc<Task>) -> Result<JoinHandle<()>, TaskError> {
        self.ensure_not_removing(task.group_id())?;
        task.start()
    }

    /// Start every Queued task of the group that has not been started yet.
    pub async fn start_group(&self, group_id: GroupId) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if self.removing.contains(&group_id) {
            return handles;
        }
        for task in self.tasks_in_group(group_id) {
            if task.state().await != TaskState::Queued {
                continue;
            }
            match task.start() {
                Ok(handle) => handles.push(handle),
                Err(e) => tracing::debug!(task_id = %task.id(), error = %e, "skipping task"),
            }
        }
        handles
    }

    pub async fn abort(&self, group_id: GroupId, task_id: TaskId) -> Result<(), TaskError> {
        self.lookup(group_id, task_id)?.abort().await
    }

    /// Abort every running task of the group concurrently. Returns how many
    /// tasks were aborted; tasks that were not running are skipped.
    pub async fn abort_group(&self, group_id: GroupId) -> usize {
        let tasks = self.tasks_in_group(group_id);
        let results = join_all(tasks.iter().map(|t| t.abort())).await;
        results.iter().filter(|r| r.is_ok()).count()
    }

    pub async fn preview(
        &self,
        group_id: GroupId,
        task_id: TaskId,
    ) -> Result<Vec<PreviewLine>, TaskError> {
        let task = self.lookup(group_id, task_id)?;
        Ok(self.ctx.store.list_preview(task.id()).await?)
    }

    /// Archive of a finished task, for download.
    pub async fn archive_path(&self, group_id: GroupId, task_id: TaskId) -> Result<PathBuf, TaskError> {
        let record = self.lookup(group_id, task_id)?.record().await;
        match (record.state, record.saved_path) {
            (TaskState::Finished, Some(path)) => Ok(path),
            (state, _) => Err(TaskError::InvalidOperation(format!(
                "task [{task_id}] has no archive in state {state:?}"
            ))),
        }
    }

    /// Delete a whole group: abort what is still running, drop the records
    /// and previews, remove the group directory and forget the tasks.
    ///
    /// While this runs the group is marked as being removed: create_task()
    /// and start() for it fail, and every task of the group is retired
    /// before the abort so a handle held elsewhere cannot start it later.
    pub async fn remove_group(&self, group_id: GroupId) -> Result<(), TaskError> {
        if !self.removing.insert(group_id) {
            return Err(Self::removing_error(group_id));
        }
        let result = self.remove_marked_group(group_id).await;
        self.removing.remove(&group_id);
        result
    }

    async fn remove_marked_group(&self, group_id: GroupId) -> Result<(), TaskError> {
        let tasks = self.tasks_in_group(group_id);
        for task in &tasks {
            task.retire();
        }
        let results = join_all(tasks.iter().map(|t| t.abort())).await;
        let aborted = results.iter().filter(|r| r.is_ok()).count();

        self.ctx.store.delete_group(group_id).await?;

        let dir = group_dir(&self.ctx.config.base_dir, group_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some((_, ids)) = self.groups.remove(&group_id) {
            for id in ids {
                self.tasks.remove(&id);
            }
        }
        tracing::info!(%group_id, aborted, "task group removed");
        Ok(())
    }

    fn ensure_not_removing(&self, group_id: GroupId) -> Result<(), TaskError> {
        if self.removing.contains(&group_id) {
            return Err(Self::removing_error(group_id));
        }
        Ok(())
    }

    fn removing_error(group_id: GroupId) -> TaskError {
        TaskError::InvalidOperation(format!("group [{group_id}] is being removed"))
    }

    fn forget(&self, group_id: GroupId, task_id: TaskId) {
        self.tasks.remove(&task_id);
        if let Some(mut ids) = self.groups.get_mut(&group_id) {
            ids.retain(|id| *id != task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComponentKind, LogLevel, LogMessage};
    use crate::impls::{InMemoryTaskStore, ScriptedDiagnostics, StreamStep};
    use crate::ports::StoreError;
    use std::time::Duration;

    fn tikv(i: u16) -> Component {
        Component::new(ComponentKind::Tikv, "10.0.1.1", 20160 + i, 20180 + i)
    }

    fn registry(diagnostics: ScriptedDiagnostics) -> (tempfile::TempDir, TaskRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = TaskRegistry::new(
            FetchConfig::new(dir.path()),
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(diagnostics),
        );
        (dir, registry)
    }

    fn lines(n: i64) -> Vec<StreamStep> {
        let msgs = (0..n)
            .map(|i| LogMessage::new(i, LogLevel::Info, format!("l{i}")))
            .collect();
        StreamStep::batches(msgs, 4)
    }

    #[tokio::test]
    async fn create_group_fans_out_queued_tasks() {
        let (_dir, registry) = registry(ScriptedDiagnostics::new());
        let (group, tasks) = registry
            .create_group(vec![tikv(0), tikv(1), tikv(2)], SearchLogRequest::default())
            .await
            .unwrap();

        assert_eq!(tasks.len(), 3);
        let records = registry.list_by_group(group).await;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.state == TaskState::Queued));
        // creation order is kept
        let ids: Vec<TaskId> = records.iter().map(|r| r.task_id).collect();
        let expected: Vec<TaskId> = tasks.iter().map(|t| t.id()).collect();
        assert_eq!(ids, expected);

        // Queued records are persisted at creation
        assert_eq!(registry.store().list_group(group).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn lookup_is_scoped_to_the_group() {
        let (_dir, registry) = registry(ScriptedDiagnostics::new());
        let group = registry.new_group_id();
        let other = registry.new_group_id();
        let task = registry
            .create_task(tikv(0), SearchLogRequest::default(), group)
            .await
            .unwrap();

        assert!(registry.lookup(group, task.id()).is_ok());
        assert!(matches!(
            registry.lookup(other, task.id()),
            Err(TaskError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creation_and_polling() {
        let (_dir, registry) = registry(ScriptedDiagnostics::new());
        let registry = Arc::new(registry);
        let group = registry.new_group_id();

        let mut joins = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            joins.push(tokio::spawn(async move {
                registry
                    .create_task(tikv(i), SearchLogRequest::default(), group)
                    .await
                    .unwrap();
                registry.list_by_group(group).await.len()
            }));
        }
        for join in joins {
            assert!(join.await.unwrap() >= 1);
        }
        assert_eq!(registry.list_by_group(group).await.len(), 32);
    }

    #[tokio::test]
    async fn start_group_runs_every_task() {
        let diagnostics = ScriptedDiagnostics::new()
            .serve(tikv(0).address(), lines(10))
            .serve(tikv(1).address(), lines(3));
        let (_dir, registry) = registry(diagnostics);
        let (group, tasks) = registry
            .create_group(vec![tikv(0), tikv(1)], SearchLogRequest::default())
            .await
            .unwrap();

        let handles = registry.start_group(group).await;
        assert_eq!(handles.len(), 2);
        for handle in handles {
            handle.await.unwrap();
        }

        for task in &tasks {
            let path = registry.archive_path(group, task.id()).await.unwrap();
            assert!(path.exists());
        }
        // already started tasks are skipped
        assert!(registry.start_group(group).await.is_empty());
    }

    #[tokio::test]
    async fn archive_path_requires_a_finished_task() {
        let (_dir, registry) = registry(ScriptedDiagnostics::new());
        let group = registry.new_group_id();
        let task = registry
            .create_task(tikv(0), SearchLogRequest::default(), group)
            .await
            .unwrap();

        assert!(matches!(
            registry.archive_path(group, task.id()).await,
            Err(TaskError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn abort_group_skips_tasks_that_are_not_running() {
        let diagnostics = ScriptedDiagnostics::new().serve(tikv(0).address(), vec![StreamStep::Hang]);
        let (_dir, registry) = registry(diagnostics);
        let (group, tasks) = registry
            .create_group(vec![tikv(0), tikv(1)], SearchLogRequest::default())
            .await
            .unwrap();

        let handle = registry.start(&tasks[0]).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while tasks[0].state().await != TaskState::Running {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(registry.abort_group(group).await, 1);
        assert_eq!(tasks[0].state().await, TaskState::Canceled);
        assert_eq!(tasks[1].state().await, TaskState::Queued);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn remove_group_cleans_everything() {
        let diagnostics = ScriptedDiagnostics::new()
            .serve(tikv(0).address(), lines(5))
            .serve(tikv(1).address(), vec![StreamStep::Hang]);
        let (_dir, registry) = registry(diagnostics);
        let (group, tasks) = registry
            .create_group(vec![tikv(0), tikv(1)], SearchLogRequest::default())
            .await
            .unwrap();

        let handles = registry.start_group(group).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while tasks[0].state().await != TaskState::Finished
                || tasks[1].state().await != TaskState::Running
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let dir = group_dir(&registry.config().base_dir, group);
        assert!(dir.exists());

        registry.remove_group(group).await.unwrap();

        assert!(!dir.exists());
        assert!(registry.list_by_group(group).await.is_empty());
        assert!(registry.store().list_group(group).await.unwrap().is_empty());
        assert!(matches!(
            registry.lookup(group, tasks[0].id()),
            Err(TaskError::NotFound(_))
        ));
        for handle in handles {
            handle.await.unwrap();
        }
    }

    /// Store whose delete_group() parks until released.
    struct GatedStore {
        inner: InMemoryTaskStore,
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl TaskStore for GatedStore {
        async fn create_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
            self.inner.create_task(record).await
        }
        async fn delete_task(&self, task_id: TaskId) -> Result<(), StoreError> {
            self.inner.delete_task(task_id).await
        }
        async fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
            self.inner.update_task(record).await
        }
        async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
            self.inner.get_task(task_id).await
        }
        async fn list_group(&self, group_id: GroupId) -> Result<Vec<TaskRecord>, StoreError> {
            self.inner.list_group(group_id).await
        }
        async fn delete_group(&self, group_id: GroupId) -> Result<(), StoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.delete_group(group_id).await
        }
        async fn append_preview(&self, task_id: TaskId, message: &LogMessage) -> Result<(), StoreError> {
            self.inner.append_preview(task_id, message).await
        }
        async fn clear_preview(&self, task_id: TaskId) -> Result<(), StoreError> {
            self.inner.clear_preview(task_id).await
        }
        async fn list_preview(&self, task_id: TaskId) -> Result<Vec<PreviewLine>, StoreError> {
            self.inner.list_preview(task_id).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn group_under_removal_accepts_no_new_work() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let store = GatedStore {
            inner: InMemoryTaskStore::new(),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        };
        let dir = tempfile::tempdir().unwrap();
        let diagnostics = ScriptedDiagnostics::new().serve(tikv(0).address(), lines(3));
        let registry = Arc::new(TaskRegistry::new(
            FetchConfig::new(dir.path()),
            Arc::new(store),
            Arc::new(diagnostics),
        ));
        let group = registry.new_group_id();
        let queued = registry
            .create_task(tikv(0), SearchLogRequest::default(), group)
            .await
            .unwrap();

        let removal = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.remove_group(group).await })
        };
        entered.notified().await;

        // removal is parked inside the store
        assert!(matches!(
            registry
                .create_task(tikv(1), SearchLogRequest::default(), group)
                .await,
            Err(TaskError::InvalidOperation(_))
        ));
        assert!(registry.start_group(group).await.is_empty());
        assert!(matches!(
            registry.start(&queued),
            Err(TaskError::InvalidOperation(_))
        ));
        // a handle obtained before the removal cannot start either
        assert!(matches!(queued.start(), Err(TaskError::InvalidOperation(_))));

        release.notify_one();
        removal.await.unwrap().unwrap();

        assert!(registry.list_by_group(group).await.is_empty());
        assert!(!group_dir(dir.path(), group).exists());
        assert!(queued.start().is_err());

        // the marker is gone once removal finished
        registry
            .create_task(tikv(1), SearchLogRequest::default(), group)
            .await
            .unwrap();
    }
}
