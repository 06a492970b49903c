//! Task - 1 コンポーネント分のログ取得を最後まで駆動する
//!
//! # フロー
//! 1. start(): キャンセルトークンを設置して tokio タスクを spawn
//! 2. dial → search_log → sink 作成（ここまでの失敗は Queued → Canceled）
//! 3. レコードを Running にして Store に書き直す（delete → create）
//! 4. recv ループ: 各行をアーカイブへ、先頭 K 行はプレビューへ。バッチ毎に flush
//! 5. finalize(): どの経路でも 1 回だけ。失敗時は部分出力を削除して Canceled
//!
//! abort() は finalize 完了まで呼び出し側をブロックします。

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::sink::ArchiveSink;
use crate::config::FetchConfig;
use crate::domain::{GroupId, TaskError, TaskId, TaskRecord, TaskState};
use crate::ports::{Clock, DiagnosticsClient, StoreError, TaskStore};

/// Collaborators shared by every task of a registry.
pub struct TaskContext {
    pub store: Arc<dyn TaskStore>,
    pub diagnostics: Arc<dyn DiagnosticsClient>,
    pub clock: Arc<dyn Clock>,
    pub config: FetchConfig,
}

/// Abort/finalize handshake. Both sides touch it only under this lock, so an
/// abort racing with completion either sees `cancel == None` or gets signalled.
#[derive(Default)]
struct Control {
    started: bool,
    /// Set when the owning group is being removed. A retired task never starts.
    retired: bool,
    /// Present from start until finalize has run.
    cancel: Option<CancellationToken>,
    /// Pending abort callers. Allocated only when someone aborts.
    waiters: Vec<oneshot::Sender<()>>,
}

pub struct Task {
    id: TaskId,
    group_id: GroupId,
    record: tokio::sync::Mutex<TaskRecord>,
    control: Mutex<Control>,
    ctx: Arc<TaskContext>,
}

impl Task {
    pub fn new(record: TaskRecord, ctx: Arc<TaskContext>) -> Self {
        Self {
            id: record.task_id,
            group_id: record.group_id,
            record: tokio::sync::Mutex::new(record),
            control: Mutex::new(Control::default()),
            ctx,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Consistent snapshot of the live record.
    pub async fn record(&self) -> TaskRecord {
        self.record.lock().await.clone()
    }

    pub async fn state(&self) -> TaskState {
        self.record.lock().await.state
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the retrieval. A task can be started once.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, TaskError> {
        let token = {
            let mut control = self.control();
            if control.started {
                return Err(TaskError::InvalidOperation(format!(
                    "task [{}] was already started",
                    self.id
                )));
            }
            if control.retired {
                return Err(TaskError::InvalidOperation(format!(
                    "task [{}] belongs to a removed group",
                    self.id
                )));
            }
            let token = CancellationToken::new();
            control.started = true;
            control.cancel = Some(token.clone());
            token
        };

        let span = tracing::info_span!("log_task", task_id = %self.id, group_id = %self.group_id);
        let task = Arc::clone(self);
        Ok(tokio::spawn(async move { task.run(token).await }.instrument(span)))
    }

    /// Forbid any later start. Used by group removal before aborting.
    pub fn retire(&self) {
        self.control().retired = true;
    }

    /// Cancel a started task and wait until its cleanup has completed.
    ///
    /// Returns `NotRunning` for a task that was never started or has
    /// already been finalized; nothing is touched in that case.
    pub async fn abort(&self) -> Result<(), TaskError> {
        let (token, done) = {
            let mut control = self.control();
            let Some(token) = control.cancel.clone() else {
                return Err(TaskError::NotRunning(self.id));
            };
            let (tx, rx) = oneshot::channel();
            control.waiters.push(tx);
            (token, rx)
        };

        tracing::info!(task_id = %self.id, group_id = %self.group_id, "aborting task");
        token.cancel();
        // Err only if finalize can no longer run (the task panicked)
        let _ = done.await;
        Ok(())
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        if let Err(err) = self.execute(&token).await {
            self.record.lock().await.record_error(err.to_string());
        }
        self.finalize().await;
    }

    async fn execute(&self, token: &CancellationToken) -> Result<(), TaskError> {
        let ctx = &self.ctx;
        let (address, request, component) = {
            let record = self.record.lock().await;
            (
                record.component.address(),
                record.request.clone(),
                record.component.clone(),
            )
        };

        tracing::debug!(%address, "dialing component");
        let conn = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TaskError::Cancelled),
            res = ctx.diagnostics.dial(&address) => res.map_err(|e| TaskError::Setup(e.to_string()))?,
        };
        let mut stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TaskError::Cancelled),
            res = conn.search_log(&request) => res.map_err(|e| TaskError::Setup(e.to_string()))?,
        };

        let mut sink = ArchiveSink::create(&ctx.config.base_dir, self.group_id, &component)?;

        {
            let mut record = self.record.lock().await;
            record.saved_path = Some(sink.path().to_path_buf());
            record.mark_running(ctx.clock.now())?;
            ctx.store.delete_task(self.id).await?;
            ctx.store.create_task(&record).await?;
        }
        tracing::info!(%address, path = %sink.path().display(), "task running");

        let preview_limit = ctx.config.preview_limit;
        let mut previewed = 0usize;
        loop {
            let received = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(TaskError::Cancelled),
                res = stream.recv() => res.map_err(|e| TaskError::Stream(e.to_string()))?,
            };
            let Some(batch) = received else {
                break;
            };

            for msg in &batch {
                sink.write_line(&msg.to_line())?;
                if previewed < preview_limit {
                    ctx.store.append_preview(self.id, msg).await?;
                    previewed += 1;
                }
            }
            sink.flush()?;
            tracing::debug!(batch = batch.len(), lines = sink.lines_written(), "batch archived");
        }

        let lines = sink.lines_written();
        sink.finish()?;
        tracing::info!(lines, previewed, "log stream finished");
        Ok(())
    }

    /// Commit or roll back the task. Runs exactly once, after `execute` has
    /// dropped the sink and the stream.
    async fn finalize(&self) {
        {
            let mut record = self.record.lock().await;
            let now = self.ctx.clock.now();

            if record.has_error() {
                tracing::warn!(error = record.error.as_deref(), "task stopped with error");
                if let Some(path) = &record.saved_path {
                    match std::fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "failed to remove partial archive")
                        }
                    }
                }
                if let Err(e) = self.ctx.store.clear_preview(self.id).await {
                    tracing::warn!(error = %e, "failed to clear preview");
                }
                if let Err(e) = record.mark_canceled(now) {
                    tracing::warn!(error = %e, "unexpected state on cancel");
                }
            } else if let Err(e) = record.mark_finished(now) {
                tracing::warn!(error = %e, "unexpected state on finish");
            }

            match self.ctx.store.update_task(&record).await {
                Ok(()) => {}
                // the Running rewrite deleted the row but failed to recreate it
                Err(StoreError::NotFound(_)) => {
                    if let Err(e) = self.ctx.store.create_task(&record).await {
                        tracing::warn!(error = %e, "failed to persist final record");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to persist final record"),
            }
        }

        let waiters = {
            let mut control = self.control();
            control.cancel = None;
            std::mem::take(&mut control.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}
