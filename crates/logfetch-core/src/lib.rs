//! logfetch-core
//!
//! クラスタの各コンポーネントからログを検索・取得するタスクのオーケストレーター。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, component, log, state, record, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, DiagnosticsClient, Clock, IdGenerator）
//! - **app**: タスクの実行とグループ管理（TaskRegistry, Task, ArchiveSink）
//! - **impls**: 実装（InMemoryTaskStore, ScriptedDiagnostics など開発用）
//! - **config**: 環境変数からの設定読み込み

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use crate::app::{Task, TaskRegistry};
pub use crate::config::{ConfigError, FetchConfig};
pub use crate::domain::{
    Component, ComponentKind, GroupId, LogLevel, LogMessage, SearchLogRequest, TaskError, TaskId,
    TaskRecord, TaskState,
};
