//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: プロセス内の TaskStore
//! - **ScriptedDiagnostics**: 台本どおりにログを返す DiagnosticsClient
//!
//! 本番用の実装（SQLite ストア、gRPC の診断クライアントなど）は別クレートに置きます。

pub mod memory_store;
pub mod scripted_diagnostics;

pub use self::memory_store::InMemoryTaskStore;
pub use self::scripted_diagnostics::{ScriptedDiagnostics, StreamStep};
