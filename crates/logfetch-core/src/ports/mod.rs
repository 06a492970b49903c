//! Ports - 抽象化レイヤー
//!
//! 外部システム（タスクストア、リモートの診断エンドポイント、時刻、ID 生成）への
//! インターフェースを定義します。実装は `impls` もしくは別クレートに置きます。

pub mod clock;
pub mod diagnostics;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::diagnostics::{DiagnosticsClient, DiagnosticsConnection, DiagnosticsError, LogStream};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::{StoreError, TaskStore};
