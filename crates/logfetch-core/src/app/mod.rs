//! App - アプリケーション層
//!
//! ports を組み合わせてログ取得タスクを駆動します。
//!
//! # 主要コンポーネント
//! - **TaskRegistry**: グループ単位のタスク作成・参照・中断・削除
//! - **Task**: 1 コンポーネント分の取得（dial → stream → zip → finalize）
//! - **ArchiveSink**: zip アーカイブへの書き込み

pub mod registry;
pub mod sink;
pub mod task;

pub use self::registry::TaskRegistry;
pub use self::sink::{group_dir, ArchiveSink};
pub use self::task::{Task, TaskContext};
