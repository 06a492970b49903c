//! Diagnostics port - リモートコンポーネントのログ検索 RPC
//!
//! dial → search_log → recv のループで、時刻付きログのバッチを順に受け取ります。
//! キャンセルは呼び出し側（タスク）が future を drop することで行うため、
//! 実装は drop されても安全でなければなりません。

use async_trait::async_trait;

use crate::domain::{LogMessage, SearchLogRequest};

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("dial {address}: {reason}")]
    Dial { address: String, reason: String },

    #[error("open log stream: {0}")]
    Open(String),

    #[error("receive: {0}")]
    Receive(String),
}

#[async_trait]
pub trait DiagnosticsClient: Send + Sync {
    async fn dial(&self, address: &str) -> Result<Box<dyn DiagnosticsConnection>, DiagnosticsError>;
}

#[async_trait]
pub trait DiagnosticsConnection: Send + Sync {
    async fn search_log(
        &self,
        request: &SearchLogRequest,
    ) -> Result<Box<dyn LogStream>, DiagnosticsError>;
}

/// Ordered sequence of log batches.
#[async_trait]
pub trait LogStream: Send {
    /// `Ok(None)` signals a clean end of stream.
    async fn recv(&mut self) -> Result<Option<Vec<LogMessage>>, DiagnosticsError>;
}
