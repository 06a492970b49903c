//! ScriptedDiagnostics - 台本どおりに振る舞う DiagnosticsClient
//!
//! アドレスごとに「dial 失敗」「stream open 失敗」「バッチ列を返す」などの
//! 振る舞いを登録しておき、テストやデモで本物のクラスタの代わりに使います。
//!
//! # 使用例
//! ```ignore
//! let client = ScriptedDiagnostics::new()
//!     .serve("10.0.0.1:20160", vec![StreamStep::Batch(msgs)])
//!     .refuse("10.0.0.2:20160", "connection refused");
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{LogMessage, SearchLogRequest};
use crate::ports::{DiagnosticsClient, DiagnosticsConnection, DiagnosticsError, LogStream};

/// One step of a scripted log stream.
#[derive(Debug, Clone)]
pub enum StreamStep {
    Batch(Vec<LogMessage>),
    /// Sleep before the next step.
    Delay(Duration),
    /// `recv` fails with this reason.
    Fail(String),
    /// `recv` never completes. Only cancellation gets the task out.
    Hang,
}

impl StreamStep {
    /// Split `messages` into `Batch` steps of at most `batch_size` lines.
    pub fn batches(messages: Vec<LogMessage>, batch_size: usize) -> Vec<StreamStep> {
        messages
            .chunks(batch_size.max(1))
            .map(|chunk| StreamStep::Batch(chunk.to_vec()))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Endpoint {
    Serve(Vec<StreamStep>),
    RefuseDial(String),
    HangDial,
    RejectSearch(String),
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedDiagnostics {
    endpoints: HashMap<String, Endpoint>,
}

impl ScriptedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream `steps` to every search against `address`. The stream ends
    /// cleanly once the steps run out.
    pub fn serve(mut self, address: impl Into<String>, steps: Vec<StreamStep>) -> Self {
        self.endpoints.insert(address.into(), Endpoint::Serve(steps));
        self
    }

    pub fn refuse(mut self, address: impl Into<String>, reason: impl Into<String>) -> Self {
        self.endpoints
            .insert(address.into(), Endpoint::RefuseDial(reason.into()));
        self
    }

    /// Dialing `address` never completes.
    pub fn hang_dial(mut self, address: impl Into<String>) -> Self {
        self.endpoints.insert(address.into(), Endpoint::HangDial);
        self
    }

    pub fn reject_search(mut self, address: impl Into<String>, reason: impl Into<String>) -> Self {
        self.endpoints
            .insert(address.into(), Endpoint::RejectSearch(reason.into()));
        self
    }
}

#[async_trait]
impl DiagnosticsClient for ScriptedDiagnostics {
    async fn dial(&self, address: &str) -> Result<Box<dyn DiagnosticsConnection>, DiagnosticsError> {
        match self.endpoints.get(address) {
            None => Err(DiagnosticsError::Dial {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            }),
            Some(Endpoint::RefuseDial(reason)) => Err(DiagnosticsError::Dial {
                address: address.to_string(),
                reason: reason.clone(),
            }),
            Some(Endpoint::HangDial) => std::future::pending().await,
            Some(endpoint) => Ok(Box::new(ScriptedConnection {
                endpoint: endpoint.clone(),
            })),
        }
    }
}

struct ScriptedConnection {
    endpoint: Endpoint,
}

#[async_trait]
impl DiagnosticsConnection for ScriptedConnection {
    async fn search_log(
        &self,
        _request: &SearchLogRequest,
    ) -> Result<Box<dyn LogStream>, DiagnosticsError> {
        match &self.endpoint {
            Endpoint::Serve(steps) => Ok(Box::new(ScriptedStream {
                steps: steps.iter().cloned().collect(),
            })),
            Endpoint::RejectSearch(reason) => Err(DiagnosticsError::Open(reason.clone())),
            // dial 側で処理済み
            Endpoint::RefuseDial(reason) => Err(DiagnosticsError::Open(reason.clone())),
            Endpoint::HangDial => std::future::pending().await,
        }
    }
}

struct ScriptedStream {
    steps: VecDeque<StreamStep>,
}

#[async_trait]
impl LogStream for ScriptedStream {
    async fn recv(&mut self) -> Result<Option<Vec<LogMessage>>, DiagnosticsError> {
        loop {
            match self.steps.pop_front() {
                None => return Ok(None),
                Some(StreamStep::Batch(batch)) => return Ok(Some(batch)),
                Some(StreamStep::Delay(d)) => tokio::time::sleep(d).await,
                Some(StreamStep::Fail(reason)) => return Err(DiagnosticsError::Receive(reason)),
                Some(StreamStep::Hang) => {
                    self.steps.push_front(StreamStep::Hang);
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}
