//! logfetch - ログ取得オーケストレーターのデモ
//!
//! 台本どおりにログを返す診断クライアントに対してグループを作り、
//! 進捗をポーリングしながら最終レコードとプレビューを JSON で出力します。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use logfetch_core::impls::{InMemoryTaskStore, ScriptedDiagnostics, StreamStep};
use logfetch_core::{
    Component, ComponentKind, FetchConfig, LogLevel, LogMessage, SearchLogRequest, TaskRegistry,
    TaskState,
};

#[derive(Debug, Parser)]
#[command(name = "logfetch", about = "Fetch logs from cluster components into zip archives")]
struct Cli {
    /// Target component, `kind@ip:port[:status_port]`. Repeatable.
    #[arg(long = "component", value_parser = parse_component, default_values_t = default_components())]
    components: Vec<Component>,

    /// Dial address that refuses connections (e.g. `10.0.0.2:20160`). Repeatable.
    #[arg(long = "refuse")]
    refused: Vec<String>,

    /// Log lines served by every component.
    #[arg(long, default_value_t = 1000)]
    lines: usize,

    /// Lines per streamed batch.
    #[arg(long, default_value_t = 128)]
    batch_size: usize,

    /// Pause between batches, in milliseconds.
    #[arg(long, default_value_t = 20)]
    batch_delay_ms: u64,

    /// Overrides LOGFETCH_PREVIEW_LIMIT.
    #[arg(long)]
    preview_limit: Option<usize>,

    /// Overrides LOGFETCH_DIR.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Abort the whole group after this many milliseconds.
    #[arg(long)]
    abort_after_ms: Option<u64>,

    /// Status polling interval, in milliseconds.
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Preview lines printed per task.
    #[arg(long, default_value_t = 5)]
    show: usize,

    /// Delete the group (records, previews and archives) before exiting.
    #[arg(long)]
    cleanup: bool,
}

fn default_components() -> Vec<Component> {
    vec![
        Component::new(ComponentKind::Tidb, "127.0.0.1", 4000, 10080),
        Component::new(ComponentKind::Tikv, "127.0.0.1", 20160, 20180),
        Component::new(ComponentKind::Pd, "127.0.0.1", 2379, 2379),
    ]
}

fn parse_component(s: &str) -> Result<Component, String> {
    let (kind, addr) = s
        .split_once('@')
        .ok_or_else(|| format!("expected kind@ip:port[:status_port], got '{s}'"))?;
    let kind = kind
        .parse::<ComponentKind>()
        .map_err(|e| e.to_string())?;

    let mut parts = addr.split(':');
    let ip = parts.next().filter(|ip| !ip.is_empty()).ok_or("missing ip")?;
    let port = parts
        .next()
        .ok_or("missing port")?
        .parse::<u16>()
        .map_err(|e| format!("invalid port: {e}"))?;
    let status_port = match parts.next() {
        Some(p) => p.parse::<u16>().map_err(|e| format!("invalid status port: {e}"))?,
        None => port,
    };
    if parts.next().is_some() {
        return Err(format!("too many ':' in '{addr}'"));
    }
    Ok(Component::new(kind, ip, port, status_port))
}

fn init_tracing() {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => {
            let level = std::env::var("LOGFETCH_LOG").unwrap_or_else(|_| "info".to_string());
            match level.parse::<tracing_subscriber::EnvFilter>() {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("invalid LOGFETCH_LOG '{level}' ({e}); falling back to info");
                    tracing_subscriber::EnvFilter::new("info")
                }
            }
        }
    };

    let json = std::env::var("LOGFETCH_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// 各コンポーネントに同じ件数のログを配る台本
fn script(cli: &Cli) -> ScriptedDiagnostics {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();
    let levels = [LogLevel::Info, LogLevel::Debug, LogLevel::Warn, LogLevel::Error];

    let mut diagnostics = ScriptedDiagnostics::new();
    for component in &cli.components {
        let address = component.address();
        if cli.refused.contains(&address) {
            diagnostics = diagnostics.refuse(address, "connection refused");
            continue;
        }

        let messages = (0..cli.lines)
            .map(|i| {
                LogMessage::new(
                    now + i as i64,
                    levels[i % levels.len()],
                    format!("[{}] demo line {i}", component.kind),
                )
            })
            .collect();
        let mut steps = Vec::new();
        for step in StreamStep::batches(messages, cli.batch_size) {
            steps.push(step);
            steps.push(StreamStep::Delay(Duration::from_millis(cli.batch_delay_ms)));
        }
        diagnostics = diagnostics.serve(address, steps);
    }
    diagnostics
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if cli.batch_size == 0 {
        bail!("--batch-size must be greater than zero");
    }

    let mut config = FetchConfig::from_env().context("loading configuration")?;
    if let Some(dir) = cli.base_dir.clone() {
        config.base_dir = dir;
    }
    if let Some(limit) = cli.preview_limit {
        config = config.with_preview_limit(limit)?;
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_dir = %config.base_dir.display(),
        preview_limit = config.preview_limit,
        "logfetch starting"
    );

    let registry = TaskRegistry::new(
        config,
        Arc::new(InMemoryTaskStore::new()),
        Arc::new(script(&cli)),
    );

    let (group_id, tasks) = registry
        .create_group(cli.components.clone(), SearchLogRequest::default())
        .await?;
    let handles = registry.start_group(group_id).await;

    let started = Instant::now();
    let mut aborted = false;
    loop {
        let records = registry.list_by_group(group_id).await;
        let running = records.iter().filter(|r| r.state == TaskState::Running).count();
        let done = records.iter().filter(|r| r.state.is_terminal()).count();
        info!(%group_id, running, done, total = records.len(), "polling");
        if done == records.len() {
            break;
        }

        if let Some(ms) = cli.abort_after_ms {
            if !aborted && started.elapsed() >= Duration::from_millis(ms) {
                let n = registry.abort_group(group_id).await;
                info!(%group_id, aborted = n, "group aborted");
                aborted = true;
                continue;
            }
        }
        tokio::time::sleep(Duration::from_millis(cli.poll_ms)).await;
    }

    for handle in handles {
        handle.await.context("task panicked")?;
    }

    for record in registry.list_by_group(group_id).await {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    for task in &tasks {
        let preview = registry.preview(group_id, task.id()).await?;
        info!(task_id = %task.id(), rows = preview.len(), "preview");
        for row in preview.iter().take(cli.show) {
            println!("{}", serde_json::to_string(row)?);
        }
    }

    if cli.cleanup {
        registry.remove_group(group_id).await?;
    }
    Ok(())
}
