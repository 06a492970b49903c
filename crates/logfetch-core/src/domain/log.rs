//! Log messages as delivered by the diagnostics stream, and their archive
//! line rendering.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp layout of an archive line, e.g. `2020/04/21 14:03:05.123 +08:00`.
pub const TIMESTAMP_LAYOUT: &str = "%Y/%m/%d %H:%M:%S%.3f %:z";

/// Log level. Discriminants match the diagnostics protocol's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Unknown = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Trace = 4,
    Critical = 5,
    Error = 6,
}

impl LogLevel {
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Unknown => "UNKNOWN",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Trace => "TRACE",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Error => "ERROR",
        }
    }

    /// Out-of-range codes map to `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Trace,
            5 => LogLevel::Critical,
            6 => LogLevel::Error,
            _ => LogLevel::Unknown,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One log line received from a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Milliseconds since the Unix epoch.
    pub time_millis: i64,
    pub level: LogLevel,
    pub message: String,
}

impl LogMessage {
    pub fn new(time_millis: i64, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            time_millis,
            level,
            message: message.into(),
        }
    }

    /// Archive line in the local time zone.
    pub fn to_line(&self) -> String {
        self.to_line_in(&Local)
    }

    /// `[<timestamp>] [<LEVEL>] <message>\n` rendered in `tz`.
    pub fn to_line_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        // 範囲外の時刻は epoch として扱う
        let utc = DateTime::from_timestamp_millis(self.time_millis).unwrap_or_default();
        let time = utc.with_timezone(tz).format(TIMESTAMP_LAYOUT);
        format!("[{}] [{}] {}\n", time, self.level, self.message)
    }
}

/// Log-search parameters forwarded untouched to the diagnostics endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLogRequest {
    /// Inclusive lower bound, epoch millis.
    pub start_time: i64,
    /// Exclusive upper bound, epoch millis. Zero means unbounded.
    pub end_time: i64,
    /// Levels to keep. Empty keeps every level.
    pub levels: Vec<LogLevel>,
    /// Regular expressions the message must match. Evaluated remotely.
    pub patterns: Vec<String>,
}
