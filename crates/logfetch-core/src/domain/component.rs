//! Cluster component addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a cluster component. Selects which port is dialed and names the
/// log entry inside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Tidb,
    Tikv,
    Pd,
    Tiflash,
}

impl ComponentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Tidb => "tidb",
            ComponentKind::Tikv => "tikv",
            ComponentKind::Pd => "pd",
            ComponentKind::Tiflash => "tiflash",
        }
    }

    /// SQL nodes serve diagnostics on their status port, not the client port.
    pub fn dials_status_port(self) -> bool {
        matches!(self, ComponentKind::Tidb)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown component kind '{0}'")]
pub struct UnknownKind(String);

impl std::str::FromStr for ComponentKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tidb" => Ok(ComponentKind::Tidb),
            "tikv" => Ok(ComponentKind::Tikv),
            "pd" => Ok(ComponentKind::Pd),
            "tiflash" => Ok(ComponentKind::Tiflash),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// Target of one retrieval task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub kind: ComponentKind,
    pub ip: String,
    pub port: u16,
    pub status_port: u16,
}

impl Component {
    pub fn new(kind: ComponentKind, ip: impl Into<String>, port: u16, status_port: u16) -> Self {
        Self {
            kind,
            ip: ip.into(),
            port,
            status_port,
        }
    }

    /// `host:port` the diagnostics client dials.
    pub fn address(&self) -> String {
        let port = if self.kind.dials_status_port() {
            self.status_port
        } else {
            self.port
        };
        format!("{}:{}", self.ip, port)
    }

    /// Archive file name. Always uses the client port so that two components
    /// on one host never collide.
    pub fn archive_file_name(&self) -> String {
        format!("{}-{}.zip", self.ip, self.port)
    }

    /// Name of the single entry inside the archive.
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.kind)
    }
}

/// `kind@ip:port:status_port`
impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}:{}", self.kind, self.ip, self.port, self.status_port)
    }
}
