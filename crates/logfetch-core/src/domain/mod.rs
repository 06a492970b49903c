//! Domain model (ids, components, log messages, task records, errors).

pub mod component;
pub mod errors;
pub mod ids;
pub mod log;
pub mod record;
pub mod state;

pub use self::component::{Component, ComponentKind};
pub use self::errors::{ErrorKind, TaskError};
pub use self::ids::{GroupId, TaskId};
pub use self::log::{LogLevel, LogMessage, SearchLogRequest};
pub use self::record::{PreviewLine, TaskRecord};
pub use self::state::TaskState;
