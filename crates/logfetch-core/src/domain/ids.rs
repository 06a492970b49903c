//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID
//! TaskId / GroupId はどちらも ULID を内部に持ち、Phantom type で型を区別します。
//!
//! - **時刻でソート可能**: 同じグループ内のタスクは作成順に並ぶ
//! - **分散生成可能**: 調整なしで生成できる
//! - Display は `task-<ulid>` / `group-<ulid>` 形式。GroupId の Display は
//!   アーカイブ保存先のディレクトリ名にもなる

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "task-", "group-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のサイズは Ulid と同じです。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Error returned when parsing an id from its display form.
#[derive(Debug, thiserror::Error)]
#[error("invalid id '{input}': expected '{prefix}<ulid>'")]
pub struct ParseIdError {
    input: String,
    prefix: &'static str,
}

/// Parses the display form (`task-<ulid>`) back into an id.
/// A bare ULID without the prefix is accepted too.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| ParseIdError {
                input: s.to_string(),
                prefix: T::prefix(),
            })
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Group のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {}

impl IdMarker for Group {
    fn prefix() -> &'static str {
        "group-"
    }
}

/// Identifier of one retrieval task (one component).
pub type TaskId = Id<Task>;

/// Identifier correlating the sibling tasks of one fetch request.
pub type GroupId = Id<Group>;
