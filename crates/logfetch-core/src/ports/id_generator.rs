//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{GroupId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はタスク・グループの ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから同時に使われる）
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_group_id(&self) -> GroupId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock の時刻を timestamp 部に使うので、FixedClock と組み合わせると
/// timestamp 部が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn generate_group_id(&self) -> GroupId {
        GroupId::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    #[test]
    fn task_ids_within_a_group_never_collide() {
        let id_gen = UlidGenerator::new(SystemClock);
        let ids: HashSet<TaskId> = (0..256).map(|_| id_gen.generate_task_id()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp_part() {
        let at = Utc.with_ymd_and_hms(2020, 4, 21, 14, 3, 5).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(at));

        let group = id_gen.generate_group_id();
        let task = id_gen.generate_task_id();

        assert_ne!(group.as_ulid(), task.as_ulid());
        for ulid in [group.as_ulid(), task.as_ulid()] {
            assert_eq!(ulid.timestamp_ms(), at.timestamp_millis() as u64);
        }
    }

    #[test]
    fn group_and_task_ids_have_their_prefixes() {
        let id_gen = UlidGenerator::new(SystemClock);

        assert!(id_gen.generate_task_id().to_string().starts_with("task-"));
        assert!(id_gen.generate_group_id().to_string().starts_with("group-"));
    }
}
