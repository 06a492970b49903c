//! Task state machine.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Queued -> Running -> Finished
/// - Queued -> Running -> Canceled (stream/sink failure or abort)
/// - Queued -> Canceled (dial, stream open or sink creation failed)
///
/// Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Created, not yet streaming.
    Queued,

    /// Stream and sink are open; lines are being archived.
    Running,

    /// Stream ended cleanly and the archive is complete.
    Finished,

    /// Failed or aborted. Partial output has been removed.
    Canceled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Canceled)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Queued, TaskState::Running)
                | (TaskState::Queued, TaskState::Canceled)
                | (TaskState::Running, TaskState::Finished)
                | (TaskState::Running, TaskState::Canceled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskState::Queued, TaskState::Running, true)]
    #[case(TaskState::Queued, TaskState::Canceled, true)]
    #[case(TaskState::Queued, TaskState::Finished, false)]
    #[case(TaskState::Running, TaskState::Finished, true)]
    #[case(TaskState::Running, TaskState::Canceled, true)]
    #[case(TaskState::Running, TaskState::Queued, false)]
    #[case(TaskState::Finished, TaskState::Canceled, false)]
    #[case(TaskState::Canceled, TaskState::Running, false)]
    fn transitions(#[case] from: TaskState, #[case] to: TaskState, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Finished.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
    }
}
