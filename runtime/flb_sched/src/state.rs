//! Task lifecycle state machine.
//!
//! ```text
//!            resume                 fail
//!   WAIT ───────────────► RUN ───────────────► RUN_ERROR
//!    ▲  ◄───────────────   │                    │    ▲
//!    │      settle(idle)   │ complete     settle│    │resume
//!    │                     ▼                    ▼    │
//!    │                 COMPLETE             WAIT_ERROR
//!    │ fail                                     │ settle(no waits)
//!    └──────────────► WAIT_ERROR                ▼
//!                                             ERROR
//! ```
//!
//! `COMPLETE` and `ERROR` absorb every event. No event moves an erroneous
//! state back to a non-error one.

use std::fmt;

/// Lifecycle state of one task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Nothing running; blocked on registered waits (or abandoned).
    Wait,
    /// At least one segment running or queued.
    Run,
    /// Produced its value.
    Complete,
    /// Erroneous with nothing running and nothing outstanding.
    Error,
    /// Erroneous with segments still running.
    RunError,
    /// Erroneous with registered waits outstanding.
    WaitError,
}

/// Something that happened to a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskEvent {
    /// A segment was started or queued.
    Resume,
    /// Segment or wait counts changed.
    Settle { running: bool, waiting: bool },
    /// The task's value was delivered.
    Complete,
    /// An error was recorded against the task.
    Fail,
}

impl TaskState {
    pub(crate) fn next(self, event: TaskEvent) -> TaskState {
        use TaskEvent as E;
        use TaskState as S;
        match (self, event) {
            (S::Complete | S::Error, _) => self,

            (S::Wait | S::Run, E::Resume) => S::Run,
            (S::Wait | S::Run, E::Settle { running, .. }) => {
                if running {
                    S::Run
                } else {
                    S::Wait
                }
            }
            (S::Wait | S::Run, E::Complete) => S::Complete,
            (S::Run, E::Fail) => S::RunError,
            (S::Wait, E::Fail) => S::WaitError,

            (S::RunError | S::WaitError, E::Resume) => S::RunError,
            (S::RunError | S::WaitError, E::Settle { running, waiting }) => {
                if running {
                    S::RunError
                } else if waiting {
                    S::WaitError
                } else {
                    S::Error
                }
            }
            (S::RunError | S::WaitError, E::Complete | E::Fail) => self,
        }
    }

    /// True for the three erroneous states.
    pub fn is_error(self) -> bool {
        matches!(self, TaskState::Error | TaskState::RunError | TaskState::WaitError)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskState::Wait => "WAIT",
            TaskState::Run => "RUN",
            TaskState::Complete => "COMPLETE",
            TaskState::Error => "ERROR",
            TaskState::RunError => "RUN_ERROR",
            TaskState::WaitError => "WAIT_ERROR",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALL: [TaskState; 6] = [
        TaskState::Wait,
        TaskState::Run,
        TaskState::Complete,
        TaskState::Error,
        TaskState::RunError,
        TaskState::WaitError,
    ];

    fn all_events() -> Vec<TaskEvent> {
        let mut events = vec![TaskEvent::Resume, TaskEvent::Complete, TaskEvent::Fail];
        for running in [false, true] {
            for waiting in [false, true] {
                events.push(TaskEvent::Settle { running, waiting });
            }
        }
        events
    }

    #[test]
    fn test_errors_are_absorbing() {
        for state in ALL.into_iter().filter(|s| s.is_error()) {
            for event in all_events() {
                assert!(
                    state.next(event).is_error(),
                    "{state} --{event:?}--> {}",
                    state.next(event)
                );
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        for event in all_events() {
            assert_eq!(TaskState::Complete.next(event), TaskState::Complete);
            assert_eq!(TaskState::Error.next(event), TaskState::Error);
        }
    }

    #[test]
    fn test_error_settles_through_wait_error() {
        let state = TaskState::Run.next(TaskEvent::Fail);
        assert_eq!(state, TaskState::RunError);
        let state = state.next(TaskEvent::Settle {
            running: false,
            waiting: true,
        });
        assert_eq!(state, TaskState::WaitError);
        let state = state.next(TaskEvent::Resume);
        assert_eq!(state, TaskState::RunError);
        let state = state.next(TaskEvent::Settle {
            running: false,
            waiting: false,
        });
        assert_eq!(state, TaskState::Error);
    }

    #[test]
    fn test_run_wait_cycle() {
        let state = TaskState::Wait.next(TaskEvent::Resume);
        assert_eq!(state, TaskState::Run);
        let state = state.next(TaskEvent::Settle {
            running: false,
            waiting: true,
        });
        assert_eq!(state, TaskState::Wait);
        assert_eq!(state.next(TaskEvent::Complete), TaskState::Complete);
    }
}
