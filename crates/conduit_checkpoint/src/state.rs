//! Run state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// State of one sync run.
///
/// ```text
/// NotStarted ─► Fetching ─┬─► Fetching
///                         ├─► Completed
///                         ├─► Failed
///                         └─► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, nothing fetched yet.
    NotStarted,
    /// Fetching pages.
    Fetching,
    /// All pages fetched.
    Completed,
    /// Stopped by an error.
    Failed,
    /// Stopped on request.
    Cancelled,
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid run state transition from {from} to {to}")]
pub struct InvalidTransition {
    /// Current state.
    pub from: RunState,
    /// Attempted target state.
    pub to: RunState,
}

impl RunState {
    /// Returns true if the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }

    /// Returns true if moving to `to` is allowed.
    pub fn can_transition_to(&self, to: RunState) -> bool {
        matches!(
            (self, to),
            (RunState::NotStarted, RunState::Fetching)
                | (
                    RunState::Fetching,
                    RunState::Fetching | RunState::Completed | RunState::Failed | RunState::Cancelled
                )
        )
    }

    /// Moves to `to`, or reports the invalid transition.
    pub fn transition(self, to: RunState) -> Result<RunState, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::NotStarted => "not_started",
            RunState::Fetching => "fetching",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
