#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-tick status of an atom step (forward or compensating).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Running,
    Success,
    Failure,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionStatus::Running)
    }
}

/// Status of one planning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RequestStatus {
    /// The search tree is still expanding.
    Running,
    /// A plan was found; `PlanRequest::actions` holds it leaf-first.
    Success,
    /// Search (including the fallback goals, if any) or execution failed.
    Failed,
}

/// Terminal outcome of a whole plan request, planning and execution
/// included. Read once by the owning agent, then cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PlanOutcome {
    Success,
    Failure,
}
