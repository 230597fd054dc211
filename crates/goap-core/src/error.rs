use thiserror::Error;

use crate::ActionId;

/// Configuration errors surfaced while building a [`Domain`](crate::Domain).
///
/// These are the only recoverable errors in the workspace; every runtime
/// outcome is communicated through explicit status fields instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("action {0:?} is already registered")]
    DuplicateAction(ActionId),

    #[error("action {0:?} has an empty atom action set")]
    EmptyAtomSet(ActionId),

    #[error("action {0:?} precondition chain cycles back to its own effect")]
    PreconditionCycle(ActionId),
}
