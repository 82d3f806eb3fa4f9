use thiserror::Error;

use crate::model::StartPayloadError;

/// Why the session is refusing user input right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    /// A finish request is outstanding.
    Finishing,
    /// A violation warning is blocking until the condition is remedied.
    Violation,
}

/// Errors surfaced by session transitions.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("exam session has not been started")]
    Uninitialized,
    #[error("no question is waiting for an answer")]
    NoCurrentQuestion,
    #[error("exam is locked: {0:?}")]
    InteractionLocked(LockReason),
    #[error("exam already completed")]
    Completed,
    #[error("the violation has not been resolved yet")]
    ViolationUnresolved,
    #[error(transparent)]
    StartPayload(#[from] StartPayloadError),
}
