use crate::ai::AiError;
use crate::repo::RepoError;
use crate::store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Error taxonomy for engine operations.
///
/// Each variant maps to a stable wire code reported back to the initiating
/// connection via `ServerMessage::Error`. Collaborator failures after a
/// completed transition are not represented here; those are delivered as
/// facilitator-only `Error` events with `SUMMARIZE_FAILED` / `GROUP_FAILED`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("only the facilitator of this meeting can do that")]
    Unauthorized,

    #[error("display name '{0}' is already taken in this meeting")]
    DuplicateName(String),

    /// The backing store is unreachable. Fatal for the operation; the
    /// engine never substitutes default state for a failed read.
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("question is not open for answers")]
    QuestionClosed,

    #[error("reveal requested for a question that is no longer current")]
    StaleReveal,

    #[error("invalid phase transition: {0}")]
    InvalidTransition(String),

    #[error("connection is not admitted to any meeting")]
    UnknownConnection,

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("answer does not belong to this question: {0}")]
    AnswerNotFound(String),

    #[error("no AI collaborator is configured")]
    AiUnavailable,
}

impl EngineError {
    /// Stable wire code for `ServerMessage::Error`
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Unauthorized => "UNAUTHORIZED",
            EngineError::DuplicateName(_) => "DUPLICATE_NAME",
            EngineError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            EngineError::QuestionClosed => "QUESTION_CLOSED",
            EngineError::StaleReveal => "STALE_REVEAL",
            EngineError::InvalidTransition(_) => "INVALID_TRANSITION",
            EngineError::UnknownConnection => "UNKNOWN_CONNECTION",
            EngineError::GroupNotFound(_) => "GROUP_NOT_FOUND",
            EngineError::AnswerNotFound(_) => "ANSWER_NOT_FOUND",
            EngineError::AiUnavailable => "AI_UNAVAILABLE",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::StoreUnavailable(e.to_string())
    }
}

impl From<RepoError> for EngineError {
    fn from(e: RepoError) -> Self {
        EngineError::StoreUnavailable(e.to_string())
    }
}

/// Wire codes for collaborator failures reported to the facilitator group
pub const SUMMARIZE_FAILED: &str = "SUMMARIZE_FAILED";
pub const GROUP_FAILED: &str = "GROUP_FAILED";

/// Render a collaborator failure as a facilitator-facing message
pub fn collaborator_error_msg(e: &AiError) -> String {
    format!("AI collaborator failed: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::Unauthorized.code(), "UNAUTHORIZED");
        assert_eq!(
            EngineError::DuplicateName("Al".into()).code(),
            "DUPLICATE_NAME"
        );
        assert_eq!(EngineError::QuestionClosed.code(), "QUESTION_CLOSED");
        assert_eq!(EngineError::StaleReveal.code(), "STALE_REVEAL");
        assert_eq!(
            EngineError::AnswerNotFound("a1".into()).code(),
            "ANSWER_NOT_FOUND"
        );
    }

    #[test]
    fn store_errors_fail_loudly() {
        let err: EngineError = StoreError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
