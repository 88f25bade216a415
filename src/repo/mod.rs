//! Durable store boundary
//!
//! Meetings, questions, answers and participant identities live in an
//! external relational store. The engine reaches it only through this
//! trait: participant find-or-create on admission, answer CRUD on
//! submit/retract, and answer listings for reveal and grouping.

mod memory;

pub use memory::MemoryMeetingRepo;

use crate::types::{Answer, AnswerId, MeetingId, Participant, ParticipantId, QuestionId};
use async_trait::async_trait;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("durable store unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait MeetingRepo: Send + Sync {
    /// Reuse the durable identity for `(meeting, display_name)` when it
    /// exists, otherwise mint one. Reconnecting participants keep their id.
    async fn find_or_create_participant(
        &self,
        meeting_id: &MeetingId,
        display_name: &str,
    ) -> RepoResult<Participant>;

    /// Prompt text of a question, used by the AI collaborator calls
    async fn question_text(&self, question_id: &QuestionId) -> RepoResult<Option<String>>;

    async fn save_answer(
        &self,
        question_id: &QuestionId,
        participant_id: &ParticipantId,
        text: String,
    ) -> RepoResult<Answer>;

    async fn delete_answer(&self, answer_id: &AnswerId) -> RepoResult<()>;

    async fn answers_for_question(&self, question_id: &QuestionId) -> RepoResult<Vec<Answer>>;

    /// How many answers this participant still holds for the question.
    /// Retraction unmarks progress only when this reaches zero.
    async fn answer_count(
        &self,
        question_id: &QuestionId,
        participant_id: &ParticipantId,
    ) -> RepoResult<usize>;
}
