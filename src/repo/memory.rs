use super::{MeetingRepo, RepoError, RepoResult};
use crate::types::{Answer, AnswerId, MeetingId, Participant, ParticipantId, QuestionId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    /// (meeting, display_name) -> participant
    participants: HashMap<(MeetingId, String), Participant>,
    questions: HashMap<QuestionId, String>,
    answers: HashMap<AnswerId, Answer>,
}

/// In-process stand-in for the external relational store.
/// Used for development and tests; production deployments would implement
/// `MeetingRepo` against the real database.
#[derive(Clone, Default)]
pub struct MemoryMeetingRepo {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryMeetingRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a question so answers can be recorded against it
    pub async fn add_question(&self, question_id: impl Into<QuestionId>, text: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.questions.insert(question_id.into(), text.into());
    }
}

#[async_trait]
impl MeetingRepo for MemoryMeetingRepo {
    async fn find_or_create_participant(
        &self,
        meeting_id: &MeetingId,
        display_name: &str,
    ) -> RepoResult<Participant> {
        let mut inner = self.inner.write().await;
        let key = (meeting_id.clone(), display_name.to_string());
        let participant = inner.participants.entry(key).or_insert_with(|| Participant {
            id: ulid::Ulid::new().to_string(),
            meeting_id: meeting_id.clone(),
            display_name: display_name.to_string(),
        });
        Ok(participant.clone())
    }

    async fn question_text(&self, question_id: &QuestionId) -> RepoResult<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.questions.get(question_id).cloned())
    }

    async fn save_answer(
        &self,
        question_id: &QuestionId,
        participant_id: &ParticipantId,
        text: String,
    ) -> RepoResult<Answer> {
        let mut inner = self.inner.write().await;
        let answer = Answer {
            id: ulid::Ulid::new().to_string(),
            question_id: question_id.clone(),
            participant_id: participant_id.clone(),
            text,
        };
        inner.answers.insert(answer.id.clone(), answer.clone());
        Ok(answer)
    }

    async fn delete_answer(&self, answer_id: &AnswerId) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .answers
            .remove(answer_id)
            .map(|_| ())
            .ok_or_else(|| RepoError::NotFound(format!("answer {answer_id}")))
    }

    async fn answers_for_question(&self, question_id: &QuestionId) -> RepoResult<Vec<Answer>> {
        let inner = self.inner.read().await;
        let mut answers: Vec<Answer> = inner
            .answers
            .values()
            .filter(|a| a.question_id == *question_id)
            .cloned()
            .collect();
        // Stable listing order for reveal broadcasts
        answers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(answers)
    }

    async fn answer_count(
        &self,
        question_id: &QuestionId,
        participant_id: &ParticipantId,
    ) -> RepoResult<usize> {
        let inner = self.inner.read().await;
        Ok(inner
            .answers
            .values()
            .filter(|a| a.question_id == *question_id && a.participant_id == *participant_id)
            .count())
    }
}
