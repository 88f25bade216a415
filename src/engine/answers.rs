//! Answer submission tracking
//!
//! Records *that* a participant answered the current question; the answer
//! text itself is a durable-store concern. The answered set feeds the
//! progress counters broadcast to everyone.

use super::Engine;
use crate::error::{EngineError, EngineResult};
use crate::protocol::ServerMessage;
use crate::rooms::Scope;
use crate::types::*;

impl Engine {
    /// Record an answer for the current question.
    ///
    /// Rejected with `QuestionClosed` unless the session is answering this
    /// exact question, which keeps post-reveal submissions from tampering
    /// with progress counters. Repeat submissions under multi-answer mode
    /// collapse into a single `answered` membership.
    pub async fn submit_answer(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
        text: String,
    ) -> EngineResult<Answer> {
        let ctx = self.participant_ctx(connection_id).await?;
        let meeting_id = ctx.meeting_id;
        let Some(participant_id) = ctx.participant_id else {
            return Err(EngineError::Unauthorized);
        };

        let lock = self.meeting_lock(&meeting_id).await;
        let _guard = lock.lock().await;

        let session = self.sessions.get(&meeting_id).await?;
        if session.phase != Phase::Answering
            || session.current_question_id.as_ref() != Some(&question_id)
        {
            return Err(EngineError::QuestionClosed);
        }

        let answer = self
            .repo
            .save_answer(&question_id, &participant_id, text)
            .await?;

        self.sessions
            .mark_answered(&meeting_id, participant_id)
            .await?;
        self.broadcast_progress(&meeting_id).await?;

        Ok(answer)
    }

    /// Delete one of the caller's answers (multi-answer mode).
    ///
    /// The participant leaves `answered` only when no answers remain for
    /// the question; unconditionally unmarking would undercount a
    /// participant who retracted one of several answers.
    pub async fn retract_answer(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
        answer_id: AnswerId,
    ) -> EngineResult<()> {
        let ctx = self.participant_ctx(connection_id).await?;
        let meeting_id = ctx.meeting_id;
        let Some(participant_id) = ctx.participant_id else {
            return Err(EngineError::Unauthorized);
        };

        let lock = self.meeting_lock(&meeting_id).await;
        let _guard = lock.lock().await;

        let session = self.sessions.get(&meeting_id).await?;
        if session.phase != Phase::Answering
            || session.current_question_id.as_ref() != Some(&question_id)
        {
            return Err(EngineError::QuestionClosed);
        }

        // Only the author may retract
        let owned = self
            .repo
            .answers_for_question(&question_id)
            .await?
            .iter()
            .any(|a| a.id == answer_id && a.participant_id == participant_id);
        if !owned {
            return Err(EngineError::Unauthorized);
        }

        self.repo.delete_answer(&answer_id).await?;

        let remaining = self.repo.answer_count(&question_id, &participant_id).await?;
        if remaining == 0 {
            self.sessions
                .unmark_answered(&meeting_id, &participant_id)
                .await?;
        }
        self.broadcast_progress(&meeting_id).await?;

        Ok(())
    }

    async fn broadcast_progress(&self, meeting_id: &MeetingId) -> EngineResult<()> {
        let session = self.sessions.get(meeting_id).await?;
        self.router
            .publish(
                meeting_id,
                Scope::All,
                ServerMessage::AnswerProgress {
                    answered_count: session.answered.len(),
                    total_count: session.participants.len(),
                },
            )
            .await;
        Ok(())
    }
}
