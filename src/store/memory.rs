use super::{SessionStore, StoreResult};
use crate::types::{MeetingId, ParticipantId, Phase, QuestionId, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process session store.
///
/// Suits the single-owner deployment model: one process owns all live
/// sessions. Scaling out means swapping this for a shared store behind the
/// same trait; each mutator here is already a single atomic step under the
/// write lock, matching what a CAS loop against an external store provides.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<MeetingId, Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, meeting_id: &MeetingId) -> StoreResult<Session> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(meeting_id).cloned().unwrap_or_default())
    }

    async fn set_phase(&self, meeting_id: &MeetingId, phase: Phase) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(meeting_id.clone()).or_default().phase = phase;
        Ok(())
    }

    async fn set_current_question(
        &self,
        meeting_id: &MeetingId,
        question_id: QuestionId,
    ) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(meeting_id.clone()).or_default();
        if session.current_question_id.as_ref() != Some(&question_id) {
            session.answered.clear();
        }
        session.current_question_id = Some(question_id);
        Ok(())
    }

    async fn add_participant(
        &self,
        meeting_id: &MeetingId,
        participant_id: ParticipantId,
    ) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(meeting_id.clone())
            .or_default()
            .participants
            .insert(participant_id);
        Ok(())
    }

    async fn remove_participant(
        &self,
        meeting_id: &MeetingId,
        participant_id: &ParticipantId,
    ) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(meeting_id) {
            session.participants.remove(participant_id);
        }
        Ok(())
    }

    async fn mark_answered(
        &self,
        meeting_id: &MeetingId,
        participant_id: ParticipantId,
    ) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(meeting_id.clone())
            .or_default()
            .answered
            .insert(participant_id);
        Ok(())
    }

    async fn unmark_answered(
        &self,
        meeting_id: &MeetingId,
        participant_id: &ParticipantId,
    ) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(meeting_id) {
            session.answered.remove(participant_id);
        }
        Ok(())
    }

    async fn clear_answered(&self, meeting_id: &MeetingId) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(meeting_id) {
            session.answered.clear();
        }
        Ok(())
    }

    async fn set_timer(&self, meeting_id: &MeetingId, deadline: DateTime<Utc>) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(meeting_id.clone()).or_default().timer_deadline = Some(deadline);
        Ok(())
    }

    async fn clear_timer(&self, meeting_id: &MeetingId) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(meeting_id) {
            session.timer_deadline = None;
        }
        Ok(())
    }

    async fn clear(&self, meeting_id: &MeetingId) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(meeting_id);
        Ok(())
    }
}
