//! Session state store
//!
//! Ephemeral per-meeting key space holding phase, current question id,
//! participant set, answered set and timer deadline. The store is the
//! single source of truth for live state; no component above it caches.
//!
//! All mutators are idempotent so connections can retry after transient
//! failures. When the backing store is unreachable every operation fails
//! with `StoreError::Unavailable` -- callers must never treat that as
//! "empty state", which would corrupt counters.

mod memory;

pub use memory::MemorySessionStore;

use crate::types::{MeetingId, ParticipantId, Phase, QuestionId, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the zero-value session (`Waiting`, empty sets) for a meeting
    /// with no recorded state.
    async fn get(&self, meeting_id: &MeetingId) -> StoreResult<Session>;

    async fn set_phase(&self, meeting_id: &MeetingId, phase: Phase) -> StoreResult<()>;

    /// Setting a *different* question id clears the answered set; re-setting
    /// the current id is a no-op for `answered`.
    async fn set_current_question(
        &self,
        meeting_id: &MeetingId,
        question_id: QuestionId,
    ) -> StoreResult<()>;

    async fn add_participant(
        &self,
        meeting_id: &MeetingId,
        participant_id: ParticipantId,
    ) -> StoreResult<()>;

    async fn remove_participant(
        &self,
        meeting_id: &MeetingId,
        participant_id: &ParticipantId,
    ) -> StoreResult<()>;

    async fn mark_answered(
        &self,
        meeting_id: &MeetingId,
        participant_id: ParticipantId,
    ) -> StoreResult<()>;

    async fn unmark_answered(
        &self,
        meeting_id: &MeetingId,
        participant_id: &ParticipantId,
    ) -> StoreResult<()>;

    async fn clear_answered(&self, meeting_id: &MeetingId) -> StoreResult<()>;

    async fn set_timer(&self, meeting_id: &MeetingId, deadline: DateTime<Utc>) -> StoreResult<()>;

    async fn clear_timer(&self, meeting_id: &MeetingId) -> StoreResult<()>;

    /// Remove every key for the meeting. Subsequent `get`s see the
    /// zero-value session again.
    async fn clear(&self, meeting_id: &MeetingId) -> StoreResult<()>;
}
