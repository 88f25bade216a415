mod answers;
mod grouping;
mod lifecycle;
mod question;

pub use lifecycle::Admission;

use crate::ai::Summarizer;
use crate::error::{EngineError, EngineResult};
use crate::repo::MeetingRepo;
use crate::rooms::RoomRouter;
use crate::store::SessionStore;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Session coordination engine.
///
/// Cheap to clone; all fields are shared handles. One instance owns every
/// live session in the process. The AI collaborator is optional: without it
/// reveals still complete, only summaries and AI groupings are unavailable.
#[derive(Clone)]
pub struct Engine {
    pub sessions: Arc<dyn SessionStore>,
    pub repo: Arc<dyn MeetingRepo>,
    pub router: RoomRouter,
    pub ai: Option<Arc<dyn Summarizer>>,
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionContext>>>,
    groupings: Arc<RwLock<HashMap<QuestionId, MeetingGrouping>>>,
    /// Per-meeting mutation locks. Every compound read-modify-broadcast
    /// sequence for one meeting runs under its lock, so concurrent joins,
    /// answers and phase changes never produce a lost update. Never held
    /// across a collaborator call.
    meeting_locks: Arc<Mutex<HashMap<MeetingId, Arc<Mutex<()>>>>>,
}

/// Grouping state tagged with its owning meeting so `end_meeting` can
/// discard it.
#[derive(Debug, Clone)]
pub(crate) struct MeetingGrouping {
    pub meeting_id: MeetingId,
    pub grouping: Grouping,
}

impl Engine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        repo: Arc<dyn MeetingRepo>,
        ai: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        Self {
            sessions,
            repo,
            router: RoomRouter::new(),
            ai,
            connections: Arc::new(RwLock::new(HashMap::new())),
            groupings: Arc::new(RwLock::new(HashMap::new())),
            meeting_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) async fn meeting_lock(&self, meeting_id: &MeetingId) -> Arc<Mutex<()>> {
        let mut locks = self.meeting_locks.lock().await;
        locks
            .entry(meeting_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) async fn drop_meeting_lock(&self, meeting_id: &MeetingId) {
        let mut locks = self.meeting_locks.lock().await;
        locks.remove(meeting_id);
    }

    pub async fn connection(&self, connection_id: &ConnectionId) -> Option<ConnectionContext> {
        let connections = self.connections.read().await;
        connections.get(connection_id).cloned()
    }

    pub(crate) async fn register_connection(&self, ctx: ConnectionContext) {
        let mut connections = self.connections.write().await;
        connections.insert(ctx.connection_id.clone(), ctx);
    }

    pub(crate) async fn unregister_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<ConnectionContext> {
        let mut connections = self.connections.write().await;
        connections.remove(connection_id)
    }

    /// True when a currently-connected participant of the meeting holds
    /// this exact display name (case-sensitive)
    pub(crate) async fn name_in_use(&self, meeting_id: &MeetingId, display_name: &str) -> bool {
        let connections = self.connections.read().await;
        connections.values().any(|ctx| {
            ctx.role == Role::Participant
                && ctx.meeting_id == *meeting_id
                && ctx.display_name.as_deref() == Some(display_name)
        })
    }

    /// Authorization gate for facilitator commands: the connection must have
    /// been admitted via `admit_facilitator` for this exact meeting.
    pub(crate) async fn facilitator_ctx(
        &self,
        connection_id: &ConnectionId,
    ) -> EngineResult<ConnectionContext> {
        let ctx = self
            .connection(connection_id)
            .await
            .ok_or(EngineError::UnknownConnection)?;
        if ctx.role != Role::Facilitator {
            return Err(EngineError::Unauthorized);
        }
        Ok(ctx)
    }

    pub(crate) async fn participant_ctx(
        &self,
        connection_id: &ConnectionId,
    ) -> EngineResult<ConnectionContext> {
        let ctx = self
            .connection(connection_id)
            .await
            .ok_or(EngineError::UnknownConnection)?;
        if ctx.role != Role::Participant || ctx.participant_id.is_none() {
            return Err(EngineError::Unauthorized);
        }
        Ok(ctx)
    }

    pub(crate) async fn grouping_for(&self, question_id: &QuestionId) -> Option<Grouping> {
        let groupings = self.groupings.read().await;
        groupings.get(question_id).map(|g| g.grouping.clone())
    }

    pub(crate) async fn store_grouping(&self, meeting_id: &MeetingId, grouping: Grouping) {
        let mut groupings = self.groupings.write().await;
        groupings.insert(
            grouping.question_id.clone(),
            MeetingGrouping {
                meeting_id: meeting_id.clone(),
                grouping,
            },
        );
    }

    pub(crate) async fn drop_groupings(&self, meeting_id: &MeetingId) {
        let mut groupings = self.groupings.write().await;
        groupings.retain(|_, g| g.meeting_id != *meeting_id);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ai::{AiError, AiResult, GroupingProposal, Summarizer};
    use crate::repo::MemoryMeetingRepo;
    use crate::store::MemorySessionStore;
    use async_trait::async_trait;

    /// Engine wired to in-memory collaborators, with direct handles kept
    /// for test setup
    pub(crate) fn engine() -> (Engine, Arc<MemoryMeetingRepo>) {
        let repo = Arc::new(MemoryMeetingRepo::new());
        let engine = Engine::new(Arc::new(MemorySessionStore::new()), repo.clone(), None);
        (engine, repo)
    }

    pub(crate) fn engine_with_ai(ai: Arc<dyn Summarizer>) -> (Engine, Arc<MemoryMeetingRepo>) {
        let repo = Arc::new(MemoryMeetingRepo::new());
        let engine = Engine::new(
            Arc::new(MemorySessionStore::new()),
            repo.clone(),
            Some(ai),
        );
        (engine, repo)
    }

    /// Collaborator stub with canned results
    pub(crate) struct StubAi {
        pub summary: AiResult<String>,
        pub proposal: AiResult<GroupingProposal>,
    }

    impl StubAi {
        pub(crate) fn ok(summary: &str, proposal: GroupingProposal) -> Self {
            Self {
                summary: Ok(summary.to_string()),
                proposal: Ok(proposal),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                summary: Err(AiError::ApiError("boom".into())),
                proposal: Err(AiError::ApiError("boom".into())),
            }
        }
    }

    #[async_trait]
    impl Summarizer for StubAi {
        async fn summarize(&self, _question: &str, _answers: &[Answer]) -> AiResult<String> {
            match &self.summary {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(AiError::ApiError(e.to_string())),
            }
        }

        async fn group_answers(
            &self,
            _question: &str,
            _answers: &[Answer],
        ) -> AiResult<GroupingProposal> {
            match &self.proposal {
                Ok(p) => Ok(p.clone()),
                Err(e) => Err(AiError::ApiError(e.to_string())),
            }
        }
    }
}
