//! Connection lifecycle: admission, identity tagging, disconnects

use super::Engine;
use crate::error::{EngineError, EngineResult};
use crate::protocol::{ServerMessage, SessionView};
use crate::rooms::Scope;
use crate::types::*;
use tokio::sync::broadcast;

/// Everything a freshly admitted connection needs: its id, the session
/// snapshot (the read-your-writes baseline; there is no broadcast replay),
/// and its group memberships.
#[derive(Debug)]
pub struct Admission {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub meeting_id: MeetingId,
    pub session: SessionView,
    pub participant: Option<Participant>,
    pub events: broadcast::Receiver<ServerMessage>,
    /// Facilitator admissions only
    pub facilitator_events: Option<broadcast::Receiver<ServerMessage>>,
}

impl Engine {
    /// Admit a connection as the facilitator of a meeting.
    ///
    /// Joins the "all" and facilitator-only groups and returns the current
    /// session snapshot to this connection only. No session mutation
    /// happens here, so a facilitator reconnect never resets live state,
    /// and re-admission is a plain state refresh.
    ///
    /// Subscriptions and the snapshot are taken together under the meeting
    /// lock; since every mutator publishes under the same lock, each event
    /// is either reflected in the snapshot or delivered through the
    /// receiver, never dropped between the two.
    pub async fn admit_facilitator(&self, meeting_id: MeetingId) -> EngineResult<Admission> {
        let lock = self.meeting_lock(&meeting_id).await;
        let (session, events, facilitator_events) = {
            let _guard = lock.lock().await;
            let events = self.router.subscribe(&meeting_id, Scope::All).await;
            let facilitator_events = self.router.subscribe(&meeting_id, Scope::Facilitators).await;
            let session = self.sessions.get(&meeting_id).await?;
            (session, events, facilitator_events)
        };

        let connection_id = ulid::Ulid::new().to_string();

        self.register_connection(ConnectionContext {
            connection_id: connection_id.clone(),
            role: Role::Facilitator,
            meeting_id: meeting_id.clone(),
            participant_id: None,
            display_name: None,
        })
        .await;

        tracing::info!(%meeting_id, %connection_id, "facilitator admitted");

        Ok(Admission {
            connection_id,
            role: Role::Facilitator,
            meeting_id,
            session: SessionView::from(&session),
            participant: None,
            events,
            facilitator_events: Some(facilitator_events),
        })
    }

    /// Admit a connection as a named participant.
    ///
    /// Display name is the facilitator-visible identity, so an exact
    /// (case-sensitive) clash with an actively connected participant is a
    /// hard `DuplicateName` rejection. A participant reconnecting after a
    /// drop reuses their durable identity; `add_participant` is a
    /// set-union, so re-admission never duplicates the membership.
    pub async fn admit_participant(
        &self,
        meeting_id: MeetingId,
        display_name: String,
    ) -> EngineResult<Admission> {
        let lock = self.meeting_lock(&meeting_id).await;
        let _guard = lock.lock().await;

        if self.name_in_use(&meeting_id, &display_name).await {
            return Err(EngineError::DuplicateName(display_name));
        }

        let participant = self
            .repo
            .find_or_create_participant(&meeting_id, &display_name)
            .await?;

        self.sessions
            .add_participant(&meeting_id, participant.id.clone())
            .await?;
        let session = self.sessions.get(&meeting_id).await?;

        let connection_id = ulid::Ulid::new().to_string();
        let events = self.router.subscribe(&meeting_id, Scope::All).await;

        self.register_connection(ConnectionContext {
            connection_id: connection_id.clone(),
            role: Role::Participant,
            meeting_id: meeting_id.clone(),
            participant_id: Some(participant.id.clone()),
            display_name: Some(display_name),
        })
        .await;

        self.router
            .publish(
                &meeting_id,
                Scope::All,
                ServerMessage::ParticipantJoined {
                    count: session.participants.len(),
                },
            )
            .await;

        tracing::info!(
            %meeting_id,
            %connection_id,
            participant_id = %participant.id,
            "participant admitted"
        );

        Ok(Admission {
            connection_id,
            role: Role::Participant,
            meeting_id,
            session: SessionView::from(&session),
            participant: Some(participant),
            events,
            facilitator_events: None,
        })
    }

    /// Handle a graceful or abrupt disconnect.
    ///
    /// Participants leave the `participants` set but stay in `answered`: a
    /// participant who answered and then dropped still counts as answered
    /// for the current question. Facilitator disconnects mutate nothing.
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> EngineResult<()> {
        let Some(ctx) = self.unregister_connection(connection_id).await else {
            return Ok(());
        };

        if ctx.role != Role::Participant {
            tracing::info!(meeting_id = %ctx.meeting_id, %connection_id, "facilitator disconnected");
            return Ok(());
        }

        let lock = self.meeting_lock(&ctx.meeting_id).await;
        let _guard = lock.lock().await;

        if let Some(participant_id) = &ctx.participant_id {
            self.sessions
                .remove_participant(&ctx.meeting_id, participant_id)
                .await?;
        }
        let session = self.sessions.get(&ctx.meeting_id).await?;

        self.router
            .publish(
                &ctx.meeting_id,
                Scope::All,
                ServerMessage::ParticipantLeft {
                    count: session.participants.len(),
                },
            )
            .await;

        tracing::info!(meeting_id = %ctx.meeting_id, %connection_id, "participant disconnected");
        Ok(())
    }
}
