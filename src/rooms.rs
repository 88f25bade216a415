//! Room router / broadcaster
//!
//! Pure multicast plumbing. Each meeting has two groups: `All` (every
//! connection in the meeting) and `Facilitators` (the facilitator-only
//! sub-group). The router knows nothing about session semantics, which
//! keeps the state machine testable independent of the transport.
//!
//! Membership is a live `broadcast::Receiver`; leaving a group is dropping
//! it. Delivery is best-effort per transport: there is no queuing or replay
//! for members who join after a publish.

use crate::protocol::ServerMessage;
use crate::types::MeetingId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const GROUP_CAPACITY: usize = 256;

/// Multicast scope within one meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    All,
    Facilitators,
}

#[derive(Clone, Default)]
pub struct RoomRouter {
    groups: Arc<RwLock<HashMap<(MeetingId, Scope), broadcast::Sender<ServerMessage>>>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a group. The returned receiver is the membership: dropping it
    /// leaves the group.
    pub async fn subscribe(
        &self,
        meeting_id: &MeetingId,
        scope: Scope,
    ) -> broadcast::Receiver<ServerMessage> {
        let mut groups = self.groups.write().await;
        groups
            .entry((meeting_id.clone(), scope))
            .or_insert_with(|| broadcast::channel(GROUP_CAPACITY).0)
            .subscribe()
    }

    /// Deliver an event to every current member of a group. Returns the
    /// number of members it reached; an empty group is not an error.
    pub async fn publish(&self, meeting_id: &MeetingId, scope: Scope, msg: ServerMessage) -> usize {
        let groups = self.groups.read().await;
        match groups.get(&(meeting_id.clone(), scope)) {
            // send only fails when there are no receivers
            Some(tx) => tx.send(msg).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop both group senders for a meeting. Existing receivers observe a
    /// closed channel and fall out of their read loops.
    pub async fn close(&self, meeting_id: &MeetingId) {
        let mut groups = self.groups.write().await;
        groups.remove(&(meeting_id.clone(), Scope::All));
        groups.remove(&(meeting_id.clone(), Scope::Facilitators));
    }
}
