use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Opaque ID types for type safety
pub type MeetingId = String;
pub type QuestionId = String;
pub type ParticipantId = String;
pub type AnswerId = String;
pub type GroupId = String;
pub type ConnectionId = String;

/// Question lifecycle phase for a live session
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Waiting,
    Answering,
    Revealed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Facilitator,
    Participant,
}

/// Live session state for one meeting. This is the single source of truth
/// for "what is live right now"; nothing above the store caches it.
///
/// Invariants: `timer_deadline` is present only while `phase == Answering`,
/// and `answered` is scoped to `current_question_id` (cleared exactly when
/// the question id changes).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub phase: Phase,
    pub current_question_id: Option<QuestionId>,
    pub timer_deadline: Option<DateTime<Utc>>,
    pub participants: HashSet<ParticipantId>,
    pub answered: HashSet<ParticipantId>,
}

/// Durable participant identity, owned by the external store.
/// The engine treats it as an opaque key plus the facilitator-visible name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub meeting_id: MeetingId,
    pub display_name: String,
}

/// A recorded answer. Text persistence belongs to the external store; the
/// engine only ferries texts into reveal and grouping broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub participant_id: ParticipantId,
    pub text: String,
}

/// Per-connection tags, owned by the connection lifecycle manager and
/// looked up by connection id. Never stored on the transport itself.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub meeting_id: MeetingId,
    /// Participant role only
    pub participant_id: Option<ParticipantId>,
    /// Participant role only
    pub display_name: Option<String>,
}

/// A named bucket of answer ids within a question's grouping state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerGroup {
    pub id: GroupId,
    pub name: String,
    pub answer_ids: Vec<AnswerId>,
}

/// Transient per-question grouping state.
///
/// Invariant: every answer id held by the question appears in exactly one
/// of (exactly one group's list, the ungrouped list).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Grouping {
    pub question_id: QuestionId,
    pub groups: Vec<AnswerGroup>,
    pub ungrouped: Vec<AnswerId>,
}
