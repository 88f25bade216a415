use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Admit this connection as the facilitator of a meeting
    JoinFacilitator {
        meeting_id: MeetingId,
    },
    /// Admit this connection as a named participant of a meeting
    JoinParticipant {
        meeting_id: MeetingId,
        display_name: String,
    },
    SubmitAnswer {
        question_id: QuestionId,
        text: String,
    },
    /// Delete one of the caller's answers (multi-answer mode)
    RetractAnswer {
        question_id: QuestionId,
        answer_id: AnswerId,
    },
    // Facilitator-only commands
    StartQuestion {
        question_id: QuestionId,
        /// Advisory countdown in seconds; expiry does not close the question
        time_limit_seconds: Option<u64>,
    },
    RevealAnswers {
        question_id: QuestionId,
    },
    NextQuestion {
        index: u32,
    },
    EndMeeting,
    /// Ask the AI collaborator to propose a grouping for a revealed question
    GroupAnswers {
        question_id: QuestionId,
    },
    /// Move an answer into a group, or to ungrouped when `group_id` is null
    MoveAnswer {
        question_id: QuestionId,
        answer_id: AnswerId,
        group_id: Option<GroupId>,
    },
    CreateGroup {
        question_id: QuestionId,
        name: String,
        #[serde(default)]
        answer_ids: Vec<AnswerId>,
    },
    RenameGroup {
        question_id: QuestionId,
        group_id: GroupId,
        name: String,
    },
    DeleteGroup {
        question_id: QuestionId,
        group_id: GroupId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent to the admitted connection only, with the current session
    /// snapshot (late joiners do not replay missed broadcasts; they start
    /// from this snapshot instead)
    Welcome {
        role: Role,
        meeting_id: MeetingId,
        session: SessionView,
        #[serde(skip_serializing_if = "Option::is_none")]
        participant_id: Option<ParticipantId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        server_now: String,
    },
    ParticipantJoined {
        count: usize,
    },
    ParticipantLeft {
        count: usize,
    },
    QuestionStarted {
        question_id: QuestionId,
        /// RFC3339; absent when the facilitator set no time limit
        #[serde(skip_serializing_if = "Option::is_none")]
        deadline: Option<String>,
        server_now: String,
    },
    AnswerProgress {
        answered_count: usize,
        total_count: usize,
    },
    AnswersRevealed {
        question_id: QuestionId,
        answers: Vec<AnswerInfo>,
    },
    /// Facilitator-only: the detached summarization task finished
    SummaryReady {
        question_id: QuestionId,
        summary: String,
    },
    NextQuestion {
        index: u32,
    },
    MeetingEnded,
    /// Full grouping state after the AI proposal was reconciled
    AnswersGrouped {
        grouping: Grouping,
    },
    /// Full grouping state after a manual facilitator edit
    GroupsUpdated {
        grouping: Grouping,
    },
    Error {
        code: String,
        msg: String,
    },
}

/// Session snapshot as sent to an admitted connection. Participant sets are
/// collapsed into counts; membership is not part of the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub phase: Phase,
    pub current_question_id: Option<QuestionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer_deadline: Option<String>,
    pub participant_count: usize,
    pub answered_count: usize,
}

impl From<&Session> for SessionView {
    fn from(s: &Session) -> Self {
        Self {
            phase: s.phase,
            current_question_id: s.current_question_id.clone(),
            timer_deadline: s.timer_deadline.map(|d| d.to_rfc3339()),
            participant_count: s.participants.len(),
            answered_count: s.answered.len(),
        }
    }
}

/// Public answer info included in reveal broadcasts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerInfo {
    pub id: AnswerId,
    pub participant_id: ParticipantId,
    pub text: String,
}

impl From<&Answer> for AnswerInfo {
    fn from(a: &Answer) -> Self {
        Self {
            id: a.id.clone(),
            participant_id: a.participant_id.clone(),
            text: a.text.clone(),
        }
    }
}
