//! WebSocket message dispatch
//!
//! Post-admission entry point for client messages. Authorization lives in
//! the engine, which checks the connection's admitted role and meeting.

use crate::engine::Engine;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::types::ConnectionId;

use super::{facilitator, participant};

/// Handle a client message and return an optional direct response.
/// Broadcasts go out through the room router as a side effect.
pub async fn handle_message(
    msg: ClientMessage,
    connection_id: &ConnectionId,
    engine: &Engine,
) -> Option<ServerMessage> {
    match msg {
        // Re-admission of an already-admitted connection is a plain state
        // refresh, not an error
        ClientMessage::JoinFacilitator { meeting_id }
        | ClientMessage::JoinParticipant { meeting_id, .. } => {
            let ctx = engine.connection(connection_id).await?;
            if ctx.meeting_id != meeting_id {
                return Some(ServerMessage::Error {
                    code: "ALREADY_ADMITTED".to_string(),
                    msg: "connection is admitted to another meeting".to_string(),
                });
            }
            let session = match engine.sessions.get(&meeting_id).await {
                Ok(session) => session,
                Err(e) => {
                    return Some(ServerMessage::Error {
                        code: "STORE_UNAVAILABLE".to_string(),
                        msg: e.to_string(),
                    })
                }
            };
            Some(ServerMessage::Welcome {
                role: ctx.role,
                meeting_id,
                session: (&session).into(),
                participant_id: ctx.participant_id,
                display_name: ctx.display_name,
                server_now: chrono::Utc::now().to_rfc3339(),
            })
        }

        // Participant messages
        ClientMessage::SubmitAnswer { question_id, text } => {
            participant::handle_submit_answer(engine, connection_id, question_id, text).await
        }
        ClientMessage::RetractAnswer {
            question_id,
            answer_id,
        } => {
            participant::handle_retract_answer(engine, connection_id, question_id, answer_id).await
        }

        // Facilitator commands (role gate enforced by the engine)
        ClientMessage::StartQuestion {
            question_id,
            time_limit_seconds,
        } => {
            facilitator::handle_start_question(
                engine,
                connection_id,
                question_id,
                time_limit_seconds,
            )
            .await
        }
        ClientMessage::RevealAnswers { question_id } => {
            facilitator::handle_reveal_answers(engine, connection_id, question_id).await
        }
        ClientMessage::NextQuestion { index } => {
            facilitator::handle_next_question(engine, connection_id, index).await
        }
        ClientMessage::EndMeeting => {
            facilitator::handle_end_meeting(engine, connection_id).await
        }
        ClientMessage::GroupAnswers { question_id } => {
            facilitator::handle_group_answers(engine, connection_id, question_id).await
        }
        ClientMessage::MoveAnswer {
            question_id,
            answer_id,
            group_id,
        } => {
            facilitator::handle_move_answer(engine, connection_id, question_id, answer_id, group_id)
                .await
        }
        ClientMessage::CreateGroup {
            question_id,
            name,
            answer_ids,
        } => {
            facilitator::handle_create_group(engine, connection_id, question_id, name, answer_ids)
                .await
        }
        ClientMessage::RenameGroup {
            question_id,
            group_id,
            name,
        } => {
            facilitator::handle_rename_group(engine, connection_id, question_id, group_id, name)
                .await
        }
        ClientMessage::DeleteGroup {
            question_id,
            group_id,
        } => facilitator::handle_delete_group(engine, connection_id, question_id, group_id).await,
    }
}

/// Render an engine error for the initiating connection only
pub(super) fn error_response(e: crate::error::EngineError) -> Option<ServerMessage> {
    Some(ServerMessage::Error {
        code: e.code().to_string(),
        msg: e.to_string(),
    })
}
