//! Participant command handlers

use super::handlers::error_response;
use crate::engine::Engine;
use crate::protocol::ServerMessage;
use crate::types::*;

pub async fn handle_submit_answer(
    engine: &Engine,
    connection_id: &ConnectionId,
    question_id: QuestionId,
    text: String,
) -> Option<ServerMessage> {
    // Progress reaches the submitter through the AnswerProgress broadcast;
    // nothing to send directly on success
    match engine.submit_answer(connection_id, question_id, text).await {
        Ok(_) => None,
        Err(e) => error_response(e),
    }
}

pub async fn handle_retract_answer(
    engine: &Engine,
    connection_id: &ConnectionId,
    question_id: QuestionId,
    answer_id: AnswerId,
) -> Option<ServerMessage> {
    match engine
        .retract_answer(connection_id, question_id, answer_id)
        .await
    {
        Ok(()) => None,
        Err(e) => error_response(e),
    }
}
