//! Facilitator command handlers
//!
//! Thin adapters between the wire protocol and the engine. Every call is
//! authorization-gated inside the engine against the connection's admitted
//! role and meeting.

use super::handlers::error_response;
use crate::engine::Engine;
use crate::protocol::ServerMessage;
use crate::types::*;

pub async fn handle_start_question(
    engine: &Engine,
    connection_id: &ConnectionId,
    question_id: QuestionId,
    time_limit_seconds: Option<u64>,
) -> Option<ServerMessage> {
    match engine
        .start_question(connection_id, question_id, time_limit_seconds)
        .await
    {
        Ok(()) => None,
        Err(e) => error_response(e),
    }
}

pub async fn handle_reveal_answers(
    engine: &Engine,
    connection_id: &ConnectionId,
    question_id: QuestionId,
) -> Option<ServerMessage> {
    match engine.reveal_answers(connection_id, question_id).await {
        Ok(()) => None,
        Err(e) => error_response(e),
    }
}

pub async fn handle_next_question(
    engine: &Engine,
    connection_id: &ConnectionId,
    index: u32,
) -> Option<ServerMessage> {
    match engine.next_question(connection_id, index).await {
        Ok(()) => None,
        Err(e) => error_response(e),
    }
}

pub async fn handle_end_meeting(
    engine: &Engine,
    connection_id: &ConnectionId,
) -> Option<ServerMessage> {
    match engine.end_meeting(connection_id).await {
        Ok(()) => None,
        Err(e) => error_response(e),
    }
}

pub async fn handle_group_answers(
    engine: &Engine,
    connection_id: &ConnectionId,
    question_id: QuestionId,
) -> Option<ServerMessage> {
    match engine.group_answers(connection_id, question_id).await {
        Ok(()) => None,
        Err(e) => error_response(e),
    }
}

pub async fn handle_move_answer(
    engine: &Engine,
    connection_id: &ConnectionId,
    question_id: QuestionId,
    answer_id: AnswerId,
    group_id: Option<GroupId>,
) -> Option<ServerMessage> {
    // The full grouping state is broadcast to everyone; no direct response
    match engine
        .move_answer(connection_id, question_id, answer_id, group_id)
        .await
    {
        Ok(_) => None,
        Err(e) => error_response(e),
    }
}

pub async fn handle_create_group(
    engine: &Engine,
    connection_id: &ConnectionId,
    question_id: QuestionId,
    name: String,
    answer_ids: Vec<AnswerId>,
) -> Option<ServerMessage> {
    match engine
        .create_group(connection_id, question_id, name, answer_ids)
        .await
    {
        Ok(_) => None,
        Err(e) => error_response(e),
    }
}

pub async fn handle_rename_group(
    engine: &Engine,
    connection_id: &ConnectionId,
    question_id: QuestionId,
    group_id: GroupId,
    name: String,
) -> Option<ServerMessage> {
    match engine
        .rename_group(connection_id, question_id, group_id, name)
        .await
    {
        Ok(_) => None,
        Err(e) => error_response(e),
    }
}

pub async fn handle_delete_group(
    engine: &Engine,
    connection_id: &ConnectionId,
    question_id: QuestionId,
    group_id: GroupId,
) -> Option<ServerMessage> {
    match engine
        .delete_group(connection_id, question_id, group_id)
        .await
    {
        Ok(_) => None,
        Err(e) => error_response(e),
    }
}
