pub mod facilitator;
pub mod handlers;
pub mod participant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{sink::SinkExt, stream::SplitSink, stream::StreamExt};
use tokio::sync::broadcast;

use crate::engine::{Admission, Engine};
use crate::protocol::{ClientMessage, ServerMessage};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(engine): State<Engine>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, engine))
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match encode(msg) {
        Some(json) => sender.send(Message::Text(json.into())).await,
        // A single bad frame should not tear down the connection
        None => Ok(()),
    }
}

fn encode(msg: &ServerMessage) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("failed to serialize outbound message: {e}");
            None
        }
    }
}

/// Await the next group event for this connection.
///
/// `All`-scope events drain ahead of facilitator-only events, so
/// cross-scope wire order matches publish order: a reveal queued on the
/// shared group is always written before the summary that follows it,
/// however quickly the summary arrives. Returns `None` once the meeting's
/// groups are gone.
async fn next_broadcast(
    connection_id: &crate::types::ConnectionId,
    events: &mut broadcast::Receiver<ServerMessage>,
    facilitator_events: &mut Option<broadcast::Receiver<ServerMessage>>,
) -> Option<ServerMessage> {
    loop {
        match events.try_recv() {
            Ok(msg) => return Some(msg),
            Err(broadcast::error::TryRecvError::Empty) => {}
            // Meeting ended: the group sender was dropped
            Err(broadcast::error::TryRecvError::Closed) => return None,
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(%connection_id, skipped, "client lagged behind broadcasts");
                continue;
            }
        }

        tokio::select! {
            biased;

            event = events.recv() => match event {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%connection_id, skipped, "client lagged behind broadcasts");
                }
            },

            event = async {
                match facilitator_events {
                    Some(rx) => rx.recv().await,
                    // Participants: wait forever
                    None => std::future::pending().await,
                }
            } => match event {
                Ok(msg) => return Some(msg),
                // Closed; stop polling this branch
                Err(broadcast::error::RecvError::Closed) => *facilitator_events = None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%connection_id, skipped, "facilitator channel lagged");
                }
            },
        }
    }
}

fn welcome_message(admission: &Admission) -> ServerMessage {
    ServerMessage::Welcome {
        role: admission.role,
        meeting_id: admission.meeting_id.clone(),
        session: admission.session.clone(),
        participant_id: admission.participant.as_ref().map(|p| p.id.clone()),
        display_name: admission.participant.as_ref().map(|p| p.display_name.clone()),
        server_now: Utc::now().to_rfc3339(),
    }
}

/// Handle one WebSocket connection for its whole lifetime.
///
/// The connection is unadmitted until its first join message; admission
/// yields the session snapshot plus the group subscriptions, after which
/// the loop multiplexes group broadcasts and client commands.
async fn handle_socket(socket: WebSocket, engine: Engine) {
    let (mut sender, mut receiver) = socket.split();

    // Admission phase: wait for a join message
    let admission = loop {
        let msg = match receiver.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(Message::Ping(data))) => {
                if sender.send(Message::Pong(data)).await.is_err() {
                    return;
                }
                continue;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!("websocket error before admission: {e}");
                return;
            }
        };

        match serde_json::from_str::<ClientMessage>(&msg) {
            Ok(ClientMessage::JoinFacilitator { meeting_id }) => {
                match engine.admit_facilitator(meeting_id).await {
                    Ok(admission) => break admission,
                    Err(e) => {
                        let error = ServerMessage::Error {
                            code: e.code().to_string(),
                            msg: e.to_string(),
                        };
                        if send_json(&mut sender, &error).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Ok(ClientMessage::JoinParticipant {
                meeting_id,
                display_name,
            }) => match engine.admit_participant(meeting_id, display_name).await {
                Ok(admission) => break admission,
                Err(e) => {
                    let error = ServerMessage::Error {
                        code: e.code().to_string(),
                        msg: e.to_string(),
                    };
                    if send_json(&mut sender, &error).await.is_err() {
                        return;
                    }
                }
            },
            Ok(_) => {
                let error = ServerMessage::Error {
                    code: "NOT_ADMITTED".to_string(),
                    msg: "join a meeting first".to_string(),
                };
                if send_json(&mut sender, &error).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let error = ServerMessage::Error {
                    code: "PARSE_ERROR".to_string(),
                    msg: format!("Invalid message format: {e}"),
                };
                if send_json(&mut sender, &error).await.is_err() {
                    return;
                }
            }
        }
    };

    if send_json(&mut sender, &welcome_message(&admission)).await.is_err() {
        let _ = engine.disconnect(&admission.connection_id).await;
        return;
    }

    let connection_id = admission.connection_id.clone();
    let mut events = admission.events;
    let mut facilitator_events = admission.facilitator_events;

    loop {
        tokio::select! {
            broadcast = next_broadcast(&connection_id, &mut events, &mut facilitator_events) => {
                match broadcast {
                    Some(msg) => {
                        if send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) =
                                    handlers::handle_message(client_msg, &connection_id, &engine).await
                                {
                                    if send_json(&mut sender, &response).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {e}"),
                                };
                                if send_json(&mut sender, &error).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%connection_id, "websocket error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if let Err(e) = engine.disconnect(&connection_id).await {
        tracing::warn!(%connection_id, error = %e, "disconnect cleanup failed");
    }
}
