use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::UserProfile;
use crate::services::chat::SendMessageRequest;
use crate::services::presence::SessionHandle;
use crate::AppState;

/// Events a client may send over an authenticated session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    SendMessage(SendMessageRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub id: Uuid,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessagePayload {
    pub sender_id: Uuid,
    pub sender_handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentPayload>,
    pub message_id: Uuid,
}

/// Events pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    PrivateMessage(PrivateMessagePayload),
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

/// WebSocket upgrade handler. The bearer credential is checked before the
/// upgrade; a missing or rejected token gets a bare 401 and no session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let header = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());

    match state.gateway.authenticate(header).await {
        Ok(user) => ws.on_upgrade(move |socket| handle_socket(socket, state, user)),
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket authentication failed");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// Handle one authenticated WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, user: UserProfile) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let handle = SessionHandle::new(tx);
    let session_id = handle.session_id;
    let user_id = user.id;

    state.gateway.connect(&user, handle.clone()).await;

    // Incoming client events; each send runs as its own task so a slow
    // storage call does not stall the socket reader.
    let gateway = state.gateway.clone();
    let reply = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(ClientEvent::SendMessage(request)) => {
                        let gateway = gateway.clone();
                        let reply = reply.clone();
                        let sender_profile = user.clone();
                        tokio::spawn(async move {
                            if let Err(e) = gateway.send_message(&sender_profile, request).await {
                                tracing::debug!(user_id = %sender_profile.id, error = %e, "Send rejected");
                                reply.send(ServerEvent::error(e.client_message()));
                            }
                        });
                    }
                    Err(e) => {
                        tracing::debug!(user_id = %user.id, error = %e, "Malformed client event");
                        reply.send(ServerEvent::error("Invalid payload: unrecognised event"));
                    }
                },
                Message::Ping(_) => {
                    tracing::trace!("Received ping");
                }
                Message::Close(_) => {
                    tracing::info!(user_id = %user.id, "Client closed connection");
                    break;
                }
                _ => {}
            }
        }
    });

    // Outgoing events and heartbeats
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat_interval = tokio::time::interval(tokio::time::Duration::from_secs(30));

        loop {
            tokio::select! {
                _ = heartbeat_interval.tick() => {
                    if sender.send(Message::Ping(vec![])).await.is_err() {
                        tracing::info!("Client disconnected during heartbeat");
                        break;
                    }
                }
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            tracing::error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        tracing::info!("Client disconnected");
                        break;
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    drop(handle);
    state.gateway.disconnect(user_id, session_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_message_event_parses() {
        let raw = json!({
            "event": "send-message",
            "data": { "recipientId": "abc", "text": "hi" }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage(SendMessageRequest {
                recipient_id: "abc".to_string(),
                text: Some("hi".to_string()),
                attachment_id: None,
            })
        );
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let raw = json!({ "event": "delete-message", "data": {} });
        assert!(serde_json::from_value::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn test_private_message_wire_shape() {
        let sender = Uuid::new_v4();
        let message = Uuid::new_v4();
        let event = ServerEvent::PrivateMessage(PrivateMessagePayload {
            sender_id: sender,
            sender_handle: "ann".to_string(),
            text: Some("hello".to_string()),
            attachment: None,
            message_id: message,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "private-message");
        assert_eq!(value["data"]["senderId"], sender.to_string());
        assert_eq!(value["data"]["senderHandle"], "ann");
        assert_eq!(value["data"]["messageId"], message.to_string());
        assert!(value["data"].get("attachment").is_none());
    }

    #[test]
    fn test_error_wire_shape() {
        let value = serde_json::to_value(ServerEvent::error("Insufficient balance")).unwrap();
        assert_eq!(value, json!({ "event": "error", "data": { "message": "Insufficient balance" } }));
    }
}
