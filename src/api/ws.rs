//! WebSocket endpoint
//!
//! `/ws`: text frames of UTF-8 JSON. Each connection gets a session in the
//! registry and a writer task draining the session's outbound channel, so
//! application-visible frame order equals write order. Unauthenticated
//! sessions may send only `auth` and `ping` and must authenticate within the
//! configured deadline.

use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::AppState;
use crate::auth::verify_token;
use crate::data::{ChatType, MessageKind};
use crate::error::code;
use crate::events::{EventPayload, topics};
use crate::session::{ClientFrame, ServerFrame, SendOutcome, Session, TransportKind};

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

enum FrameOutcome {
    Continue,
    Close,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(state.config.session.outbound_buffer);
    let session = state.registry.accept(TransportKind::WebSocket, tx);
    let session_id = session.id();

    // Writer task: the only place that touches the socket's write half.
    let writer_state = state.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            crate::metrics::WS_FRAMES_TOTAL
                .with_label_values(&["outbound", frame.kind()])
                .inc();
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(error) => {
                    tracing::error!(%error, "Failed to serialize outbound frame");
                    continue;
                }
            };
            let write = tokio::time::timeout(WRITE_TIMEOUT, ws_sender.send(Message::Text(json)));
            match write.await {
                Ok(Ok(())) => {}
                _ => {
                    // Write failure is terminal for the session.
                    writer_state
                        .registry
                        .remove(session_id, "write failed")
                        .await;
                    break;
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    // Transport handshake: the welcome frame.
    if state.registry.send(session_id, ServerFrame::welcome(&session_id.to_string()))
        != SendOutcome::Sent
    {
        state.registry.remove(session_id, "welcome failed").await;
        return;
    }
    state.registry.mark_established(&session);

    let auth_deadline =
        Instant::now() + Duration::from_secs(state.config.session.auth_timeout_seconds);

    loop {
        // The registry may remove the session underneath us (sweep eviction,
        // forced disconnect); the close signal ends the read loop so no
        // orphaned connection outlives its session.
        let received = if session.is_authorized() {
            tokio::select! {
                received = ws_receiver.next() => received,
                _ = session.wait_closed() => break,
            }
        } else {
            tokio::select! {
                received = tokio::time::timeout_at(auth_deadline, ws_receiver.next()) => {
                    match received {
                        Ok(received) => received,
                        Err(_) => {
                            state.registry.send(
                                session_id,
                                ServerFrame::error(
                                    code::USER_TOKEN_INVALID,
                                    "authentication timed out",
                                ),
                            );
                            break;
                        }
                    }
                }
                _ = session.wait_closed() => break,
            }
        };

        match received {
            Some(Ok(Message::Text(text))) => {
                session.touch();
                match handle_text(&state, &session, &text).await {
                    FrameOutcome::Continue => {}
                    FrameOutcome::Close => break,
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                session.touch();
            }
            Some(Ok(Message::Binary(_))) => {
                session.touch();
                state.registry.send(
                    session_id,
                    ServerFrame::error(code::WEBSOCKET_UNKNOWN_FRAME, "expected text frames"),
                );
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
        }
    }

    state.registry.remove(session_id, "connection closed").await;
    // Dropping our handle closes the outbound channel once the registry's
    // copy is gone; the writer drains what was queued and exits.
    drop(session);
    let _ = tokio::time::timeout(WRITE_TIMEOUT, writer).await;
}

async fn handle_text(state: &AppState, session: &Session, text: &str) -> FrameOutcome {
    let session_id = session.id();
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            state.registry.send(
                session_id,
                ServerFrame::error(code::WEBSOCKET_UNKNOWN_FRAME, "unrecognized frame"),
            );
            return FrameOutcome::Continue;
        }
    };

    crate::metrics::WS_FRAMES_TOTAL
        .with_label_values(&["inbound", frame.kind()])
        .inc();

    // Unauthenticated sessions may only authenticate and ping.
    if !session.is_authorized() && !matches!(frame, ClientFrame::Auth { .. } | ClientFrame::Ping) {
        state.registry.send(
            session_id,
            ServerFrame::error(code::USER_TOKEN_INVALID, "authenticate first"),
        );
        return FrameOutcome::Continue;
    }

    match frame {
        ClientFrame::Auth { token } => handle_auth(state, session, &token).await,
        ClientFrame::Ping => {
            if session.is_authorized() {
                state.presence.refresh(session.user_id()).await;
            }
            state.registry.send(session_id, ServerFrame::pong());
            FrameOutcome::Continue
        }
        ClientFrame::ChatMessage {
            to_user_id,
            content,
            message_id,
        } => {
            submit_from_ws(
                state,
                session,
                ChatType::Personal,
                to_user_id,
                content,
                message_id,
            )
            .await;
            FrameOutcome::Continue
        }
        ClientFrame::GroupMessage {
            group_id,
            content,
            message_id,
        } => {
            submit_from_ws(state, session, ChatType::Group, group_id, content, message_id).await;
            FrameOutcome::Continue
        }
        ClientFrame::StatusUpdate { status } => {
            let user_id = session.user_id();
            state.presence.set_status(user_id, &status).await;
            let payload = EventPayload::PresenceChange {
                user_id,
                status: status.clone(),
            };
            if let Err(error) =
                state
                    .bus
                    .publish(topics::SYSTEM_EVENTS, &user_id.to_string(), &payload)
            {
                tracing::warn!(%error, user_id, "Failed to publish status update");
            }
            FrameOutcome::Continue
        }
        ClientFrame::ReadReceipt {
            message_id,
            sender_id: _,
        } => {
            // The stored row names the sender; the claimed one is ignored.
            let newly_read = state
                .delivery
                .mark_read(session.user_id(), message_id)
                .await
                .unwrap_or(false);
            state.registry.send(
                session_id,
                ServerFrame::ReadReceiptAck {
                    success: newly_read,
                    message_id,
                    timestamp: crate::data::now_seconds(),
                },
            );
            FrameOutcome::Continue
        }
        ClientFrame::Broadcast { content } => {
            if !session.is_admin() {
                state.registry.send(
                    session_id,
                    ServerFrame::error(code::PERMISSION_DENIED, "admin role required"),
                );
                return FrameOutcome::Continue;
            }
            let user_id = session.user_id();
            if let Err(error) = state
                .db
                .insert_announcement("System broadcast", &content, user_id)
                .await
            {
                tracing::error!(%error, "Failed to persist announcement");
            }
            let payload = EventPayload::SystemBroadcast {
                from_user_id: user_id,
                content,
            };
            if let Err(error) =
                state
                    .bus
                    .publish(topics::SYSTEM_EVENTS, &user_id.to_string(), &payload)
            {
                tracing::warn!(%error, "Failed to publish system broadcast");
            }
            FrameOutcome::Continue
        }
    }
}

async fn handle_auth(state: &AppState, session: &Session, token: &str) -> FrameOutcome {
    let session_id = session.id();

    if session.is_authorized() {
        state
            .registry
            .send(session_id, ServerFrame::auth_success(session.user_id()));
        return FrameOutcome::Continue;
    }

    let claims = match verify_token(token, &state.config.auth.token_secret) {
        Ok(claims) => claims,
        Err(_) => {
            // Typed failure frame, then close after the write drains.
            state
                .registry
                .send(session_id, ServerFrame::auth_failure("invalid token"));
            tracing::warn!(session_id = %session_id, "WebSocket authentication failed");
            return FrameOutcome::Close;
        }
    };

    match state
        .registry
        .authorize(session_id, claims.user_id, claims.is_admin())
    {
        Ok(outcome) => {
            if outcome.first_session {
                state.presence.session_opened(claims.user_id).await;
            } else {
                state.presence.refresh(claims.user_id).await;
            }
            state
                .registry
                .send(session_id, ServerFrame::auth_success(claims.user_id));
            FrameOutcome::Continue
        }
        Err(_) => {
            state
                .registry
                .send(session_id, ServerFrame::auth_failure("session not available"));
            FrameOutcome::Close
        }
    }
}

async fn submit_from_ws(
    state: &AppState,
    session: &Session,
    chat_type: ChatType,
    recipient_id: i64,
    content: String,
    client_message_id: Option<i64>,
) {
    let session_id = session.id();
    let result = state
        .delivery
        .submit(
            session.user_id(),
            chat_type,
            recipient_id,
            MessageKind::Text,
            &content,
            None,
        )
        .await;

    let ack = match result {
        Ok(receipt) => ServerFrame::MessageAck {
            success: true,
            message_id: client_message_id,
            server_message_id: Some(receipt.message_id),
            message: None,
            timestamp: crate::data::now_seconds(),
        },
        Err(error) => ServerFrame::MessageAck {
            success: false,
            message_id: client_message_id,
            server_message_id: None,
            message: Some(error.public_message()),
            timestamp: crate::data::now_seconds(),
        },
    };
    state.registry.send(session_id, ack);
}
