use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use society_types::api::Claims;
use society_types::events::{ChannelCommand, ChannelEvent};
use society_types::models::{Author, ComplaintId};

use crate::AppState;
use crate::auth;
use crate::dispatcher::{Dispatcher, RoomEvent};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type CurrentRoom = Arc<RwLock<Option<ComplaintId>>>;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    token: Option<String>,
}

/// Authenticate at the HTTP upgrade: a bearer header, or `?token=` for
/// clients that cannot set headers on a WebSocket request.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = auth::bearer(&headers).map(str::to_string).or(query.token);
    let Some(claims) = token.and_then(|t| auth::decode_token(&state.jwt_secret, &t)) else {
        warn!("Gateway upgrade rejected: missing or invalid token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, dispatcher, claims))
}

/// Drive one authenticated gateway connection until either side goes away.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, claims: Claims) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();

    info!("{} ({}) connected to gateway", claims.name, claims.sub);

    let ready = ChannelEvent::Ready {
        user_id: claims.sub.clone(),
        display_name: claims.name.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    let mut broadcast_rx = dispatcher.subscribe();
    let current_room: CurrentRoom = Arc::new(RwLock::new(None));
    let send_room = current_room.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let room_event = match result {
                        Ok(room_event) => room_event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if room_event.skip_conn == Some(conn_id) || !in_room(&send_room, &room_event.complaint_id) {
                        continue;
                    }

                    if !send_event(&mut sender, &room_event.event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_dispatcher = dispatcher.clone();
    let recv_claims = claims.clone();
    let recv_room = current_room.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ChannelCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_dispatcher, conn_id, &recv_claims, cmd, &recv_room).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_claims.name,
                            recv_claims.sub,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.leave(conn_id).await;
    info!("{} ({}) disconnected from gateway", claims.name, claims.sub);
}

async fn handle_command(
    dispatcher: &Dispatcher,
    conn_id: Uuid,
    claims: &Claims,
    cmd: ChannelCommand,
    current_room: &CurrentRoom,
) {
    match cmd {
        ChannelCommand::JoinRoom { complaint_id } => {
            info!("{} ({}) joining room {}", claims.name, claims.sub, complaint_id);
            if let Ok(mut room) = current_room.write() {
                *room = Some(complaint_id.clone());
            }
            if let Some(left) = dispatcher.join(conn_id, &claims.sub, complaint_id).await {
                debug!("{} ({}) left room {}", claims.name, claims.sub, left);
            }
        }

        ChannelCommand::SendMessage { complaint_id, body } => {
            if !in_room(current_room, &complaint_id) {
                warn!("{} ({}) sent to {} without joining it", claims.name, claims.sub, complaint_id);
                return;
            }
            if body.trim().is_empty() {
                return;
            }
            let author = Author {
                id: claims.sub.clone(),
                display_name: claims.name.clone(),
                role: claims.role,
            };
            dispatcher.post_message(complaint_id, author, body).await;
        }

        ChannelCommand::TypingStart {
            complaint_id,
            display_name,
        } => {
            if !in_room(current_room, &complaint_id) {
                return;
            }
            let display_name = if display_name.trim().is_empty() {
                claims.name.clone()
            } else {
                display_name
            };
            dispatcher.broadcast(RoomEvent {
                complaint_id: complaint_id.clone(),
                event: ChannelEvent::TypingStart {
                    complaint_id,
                    user_id: claims.sub.clone(),
                    display_name: Some(display_name),
                },
                skip_conn: Some(conn_id),
            });
        }

        ChannelCommand::TypingStop { complaint_id } => {
            if !in_room(current_room, &complaint_id) {
                return;
            }
            dispatcher.broadcast(RoomEvent {
                complaint_id: complaint_id.clone(),
                event: ChannelEvent::TypingStop {
                    complaint_id,
                    user_id: claims.sub.clone(),
                },
                skip_conn: Some(conn_id),
            });
        }
    }
}

fn in_room(current_room: &CurrentRoom, complaint_id: &ComplaintId) -> bool {
    current_room
        .read()
        .map(|room| room.as_ref() == Some(complaint_id))
        .unwrap_or(false)
}

/// Returns `false` once the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ChannelEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode event: {}", e);
            true
        }
    }
}
