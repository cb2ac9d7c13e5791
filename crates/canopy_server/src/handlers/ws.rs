use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info};

use super::AppState;
use crate::collab::{ClientEvent, CollabHub, ServerEvent};

/// WebSocket upgrade handler for GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one established WebSocket connection against the hub.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (conn_id, mut events) = state.hub.register().await;

    info!("WebSocket connected: {conn_id}");

    loop {
        tokio::select! {
            // Incoming frames from the client
            Some(msg) = ws_rx.next() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => dispatch(&state.hub, &conn_id, event).await,
                            Err(err) => {
                                debug!("unparseable frame from {conn_id}: {err}");
                                let frame = ServerEvent::Error {
                                    message: "Invalid message format".to_string(),
                                };
                                if let Ok(json) = serde_json::to_string(&frame) {
                                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(err) = ws_tx.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {err}");
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Client requested close");
                        break;
                    }
                    Err(err) => {
                        error!("WebSocket error: {err}");
                        break;
                    }
                    _ => {}
                }
            }

            // Events routed to this connection by the hub
            Some(event) = events.recv() => {
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if let Err(err) = ws_tx.send(Message::Text(json.into())).await {
                            error!("Failed to send event: {err}");
                            break;
                        }
                    }
                    Err(err) => error!("Failed to encode event: {err}"),
                }
            }

            else => break,
        }
    }

    state.hub.disconnect(&conn_id).await;
    info!("WebSocket disconnected: {conn_id}");
}

async fn dispatch(hub: &CollabHub, conn_id: &str, event: ClientEvent) {
    match event {
        ClientEvent::Authenticate { user_id, name } => {
            hub.authenticate(conn_id, &user_id, &name).await;
        }
        ClientEvent::JoinPage { page_id } => hub.join_page(conn_id, &page_id).await,
        ClientEvent::LeavePage { page_id } => hub.leave_page(conn_id, &page_id).await,
        ClientEvent::BlockOperation { operation } => {
            hub.relay_block_operation(conn_id, operation).await;
        }
        ClientEvent::CursorUpdate {
            block_id, position, ..
        } => hub.relay_cursor(conn_id, block_id, position).await,
    }
}
