//! WebSocket endpoints for the three channels:
//!
//! * `/move` - fire-and-forget movement intents (client to server)
//! * `/snapshots` - one world snapshot per tick (server to every subscriber)
//! * `/control` - connect/disconnect request/reply

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use celestial_shared::protocol::{LifecycleReply, LifecycleRequest, MovementIntent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::game_loop::{GameCommand, SnapshotBroadcast};
use crate::state::ControlId;

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub game_tx: mpsc::Sender<GameCommand>,
    pub intent_tx: mpsc::Sender<MovementIntent>,
    pub snapshot_tx: broadcast::Sender<SnapshotBroadcast>,
    pub max_message_bytes: usize,
    /// Source of per-socket ownership tokens for `/control`
    pub next_control_id: Arc<AtomicU64>,
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/move", get(move_handler))
        .route("/snapshots", get(snapshot_handler))
        .route("/control", get(control_handler))
        .with_state(app_state)
}

pub async fn move_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(app_state.max_message_bytes)
        .on_upgrade(|socket| handle_move_socket(socket, app_state))
}

pub async fn snapshot_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_snapshot_socket(socket, app_state))
}

pub async fn control_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(app_state.max_message_bytes)
        .on_upgrade(|socket| handle_control_socket(socket, app_state))
}

async fn handle_move_socket(mut socket: WebSocket, app_state: AppState) {
    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<MovementIntent>(text.as_str()) {
                Ok(intent) => {
                    if app_state.intent_tx.send(intent).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::trace!("Dropping malformed intent: {}", e),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {} // Ignore ping/pong/binary
        }
    }
}

async fn handle_snapshot_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut snapshot_rx = app_state.snapshot_tx.subscribe();

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {} // Subscribers have nothing to say
                }
            }

            result = snapshot_rx.recv() => {
                match result {
                    Ok(snapshot) => {
                        let Ok(json) = serde_json::to_string(snapshot.as_ref()) else {
                            continue;
                        };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Snapshots are full state; skipping ahead loses nothing.
                        tracing::debug!("Snapshot subscriber lagged by {} ticks", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn handle_control_socket(mut socket: WebSocket, app_state: AppState) {
    let owner: ControlId = app_state.next_control_id.fetch_add(1, Ordering::Relaxed);

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let request = match serde_json::from_str::<LifecycleRequest>(text.as_str()) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Dropping malformed lifecycle request: {}", e);
                continue;
            }
        };

        let Some(reply) = lifecycle(&app_state, request, owner).await else {
            tracing::error!("Game loop is gone, closing control socket");
            return;
        };

        let Ok(json) = serde_json::to_string(&reply) else {
            continue;
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }

    // A dropped control socket releases the slots it still owns
    let _ = app_state.game_tx.send(GameCommand::Release { owner }).await;
}

async fn lifecycle(
    app_state: &AppState,
    request: LifecycleRequest,
    owner: ControlId,
) -> Option<LifecycleReply> {
    let (response, reply_rx) = oneshot::channel();
    app_state
        .game_tx
        .send(GameCommand::Lifecycle {
            request,
            owner,
            response,
        })
        .await
        .ok()?;
    reply_rx.await.ok()
}
