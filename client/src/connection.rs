//! Network side of a session. Runs inside the session's own runtime and
//! owns the three sockets.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use celestial_shared::protocol::{
    Direction, LifecycleReply, LifecycleRequest, MovementIntent, ServerSnapshot, PROTOCOL_VERSION,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::ClientConfig;
use crate::session::StatusCell;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Everything the network thread shares with the render side.
pub(crate) struct NetworkChannels {
    pub status: Arc<StatusCell>,
    pub intent_rx: mpsc::UnboundedReceiver<Direction>,
    pub snapshot_tx: Sender<ServerSnapshot>,
    pub alive_rx: watch::Receiver<bool>,
}

struct Sockets {
    control: Socket,
    moves: Socket,
    snapshots: Socket,
}

pub(crate) async fn run_network(config: ClientConfig, mut channels: NetworkChannels) {
    let mut sockets = tokio::select! {
        result = handshake(&config) => match result {
            Some((sockets, slot)) => {
                tracing::info!("{} accepted in slot {}", config.player_id, slot);
                channels.status.accept(slot);
                sockets
            }
            None => {
                channels.status.reject();
                return;
            }
        },
        _ = wait_for_shutdown(&mut channels.alive_rx) => {
            tracing::info!("Shutdown requested before the handshake finished");
            channels.status.reject();
            return;
        }
    };

    loop {
        tokio::select! {
            Some(direction) = channels.intent_rx.recv() => {
                let intent = MovementIntent {
                    id: config.player_id.clone(),
                    direction,
                };
                let Ok(json) = serde_json::to_string(&intent) else {
                    continue;
                };
                if let Err(e) = sockets.moves.send(Message::Text(json.into())).await {
                    tracing::debug!("Dropping intent: {}", e);
                }
            }

            msg = sockets.snapshots.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerSnapshot>(&text) {
                            Ok(snapshot) => {
                                if channels.snapshot_tx.send(snapshot).is_err() {
                                    // Render side is gone
                                    break;
                                }
                            }
                            Err(e) => tracing::trace!("Discarding snapshot: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        tracing::warn!("Snapshot stream closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            _ = wait_for_shutdown(&mut channels.alive_rx) => break,
        }
    }

    let id = config.player_id.clone();
    match tokio::time::timeout(config.disconnect_timeout, disconnect(&mut sockets, id)).await {
        Ok(Ok(())) => tracing::info!("{} disconnected", config.player_id),
        Ok(Err(e)) => tracing::warn!("Disconnect for {} failed: {}", config.player_id, e),
        Err(_) => tracing::warn!(
            "Disconnect for {} timed out after {:?}",
            config.player_id,
            config.disconnect_timeout
        ),
    }
}

/// Resolves once the liveness flag drops to false or its sender is gone.
async fn wait_for_shutdown(alive_rx: &mut watch::Receiver<bool>) {
    let _ = alive_rx.wait_for(|alive| !*alive).await;
}

async fn open(config: &ClientConfig, channel: &str) -> Option<Socket> {
    let url = config.channel_url(channel);
    match connect_async(url.as_str()).await {
        Ok((socket, _)) => Some(socket),
        Err(e) => {
            tracing::warn!("Could not open {}: {}", url, e);
            None
        }
    }
}

/// Open all three channels and ask for a slot. `None` means rejected.
async fn handshake(config: &ClientConfig) -> Option<(Sockets, u32)> {
    let mut sockets = Sockets {
        control: open(config, "control").await?,
        moves: open(config, "move").await?,
        snapshots: open(config, "snapshots").await?,
    };

    let request = LifecycleRequest::Connect {
        id: config.player_id.clone(),
    };
    let reply = match request_reply(&mut sockets.control, &request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("Connect request failed: {}", e);
            return None;
        }
    };

    if let Some(version) = reply.version {
        if version != PROTOCOL_VERSION {
            tracing::error!(
                "Protocol mismatch: server {}, client {}",
                version,
                PROTOCOL_VERSION
            );
            let _ = sockets.control.close(None).await;
            return None;
        }
    }

    match reply.slot {
        Some(slot) if reply.is_ok() => Some((sockets, slot)),
        _ => {
            tracing::warn!("Server refused {}: {:?}", config.player_id, reply.status);
            let _ = sockets.control.close(None).await;
            None
        }
    }
}

async fn request_reply(
    control: &mut Socket,
    request: &LifecycleRequest,
) -> Result<LifecycleReply, String> {
    let json = serde_json::to_string(request).map_err(|e| e.to_string())?;
    control
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())?;

    while let Some(msg) = control.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                return serde_json::from_str(&text).map_err(|e| e.to_string());
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
    Err("control channel closed".to_string())
}

async fn disconnect(sockets: &mut Sockets, id: String) -> Result<(), String> {
    let reply = request_reply(&mut sockets.control, &LifecycleRequest::Disconnect { id }).await?;
    if !reply.is_ok() {
        return Err(format!("unexpected reply {:?}", reply.status));
    }
    let _ = sockets.moves.close(None).await;
    let _ = sockets.snapshots.close(None).await;
    let _ = sockets.control.close(None).await;
    Ok(())
}
