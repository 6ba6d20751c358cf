//! Celestial Lands authoritative server.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod collision;
pub mod config;
pub mod game_loop;
pub mod map;
pub mod registry;
pub mod state;
pub mod ws;

use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::Router;
use tokio::sync::{broadcast, mpsc};

use crate::config::ServerConfig;
use crate::game_loop::{run_game_loop, GameCommand};
use crate::map::MapGeometry;
use crate::ws::AppState;

/// Wire one server instance: the transport router and the game loop future
/// that owns the world. The caller decides where both run.
pub fn build(
    config: ServerConfig,
    map: MapGeometry,
) -> (Router, impl Future<Output = ()> + Send + 'static) {
    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(256);
    let (intent_tx, intent_rx) = mpsc::channel(config.intent_queue);
    let (snapshot_tx, _) = broadcast::channel(config.snapshot_buffer);

    let app_state = AppState {
        game_tx,
        intent_tx,
        snapshot_tx: snapshot_tx.clone(),
        max_message_bytes: config.max_message_bytes,
        next_control_id: Arc::new(AtomicU64::new(1)),
    };

    let game_loop = run_game_loop(game_rx, intent_rx, snapshot_tx, config, map);
    (ws::router(app_state), game_loop)
}
