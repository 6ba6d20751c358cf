use std::sync::Arc;
use std::time::{Duration, Instant};

use celestial_shared::protocol::{LifecycleReply, LifecycleRequest, MovementIntent, ServerSnapshot};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::ServerConfig;
use crate::map::MapGeometry;
use crate::state::{ControlId, WorldState};

/// Commands from lifecycle connections to the game loop
#[derive(Debug)]
pub enum GameCommand {
    Lifecycle {
        request: LifecycleRequest,
        owner: ControlId,
        response: oneshot::Sender<LifecycleReply>,
    },
    /// A control socket closed; drop the ids it still owns
    Release { owner: ControlId },
}

/// Snapshots fanned out to every subscriber. Shared, never mutated after send.
pub type SnapshotBroadcast = Arc<ServerSnapshot>;

/// Run the authoritative simulation. Owns all world state.
///
/// Runs until the process shuts down, or until the last participant leaves
/// when `exit_when_empty` is set.
pub async fn run_game_loop(
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    mut intent_rx: mpsc::Receiver<MovementIntent>,
    snapshot_tx: broadcast::Sender<SnapshotBroadcast>,
    config: ServerConfig,
    map: MapGeometry,
) {
    let mut state = WorldState::new(config.sim, &map);

    let mut tick_interval = tokio::time::interval(Duration::from_secs_f64(config.sim.tick_dt));
    // An overrun tick starts the next one immediately; no catch-up burst.
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut intents = Vec::new();

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                // Intents arriving after this drain belong to the next tick.
                while let Ok(intent) = intent_rx.try_recv() {
                    intents.push(intent);
                }

                let snapshot = state.step(intents.drain(..), Instant::now());
                tracing::trace!("Tick {} with {} players", snapshot.tick, snapshot.players.len());
                // No subscribers is fine; the next tick supersedes this one.
                let _ = snapshot_tx.send(Arc::new(snapshot));
            }

            Some(cmd) = cmd_rx.recv() => {
                let had_players = !state.registry.is_empty();
                let left = match cmd {
                    GameCommand::Lifecycle { request, owner, response } => {
                        let reply = state.handle_lifecycle(&request, owner, Instant::now());
                        let _ = response.send(reply);
                        matches!(request, LifecycleRequest::Disconnect { .. })
                    }
                    GameCommand::Release { owner } => !state.release(owner).is_empty(),
                };

                if config.exit_when_empty && left && had_players && state.registry.is_empty() {
                    tracing::info!("All players left, shutting down");
                    break;
                }
            }
        }
    }

    tracing::info!("Game loop ended at tick {}", state.tick());
}
