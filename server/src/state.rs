use std::collections::HashMap;
use std::time::Instant;

use celestial_shared::config::SimConfig;
use celestial_shared::protocol::{
    LifecycleReply, LifecycleRequest, MovementIntent, ParticipantId, ServerSnapshot,
};
use celestial_shared::vec2::Vec2;

use crate::collision::CollisionResolver;
use crate::map::MapGeometry;
use crate::registry::{ConnectOutcome, SessionRegistry};

/// Identifies the control socket a participant last connected through.
pub type ControlId = u64;

/// Central world state owned by the game loop task.
pub struct WorldState {
    pub registry: SessionRegistry,
    pub positions: HashMap<ParticipantId, Vec2>,
    /// Control socket owning each connected id; a reconnect takes it over
    owners: HashMap<ParticipantId, ControlId>,
    resolver: CollisionResolver,
    sim: SimConfig,
    tick: u64,
    match_started_at: Option<Instant>,
}

impl WorldState {
    pub fn new(sim: SimConfig, map: &MapGeometry) -> Self {
        Self {
            registry: SessionRegistry::new(sim.capacity, map.spawn_points.clone()),
            positions: HashMap::new(),
            owners: HashMap::new(),
            resolver: map.resolver(&sim),
            sim,
            tick: 0,
            match_started_at: None,
        }
    }

    pub fn handle_lifecycle(
        &mut self,
        request: &LifecycleRequest,
        owner: ControlId,
        now: Instant,
    ) -> LifecycleReply {
        match request {
            LifecycleRequest::Connect { id } => {
                let reply = self.connect(id, now);
                if reply.is_ok() {
                    self.owners.insert(id.clone(), owner);
                }
                reply
            }
            LifecycleRequest::Disconnect { id } => self.disconnect(id),
        }
    }

    /// Disconnect every id still owned by a closed control socket. Ids
    /// reconnected through another socket since then are left alone.
    pub fn release(&mut self, owner: ControlId) -> Vec<ParticipantId> {
        let mut released: Vec<ParticipantId> = self
            .owners
            .iter()
            .filter(|(_, o)| **o == owner)
            .map(|(id, _)| id.clone())
            .collect();
        released.sort();
        for id in &released {
            tracing::info!("Control socket for {} closed without disconnect", id);
            self.disconnect(id);
        }
        released
    }

    /// Register `id` and place it at its spawn. The position exists before
    /// the reply is produced.
    pub fn connect(&mut self, id: &str, now: Instant) -> LifecycleReply {
        match self.registry.connect(id) {
            ConnectOutcome::Accepted {
                slot,
                spawn,
                reconnect,
            } => {
                self.positions.insert(id.to_string(), spawn);
                if reconnect {
                    tracing::info!("Player {} reconnected in slot {}", id, slot);
                } else {
                    tracing::info!(
                        "Player {} connected as slot {} at ({}, {})",
                        id,
                        slot,
                        spawn.x,
                        spawn.y
                    );
                }
                if self.match_started_at.is_none() && self.registry.len() >= self.sim.match_size {
                    self.match_started_at = Some(now);
                    let players: Vec<&str> = self.registry.ids().collect();
                    tracing::info!("Match started with {}", players.join(", "));
                }
                LifecycleReply::accepted(slot)
            }
            ConnectOutcome::Full => {
                tracing::info!(
                    "Player {} rejected: all {} slots taken",
                    id,
                    self.registry.capacity()
                );
                LifecycleReply::full()
            }
        }
    }

    pub fn disconnect(&mut self, id: &str) -> LifecycleReply {
        if let Some(slot) = self.registry.slot_of(id) {
            self.registry.disconnect(id);
            tracing::info!("Player {} disconnected from slot {}", id, slot);
        }
        self.positions.remove(id);
        self.owners.remove(id);
        LifecycleReply::ok()
    }

    /// Apply one movement step. Intents for unknown ids, or sent before the
    /// match has started, are ignored. Returns whether the position changed.
    pub fn apply_intent(&mut self, intent: &MovementIntent) -> bool {
        if self.match_started_at.is_none() || !self.registry.contains(&intent.id) {
            return false;
        }
        let Some(pos) = self.positions.get_mut(&intent.id) else {
            return false;
        };
        let next = self
            .resolver
            .resolve(*pos, intent.direction.step(self.sim.speed));
        let moved = next != *pos;
        *pos = next;
        moved
    }

    /// Advance one tick: apply the drained intents in arrival order, then
    /// produce the snapshot for this tick.
    pub fn step<I>(&mut self, intents: I, now: Instant) -> ServerSnapshot
    where
        I: IntoIterator<Item = MovementIntent>,
    {
        for intent in intents {
            self.apply_intent(&intent);
        }
        self.tick = self.tick.wrapping_add(1);
        self.snapshot(now)
    }

    pub fn snapshot(&self, now: Instant) -> ServerSnapshot {
        ServerSnapshot {
            tick: self.tick,
            tick_dt: self.sim.tick_dt,
            players: self.positions.clone(),
            elapsed_time: self.elapsed_time(now),
            match_started: self.match_started(),
        }
    }

    /// Seconds since the match started, 0 before that.
    pub fn elapsed_time(&self, now: Instant) -> f64 {
        self.match_started_at
            .map(|start| now.saturating_duration_since(start).as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn match_started(&self) -> bool {
        self.match_started_at.is_some()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn resolver(&self) -> &CollisionResolver {
        &self.resolver
    }
}
