use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TICK_DT;
use crate::vec2::Vec2;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Opaque client-chosen identifier of a participant.
pub type ParticipantId = String;

/// A held movement key. Serialized as `"UP"`, `"DOWN"`, `"LEFT"`, `"RIGHT"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Per-axis displacement for one step of `speed` units. Up is +y.
    pub fn step(self, speed: f64) -> Vec2 {
        match self {
            Direction::Up => Vec2::new(0.0, speed),
            Direction::Down => Vec2::new(0.0, -speed),
            Direction::Left => Vec2::new(-speed, 0.0),
            Direction::Right => Vec2::new(speed, 0.0),
        }
    }
}

// === Movement channel (client -> server, fire-and-forget) ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementIntent {
    pub id: ParticipantId,
    #[serde(rename = "move")]
    pub direction: Direction,
}

// === Snapshot channel (server -> all clients) ===

/// Full world state at one tick. Superseded entirely by the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub tick: u64,
    #[serde(default = "default_tick_dt")]
    pub tick_dt: f64,
    #[serde(default)]
    pub players: HashMap<ParticipantId, Vec2>,
    #[serde(default)]
    pub elapsed_time: f64,
    #[serde(default = "default_match_started")]
    pub match_started: bool,
}

fn default_tick_dt() -> f64 {
    DEFAULT_TICK_DT
}

fn default_match_started() -> bool {
    true
}

// === Lifecycle channel (request/reply) ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LifecycleRequest {
    Connect { id: ParticipantId },
    Disconnect { id: ParticipantId },
}

impl LifecycleRequest {
    pub fn id(&self) -> &str {
        match self {
            LifecycleRequest::Connect { id } | LifecycleRequest::Disconnect { id } => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Ok,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleReply {
    pub status: LifecycleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl LifecycleReply {
    /// Accepted connect occupying `slot` (1-based).
    pub fn accepted(slot: u32) -> Self {
        Self {
            status: LifecycleStatus::Ok,
            slot: Some(slot),
            version: Some(PROTOCOL_VERSION),
        }
    }

    /// Acknowledged disconnect.
    pub fn ok() -> Self {
        Self {
            status: LifecycleStatus::Ok,
            slot: None,
            version: Some(PROTOCOL_VERSION),
        }
    }

    pub fn full() -> Self {
        Self {
            status: LifecycleStatus::Full,
            slot: None,
            version: Some(PROTOCOL_VERSION),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == LifecycleStatus::Ok
    }
}
