//! Connected participants, their slots and spawn assignment.
//!
//! Policy: hard capacity. New ids take the lowest free slot and are rejected
//! with `Full` once every slot is taken. Connecting an id that is already
//! registered keeps its slot and re-spawns it (last writer wins).

use celestial_shared::protocol::ParticipantId;
use celestial_shared::vec2::Vec2;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Accepted {
        /// 1-based slot number
        slot: u32,
        spawn: Vec2,
        /// The id was already registered
        reconnect: bool,
    },
    Full,
}

#[derive(Debug)]
pub struct SessionRegistry {
    slots: Vec<Option<ParticipantId>>,
    spawn_points: Vec<Vec2>,
    /// Successful connects so far; drives the spawn rotation and never decreases
    spawns_assigned: u64,
}

impl SessionRegistry {
    pub fn new(capacity: usize, spawn_points: Vec<Vec2>) -> Self {
        Self {
            slots: vec![None; capacity],
            spawn_points,
            spawns_assigned: 0,
        }
    }

    pub fn connect(&mut self, id: &str) -> ConnectOutcome {
        if let Some(index) = self.index_of(id) {
            let spawn = self.next_spawn();
            return ConnectOutcome::Accepted {
                slot: index as u32 + 1,
                spawn,
                reconnect: true,
            };
        }

        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return ConnectOutcome::Full;
        };
        self.slots[index] = Some(id.to_string());
        let spawn = self.next_spawn();
        ConnectOutcome::Accepted {
            slot: index as u32 + 1,
            spawn,
            reconnect: false,
        }
    }

    /// Returns true if the id was registered.
    pub fn disconnect(&mut self, id: &str) -> bool {
        match self.index_of(id) {
            Some(index) => {
                self.slots[index] = None;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    pub fn slot_of(&self, id: &str) -> Option<u32> {
        self.index_of(id).map(|i| i as u32 + 1)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Connected ids in slot order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().filter_map(|s| s.as_deref())
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.as_deref() == Some(id))
    }

    fn next_spawn(&mut self) -> Vec2 {
        let spawn = if self.spawn_points.is_empty() {
            Vec2::ZERO
        } else {
            let index = (self.spawns_assigned % self.spawn_points.len() as u64) as usize;
            self.spawn_points[index]
        };
        self.spawns_assigned += 1;
        spawn
    }
}
