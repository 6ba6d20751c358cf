//! Client-side reconciliation: buffers the last two server positions per
//! participant, extrapolates one tick ahead and blends toward that target
//! over one server tick, independent of when snapshots arrive.

use std::collections::{HashMap, VecDeque};

use celestial_shared::config::DEFAULT_TICK_DT;
use celestial_shared::protocol::{ParticipantId, ServerSnapshot};
use celestial_shared::vec2::{add, lerp, scale, sub, Vec2};

use crate::animation::{Animator, Facing, MotionState};

const HISTORY_LEN: usize = 2;

/// One authoritative position as seen in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub position: Vec2,
    pub tick: u64,
}

/// What the renderer needs for one participant this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub position: Vec2,
    pub motion: MotionState,
    pub facing: Facing,
    pub frame: usize,
}

#[derive(Debug)]
struct Track {
    history: VecDeque<HistoryEntry>,
    /// Smoothed position captured when the latest entry was absorbed
    origin: Vec2,
    /// Seconds since the latest entry was absorbed
    t_local: f64,
    smoothed: Vec2,
    last_facing: Facing,
    animator: Animator,
}

impl Track {
    fn new(entry: HistoryEntry) -> Self {
        let mut history = VecDeque::with_capacity(HISTORY_LEN + 1);
        history.push_back(entry);
        Self {
            history,
            origin: entry.position,
            t_local: 0.0,
            smoothed: entry.position,
            last_facing: Facing::default(),
            animator: Animator::new(),
        }
    }

    fn push(&mut self, entry: HistoryEntry) {
        let newest = self.history.back().map(|e| e.tick);
        if newest.is_some_and(|tick| entry.tick < tick) {
            tracing::trace!("Dropping stale entry for tick {}", entry.tick);
            return;
        }
        self.history.push_back(entry);
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
        self.origin = self.smoothed;
        self.t_local = 0.0;
    }

    /// Predicted target and the server time span the two entries cover.
    fn target(&self, tick_dt: f64) -> (Vec2, f64) {
        let (Some(first), Some(last)) = (self.history.front(), self.history.back()) else {
            return (self.smoothed, 0.0);
        };
        if self.history.len() < 2 {
            return (last.position, 0.0);
        }

        let dtick = last.tick as f64 - first.tick as f64;
        let dt = dtick * tick_dt;
        if dtick <= 0.0 || dt <= 0.0 {
            return (last.position, dt);
        }

        let velocity = scale(sub(last.position, first.position), 1.0 / dt);
        (add(last.position, scale(velocity, tick_dt)), dt)
    }

    fn update(&mut self, delta_time: f64, tick_dt: f64) {
        self.t_local += delta_time.max(0.0);

        if self.history.len() < 2 {
            if let Some(entry) = self.history.back() {
                self.smoothed = entry.position;
            }
            self.animator.set(MotionState::Idle, self.last_facing);
            self.animator.advance(delta_time);
            return;
        }

        let (target, dt) = self.target(tick_dt);
        let alpha = if dt <= 0.0 {
            1.0
        } else {
            (self.t_local / dt).clamp(0.0, 1.0)
        };
        self.smoothed = lerp(self.origin, target, alpha);

        let raw = sub(self.history[1].position, self.history[0].position);
        match Facing::from_motion(raw) {
            Some(facing) => {
                self.last_facing = facing;
                self.animator.set(MotionState::Walking, facing);
            }
            None => self.animator.set(MotionState::Idle, self.last_facing),
        }
        self.animator.advance(delta_time);
    }

    fn render_state(&self) -> RenderState {
        RenderState {
            position: self.smoothed,
            motion: self.animator.state(),
            facing: self.animator.facing(),
            frame: self.animator.frame(),
        }
    }
}

/// Per-participant smoothing state driven once per render frame.
#[derive(Debug)]
pub struct ReconciliationEngine {
    tracks: HashMap<ParticipantId, Track>,
    tick_dt: f64,
    elapsed_time: f64,
    match_started: bool,
    /// Newest snapshot tick absorbed so far
    latest_tick: Option<u64>,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self {
            tracks: HashMap::new(),
            tick_dt: DEFAULT_TICK_DT,
            elapsed_time: 0.0,
            match_started: false,
            latest_tick: None,
        }
    }
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb the newest snapshot, if any, then advance every participant by
    /// `delta_time` seconds.
    pub fn frame(&mut self, snapshot: Option<&ServerSnapshot>, delta_time: f64) {
        if let Some(snapshot) = snapshot {
            self.absorb(snapshot);
        }
        self.update(delta_time);
    }

    /// Absorb one snapshot. A snapshot older than the newest one absorbed
    /// is discarded whole.
    pub fn absorb(&mut self, snapshot: &ServerSnapshot) {
        if self.latest_tick.is_some_and(|tick| snapshot.tick < tick) {
            tracing::trace!("Discarding stale snapshot for tick {}", snapshot.tick);
            return;
        }
        self.latest_tick = Some(snapshot.tick);
        self.tick_dt = snapshot.tick_dt;
        self.elapsed_time = snapshot.elapsed_time;
        self.match_started = snapshot.match_started;

        // Participants missing from the snapshot have disconnected
        self.tracks.retain(|id, _| snapshot.players.contains_key(id));

        for (id, position) in &snapshot.players {
            let entry = HistoryEntry {
                position: *position,
                tick: snapshot.tick,
            };
            match self.tracks.get_mut(id) {
                Some(track) => track.push(entry),
                None => {
                    tracing::debug!("Tracking new participant {}", id);
                    self.tracks.insert(id.clone(), Track::new(entry));
                }
            }
        }
    }

    pub fn update(&mut self, delta_time: f64) {
        let tick_dt = self.tick_dt;
        for track in self.tracks.values_mut() {
            track.update(delta_time, tick_dt);
        }
    }

    pub fn render_state(&self, id: &str) -> Option<RenderState> {
        self.tracks.get(id).map(Track::render_state)
    }

    pub fn render_states(&self) -> impl Iterator<Item = (&str, RenderState)> + '_ {
        self.tracks
            .iter()
            .map(|(id, track)| (id.as_str(), track.render_state()))
    }

    /// Buffered entries for a participant, oldest first.
    pub fn history(&self, id: &str) -> Option<Vec<HistoryEntry>> {
        self.tracks
            .get(id)
            .map(|track| track.history.iter().copied().collect())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tick_dt(&self) -> f64 {
        self.tick_dt
    }

    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    pub fn match_started(&self) -> bool {
        self.match_started
    }

    /// Match clock as `mm:ss`.
    pub fn match_clock(&self) -> String {
        let secs = self.elapsed_time.max(0.0).floor() as u64;
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use celestial_shared::vec2::vec2;

    const EPS: f64 = 1e-9;

    fn snapshot(tick: u64, players: &[(&str, f64, f64)]) -> ServerSnapshot {
        ServerSnapshot {
            tick,
            tick_dt: 0.02,
            players: players
                .iter()
                .map(|(id, x, y)| (id.to_string(), vec2(*x, *y)))
                .collect(),
            elapsed_time: 0.0,
            match_started: true,
        }
    }

    fn assert_close(a: Vec2, b: Vec2) {
        assert!(
            (a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS,
            "{:?} != {:?}",
            a,
            b
        );
    }

    fn position(engine: &ReconciliationEngine, id: &str) -> Vec2 {
        engine.render_state(id).unwrap().position
    }

    #[test]
    fn test_single_entry_snaps() {
        let mut engine = ReconciliationEngine::new();
        engine.frame(Some(&snapshot(1, &[("a", 50.0, 60.0)])), 0.016);

        let state = engine.render_state("a").unwrap();
        assert_close(state.position, vec2(50.0, 60.0));
        assert_eq!(state.motion, MotionState::Idle);
    }

    #[test]
    fn test_dead_reckoning_scenario() {
        let mut engine = ReconciliationEngine::new();
        engine.absorb(&snapshot(10, &[("a", 0.0, 0.0)]));
        engine.absorb(&snapshot(11, &[("a", 10.0, 0.0)]));

        engine.update(0.01);
        assert_close(position(&engine, "a"), vec2(10.0, 0.0));

        engine.update(0.01);
        assert_close(position(&engine, "a"), vec2(20.0, 0.0));

        // Clamped at the target
        engine.update(1.0);
        assert_close(position(&engine, "a"), vec2(20.0, 0.0));
    }

    #[test]
    fn test_interpolation_stays_on_segment() {
        let mut engine = ReconciliationEngine::new();
        engine.frame(Some(&snapshot(1, &[("a", 0.0, 0.0)])), 0.016);
        engine.frame(Some(&snapshot(3, &[("a", 8.0, 4.0)])), 0.0);

        // origin (0,0), target (8,4) + (200,100) * 0.02 = (12,6)
        for _ in 0..20 {
            engine.update(0.003);
            let p = position(&engine, "a");
            assert!(p.x >= -EPS && p.x <= 12.0 + EPS, "x out of range: {}", p.x);
            assert!((p.y - p.x / 2.0).abs() < 1e-6, "off the segment: {:?}", p);
        }
        assert_close(position(&engine, "a"), vec2(12.0, 6.0));
    }

    #[test]
    fn test_origin_is_current_smoothed_position() {
        let mut engine = ReconciliationEngine::new();
        engine.absorb(&snapshot(10, &[("a", 0.0, 0.0)]));
        engine.absorb(&snapshot(11, &[("a", 10.0, 0.0)]));
        engine.update(0.01);
        assert_close(position(&engine, "a"), vec2(10.0, 0.0));

        // New pair (10,0)@11 -> (20,0)@12, target (30,0); blend starts at (10,0)
        engine.absorb(&snapshot(12, &[("a", 20.0, 0.0)]));
        engine.update(0.0);
        assert_close(position(&engine, "a"), vec2(10.0, 0.0));
        engine.update(0.01);
        assert_close(position(&engine, "a"), vec2(20.0, 0.0));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut engine = ReconciliationEngine::new();
        for tick in 0..10 {
            engine.frame(Some(&snapshot(tick, &[("a", tick as f64, 0.0)])), 0.02);
        }
        let history = engine.history("a").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].tick, 8);
        assert_eq!(history[1].tick, 9);
    }

    #[test]
    fn test_stale_entry_is_dropped() {
        let mut engine = ReconciliationEngine::new();
        engine.absorb(&snapshot(5, &[("a", 0.0, 0.0)]));
        engine.absorb(&snapshot(6, &[("a", 5.0, 0.0)]));
        engine.update(0.01);
        let before = position(&engine, "a");

        engine.absorb(&snapshot(4, &[("a", 100.0, 100.0)]));
        let history = engine.history("a").unwrap();
        assert_eq!(history.last().unwrap().tick, 6);

        // Clock was not reset: the blend simply continues
        engine.update(0.01);
        assert!(position(&engine, "a").x > before.x);
        assert_eq!(position(&engine, "a").y, 0.0);
    }

    #[test]
    fn test_late_snapshot_is_discarded_whole() {
        let mut engine = ReconciliationEngine::new();
        let mut s10 = snapshot(10, &[("a", 0.0, 0.0), ("b", 50.0, 0.0)]);
        s10.elapsed_time = 3.0;
        let mut s11 = snapshot(11, &[("a", 5.0, 0.0), ("b", 50.0, 0.0)]);
        s11.elapsed_time = 3.02;
        let mut s9 = snapshot(9, &[("a", -5.0, 0.0), ("c", 90.0, 90.0)]);
        s9.elapsed_time = 2.98;
        s9.match_started = false;

        engine.absorb(&s10);
        engine.absorb(&s11);
        engine.absorb(&s9);

        assert!(engine.render_state("b").is_some());
        assert!(engine.render_state("c").is_none());
        assert_eq!(engine.elapsed_time(), 3.02);
        assert!(engine.match_started());
        assert_eq!(engine.history("a").unwrap().last().unwrap().tick, 11);

        // Later snapshots are still absorbed
        engine.absorb(&snapshot(12, &[("a", 10.0, 0.0)]));
        assert!(engine.render_state("b").is_none());
        assert_eq!(engine.history("a").unwrap().last().unwrap().tick, 12);
    }

    #[test]
    fn test_duplicate_tick_jumps_to_latest() {
        let mut engine = ReconciliationEngine::new();
        engine.absorb(&snapshot(7, &[("a", 0.0, 0.0)]));
        engine.absorb(&snapshot(7, &[("a", 3.0, 4.0)]));
        engine.update(0.0);
        assert_close(position(&engine, "a"), vec2(3.0, 4.0));
    }

    #[test]
    fn test_zero_tick_dt_jumps_to_latest() {
        let mut engine = ReconciliationEngine::new();
        let mut first = snapshot(1, &[("a", 0.0, 0.0)]);
        first.tick_dt = 0.0;
        let mut second = snapshot(2, &[("a", 9.0, 0.0)]);
        second.tick_dt = 0.0;
        engine.absorb(&first);
        engine.absorb(&second);
        engine.update(0.001);
        assert_close(position(&engine, "a"), vec2(9.0, 0.0));
    }

    #[test]
    fn test_absent_participant_is_removed() {
        let mut engine = ReconciliationEngine::new();
        engine.frame(Some(&snapshot(1, &[("a", 0.0, 0.0), ("b", 1.0, 1.0)])), 0.016);
        assert_eq!(engine.len(), 2);

        engine.frame(Some(&snapshot(2, &[("b", 1.0, 1.0)])), 0.016);
        assert_eq!(engine.len(), 1);
        assert!(engine.render_state("a").is_none());
        assert!(engine.history("a").is_none());

        // A returning participant starts from scratch
        engine.frame(Some(&snapshot(3, &[("a", 40.0, 0.0), ("b", 1.0, 1.0)])), 0.016);
        assert_eq!(engine.history("a").unwrap().len(), 1);
        assert_close(position(&engine, "a"), vec2(40.0, 0.0));
    }

    #[test]
    fn test_render_states_cover_every_tracked_participant() {
        let mut engine = ReconciliationEngine::new();
        engine.frame(Some(&snapshot(1, &[("a", 1.0, 2.0), ("b", 3.0, 4.0)])), 0.016);
        let mut states: Vec<_> = engine.render_states().collect();
        states.sort_by(|x, y| x.0.cmp(y.0));
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].0, "a");
        assert_close(states[1].1.position, vec2(3.0, 4.0));
    }

    #[test]
    fn test_unknown_participant_has_no_render_state() {
        let engine = ReconciliationEngine::new();
        assert!(engine.render_state("ghost").is_none());
        assert!(engine.is_empty());
        assert_eq!(engine.tick_dt(), DEFAULT_TICK_DT);
    }

    #[test]
    fn test_motion_state_follows_history() {
        let mut engine = ReconciliationEngine::new();
        engine.frame(Some(&snapshot(1, &[("a", 0.0, 0.0)])), 0.016);
        engine.frame(Some(&snapshot(2, &[("a", 0.0, -5.0)])), 0.016);
        let state = engine.render_state("a").unwrap();
        assert_eq!(state.motion, MotionState::Walking);
        assert_eq!(state.facing, Facing::Down);

        // Stops moving: idle, still facing down
        engine.frame(Some(&snapshot(3, &[("a", 0.0, -5.0)])), 0.016);
        let state = engine.render_state("a").unwrap();
        assert_eq!(state.motion, MotionState::Idle);
        assert_eq!(state.facing, Facing::Down);
    }

    #[test]
    fn test_match_clock_and_flags() {
        let mut engine = ReconciliationEngine::new();
        let mut snap = snapshot(100, &[]);
        snap.elapsed_time = 125.7;
        snap.match_started = true;
        engine.absorb(&snap);
        assert_eq!(engine.match_clock(), "02:05");
        assert!(engine.match_started());
        assert_eq!(engine.elapsed_time(), 125.7);
    }
}
