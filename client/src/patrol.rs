use celestial_shared::protocol::Direction;

/// Scripted input for the headless client: walks a loop of timed legs.
#[derive(Debug, Clone)]
pub struct Patrol {
    legs: Vec<(Direction, f64)>,
    index: usize,
    remaining: f64,
}

impl Patrol {
    /// Each leg is held for its duration in seconds. Empty or non-positive
    /// durations are skipped.
    pub fn new(legs: Vec<(Direction, f64)>) -> Self {
        let legs: Vec<_> = legs.into_iter().filter(|(_, secs)| *secs > 0.0).collect();
        let remaining = legs.first().map_or(0.0, |(_, secs)| *secs);
        Self {
            legs,
            index: 0,
            remaining,
        }
    }

    /// Right, up, left, down, each held for `leg_secs`.
    pub fn square(leg_secs: f64) -> Self {
        Self::new(vec![
            (Direction::Right, leg_secs),
            (Direction::Up, leg_secs),
            (Direction::Left, leg_secs),
            (Direction::Down, leg_secs),
        ])
    }

    /// Direction to hold for this frame, or `None` when there are no legs.
    pub fn update(&mut self, dt: f64) -> Option<Direction> {
        if self.legs.is_empty() {
            return None;
        }
        self.remaining -= dt.max(0.0);
        while self.remaining <= 0.0 {
            self.index = (self.index + 1) % self.legs.len();
            self.remaining += self.legs[self.index].1;
        }
        Some(self.legs[self.index].0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_cycles_directions() {
        let mut patrol = Patrol::square(1.0);
        assert_eq!(patrol.update(0.5), Some(Direction::Right));
        assert_eq!(patrol.update(0.75), Some(Direction::Up));
        assert_eq!(patrol.update(1.0), Some(Direction::Left));
        assert_eq!(patrol.update(1.0), Some(Direction::Down));
        assert_eq!(patrol.update(1.0), Some(Direction::Right));
    }

    #[test]
    fn test_large_step_skips_legs() {
        let mut patrol = Patrol::square(1.0);
        assert_eq!(patrol.update(2.5), Some(Direction::Left));
    }

    #[test]
    fn test_empty_patrol_is_silent() {
        let mut patrol = Patrol::new(vec![(Direction::Up, 0.0)]);
        assert_eq!(patrol.update(0.1), None);
    }
}
