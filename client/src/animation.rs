use celestial_shared::vec2::Vec2;

/// Seconds each animation frame is held.
pub const FRAME_TIME: f64 = 0.12;

/// Displacements at or below this are treated as standing still.
const MOTION_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionState {
    Idle,
    Walking,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Facing {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Facing {
    /// Facing implied by a displacement, or `None` when it is too small to
    /// count as movement. The dominant axis wins; ties go vertical.
    pub fn from_motion(delta: Vec2) -> Option<Facing> {
        if delta.x.abs() <= MOTION_EPSILON && delta.y.abs() <= MOTION_EPSILON {
            return None;
        }
        let facing = if delta.x.abs() > delta.y.abs() {
            if delta.x > 0.0 {
                Facing::Right
            } else {
                Facing::Left
            }
        } else if delta.y > 0.0 {
            Facing::Up
        } else {
            Facing::Down
        };
        Some(facing)
    }
}

/// Number of frames in the sprite clip for a state/facing pair.
pub fn clip_len(state: MotionState, facing: Facing) -> usize {
    match (state, facing) {
        (MotionState::Idle, Facing::Up) => 4,
        (MotionState::Idle, _) => 12,
        (MotionState::Walking, _) => 6,
    }
}

/// Frame counter for one participant's sprite.
#[derive(Debug, Clone)]
pub struct Animator {
    state: MotionState,
    facing: Facing,
    frame: usize,
    timer: f64,
}

impl Default for Animator {
    fn default() -> Self {
        Self {
            state: MotionState::Idle,
            facing: Facing::default(),
            frame: 0,
            timer: 0.0,
        }
    }
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch clip. Only a state change restarts the clip; a facing change
    /// keeps the current frame, wrapped into the new clip.
    pub fn set(&mut self, state: MotionState, facing: Facing) {
        if state != self.state {
            self.frame = 0;
            self.timer = 0.0;
        } else if facing != self.facing {
            self.frame %= clip_len(state, facing);
        }
        self.state = state;
        self.facing = facing;
    }

    pub fn advance(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        self.timer += dt;
        let len = clip_len(self.state, self.facing);
        while self.timer >= FRAME_TIME {
            self.timer -= FRAME_TIME;
            self.frame = (self.frame + 1) % len;
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn frame(&self) -> usize {
        self.frame
    }
}
