//! Axis-aligned collision against the static obstacle set.
//!
//! Everything here is a pure function of immutable map data, so a resolver
//! can be shared freely between tasks.

use celestial_shared::vec2::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in world units (y up, so `bottom < top`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

impl Rect {
    pub fn new(left: f64, right: f64, bottom: f64, top: f64) -> Self {
        Self {
            left,
            right,
            bottom,
            top,
        }
    }

    /// Box of the given half extents centred on `center`.
    pub fn centered(center: Vec2, half_w: f64, half_h: f64) -> Self {
        Self {
            left: center.x - half_w,
            right: center.x + half_w,
            bottom: center.y - half_h,
            top: center.y + half_h,
        }
    }

    /// Strict overlap: rectangles that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.right > other.left
            && self.left < other.right
            && self.top > other.bottom
            && self.bottom < other.top
    }

    pub fn is_well_formed(&self) -> bool {
        [self.left, self.right, self.bottom, self.top]
            .iter()
            .all(|v| v.is_finite())
            && self.left < self.right
            && self.bottom < self.top
    }
}

/// Collision queries for a participant body against static geometry.
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    obstacles: Vec<Rect>,
    half_w: f64,
    half_h: f64,
    width: f64,
    height: f64,
}

impl CollisionResolver {
    pub fn new(obstacles: Vec<Rect>, width: f64, height: f64, body_w: f64, body_h: f64) -> Self {
        Self {
            obstacles,
            half_w: body_w / 2.0,
            half_h: body_h / 2.0,
            width,
            height,
        }
    }

    /// Participant box centred at `(x, y)`.
    pub fn body_at(&self, x: f64, y: f64) -> Rect {
        Rect::centered(Vec2::new(x, y), self.half_w, self.half_h)
    }

    /// True if any obstacle overlaps the body centred at `(x, y)`.
    pub fn is_blocked(&self, x: f64, y: f64) -> bool {
        let body = self.body_at(x, y);
        self.obstacles.iter().any(|o| body.overlaps(o))
    }

    /// Clamp a centre so the whole body stays inside the map.
    pub fn clamp(&self, x: f64, y: f64) -> Vec2 {
        Vec2::new(
            clamp_axis(x, self.half_w, self.width - self.half_w),
            clamp_axis(y, self.half_h, self.height - self.half_h),
        )
    }

    /// Move from `from` by `delta`, resolving x then y.
    ///
    /// The y check uses the already-resolved x, so a body blocked on one
    /// axis still slides along the other.
    pub fn resolve(&self, from: Vec2, delta: Vec2) -> Vec2 {
        let candidate = self.clamp(from.x + delta.x, from.y + delta.y);
        let mut pos = from;
        if candidate.x != from.x && !self.is_blocked(candidate.x, pos.y) {
            pos.x = candidate.x;
        }
        if candidate.y != from.y && !self.is_blocked(pos.x, candidate.y) {
            pos.y = candidate.y;
        }
        pos
    }
}

/// Bodies wider than the map pin to the centre of the span.
fn clamp_axis(v: f64, min: f64, max: f64) -> f64 {
    if min > max {
        return (min + max) / 2.0;
    }
    v.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(obstacles: Vec<Rect>) -> CollisionResolver {
        CollisionResolver::new(obstacles, 800.0, 600.0, 32.0, 32.0)
    }

    #[test]
    fn overlap_is_strict() {
        let a = Rect::new(0.0, 10.0, 0.0, 10.0);
        let touching = Rect::new(10.0, 20.0, 0.0, 10.0);
        let inside = Rect::new(5.0, 15.0, 5.0, 15.0);
        assert!(!a.overlaps(&touching));
        assert!(a.overlaps(&inside));
        assert!(inside.overlaps(&a));
    }

    #[test]
    fn blocked_only_near_obstacle() {
        let r = resolver(vec![Rect::new(100.0, 200.0, 100.0, 200.0)]);
        assert!(r.is_blocked(150.0, 150.0));
        // Body edge reaches 100.0 exactly: touching, not overlapping
        assert!(!r.is_blocked(84.0, 150.0));
        assert!(r.is_blocked(85.0, 150.0));
        assert!(!r.is_blocked(400.0, 400.0));
    }

    #[test]
    fn clamp_keeps_body_inside_bounds() {
        let r = resolver(vec![]);
        assert_eq!(r.clamp(-50.0, 900.0), Vec2::new(16.0, 584.0));
        assert_eq!(r.clamp(400.0, 300.0), Vec2::new(400.0, 300.0));
    }

    #[test]
    fn resolve_rejects_move_into_wall() {
        let r = resolver(vec![Rect::new(120.0, 200.0, 0.0, 600.0)]);
        let from = Vec2::new(100.0, 300.0);
        assert_eq!(r.resolve(from, Vec2::new(5.0, 0.0)), from);
        assert_eq!(r.resolve(from, Vec2::new(-5.0, 0.0)), Vec2::new(95.0, 300.0));
    }

    #[test]
    fn resolve_slides_along_wall() {
        // Wall to the right; a diagonal step keeps its y component.
        let r = resolver(vec![Rect::new(120.0, 200.0, 0.0, 600.0)]);
        let from = Vec2::new(100.0, 300.0);
        assert_eq!(r.resolve(from, Vec2::new(5.0, 5.0)), Vec2::new(100.0, 305.0));
    }

    #[test]
    fn resolve_checks_y_with_moved_x() {
        // Moving right clears the x path, but the ceiling block above the
        // new x stops the y part. With the old x the y move would be free.
        let block = Rect::new(110.0, 150.0, 320.0, 400.0);
        let r = resolver(vec![block]);
        let from = Vec2::new(90.0, 300.0);
        assert!(!r.is_blocked(90.0, 305.0));
        let to = r.resolve(from, Vec2::new(5.0, 5.0));
        assert_eq!(to, Vec2::new(95.0, 300.0));
    }

    #[test]
    fn resolve_never_leaves_map() {
        let r = resolver(vec![]);
        let to = r.resolve(Vec2::new(18.0, 18.0), Vec2::new(-5.0, -5.0));
        assert_eq!(to, Vec2::new(16.0, 16.0));
    }
}
