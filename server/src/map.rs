//! Static map geometry: bounds, obstacles and spawn points.
//!
//! The tile-map loader lives outside this crate; it hands the server a JSON
//! export of the collision layer which is read once at startup.

use std::path::{Path, PathBuf};

use celestial_shared::config::SimConfig;
use celestial_shared::vec2::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::{CollisionResolver, Rect};

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("failed to read map {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse map {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid map: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapGeometry {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub obstacles: Vec<Rect>,
    #[serde(default = "default_spawn_points")]
    pub spawn_points: Vec<Vec2>,
}

/// The two-slot arena layout: one spawn on each side.
pub const LEFT_SPAWN: Vec2 = Vec2 { x: 200.0, y: 300.0 };
pub const RIGHT_SPAWN: Vec2 = Vec2 { x: 600.0, y: 300.0 };

fn default_spawn_points() -> Vec<Vec2> {
    vec![LEFT_SPAWN, RIGHT_SPAWN]
}

impl Default for MapGeometry {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            // Central pillar between the two spawns
            obstacles: vec![Rect::new(380.0, 420.0, 240.0, 360.0)],
            spawn_points: default_spawn_points(),
        }
    }
}

impl MapGeometry {
    pub fn load(path: &Path) -> Result<Self, MapError> {
        let text = std::fs::read_to_string(path).map_err(|source| MapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| MapError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the geometry against the participant body it will host.
    pub fn validate(&self, sim: &SimConfig) -> Result<(), MapError> {
        if !self.width.is_finite() || !self.height.is_finite() {
            return Err(MapError::Invalid("bounds must be finite".to_string()));
        }
        if self.width < sim.body_width || self.height < sim.body_height {
            return Err(MapError::Invalid(format!(
                "map {}x{} is smaller than a participant body",
                self.width, self.height
            )));
        }
        if let Some(bad) = self.obstacles.iter().find(|o| !o.is_well_formed()) {
            return Err(MapError::Invalid(format!("malformed obstacle {:?}", bad)));
        }
        if self.spawn_points.is_empty() {
            return Err(MapError::Invalid("no spawn points".to_string()));
        }

        let resolver = self.resolver(sim);
        for spawn in &self.spawn_points {
            if resolver.clamp(spawn.x, spawn.y) != *spawn {
                return Err(MapError::Invalid(format!(
                    "spawn ({}, {}) is outside the map",
                    spawn.x, spawn.y
                )));
            }
            if resolver.is_blocked(spawn.x, spawn.y) {
                return Err(MapError::Invalid(format!(
                    "spawn ({}, {}) overlaps an obstacle",
                    spawn.x, spawn.y
                )));
            }
        }
        Ok(())
    }

    pub fn resolver(&self, sim: &SimConfig) -> CollisionResolver {
        CollisionResolver::new(
            self.obstacles.clone(),
            self.width,
            self.height,
            sim.body_width,
            sim.body_height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_is_valid() {
        let map = MapGeometry::default();
        assert!(map.validate(&SimConfig::default()).is_ok());
        assert_eq!(map.spawn_points, vec![LEFT_SPAWN, RIGHT_SPAWN]);
    }

    #[test]
    fn bundled_region_map_is_valid() {
        let map: MapGeometry =
            serde_json::from_str(include_str!("../../maps/first_region.json")).unwrap();
        assert!(map.validate(&SimConfig::default()).is_ok());
        assert_eq!(map.obstacles.len(), 4);
        assert_eq!(map.spawn_points.len(), 3);
    }

    #[test]
    fn parses_exported_collision_layer() {
        let json = r#"{
            "width": 1024,
            "height": 768,
            "obstacles": [{"left": 0, "right": 64, "bottom": 0, "top": 768}],
            "spawn_points": [{"x": 128, "y": 128}, {"x": 900, "y": 600}, {"x": 500, "y": 400}]
        }"#;
        let map: MapGeometry = serde_json::from_str(json).unwrap();
        assert_eq!(map.obstacles.len(), 1);
        assert_eq!(map.spawn_points.len(), 3);
        assert!(map.validate(&SimConfig::default()).is_ok());
    }

    #[test]
    fn missing_spawn_points_fall_back_to_arena_pair() {
        let map: MapGeometry = serde_json::from_str(r#"{"width": 800, "height": 600}"#).unwrap();
        assert_eq!(map.spawn_points, vec![LEFT_SPAWN, RIGHT_SPAWN]);
        assert!(map.obstacles.is_empty());
    }

    #[test]
    fn spawn_inside_obstacle_invalid() {
        let map = MapGeometry {
            obstacles: vec![Rect::new(150.0, 250.0, 250.0, 350.0)],
            ..Default::default()
        };
        assert!(matches!(
            map.validate(&SimConfig::default()),
            Err(MapError::Invalid(_))
        ));
    }

    #[test]
    fn spawn_outside_bounds_invalid() {
        let map = MapGeometry {
            spawn_points: vec![Vec2::new(5.0, 300.0)],
            ..Default::default()
        };
        assert!(map.validate(&SimConfig::default()).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = MapGeometry::load(Path::new("/nonexistent/celestial-map.json")).unwrap_err();
        assert!(matches!(err, MapError::Read { .. }));
    }
}
