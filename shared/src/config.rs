/// Simulation parameters shared by the server (authoritative values) and the
/// client (fallbacks until the first snapshot arrives).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seconds per server tick
    pub tick_dt: f64,
    /// World units moved per applied movement intent
    pub speed: f64,
    /// Collision box of a participant, centred on its position
    pub body_width: f64,
    pub body_height: f64,
    /// Maximum simultaneously connected participants
    pub capacity: usize,
    /// Connected participants needed before movement is simulated
    pub match_size: usize,
}

/// Server tick duration used when nothing else is known (50 Hz).
pub const DEFAULT_TICK_DT: f64 = 0.02;

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_dt: DEFAULT_TICK_DT,
            speed: 5.0,
            body_width: 32.0,
            body_height: 32.0,
            capacity: 2,
            match_size: 2,
        }
    }
}

impl SimConfig {
    pub fn half_width(&self) -> f64 {
        self.body_width / 2.0
    }

    pub fn half_height(&self) -> f64 {
        self.body_height / 2.0
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.tick_dt.is_finite() || self.tick_dt <= 0.0 {
            return Err("tick_dt must be finite and > 0".to_string());
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err("speed must be finite and >= 0".to_string());
        }
        if !self.body_width.is_finite() || self.body_width <= 0.0 {
            return Err("body_width must be finite and > 0".to_string());
        }
        if !self.body_height.is_finite() || self.body_height <= 0.0 {
            return Err("body_height must be finite and > 0".to_string());
        }
        if self.capacity == 0 {
            return Err("capacity must be at least 1".to_string());
        }
        if self.match_size == 0 || self.match_size > self.capacity {
            return Err("match_size must be between 1 and capacity".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sim_config_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_dt, 0.02);
    }

    #[test]
    fn zero_tick_dt_invalid() {
        let config = SimConfig {
            tick_dt: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn match_size_above_capacity_invalid() {
        let config = SimConfig {
            capacity: 2,
            match_size: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn half_extents() {
        let config = SimConfig {
            body_width: 20.0,
            body_height: 10.0,
            ..Default::default()
        };
        assert_eq!(config.half_width(), 10.0);
        assert_eq!(config.half_height(), 5.0);
    }
}
