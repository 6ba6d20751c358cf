use std::path::{Path, PathBuf};

use celestial_shared::config::SimConfig;
use serde::Deserialize;

/// Errors raised while assembling the server configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration, loaded from an optional TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Map geometry JSON; the built-in map is used when unset
    pub map_path: Option<PathBuf>,
    /// Stop the server once the last participant disconnects
    pub exit_when_empty: bool,
    /// Queued movement intents before the `/move` readers are back-pressured
    pub intent_queue: usize,
    /// Snapshots buffered per subscriber before it is skipped ahead
    pub snapshot_buffer: usize,
    /// Largest accepted WebSocket frame on the client-to-server channels
    pub max_message_bytes: usize,
    pub sim: SimConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5555".to_string(),
            map_path: None,
            exit_when_empty: false,
            intent_queue: 1024,
            snapshot_buffer: 16,
            max_message_bytes: 1024,
            sim: SimConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `path` as TOML. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Config file named by `CELESTIAL_CONFIG` (if any), then the
    /// `CELESTIAL_LISTEN_ADDR` and `CELESTIAL_MAP` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("CELESTIAL_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Ok(addr) = std::env::var("CELESTIAL_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(map) = std::env::var_os("CELESTIAL_MAP") {
            config.map_path = Some(PathBuf::from(map));
        }
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.sim.validate()?;
        if self.intent_queue == 0 {
            return Err("intent_queue must be at least 1".to_string());
        }
        if self.snapshot_buffer == 0 {
            return Err("snapshot_buffer must be at least 1".to_string());
        }
        if self.max_message_bytes < 64 {
            return Err("max_message_bytes must be at least 64".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_file_parses() {
        let config: ServerConfig = toml::from_str(include_str!("../../celestial.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.map_path,
            Some(PathBuf::from("maps/first_region.json"))
        );
        assert_eq!(config.sim.match_size, 2);
        assert_eq!(config.sim.body_width, 32.0);
    }

    #[test]
    fn default_server_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sim.capacity, 2);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            listen_addr = "127.0.0.1:7000"
            exit_when_empty = true

            [sim]
            capacity = 4
            match_size = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:7000");
        assert!(config.exit_when_empty);
        assert_eq!(config.sim.capacity, 4);
        assert_eq!(config.sim.match_size, 1);
        assert_eq!(config.sim.tick_dt, 0.02);
        assert_eq!(config.intent_queue, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_sim_section_rejected() {
        let mut config = ServerConfig::default();
        config.sim.capacity = 0;
        assert!(config.validate().is_err());
    }
}
