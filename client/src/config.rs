use std::time::Duration;

use url::Url;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:5555";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported server url {0}: expected ws:// or wss://")]
    UnsupportedScheme(String),
    #[error("invalid {name}: {value}")]
    InvalidSetting { name: &'static str, value: String },
    #[error("failed to start network thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("network thread did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL; the `/move`, `/snapshots` and `/control` channels hang off it
    pub server_url: Url,
    pub player_id: String,
    /// How long the headless client runs before disconnecting
    pub run_secs: f64,
    /// Bound on the best-effort disconnect exchange
    pub disconnect_timeout: Duration,
    /// Bound on waiting for the network thread at shutdown
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server_url: &str, player_id: impl Into<String>) -> Result<Self, ClientError> {
        let server_url = Url::parse(server_url)?;
        if !matches!(server_url.scheme(), "ws" | "wss") || server_url.cannot_be_a_base() {
            return Err(ClientError::UnsupportedScheme(server_url.to_string()));
        }
        Ok(Self {
            server_url,
            player_id: player_id.into(),
            run_secs: 10.0,
            disconnect_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(5),
        })
    }

    /// Read `CELESTIAL_SERVER_URL`, `CELESTIAL_PLAYER_ID` and
    /// `CELESTIAL_RUN_SECS`, falling back to defaults.
    pub fn from_env() -> Result<Self, ClientError> {
        let url = std::env::var("CELESTIAL_SERVER_URL")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        let player_id = std::env::var("CELESTIAL_PLAYER_ID")
            .unwrap_or_else(|_| format!("player-{}", std::process::id()));
        if player_id.is_empty() {
            return Err(ClientError::InvalidSetting {
                name: "CELESTIAL_PLAYER_ID",
                value: player_id,
            });
        }

        let mut config = Self::new(&url, player_id)?;
        if let Ok(value) = std::env::var("CELESTIAL_RUN_SECS") {
            config.run_secs = match value.parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs >= 0.0 => secs,
                _ => {
                    return Err(ClientError::InvalidSetting {
                        name: "CELESTIAL_RUN_SECS",
                        value,
                    })
                }
            };
        }
        Ok(config)
    }

    /// URL of one named channel below the base URL.
    pub fn channel_url(&self, channel: &str) -> Url {
        let mut url = self.server_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(channel);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_urls() {
        let config = ClientConfig::new(DEFAULT_SERVER_URL, "a").unwrap();
        assert_eq!(
            config.channel_url("control").as_str(),
            "ws://127.0.0.1:5555/control"
        );

        let config = ClientConfig::new("wss://lands.example/game/", "a").unwrap();
        assert_eq!(
            config.channel_url("snapshots").as_str(),
            "wss://lands.example/game/snapshots"
        );
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        assert!(matches!(
            ClientConfig::new("http://127.0.0.1:5555", "a"),
            Err(ClientError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            ClientConfig::new("not a url", "a"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_default_timeouts() {
        let config = ClientConfig::new(DEFAULT_SERVER_URL, "a").unwrap();
        assert_eq!(config.disconnect_timeout, Duration::from_secs(2));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }
}
