//! Node configuration types.

use lobby_realtime::{HeartbeatConfig, LobbyConfig, RouterConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "LOBBY";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Configuration for the lobby node.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP and WebSocket listen address.
    pub api_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (pretty or json).
    pub log_format: String,

    /// Seconds between heartbeat probes.
    #[validate(range(min = 1, max = 3600))]
    pub probe_interval_secs: u64,
    /// Seconds a client has to answer a probe.
    #[validate(range(min = 1, max = 3600))]
    pub reply_deadline_secs: u64,

    /// Capacity of each connection's outbound queue.
    #[validate(range(min = 1, max = 65536))]
    pub outbound_capacity: usize,
    /// Maximum number of concurrent connections.
    #[validate(range(min = 1))]
    pub max_connections: usize,
    /// Maximum username length, in characters.
    #[validate(range(min = 1, max = 256))]
    pub max_username_len: usize,
    /// Maximum chat message length, in characters.
    #[validate(range(min = 1, max = 65536))]
    pub max_content_len: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let lobby = LobbyConfig::default();
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            probe_interval_secs: lobby.heartbeat.probe_interval.as_secs(),
            reply_deadline_secs: lobby.heartbeat.reply_deadline.as_secs(),
            outbound_capacity: lobby.outbound_capacity,
            max_connections: lobby.max_connections,
            max_username_len: lobby.router.max_username_len,
            max_content_len: lobby.router.max_content_len,
        }
    }
}

impl NodeConfig {
    /// Load configuration from defaults, an optional YAML file and
    /// `LOBBY_*` environment variables, in increasing precedence.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&NodeConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: NodeConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Core settings for the lobby.
    pub fn lobby_config(&self) -> LobbyConfig {
        LobbyConfig {
            heartbeat: HeartbeatConfig {
                probe_interval: Duration::from_secs(self.probe_interval_secs),
                reply_deadline: Duration::from_secs(self.reply_deadline_secs),
            },
            router: RouterConfig {
                max_username_len: self.max_username_len,
                max_content_len: self.max_content_len,
            },
            outbound_capacity: self.outbound_capacity,
            max_connections: self.max_connections,
        }
    }
}
