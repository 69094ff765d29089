//! Server configuration loaded from TOML.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! max_body_bytes = 1048576
//!
//! [websocket]
//! allowed_origins = ["https://tpot.example"]
//! subprotocols = ["chat.v1"]
//! ```

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Request bodies larger than this are answered with `413`.
    pub max_body_bytes: usize,
    pub websocket: WebSocketSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            websocket: WebSocketSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), bind = %config.bind, "loaded server config");
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSocketSettings {
    pub max_message_size: Option<usize>,
    pub max_frame_size: Option<usize>,
    /// Origins allowed to open a socket. Empty means same-origin only.
    pub allowed_origins: Vec<String>,
    /// Subprotocols offered to clients, in order of preference.
    pub subprotocols: Vec<String>,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            max_message_size: Some(64 << 20),
            max_frame_size: Some(16 << 20),
            allowed_origins: Vec::new(),
            subprotocols: Vec::new(),
        }
    }
}

impl WebSocketSettings {
    pub fn protocol_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = self.max_message_size;
        config.max_frame_size = self.max_frame_size;
        config
    }
}
