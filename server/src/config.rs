//! Server settings: built-in defaults, optionally overlaid by a TOML file.
//! Command-line overrides are applied by the binary.

use crate::error::ServerError;
use chat_shared::{DEFAULT_HOST, DEFAULT_PORT};
use clap::ValueEnum;
use serde::Deserialize;
use std::path::Path;

/// How received bytes are cut into messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One read of up to 255 bytes is one message
    #[default]
    Chunk,
    /// Every `\n`-terminated line is one message
    Line,
}

/// Effective server settings; keys missing from a TOML file keep their defaults
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub host: String,
    /// Port to listen on; 0 picks an ephemeral one
    pub port: u16,
    /// Hours a banned session stays muted
    pub ban_duration_hours: u64,
    /// Complaints that start a ban
    pub complaint_threshold: u32,
    /// Broadcasts allowed per rate window
    pub message_limit: u32,
    /// Length of one rate window in minutes
    pub rate_window_minutes: u64,
    /// How received bytes are split into messages
    pub framing: Framing,
    /// Messages queued for one peer before it is disconnected as unresponsive
    pub outbound_queue_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ban_duration_hours: 4,
            complaint_threshold: 3,
            message_limit: 20,
            rate_window_minutes: 60,
            framing: Framing::Chunk,
            outbound_queue_limit: 1024,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ServerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
