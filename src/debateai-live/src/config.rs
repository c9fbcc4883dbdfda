//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::DebateError;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub narration: NarrationConfig,
    #[serde(default)]
    pub voices: VoicesConfig,
}

/// Where the debate service lives and how patient to be with it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Event stream behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Longest gap tolerated between two events before the connection counts as lost.
    pub idle_timeout_secs: u64,
    /// Reconnection attempts after a lost connection. Zero disables reconnection.
    pub max_reconnects: u32,
    /// Base delay for the exponential reconnect backoff.
    pub reconnect_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 600,
            max_reconnects: 0,
            reconnect_delay_ms: 1000,
        }
    }
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Backoff before reconnect attempt `attempt` (zero based): 1x, 2x, 4x, ...
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.saturating_mul(1 << attempt.min(16)))
    }
}

/// Narration pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Silence inserted between two narrated turns.
    pub pause_ms: u64,
    /// How long a narration run waits for an empty voice list to populate.
    pub voice_wait_secs: u64,
    /// Maximum characters per synthesis chunk.
    pub chunk_chars: usize,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            pause_ms: 600,
            voice_wait_secs: 30,
            chunk_chars: 200,
        }
    }
}

impl NarrationConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn voice_wait(&self) -> Duration {
        Duration::from_secs(self.voice_wait_secs)
    }
}

/// Voice configuration for TTS.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    /// Designated "standard" voice used for the moderator.
    pub standard_voice: String,
    /// Optional language prefix filter (e.g. "en") applied to the engine's voice list.
    pub language: Option<String>,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            standard_voice: "af_sky".to_string(),
            language: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Override the service base URL (e.g. from the environment or a CLI flag).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.service.base_url = base_url.into();
        self
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}
