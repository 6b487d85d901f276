//! Configuration types for the live view client.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Frame channel (WebSocket) settings.
    pub frame: FrameConfig,
    /// Event channel (Server-Sent Events) settings.
    pub events: EventConfig,
    /// Recent-media collaborator settings.
    pub media: MediaConfig,
    /// Optional reconnection supervisor.
    pub reconnect: ReconnectConfig,
}

/// Frame channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// WebSocket endpoint delivering binary frames.
    pub url: String,
    /// Maximum time to wait for the WebSocket handshake, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/video".to_owned(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl FrameConfig {
    /// Handshake timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Event channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Server-Sent Events endpoint.
    pub url: String,
    /// Maximum time to wait for the response headers, in milliseconds.
    ///
    /// The stream itself has no timeout; a stalled stream stays open until
    /// the transport reports an error.
    pub connect_timeout_ms: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/sse/stream".to_owned(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl EventConfig {
    /// Header timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Recent-media collaborator configuration.
///
/// `directory` takes precedence over `url` when both are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Listing endpoint returning a JSON array of filenames.
    pub url: Option<String>,
    /// Local directory of recorded clips.
    pub directory: Option<PathBuf>,
    /// File extension kept by the directory source (without the dot).
    pub extension: String,
    /// Number of clips shown in the recent list.
    pub limit: usize,
    /// HTTP request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            url: Some("http://localhost:3000/api/videos".to_owned()),
            directory: None,
            extension: "mp4".to_owned(),
            limit: 5,
            timeout_ms: 5_000,
        }
    }
}

/// Reconnection supervisor configuration.
///
/// Disabled by default: the channel managers never reconnect on their own,
/// and without the supervisor a dropped channel stays down until reopened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Whether the supervisor runs.
    pub enabled: bool,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Random spread applied to each delay, as a fraction in `[0, 1]`.
    pub jitter: f64,
    /// Consecutive failed attempts before giving up on a channel.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter: 0.2,
            max_attempts: 8,
        }
    }
}

/// Default config location: `~/.config/guardcar/live.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("guardcar").join("live.toml"))
}

impl LiveConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::LiveError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::LiveError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check endpoint URLs and limits before anything connects.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Config`](crate::error::LiveError::Config) naming
    /// the first offending field.
    pub fn validate(&self) -> crate::error::Result<()> {
        check_url("frame.url", &self.frame.url, &["ws", "wss"])?;
        check_url("events.url", &self.events.url, &["http", "https"])?;
        if let Some(url) = &self.media.url {
            check_url("media.url", url, &["http", "https"])?;
        }
        if self.media.extension.trim_start_matches('.').is_empty() {
            return Err(crate::error::LiveError::Config(
                "media.extension must not be empty".into(),
            ));
        }
        if self.reconnect.enabled && self.reconnect.max_attempts == 0 {
            return Err(crate::error::LiveError::Config(
                "reconnect.max_attempts must be at least 1 when enabled".into(),
            ));
        }
        Ok(())
    }
}

fn check_url(field: &str, value: &str, schemes: &[&str]) -> crate::error::Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| crate::error::LiveError::Config(format!("{field}: {e}")))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(crate::error::LiveError::Config(format!(
            "{field}: unsupported scheme `{}`, expected one of {}",
            parsed.scheme(),
            schemes.join(", ")
        )));
    }
    Ok(())
}
