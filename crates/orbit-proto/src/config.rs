use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;
use crate::poll::Cadence;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Where the now-playing status comes from.
///
/// With `api_key` and `user` both set, the Last.fm API is called directly.
/// Otherwise `endpoint` is fetched as-is and must return the same
/// `recenttracks` JSON shape (a relay that keeps the key off the client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    /// Cover shown when the provider reports a track without artwork.
    #[serde(default = "default_placeholder_cover")]
    pub placeholder_cover: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceMode {
    /// Short interval during the warm-up window, long interval afterwards.
    TwoPhase,
    /// One interval for the whole session.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_cadence")]
    pub cadence: CadenceMode,
    #[serde(default = "default_warmup_interval")]
    pub warmup_interval_secs: u64,
    #[serde(default = "default_warmup")]
    pub warmup_secs: u64,
    #[serde(default = "default_steady_interval")]
    pub steady_interval_secs: u64,
    #[serde(default = "default_fixed_interval")]
    pub fixed_interval_secs: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Give up waiting for the first poll after this long and fall back.
    #[serde(default = "default_unlock_timeout")]
    pub unlock_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Looped stand-in played while a remote track is detected.
    #[serde(default = "default_ambient_cue")]
    pub ambient_cue: String,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Refuse `play()` until the first user gesture.
    #[serde(default = "default_require_gesture")]
    pub require_gesture: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    /// `.toml` (`[[track]]` tables) or `.m3u`.  Missing file → built-in playlist.
    #[serde(default = "default_playlist_path")]
    pub path: PathBuf,
}

/// Widget socket.  Independent of `[http]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_socket_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_socket_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            user: None,
            timeout_secs: default_provider_timeout(),
            placeholder_cover: default_placeholder_cover(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            cadence: default_cadence(),
            warmup_interval_secs: default_warmup_interval(),
            warmup_secs: default_warmup(),
            steady_interval_secs: default_steady_interval(),
            fixed_interval_secs: default_fixed_interval(),
            cache_ttl_secs: default_cache_ttl(),
            unlock_timeout_secs: default_unlock_timeout(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            ambient_cue: default_ambient_cue(),
            retry_delay_secs: default_retry_delay(),
            require_gesture: default_require_gesture(),
            volume: default_volume(),
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            path: default_playlist_path(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_address: default_socket_bind_address(),
            port: default_socket_port(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_endpoint() -> String {
    "https://spring-tooth-3a41.golonchy-aitta.workers.dev".to_string()
}

fn default_provider_timeout() -> u64 {
    10
}

fn default_placeholder_cover() -> String {
    "assets/images/trollge.gif".to_string()
}

fn default_cadence() -> CadenceMode {
    CadenceMode::TwoPhase
}

fn default_warmup_interval() -> u64 {
    5
}

fn default_warmup() -> u64 {
    30
}

fn default_steady_interval() -> u64 {
    30
}

fn default_fixed_interval() -> u64 {
    30
}

fn default_cache_ttl() -> u64 {
    5
}

fn default_unlock_timeout() -> u64 {
    5
}

fn default_ambient_cue() -> String {
    "assets/audio/play-when-spotify-is-detected.mp4".to_string()
}

fn default_retry_delay() -> u64 {
    2
}

fn default_require_gesture() -> bool {
    true
}

fn default_volume() -> f32 {
    1.0
}

fn default_playlist_path() -> PathBuf {
    platform::config_dir().join("playlist.toml")
}

fn default_socket_bind_address() -> String {
    platform::DAEMON_TCP_HOST.to_string()
}

fn default_socket_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl PollConfig {
    pub fn cadence(&self) -> Cadence {
        match self.cadence {
            CadenceMode::TwoPhase => Cadence::TwoPhase {
                warmup: Duration::from_secs(self.warmup_secs),
                warmup_interval: secs_at_least_one(self.warmup_interval_secs),
                steady_interval: secs_at_least_one(self.steady_interval_secs),
            },
            CadenceMode::Fixed => Cadence::Fixed {
                interval: secs_at_least_one(self.fixed_interval_secs),
            },
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn unlock_timeout(&self) -> Duration {
        Duration::from_secs(self.unlock_timeout_secs)
    }
}

impl PlaybackConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

// A zero interval would spin the poll timer.
fn secs_at_least_one(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
