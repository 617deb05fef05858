// jukebot-core/src/config.rs

use std::time::Duration;

use jukebot_common::models::playback::Volume;

use crate::Error;
use crate::audio::session::SessionConfig;
use crate::tasks::heartbeat::HEARTBEAT_INTERVAL;

/// Runtime settings, assembled by the server binary from CLI flags and the environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub command_prefix: String,
    pub database_url: String,
    /// Persist every guild chat message the bot sees.
    pub log_messages: bool,
    pub status_channel_id: Option<u64>,
    pub port: u16,
    pub heartbeat_url: Option<String>,
    pub heartbeat_interval: Duration,
    pub acquire_timeout: Duration,
    pub default_volume: Volume,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
}

impl BotConfig {
    pub fn new(discord_token: impl Into<String>) -> Self {
        Self {
            discord_token: discord_token.into(),
            command_prefix: "!".to_string(),
            database_url: "sqlite://jukebot.db?mode=rwc".to_string(),
            log_messages: true,
            status_channel_id: None,
            port: 3000,
            heartbeat_url: None,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            acquire_timeout: Duration::from_secs(20),
            default_volume: Volume::default(),
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    /// Rejects settings the bot cannot start with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.discord_token.trim().is_empty() {
            return Err(Error::Config("DISCORD_TOKEN is empty".into()));
        }
        if self.command_prefix.is_empty() || self.command_prefix.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!(
                "command prefix {:?} must be non-empty and contain no whitespace",
                self.command_prefix
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Config("heartbeat interval must be at least one second".into()));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::Config("acquire timeout must be at least one second".into()));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            acquire_timeout: self.acquire_timeout,
            default_volume: self.default_volume,
        }
    }
}
