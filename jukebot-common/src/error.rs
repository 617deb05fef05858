// ================================================================
// File: jukebot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Playback taxonomy:
    #[error("No track found: {0}")]
    ResolutionFailure(String),

    #[error("Audio source unavailable: {0}")]
    AcquisitionFailure(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Voice connection lost: {0}")]
    ConnectionLost(String),

    #[error("Usage: {0}")]
    Usage(String),

    #[error("Voice error: {0}")]
    Voice(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Text shown to chat users when a command fails.
    pub fn user_message(&self) -> String {
        match self {
            Error::ResolutionFailure(q) => format!("❌ No results found for `{q}`."),
            Error::AcquisitionFailure(reason) => format!("⚠️ Could not play that track: {reason}"),
            Error::InvalidTransition(reason) => format!("⚠️ {reason}"),
            Error::Usage(usage) => format!("ℹ️ Usage: {usage}"),
            Error::ConnectionLost(_) | Error::Voice(_) => {
                "⚠️ I couldn't reach the voice channel. Try again in a moment.".to_string()
            }
            other => format!("❗ Something went wrong: {other}"),
        }
    }
}
