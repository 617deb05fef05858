use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A guild chat message captured by the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub user_id: String,
    pub username: String,
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}
