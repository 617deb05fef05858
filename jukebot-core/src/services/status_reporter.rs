use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::Error;

/// Lifecycle notices posted to the optional status channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusNotice {
    Online { bot_tag: String },
    Reconnected,
    Reconnecting,
    Disconnected,
    Error(String),
}

impl StatusNotice {
    pub fn render(&self) -> String {
        match self {
            StatusNotice::Online { bot_tag } => {
                format!("🚀 Bot {bot_tag} is now online and ready to serve!")
            }
            StatusNotice::Reconnected => "✅ Bot has successfully reconnected!".to_string(),
            StatusNotice::Reconnecting => "🔄 Bot is attempting to reconnect...".to_string(),
            StatusNotice::Disconnected => "⚠️ Bot has been disconnected from Discord!".to_string(),
            StatusNotice::Error(msg) => format!("❗ Error occurred: {msg}"),
        }
    }
}

/// Where status text ends up.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn post(&self, channel_id: u64, text: &str) -> Result<(), Error>;
}

pub struct StatusReporter {
    channel_id: Option<u64>,
    sink: Arc<dyn StatusSink>,
    ready_shards: Mutex<HashSet<u32>>,
}

impl StatusReporter {
    pub fn new(channel_id: Option<u64>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            channel_id,
            sink,
            ready_shards: Mutex::new(HashSet::new()),
        }
    }

    /// The very first READY is the online notice. A repeated READY from the
    /// same shard is a reconnect; the first READY of any other shard is silent.
    pub fn ready_notice(&self, shard_id: u32, bot_tag: &str) -> Option<StatusNotice> {
        let mut shards = self.ready_shards.lock();
        let first_ever = shards.is_empty();
        if !shards.insert(shard_id) {
            Some(StatusNotice::Reconnected)
        } else if first_ever {
            Some(StatusNotice::Online { bot_tag: bot_tag.to_string() })
        } else {
            None
        }
    }

    pub async fn report(&self, notice: StatusNotice) {
        let Some(channel_id) = self.channel_id else {
            debug!("(StatusReporter) no status channel; dropping {notice:?}");
            return;
        };
        if let Err(e) = self.sink.post(channel_id, &notice.render()).await {
            warn!("(StatusReporter) failed to post status update: {e}");
        }
    }
}
