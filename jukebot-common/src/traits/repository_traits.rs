use async_trait::async_trait;
use crate::error::Error;
use crate::models::message_log::LoggedMessage;

#[async_trait]
pub trait MessageLogRepository: Send + Sync {
    async fn insert_message(&self, msg: &LoggedMessage) -> Result<(), Error>;

    /// Newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<LoggedMessage>, Error>;
}
