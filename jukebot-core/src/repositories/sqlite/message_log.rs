// jukebot-core/src/repositories/sqlite/message_log.rs
//
// Stores every guild chat message the bot sees in the `chat_messages` table.

use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

use jukebot_common::error::Error;
use jukebot_common::models::message_log::LoggedMessage;
use jukebot_common::traits::repository_traits::MessageLogRepository;

#[derive(Clone)]
pub struct SqliteMessageLogRepository {
    pool: Pool<Sqlite>,
}

impl SqliteMessageLogRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageLogRepository for SqliteMessageLogRepository {
    async fn insert_message(&self, msg: &LoggedMessage) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (user_id, username, guild_id, channel_id, content, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&msg.user_id)
        .bind(&msg.username)
        .bind(&msg.guild_id)
        .bind(&msg.channel_id)
        .bind(&msg.content)
        .bind(msg.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<LoggedMessage>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, username, guild_id, channel_id, content, timestamp
            FROM chat_messages
            ORDER BY timestamp DESC, message_row DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(LoggedMessage {
                user_id:    r.try_get("user_id")?,
                username:   r.try_get("username")?,
                guild_id:   r.try_get("guild_id")?,
                channel_id: r.try_get("channel_id")?,
                content:    r.try_get("content")?,
                timestamp:  r.try_get("timestamp")?,
            });
        }
        Ok(out)
    }
}
