pub mod sqlite;

pub use jukebot_common::traits::repository_traits::MessageLogRepository;
pub use sqlite::SqliteMessageLogRepository;
