pub mod message_log;

pub use message_log::SqliteMessageLogRepository;
