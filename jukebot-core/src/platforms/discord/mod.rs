pub mod controls;
pub mod outbound;
pub mod runtime;
pub mod voice;

pub use outbound::{spawn_notice_task, TwilightStatusSink};
pub use runtime::{DiscordEventHandler, DiscordPlatform};
pub use voice::SongbirdBackend;
