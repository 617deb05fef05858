// File: jukebot-common/src/models/mod.rs
pub mod track;
pub mod playback;
pub mod message_log;

pub use track::{QueueEntry, Track};
pub use playback::{
    FilterSettings, FilterStage, PlaybackEvent, PlaybackEventKind, PlaybackNotice, PlaybackState,
    SessionStatus, Volume,
};
pub use message_log::LoggedMessage;
