pub mod music_commands;
pub mod status_reporter;

pub use music_commands::{CommandReply, Invocation, MusicCommand, MusicCommandService};
pub use status_reporter::{StatusNotice, StatusReporter, StatusSink};
