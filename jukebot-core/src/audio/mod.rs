pub mod filters;
pub mod manager;
pub mod session;
pub mod ytdlp;

pub use filters::{apply_filters, FilterChain};
pub use manager::SessionManager;
pub use session::{EnqueueOutcome, FailedTrack, Session, SessionConfig, SkipOutcome, StartReport};
pub use ytdlp::YtDlp;
