pub mod playback_traits;
pub mod repository_traits;
