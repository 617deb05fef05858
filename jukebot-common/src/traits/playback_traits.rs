//! Seams between the playback session and the outside world: track lookup,
//! audio acquisition, and the voice output the session drives.

use async_trait::async_trait;

use crate::error::Error;
use crate::models::track::Track;

/// Turns a free-text query (or a URL) into a track descriptor.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Returns `Error::ResolutionFailure` when nothing matches.
    async fn resolve(&self, query: &str, requested_by: &str) -> Result<Track, Error>;
}

/// A stream the filter chain can wrap. Each call appends one transform.
pub trait Filterable: Sized {
    fn bass_boost(self, gain_db: f32) -> Self;
    fn tempo(self, factor: f32) -> Self;
}

/// Control over one in-flight output stream.
pub trait PlaybackHandle: Send + Sync {
    fn pause(&self) -> Result<(), Error>;
    fn resume(&self) -> Result<(), Error>;
    fn set_volume(&self, volume: f32) -> Result<(), Error>;
    fn stop(&self) -> Result<(), Error>;
}

/// Audio source provider plus voice output for every guild.
///
/// Implementations report natural ends, stream errors and dropped
/// connections as `PlaybackEvent`s tagged with the token passed to `play`.
#[async_trait]
pub trait AudioBackend: Send + Sync + 'static {
    type Stream: Filterable + Send + 'static;

    /// Acquire a decodable stream for `track`. Failures are
    /// `Error::AcquisitionFailure`.
    async fn open(&self, track: &Track) -> Result<Self::Stream, Error>;

    async fn connect(&self, guild_id: u64, channel_id: u64) -> Result<(), Error>;

    async fn play(
        &self,
        guild_id: u64,
        stream: Self::Stream,
        volume: f32,
        token: u64,
    ) -> Result<Box<dyn PlaybackHandle>, Error>;

    async fn disconnect(&self, guild_id: u64) -> Result<(), Error>;
}
