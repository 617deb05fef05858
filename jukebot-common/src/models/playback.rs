use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Independent audio filter toggles. They outlive any single track and are
/// only read when a track starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub bass_boost: bool,
    pub nightcore: bool,
    pub vaporwave: bool,
}

impl FilterSettings {
    /// Names of the enabled filters, in chain order.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.bass_boost {
            out.push("bass boost");
        }
        if self.nightcore {
            out.push("nightcore");
        }
        if self.vaporwave {
            out.push("vaporwave");
        }
        out
    }
}

/// One transform in a filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterStage {
    BassBoost { gain_db: f32 },
    /// Playback rate multiplier (pitch follows tempo).
    Tempo(f32),
}

/// Output gain in `[0.0, 1.0]`. Every constructor and adjustment clamps.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Volume(f32);

impl Volume {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 1.0;

    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Volume(Self::MIN);
        }
        Volume(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn adjusted(self, delta: f32) -> Self {
        Volume::new(self.0 + delta)
    }

    pub fn get(self) -> f32 {
        self.0
    }

    pub fn percent(self) -> u32 {
        (self.0 * 100.0).round() as u32
    }
}

impl Default for Volume {
    fn default() -> Self {
        Volume(0.5)
    }
}

/// Read-only projection of a session for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: PlaybackState,
    pub now_playing: Option<Track>,
    pub queue_length: usize,
    pub volume: Volume,
    pub loop_enabled: bool,
    pub filters: FilterSettings,
}

/// Raised by the voice backend for a specific playback token.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub guild_id: u64,
    pub token: u64,
    pub kind: PlaybackEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEventKind {
    /// The stream reached its end without a stop or skip.
    Ended,
    /// The stream failed while playing.
    Errored(String),
    /// The voice transport dropped.
    ConnectionLost(String),
}

/// Announcements a session wants shown in its text channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackNotice {
    NowPlaying {
        guild_id: u64,
        channel_id: Option<u64>,
        track: Track,
    },
    AcquisitionFailed {
        guild_id: u64,
        channel_id: Option<u64>,
        track: Track,
        reason: String,
    },
    QueueFinished {
        guild_id: u64,
        channel_id: Option<u64>,
    },
}

impl PlaybackNotice {
    pub fn channel_id(&self) -> Option<u64> {
        match self {
            PlaybackNotice::NowPlaying { channel_id, .. }
            | PlaybackNotice::AcquisitionFailed { channel_id, .. }
            | PlaybackNotice::QueueFinished { channel_id, .. } => *channel_id,
        }
    }
}
