//! voice.rs
//!
//! Songbird-backed `AudioBackend`. yt-dlp finds the media URL, ffmpeg decodes
//! it through the filter graph, and songbird mixes the result into the guild's
//! voice call. Track End/Error events and driver disconnects are published as
//! `PlaybackEvent`s tagged with the playback token.

use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use songbird::events::{CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use songbird::input::{ChildContainer, Input};
use songbird::tracks::{PlayMode, Track as SongbirdTrack, TrackHandle};
use songbird::Songbird;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};

use jukebot_common::error::Error;
use jukebot_common::models::playback::{FilterStage, PlaybackEvent, PlaybackEventKind};
use jukebot_common::models::track::Track;
use jukebot_common::traits::playback_traits::{AudioBackend, Filterable, PlaybackHandle};

use crate::audio::filters::{ffmpeg_filtergraph, OUTPUT_SAMPLE_RATE};
use crate::audio::ytdlp::YtDlp;

/// A direct media URL plus the filter stages ffmpeg should run it through.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegSource {
    pub track_id: String,
    pub url: String,
    pub stages: Vec<FilterStage>,
}

impl FfmpegSource {
    pub fn new(track_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            url: url.into(),
            stages: Vec::new(),
        }
    }

    /// Arguments for an ffmpeg process that writes 48 kHz stereo WAV to stdout.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
            "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(self.url.clone());
        if let Some(graph) = ffmpeg_filtergraph(&self.stages) {
            args.push("-af".into());
            args.push(graph);
        }
        args.extend(
            ["-vn", "-ac", "2", "-ar"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(OUTPUT_SAMPLE_RATE.to_string());
        args.extend(["-f", "wav", "pipe:1"].iter().map(|s| s.to_string()));
        args
    }
}

impl Filterable for FfmpegSource {
    fn bass_boost(mut self, gain_db: f32) -> Self {
        self.stages.push(FilterStage::BassBoost { gain_db });
        self
    }

    fn tempo(mut self, factor: f32) -> Self {
        self.stages.push(FilterStage::Tempo(factor));
        self
    }
}

struct SongbirdHandle(TrackHandle);

impl PlaybackHandle for SongbirdHandle {
    fn pause(&self) -> Result<(), Error> {
        self.0.pause().map_err(|e| Error::Voice(e.to_string()))
    }

    fn resume(&self) -> Result<(), Error> {
        self.0.play().map_err(|e| Error::Voice(e.to_string()))
    }

    fn set_volume(&self, volume: f32) -> Result<(), Error> {
        self.0.set_volume(volume).map_err(|e| Error::Voice(e.to_string()))
    }

    fn stop(&self) -> Result<(), Error> {
        self.0.stop().map_err(|e| Error::Voice(e.to_string()))
    }
}

#[derive(Clone, Copy)]
enum Watch {
    End,
    Error,
}

/// Publishes a `PlaybackEvent` for one played track.
struct TrackNotifier {
    guild_id: u64,
    token: u64,
    watch: Watch,
    events: UnboundedSender<PlaybackEvent>,
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };
        let kind = match self.watch {
            Watch::End => PlaybackEventKind::Ended,
            Watch::Error => {
                let reason = tracks
                    .iter()
                    .find_map(|(state, _)| match &state.playing {
                        PlayMode::Errored(e) => Some(format!("{e:?}")),
                        _ => None,
                    })
                    .unwrap_or_else(|| "stream error".to_string());
                PlaybackEventKind::Errored(reason)
            }
        };
        let _ = self.events.send(PlaybackEvent {
            guild_id: self.guild_id,
            token: self.token,
            kind,
        });
        None
    }
}

/// Publishes `ConnectionLost` for whatever token is current on the guild.
struct DisconnectNotifier {
    guild_id: u64,
    current_token: Arc<AtomicU64>,
    events: UnboundedSender<PlaybackEvent>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            let reason = data
                .reason
                .as_ref()
                .map(|r| format!("{r:?}"))
                .unwrap_or_else(|| "requested".to_string());
            let _ = self.events.send(PlaybackEvent {
                guild_id: self.guild_id,
                token: self.current_token.load(Ordering::SeqCst),
                kind: PlaybackEventKind::ConnectionLost(reason),
            });
        }
        None
    }
}

pub struct SongbirdBackend {
    songbird: Arc<Songbird>,
    ytdlp: YtDlp,
    ffmpeg: String,
    events: UnboundedSender<PlaybackEvent>,
    /// Token of the most recent `play` per guild; present while in a call.
    tokens: DashMap<u64, Arc<AtomicU64>>,
}

impl SongbirdBackend {
    pub fn new(
        songbird: Arc<Songbird>,
        ytdlp: YtDlp,
        ffmpeg: impl Into<String>,
        events: UnboundedSender<PlaybackEvent>,
    ) -> Self {
        Self {
            songbird,
            ytdlp,
            ffmpeg: ffmpeg.into(),
            events,
            tokens: DashMap::new(),
        }
    }

    fn spawn_ffmpeg(&self, source: &FfmpegSource) -> Result<Child, Error> {
        Command::new(&self.ffmpeg)
            .args(source.ffmpeg_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::AcquisitionFailure(format!("could not start {}: {e}", self.ffmpeg)))
    }
}

fn guild_key(guild_id: u64) -> Result<Id<GuildMarker>, Error> {
    Id::new_checked(guild_id).ok_or_else(|| Error::Voice(format!("invalid guild id {guild_id}")))
}

fn channel_key(channel_id: u64) -> Result<Id<ChannelMarker>, Error> {
    Id::new_checked(channel_id).ok_or_else(|| Error::Voice(format!("invalid channel id {channel_id}")))
}

#[async_trait]
impl AudioBackend for SongbirdBackend {
    type Stream = FfmpegSource;

    async fn open(&self, track: &Track) -> Result<FfmpegSource, Error> {
        let url = self.ytdlp.stream_url(track).await?;
        debug!("(SongbirdBackend) acquired stream for {}", track.id);
        Ok(FfmpegSource::new(track.id.clone(), url))
    }

    async fn connect(&self, guild_id: u64, channel_id: u64) -> Result<(), Error> {
        let guild = guild_key(guild_id)?;
        let channel = channel_key(channel_id)?;
        let call = self
            .songbird
            .join(guild, channel)
            .await
            .map_err(|e| Error::Voice(format!("join failed: {e}")))?;

        if !self.tokens.contains_key(&guild_id) {
            let current_token = Arc::new(AtomicU64::new(0));
            self.tokens.insert(guild_id, current_token.clone());
            let mut call = call.lock().await;
            call.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier {
                    guild_id,
                    current_token,
                    events: self.events.clone(),
                },
            );
        }
        info!("(SongbirdBackend) joined channel {channel_id} in guild {guild_id}");
        Ok(())
    }

    async fn play(
        &self,
        guild_id: u64,
        stream: FfmpegSource,
        volume: f32,
        token: u64,
    ) -> Result<Box<dyn PlaybackHandle>, Error> {
        let guild = guild_key(guild_id)?;
        let call = self
            .songbird
            .get(guild)
            .ok_or_else(|| Error::ConnectionLost("not connected to a voice channel".into()))?;

        let child = self.spawn_ffmpeg(&stream)?;
        let input: Input = ChildContainer::from(child).into();

        let handle = {
            let mut call = call.lock().await;
            call.play_only(SongbirdTrack::from(input).volume(volume))
        };

        for watch in [Watch::End, Watch::Error] {
            let event = match watch {
                Watch::End => TrackEvent::End,
                Watch::Error => TrackEvent::Error,
            };
            handle
                .add_event(
                    Event::Track(event),
                    TrackNotifier {
                        guild_id,
                        token,
                        watch,
                        events: self.events.clone(),
                    },
                )
                .map_err(|e| Error::Voice(e.to_string()))?;
        }

        if let Some(current) = self.tokens.get(&guild_id) {
            current.store(token, Ordering::SeqCst);
        }
        debug!(
            "(SongbirdBackend) playing {} in guild {guild_id} (token {token}, {} filter stages)",
            stream.track_id,
            stream.stages.len()
        );
        Ok(Box::new(SongbirdHandle(handle)))
    }

    async fn disconnect(&self, guild_id: u64) -> Result<(), Error> {
        let guild = guild_key(guild_id)?;
        self.tokens.remove(&guild_id);
        if self.songbird.get(guild).is_none() {
            return Ok(());
        }
        self.songbird
            .remove(guild)
            .await
            .map_err(|e| {
                warn!("(SongbirdBackend) leave failed in guild {guild_id}: {e}");
                Error::Voice(format!("leave failed: {e}"))
            })
    }
}
