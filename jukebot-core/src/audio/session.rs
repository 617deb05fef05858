//! session.rs
//!
//! One playback session per guild: the pending queue, the now-playing entry,
//! the loop/volume/filter toggles and the single voice output handle.
//!
//! All state lives behind one mutex that is never held across an `.await`.
//! Every track start bumps `token`; output handles and backend events carry
//! the token they were started with, and anything tagged with an older token
//! is discarded. A `stop` racing a natural end therefore cannot resurrect an
//! entry, and the End event of a handle we stopped ourselves is ignored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use jukebot_common::error::Error;
use jukebot_common::models::playback::{
    FilterSettings, PlaybackEvent, PlaybackEventKind, PlaybackNotice, PlaybackState,
    SessionStatus, Volume,
};
use jukebot_common::models::track::{QueueEntry, Track};
use jukebot_common::traits::playback_traits::{AudioBackend, PlaybackHandle};

use crate::audio::filters::apply_filters;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on acquiring an audio stream for one track.
    pub acquire_timeout: Duration,
    pub default_volume: Volume,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(20),
            default_volume: Volume::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedTrack {
    pub track: Track,
    pub reason: String,
}

/// What happened while trying to get a track onto the output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartReport {
    pub started: Option<Track>,
    /// Entries that could not be acquired and were skipped over.
    pub failed: Vec<FailedTrack>,
    /// A stop, or a skip before the output was up, took over the start.
    pub superseded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Started(StartReport),
    Queued { track: Track, position: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkipOutcome {
    pub skipped: Option<Track>,
    pub next: StartReport,
}

/// Everything needed to start one entry once the lock is released.
struct Launch {
    token: u64,
    entry: QueueEntry,
    filters: FilterSettings,
    cancel: CancellationToken,
    /// `stops` when the launch began; a change means a stop took over.
    stops: u64,
}

struct SessionState {
    queue: VecDeque<QueueEntry>,
    playback: PlaybackState,
    now_playing: Option<QueueEntry>,
    filters: FilterSettings,
    volume: Volume,
    looping: bool,
    token: u64,
    handle: Option<Box<dyn PlaybackHandle>>,
    cancel: CancellationToken,
    voice_channel: Option<u64>,
    connected: bool,
    announce_channel: Option<u64>,
    stops: u64,
    /// First token that can belong to the current voice connection. Events
    /// for older tokens come from before the last `stop` left the channel.
    joined_at: u64,
}

impl SessionState {
    fn new(volume: Volume) -> Self {
        Self {
            queue: VecDeque::new(),
            playback: PlaybackState::Idle,
            now_playing: None,
            filters: FilterSettings::default(),
            volume,
            looping: false,
            token: 0,
            handle: None,
            cancel: CancellationToken::new(),
            voice_channel: None,
            connected: false,
            announce_channel: None,
            stops: 0,
            joined_at: 0,
        }
    }

    /// Make `entry` the now-playing track. Filters are snapshotted here, so a
    /// toggle only affects the next start.
    fn begin(&mut self, entry: QueueEntry) -> Launch {
        self.token += 1;
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.playback = PlaybackState::Playing;
        self.now_playing = Some(entry.clone());
        Launch {
            token: self.token,
            entry,
            filters: self.filters,
            cancel: self.cancel.clone(),
            stops: self.stops,
        }
    }

    fn go_idle(&mut self) {
        self.token += 1;
        self.cancel.cancel();
        self.playback = PlaybackState::Idle;
        self.now_playing = None;
    }

    /// Start the next queued entry, or go idle when the queue is empty.
    fn advance(&mut self) -> Option<Launch> {
        match self.queue.pop_front() {
            Some(entry) => Some(self.begin(entry)),
            None => {
                self.go_idle();
                None
            }
        }
    }
}

pub struct Session<B: AudioBackend> {
    guild_id: u64,
    backend: Arc<B>,
    config: SessionConfig,
    notices: Option<UnboundedSender<PlaybackNotice>>,
    state: Mutex<SessionState>,
}

impl<B: AudioBackend> Session<B> {
    pub fn new(
        guild_id: u64,
        backend: Arc<B>,
        config: SessionConfig,
        notices: Option<UnboundedSender<PlaybackNotice>>,
    ) -> Self {
        let state = SessionState::new(config.default_volume);
        Self {
            guild_id,
            backend,
            config,
            notices,
            state: Mutex::new(state),
        }
    }

    /// Text channel that receives now-playing and failure notices.
    pub fn set_announce_channel(&self, channel_id: u64) {
        self.state.lock().announce_channel = Some(channel_id);
    }

    /// Append `entry`. When the session is idle the entry starts right away
    /// and the call returns once it is playing (or every candidate failed).
    pub async fn enqueue(
        &self,
        entry: QueueEntry,
        voice_channel_id: u64,
    ) -> Result<EnqueueOutcome, Error> {
        self.ensure_connected(voice_channel_id).await?;

        let track = entry.track.clone();
        let (launch, position) = {
            let mut st = self.state.lock();
            st.queue.push_back(entry);
            if st.playback == PlaybackState::Idle {
                (st.advance(), 0)
            } else {
                (None, st.queue.len())
            }
        };

        match launch {
            Some(launch) => Ok(EnqueueOutcome::Started(self.run_launch(launch).await)),
            None => {
                debug!(
                    "(Session {}) queued '{}' at position {}",
                    self.guild_id, track.title, position
                );
                Ok(EnqueueOutcome::Queued { track, position })
            }
        }
    }

    pub fn pause(&self) -> Result<(), Error> {
        let mut st = self.state.lock();
        match st.playback {
            PlaybackState::Playing => {
                if let Some(handle) = &st.handle {
                    handle.pause()?;
                }
                st.playback = PlaybackState::Paused;
                Ok(())
            }
            PlaybackState::Paused => Err(Error::InvalidTransition("Playback is already paused.".into())),
            PlaybackState::Idle => Err(Error::InvalidTransition("Nothing is playing.".into())),
        }
    }

    pub fn resume(&self) -> Result<(), Error> {
        let mut st = self.state.lock();
        match st.playback {
            PlaybackState::Paused => {
                if let Some(handle) = &st.handle {
                    handle.resume()?;
                }
                st.playback = PlaybackState::Playing;
                Ok(())
            }
            PlaybackState::Playing => Err(Error::InvalidTransition("Playback is not paused.".into())),
            PlaybackState::Idle => Err(Error::InvalidTransition("Nothing is playing.".into())),
        }
    }

    /// End the current track and move to the next queued entry. Loop mode is
    /// deliberately not consulted here.
    pub async fn skip(&self) -> Result<SkipOutcome, Error> {
        let (old_handle, skipped, launch, channel) = {
            let mut st = self.state.lock();
            if st.playback == PlaybackState::Idle {
                return Err(Error::InvalidTransition("Nothing is playing to skip.".into()));
            }
            let skipped = st.now_playing.as_ref().map(|e| e.track.clone());
            let handle = st.handle.take();
            let launch = st.advance();
            (handle, skipped, launch, st.announce_channel)
        };

        if let Some(handle) = old_handle {
            if let Err(e) = handle.stop() {
                warn!("(Session {}) stopping skipped track failed: {e}", self.guild_id);
            }
        }

        let next = match launch {
            Some(launch) => self.run_launch(launch).await,
            None => {
                self.notify(PlaybackNotice::QueueFinished {
                    guild_id: self.guild_id,
                    channel_id: channel,
                });
                StartReport::default()
            }
        };
        Ok(SkipOutcome { skipped, next })
    }

    /// Clear the queue, end any output and leave the voice channel.
    pub async fn stop(&self) {
        let (handle, was_connected) = {
            let mut st = self.state.lock();
            st.queue.clear();
            st.go_idle();
            st.stops += 1;
            st.joined_at = st.token + 1;
            let was_connected = st.connected;
            st.connected = false;
            st.voice_channel = None;
            (st.handle.take(), was_connected)
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.stop() {
                warn!("(Session {}) stopping output failed: {e}", self.guild_id);
            }
        }
        if was_connected {
            if let Err(e) = self.backend.disconnect(self.guild_id).await {
                warn!("(Session {}) leaving voice failed: {e}", self.guild_id);
            }
        }
        info!("(Session {}) stopped", self.guild_id);
    }

    /// Clamp `current + delta` into `[0, 1]` and apply it to the live output.
    pub fn set_volume(&self, delta: f32) -> Volume {
        let mut st = self.state.lock();
        st.volume = st.volume.adjusted(delta);
        if let Some(handle) = &st.handle {
            if let Err(e) = handle.set_volume(st.volume.get()) {
                warn!("(Session {}) applying volume failed: {e}", self.guild_id);
            }
        }
        st.volume
    }

    pub fn toggle_loop(&self) -> bool {
        let mut st = self.state.lock();
        st.looping = !st.looping;
        st.looping
    }

    pub fn toggle_bass_boost(&self) -> bool {
        let mut st = self.state.lock();
        st.filters.bass_boost = !st.filters.bass_boost;
        st.filters.bass_boost
    }

    pub fn toggle_nightcore(&self) -> bool {
        let mut st = self.state.lock();
        st.filters.nightcore = !st.filters.nightcore;
        st.filters.nightcore
    }

    pub fn toggle_vaporwave(&self) -> bool {
        let mut st = self.state.lock();
        st.filters.vaporwave = !st.filters.vaporwave;
        st.filters.vaporwave
    }

    /// Pending entries in play order. Never includes the now-playing track.
    pub fn list_queue(&self) -> Vec<QueueEntry> {
        self.state.lock().queue.iter().cloned().collect()
    }

    pub fn now_playing(&self) -> Option<QueueEntry> {
        self.state.lock().now_playing.clone()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.lock().playback
    }

    pub fn status(&self) -> SessionStatus {
        let st = self.state.lock();
        SessionStatus {
            state: st.playback,
            now_playing: st.now_playing.as_ref().map(|e| e.track.clone()),
            queue_length: st.queue.len(),
            volume: st.volume,
            loop_enabled: st.looping,
            filters: st.filters,
        }
    }

    /// Route a backend event to the matching transition.
    pub async fn handle_event(&self, event: PlaybackEvent) -> Option<StartReport> {
        match event.kind {
            PlaybackEventKind::Ended => self.on_playback_ended(event.token).await,
            PlaybackEventKind::Errored(reason) => self.on_playback_failed(event.token, reason).await,
            PlaybackEventKind::ConnectionLost(reason) => {
                self.on_connection_lost(event.token, reason).await
            }
        }
    }

    /// The track started with `token` reached end-of-stream. Replays it in loop
    /// mode, otherwise advances. Stale tokens are ignored.
    pub async fn on_playback_ended(&self, token: u64) -> Option<StartReport> {
        let (launch, channel) = {
            let mut st = self.state.lock();
            if st.token != token || st.playback == PlaybackState::Idle {
                trace!("(Session {}) ignoring stale end for token {token}", self.guild_id);
                return None;
            }
            st.handle = None;
            let launch = match (st.looping, st.now_playing.clone()) {
                (true, Some(entry)) => Some(st.begin(entry)),
                _ => st.advance(),
            };
            (launch, st.announce_channel)
        };
        Some(self.continue_with(launch, channel).await)
    }

    /// The output for `token` failed mid-stream. Never replays, even in loop mode.
    pub async fn on_playback_failed(&self, token: u64, reason: String) -> Option<StartReport> {
        let (failed, launch, channel) = {
            let mut st = self.state.lock();
            if st.token != token || st.playback == PlaybackState::Idle {
                trace!("(Session {}) ignoring stale error for token {token}", self.guild_id);
                return None;
            }
            st.handle = None;
            let failed = st.now_playing.as_ref().map(|e| e.track.clone());
            (failed, st.advance(), st.announce_channel)
        };

        let mut failures = Vec::new();
        if let Some(track) = failed {
            warn!("(Session {}) '{}' failed while playing: {reason}", self.guild_id, track.title);
            self.notify(PlaybackNotice::AcquisitionFailed {
                guild_id: self.guild_id,
                channel_id: channel,
                track: track.clone(),
                reason: reason.clone(),
            });
            failures.push(FailedTrack { track, reason });
        }
        let mut report = self.continue_with(launch, channel).await;
        failures.append(&mut report.failed);
        report.failed = failures;
        Some(report)
    }

    /// The voice transport dropped. The current track is abandoned like an
    /// acquisition failure; the next start rejoins the remembered channel.
    pub async fn on_connection_lost(&self, token: u64, reason: String) -> Option<StartReport> {
        {
            let mut st = self.state.lock();
            if token < st.joined_at {
                trace!("(Session {}) ignoring disconnect for token {token} from before the last stop", self.guild_id);
                return None;
            }
            st.connected = false;
        }
        warn!("(Session {}) voice connection lost: {reason}", self.guild_id);
        self.on_playback_failed(token, format!("voice connection lost: {reason}"))
            .await
    }

    async fn continue_with(&self, launch: Option<Launch>, channel: Option<u64>) -> StartReport {
        match launch {
            Some(launch) => self.run_launch(launch).await,
            None => {
                info!("(Session {}) queue finished", self.guild_id);
                self.notify(PlaybackNotice::QueueFinished {
                    guild_id: self.guild_id,
                    channel_id: channel,
                });
                StartReport::default()
            }
        }
    }

    /// Acquire and start `launch`, falling through to later entries on failure
    /// until something plays or the queue runs dry.
    async fn run_launch(&self, mut launch: Launch) -> StartReport {
        let mut report = StartReport::default();
        loop {
            let track = launch.entry.track.clone();
            match self.acquire_and_play(&launch).await {
                Ok(handle) => {
                    let channel = {
                        let mut st = self.state.lock();
                        if st.token != launch.token {
                            let stopped = st.stops != launch.stops;
                            drop(st);
                            debug!(
                                "(Session {}) '{}' moved past before it attached (stopped: {stopped})",
                                self.guild_id, track.title
                            );
                            if let Err(e) = handle.stop() {
                                warn!("(Session {}) stopping superseded output failed: {e}", self.guild_id);
                            }
                            // Without a stop, the track played and its end or a skip was already handled.
                            if stopped {
                                report.superseded = true;
                            } else {
                                report.started = Some(track);
                            }
                            return report;
                        }
                        if let Err(e) = handle.set_volume(st.volume.get()) {
                            warn!("(Session {}) applying volume failed: {e}", self.guild_id);
                        }
                        if st.playback == PlaybackState::Paused {
                            if let Err(e) = handle.pause() {
                                warn!("(Session {}) applying pause failed: {e}", self.guild_id);
                            }
                        }
                        st.handle = Some(handle);
                        st.announce_channel
                    };
                    info!("(Session {}) now playing '{}'", self.guild_id, track.title);
                    self.notify(PlaybackNotice::NowPlaying {
                        guild_id: self.guild_id,
                        channel_id: channel,
                        track: track.clone(),
                    });
                    report.started = Some(track);
                    return report;
                }
                Err(e) => {
                    let (next, channel) = {
                        let mut st = self.state.lock();
                        if st.token != launch.token {
                            report.superseded = true;
                            return report;
                        }
                        (st.advance(), st.announce_channel)
                    };
                    let reason = e.to_string();
                    warn!("(Session {}) could not start '{}': {reason}", self.guild_id, track.title);
                    self.notify(PlaybackNotice::AcquisitionFailed {
                        guild_id: self.guild_id,
                        channel_id: channel,
                        track: track.clone(),
                        reason: reason.clone(),
                    });
                    report.failed.push(FailedTrack { track, reason });
                    match next {
                        Some(next) => launch = next,
                        None => {
                            self.notify(PlaybackNotice::QueueFinished {
                                guild_id: self.guild_id,
                                channel_id: channel,
                            });
                            return report;
                        }
                    }
                }
            }
        }
    }

    async fn acquire_and_play(&self, launch: &Launch) -> Result<Box<dyn PlaybackHandle>, Error> {
        let timeout = self.config.acquire_timeout;
        let open = tokio::time::timeout(timeout, self.backend.open(&launch.entry.track));
        let stream = tokio::select! {
            _ = launch.cancel.cancelled() => {
                return Err(Error::AcquisitionFailure("cancelled".into()));
            }
            res = open => match res {
                Ok(stream) => stream?,
                Err(_) => {
                    return Err(Error::AcquisitionFailure(format!(
                        "timed out after {}s",
                        timeout.as_secs_f32()
                    )));
                }
            },
        };

        let stream = apply_filters(stream, &launch.filters);

        self.reconnect_if_needed().await?;
        if launch.cancel.is_cancelled() {
            return Err(Error::AcquisitionFailure("cancelled".into()));
        }

        let volume = self.state.lock().volume.get();
        self.backend
            .play(self.guild_id, stream, volume, launch.token)
            .await
    }

    async fn ensure_connected(&self, channel_id: u64) -> Result<(), Error> {
        let stops = {
            let mut st = self.state.lock();
            if st.connected {
                return Ok(());
            }
            st.voice_channel = Some(channel_id);
            st.stops
        };

        self.backend
            .connect(self.guild_id, channel_id)
            .await
            .map_err(|e| Error::ConnectionLost(e.to_string()))?;

        let stopped_meanwhile = {
            let mut st = self.state.lock();
            if st.stops != stops {
                true
            } else {
                st.connected = true;
                false
            }
        };
        if stopped_meanwhile {
            if let Err(e) = self.backend.disconnect(self.guild_id).await {
                warn!("(Session {}) leaving voice failed: {e}", self.guild_id);
            }
            return Err(Error::InvalidTransition(
                "Playback was stopped while joining the voice channel.".into(),
            ));
        }
        debug!("(Session {}) joined voice channel {channel_id}", self.guild_id);
        Ok(())
    }

    async fn reconnect_if_needed(&self) -> Result<(), Error> {
        let channel = {
            let st = self.state.lock();
            if st.connected {
                return Ok(());
            }
            st.voice_channel
        };
        let Some(channel_id) = channel else {
            return Err(Error::ConnectionLost("no voice channel to rejoin".into()));
        };
        self.backend
            .connect(self.guild_id, channel_id)
            .await
            .map_err(|e| Error::ConnectionLost(e.to_string()))?;
        self.state.lock().connected = true;
        Ok(())
    }

    fn notify(&self, notice: PlaybackNotice) {
        if let Some(tx) = &self.notices {
            let _ = tx.send(notice);
        }
    }
}
