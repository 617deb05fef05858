//! Chat commands and control buttons mapped onto playback session calls.
//! Every call to `execute` produces exactly one reply.

use std::sync::Arc;

use tracing::{debug, info};

use jukebot_common::error::Error;
use jukebot_common::models::playback::PlaybackState;
use jukebot_common::models::track::{QueueEntry, Track};
use jukebot_common::traits::playback_traits::{AudioBackend, TrackResolver};

use crate::audio::manager::SessionManager;
use crate::audio::session::EnqueueOutcome;

/// Volume change applied by the up/down buttons and `volume up|down`.
pub const VOLUME_STEP: f32 = 0.1;

/// Max entries listed by the queue command.
const QUEUE_PAGE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum MusicCommand {
    Play(String),
    Pause,
    Resume,
    Skip,
    Stop,
    Queue,
    NowPlaying,
    Loop,
    /// Relative change in `[-1, 1]`.
    Volume(f32),
    BassBoost,
    Nightcore,
    Vaporwave,
    Ping,
    Help,
}

/// Button `custom_id`s and labels, one inner array per action row.
pub const CONTROL_ROWS: [[(&str, &str); 5]; 2] = [
    [
        ("music:pause", "⏸️ Pause"),
        ("music:resume", "▶️ Resume"),
        ("music:skip", "⏭️ Skip"),
        ("music:stop", "⏹️ Stop"),
        ("music:loop", "🔁 Loop"),
    ],
    [
        ("music:volume_down", "🔉 Vol -"),
        ("music:volume_up", "🔊 Vol +"),
        ("music:bassboost", "🎚️ Bass"),
        ("music:nightcore", "⏩ Nightcore"),
        ("music:vaporwave", "🌊 Vaporwave"),
    ],
];

impl MusicCommand {
    /// `None` when `text` is not one of our commands; `Some(Err)` on bad usage.
    pub fn parse(text: &str, prefix: &str) -> Option<Result<Self, Error>> {
        let rest = text.trim().strip_prefix(prefix)?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).unwrap_or("");

        let cmd = match name.as_str() {
            "play" | "p" => {
                if arg.is_empty() {
                    return Some(Err(Error::Usage(format!("{prefix}play <song name or URL>"))));
                }
                MusicCommand::Play(arg.to_string())
            }
            "pause" => MusicCommand::Pause,
            "resume" | "unpause" => MusicCommand::Resume,
            "skip" | "next" => MusicCommand::Skip,
            "stop" | "leave" => MusicCommand::Stop,
            "queue" | "q" => MusicCommand::Queue,
            "np" | "nowplaying" => MusicCommand::NowPlaying,
            "loop" => MusicCommand::Loop,
            "volume" | "vol" => match parse_volume_delta(arg) {
                Some(delta) => MusicCommand::Volume(delta),
                None => {
                    return Some(Err(Error::Usage(format!(
                        "{prefix}volume <+N|-N|up|down> (percent)"
                    ))));
                }
            },
            "bassboost" | "bass" => MusicCommand::BassBoost,
            "nightcore" => MusicCommand::Nightcore,
            "vaporwave" => MusicCommand::Vaporwave,
            "ping" => MusicCommand::Ping,
            "help" => MusicCommand::Help,
            _ => return None,
        };
        Some(Ok(cmd))
    }

    pub fn from_button(custom_id: &str) -> Option<Self> {
        let cmd = match custom_id {
            "music:pause" => MusicCommand::Pause,
            "music:resume" => MusicCommand::Resume,
            "music:skip" => MusicCommand::Skip,
            "music:stop" => MusicCommand::Stop,
            "music:loop" => MusicCommand::Loop,
            "music:volume_down" => MusicCommand::Volume(-VOLUME_STEP),
            "music:volume_up" => MusicCommand::Volume(VOLUME_STEP),
            "music:bassboost" => MusicCommand::BassBoost,
            "music:nightcore" => MusicCommand::Nightcore,
            "music:vaporwave" => MusicCommand::Vaporwave,
            _ => return None,
        };
        Some(cmd)
    }

    fn needs_guild(&self) -> bool {
        !matches!(self, MusicCommand::Ping | MusicCommand::Help)
    }
}

fn parse_volume_delta(arg: &str) -> Option<f32> {
    match arg.to_lowercase().as_str() {
        "up" => return Some(VOLUME_STEP),
        "down" => return Some(-VOLUME_STEP),
        _ => {}
    }
    if !(arg.starts_with('+') || arg.starts_with('-')) {
        return None;
    }
    let percent: f32 = arg.trim_end_matches('%').parse().ok()?;
    if !percent.is_finite() {
        return None;
    }
    Some((percent / 100.0).clamp(-1.0, 1.0))
}

/// Who asked, and from where.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub guild_id: Option<u64>,
    pub text_channel_id: u64,
    pub user_name: String,
    /// Voice channel the invoker is currently in.
    pub voice_channel_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub content: String,
    /// Render a now-playing card for this track alongside the text.
    pub now_playing: Option<Track>,
    pub with_controls: bool,
}

impl CommandReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            now_playing: None,
            with_controls: false,
        }
    }
}

impl From<Error> for CommandReply {
    fn from(e: Error) -> Self {
        CommandReply::text(e.user_message())
    }
}

pub struct MusicCommandService<B: AudioBackend> {
    manager: Arc<SessionManager<B>>,
    resolver: Arc<dyn TrackResolver>,
    prefix: String,
}

impl<B: AudioBackend> MusicCommandService<B> {
    pub fn new(
        manager: Arc<SessionManager<B>>,
        resolver: Arc<dyn TrackResolver>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            resolver,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn execute(&self, cmd: MusicCommand, inv: &Invocation) -> CommandReply {
        debug!("(MusicCommandService) {} => {:?}", inv.user_name, cmd);

        let guild_id = match (cmd.needs_guild(), inv.guild_id) {
            (false, _) => 0,
            (true, Some(g)) => g,
            (true, None) => {
                return CommandReply::text("🎵 Music commands only work inside a server.");
            }
        };

        match cmd {
            MusicCommand::Ping => CommandReply::text("Pong!"),
            MusicCommand::Help => CommandReply::text(self.help_text()),
            MusicCommand::Play(query) => self.play(guild_id, &query, inv).await,
            MusicCommand::Pause => match self.manager.session(guild_id).pause() {
                Ok(()) => CommandReply::text("⏸️ Paused."),
                Err(e) => e.into(),
            },
            MusicCommand::Resume => match self.manager.session(guild_id).resume() {
                Ok(()) => CommandReply::text("▶️ Resumed."),
                Err(e) => e.into(),
            },
            MusicCommand::Skip => match self.manager.session(guild_id).skip().await {
                Ok(outcome) => {
                    let mut text = match outcome.skipped {
                        Some(t) => format!("⏭️ Skipped **{}**.", t.title),
                        None => "⏭️ Skipped.".to_string(),
                    };
                    if outcome.next.started.is_none() && !outcome.next.superseded {
                        text.push_str(" The queue is now empty.");
                    }
                    CommandReply::text(text)
                }
                Err(e) => e.into(),
            },
            MusicCommand::Stop => {
                self.manager.session(guild_id).stop().await;
                CommandReply::text("⏹️ Stopped playback and cleared the queue.")
            }
            MusicCommand::Queue => CommandReply::text(self.queue_text(guild_id)),
            MusicCommand::NowPlaying => {
                let status = self.manager.session(guild_id).status();
                match status.now_playing {
                    Some(track) => {
                        let paused = if status.state == PlaybackState::Paused { " (paused)" } else { "" };
                        CommandReply {
                            content: format!("🎵 Now playing **{}**{paused}", track.title),
                            now_playing: Some(track),
                            with_controls: true,
                        }
                    }
                    None => CommandReply::text("Nothing is playing right now."),
                }
            }
            MusicCommand::Loop => {
                if self.manager.session(guild_id).toggle_loop() {
                    CommandReply::text("🔁 Loop enabled. The current track will repeat.")
                } else {
                    CommandReply::text("➡️ Loop disabled.")
                }
            }
            MusicCommand::Volume(delta) => {
                let volume = self.manager.session(guild_id).set_volume(delta);
                CommandReply::text(format!("🔊 Volume set to {}%.", volume.percent()))
            }
            MusicCommand::BassBoost => {
                let on = self.manager.session(guild_id).toggle_bass_boost();
                CommandReply::text(filter_toggled("Bass boost", on))
            }
            MusicCommand::Nightcore => {
                let on = self.manager.session(guild_id).toggle_nightcore();
                CommandReply::text(filter_toggled("Nightcore", on))
            }
            MusicCommand::Vaporwave => {
                let on = self.manager.session(guild_id).toggle_vaporwave();
                CommandReply::text(filter_toggled("Vaporwave", on))
            }
        }
    }

    async fn play(&self, guild_id: u64, query: &str, inv: &Invocation) -> CommandReply {
        let Some(voice_channel_id) = inv.voice_channel_id else {
            return CommandReply::text("🔊 Join a voice channel first.");
        };

        let track = match self.resolver.resolve(query, &inv.user_name).await {
            Ok(track) => track,
            Err(e) => return e.into(),
        };

        let session = self.manager.session(guild_id);
        session.set_announce_channel(inv.text_channel_id);
        match session.enqueue(QueueEntry::new(track.clone()), voice_channel_id).await {
            Ok(EnqueueOutcome::Queued { track, position }) => {
                CommandReply::text(format!("➕ Queued **{}** at position {position}.", track.title))
            }
            Ok(EnqueueOutcome::Started(report)) => {
                if let Some(started) = report.started {
                    info!("(MusicCommandService) {} started '{}'", inv.user_name, started.title);
                    CommandReply::text(format!("🎶 Starting **{}**.", started.title))
                } else if report.superseded {
                    CommandReply::text(format!("⏹️ Playback was stopped before **{}** started.", track.title))
                } else {
                    CommandReply::text(format!("⚠️ Couldn't start **{}**.", track.title))
                }
            }
            Err(e) => e.into(),
        }
    }

    fn queue_text(&self, guild_id: u64) -> String {
        let session = self.manager.session(guild_id);
        let status = session.status();
        let queue = session.list_queue();

        let mut lines = Vec::new();
        if let Some(track) = &status.now_playing {
            lines.push(format!("🎵 Now playing: **{}** `{}`", track.title, track.duration_label));
        }
        if queue.is_empty() {
            lines.push("📭 The queue is empty.".to_string());
        } else {
            for (i, entry) in queue.iter().take(QUEUE_PAGE).enumerate() {
                lines.push(format!(
                    "{}. **{}** `{}` · requested by {}",
                    i + 1,
                    entry.track.title,
                    entry.track.duration_label,
                    entry.requested_by
                ));
            }
            if queue.len() > QUEUE_PAGE {
                lines.push(format!("…and {} more", queue.len() - QUEUE_PAGE));
            }
        }
        let mut flags = Vec::new();
        if status.loop_enabled {
            flags.push("loop".to_string());
        }
        flags.extend(status.filters.enabled_names().into_iter().map(String::from));
        flags.push(format!("volume {}%", status.volume.percent()));
        lines.push(format!("⚙️ {}", flags.join(" · ")));
        lines.join("\n")
    }

    fn help_text(&self) -> String {
        let p = &self.prefix;
        [
            "**Music commands**".to_string(),
            format!("`{p}play <song or URL>` play or queue a track"),
            format!("`{p}pause` / `{p}resume` / `{p}skip` / `{p}stop`"),
            format!("`{p}queue` show pending tracks, `{p}np` show the current track"),
            format!("`{p}loop` repeat the current track"),
            format!("`{p}volume <+N|-N|up|down>` change volume in percent"),
            format!("`{p}bassboost` / `{p}nightcore` / `{p}vaporwave` toggle filters (next track)"),
        ]
        .join("\n")
    }
}

fn filter_toggled(name: &str, on: bool) -> String {
    if on {
        format!("🎚️ {name} enabled. It applies from the next track.")
    } else {
        format!("🎚️ {name} disabled. It applies from the next track.")
    }
}
