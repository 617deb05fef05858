use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use jukebot_common::models::playback::{PlaybackEvent, PlaybackNotice};
use jukebot_common::traits::playback_traits::AudioBackend;

use crate::audio::session::{Session, SessionConfig};

/// Owns one `Session` per guild and routes backend events to them.
pub struct SessionManager<B: AudioBackend> {
    backend: Arc<B>,
    config: SessionConfig,
    notices: Option<UnboundedSender<PlaybackNotice>>,
    sessions: DashMap<u64, Arc<Session<B>>>,
}

impl<B: AudioBackend> SessionManager<B> {
    pub fn new(
        backend: Arc<B>,
        config: SessionConfig,
        notices: Option<UnboundedSender<PlaybackNotice>>,
    ) -> Self {
        Self {
            backend,
            config,
            notices,
            sessions: DashMap::new(),
        }
    }

    /// The guild's session, created on first use.
    pub fn session(&self, guild_id: u64) -> Arc<Session<B>> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("(SessionManager) creating session for guild {guild_id}");
                Arc::new(Session::new(
                    guild_id,
                    self.backend.clone(),
                    self.config.clone(),
                    self.notices.clone(),
                ))
            })
            .clone()
    }

    pub fn existing(&self, guild_id: u64) -> Option<Arc<Session<B>>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    pub fn guild_count(&self) -> usize {
        self.sessions.len()
    }

    /// Stop every session and leave all voice channels.
    pub async fn stop_all(&self) {
        let sessions: Vec<Arc<Session<B>>> = self.sessions.iter().map(|s| s.value().clone()).collect();
        for session in sessions {
            session.stop().await;
        }
    }

    /// Forward one backend event to its session.
    pub async fn dispatch(&self, event: PlaybackEvent) {
        match self.existing(event.guild_id) {
            Some(session) => {
                session.handle_event(event).await;
            }
            None => {
                warn!(
                    "(SessionManager) event for unknown guild {} dropped: {:?}",
                    event.guild_id, event.kind
                );
            }
        }
    }

    /// Drain `rx` until every sender is gone. Each event is handled on its own
    /// task so a slow acquisition in one guild does not hold up the others.
    pub fn spawn_event_pump(
        self: Arc<Self>,
        mut rx: UnboundedReceiver<PlaybackEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("(SessionManager) event pump started");
            while let Some(event) = rx.recv().await {
                let manager = self.clone();
                tokio::spawn(async move {
                    manager.dispatch(event).await;
                });
            }
            info!("(SessionManager) event pump ended");
        })
    }
}
