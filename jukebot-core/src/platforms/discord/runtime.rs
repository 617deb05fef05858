use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use songbird::Songbird;
use songbird::shards::TwilightMap;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway,
    CloseFrame,
    Config,
    Event,
    EventTypeFlags,
    Intents,
    MessageSender,
    Shard,
    StreamExt,
};
use twilight_http::Client as HttpClient;
use twilight_http::client::ClientBuilder;
use twilight_model::application::interaction::{Interaction, InteractionData};
use twilight_model::gateway::payload::incoming::MessageCreate;
use twilight_model::gateway::payload::outgoing::update_presence::UpdatePresencePayload;
use twilight_model::gateway::presence::{ActivityType, MinimalActivity, Status};
use twilight_model::id::Id;
use twilight_model::id::marker::{ApplicationMarker, GuildMarker, UserMarker};

use jukebot_common::models::message_log::LoggedMessage;
use jukebot_common::traits::playback_traits::AudioBackend;
use jukebot_common::traits::repository_traits::MessageLogRepository;

use crate::Error;
use crate::platforms::discord::outbound::{acknowledge_button, complete_button, send_reply};
use crate::services::music_commands::{CommandReply, Invocation, MusicCommand, MusicCommandService};
use crate::services::status_reporter::{StatusNotice, StatusReporter};

pub const PRESENCE_TEXT: &str = "Ready to serve!";

/// Reacts to gateway events: status notices, the message log, prefix
/// commands and control-button interactions.
pub struct DiscordEventHandler<B: AudioBackend> {
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    application_id: Id<ApplicationMarker>,
    commands: Arc<MusicCommandService<B>>,
    reporter: Arc<StatusReporter>,
    message_log: Option<Arc<dyn MessageLogRepository>>,
}

impl<B: AudioBackend> DiscordEventHandler<B> {
    pub fn new(
        platform: &DiscordPlatform,
        commands: Arc<MusicCommandService<B>>,
        reporter: Arc<StatusReporter>,
        message_log: Option<Arc<dyn MessageLogRepository>>,
    ) -> Self {
        Self {
            http: platform.http.clone(),
            cache: platform.cache.clone(),
            application_id: platform.application_id,
            commands,
            reporter,
            message_log,
        }
    }

    pub async fn handle(&self, shard_id: u32, event: Event) {
        match event {
            Event::Ready(ready) => {
                let tag = user_tag(&ready.user.name, ready.user.discriminator);
                info!("Shard {shard_id} => READY as {} (ID={})", tag, ready.user.id);
                if let Some(notice) = self.reporter.ready_notice(shard_id, &tag) {
                    self.reporter.report(notice).await;
                }
            }
            Event::Resumed => {
                info!("Shard {shard_id} => RESUMED");
                self.reporter.report(StatusNotice::Reconnected).await;
            }
            Event::GatewayReconnect => {
                info!("Shard {shard_id} => gateway asked us to reconnect");
                self.reporter.report(StatusNotice::Reconnecting).await;
            }
            Event::GatewayClose(frame) => {
                warn!("Shard {shard_id} => gateway closed: {frame:?}");
                self.reporter.report(StatusNotice::Disconnected).await;
            }
            Event::MessageCreate(msg) => {
                if let Err(e) = self.on_message(&msg).await {
                    error!("Shard {shard_id} => message handling failed: {e}");
                }
            }
            Event::InteractionCreate(interaction) => {
                if let Err(e) = self.on_interaction(&interaction.0).await {
                    error!("Shard {shard_id} => interaction handling failed: {e}");
                }
            }
            other => {
                trace!("Shard {shard_id} => unhandled event: {:?}", other.kind());
            }
        }
    }

    async fn on_message(&self, msg: &MessageCreate) -> Result<(), Error> {
        if msg.author.bot {
            debug!("Ignoring bot message from {}", msg.author.name);
            return Ok(());
        }

        if let (Some(repo), Some(guild_id)) = (&self.message_log, msg.guild_id) {
            let logged = LoggedMessage {
                user_id: msg.author.id.to_string(),
                username: msg.author.name.clone(),
                guild_id: Some(guild_id.to_string()),
                channel_id: msg.channel_id.to_string(),
                content: msg.content.clone(),
                timestamp: DateTime::from_timestamp_micros(msg.timestamp.as_micros())
                    .unwrap_or_else(Utc::now),
            };
            if let Err(e) = repo.insert_message(&logged).await {
                warn!("(MessageLog) failed to store message from {}: {e}", msg.author.name);
            }
        }

        let reply = match MusicCommand::parse(&msg.content, self.commands.prefix()) {
            None => return Ok(()),
            Some(Err(e)) => CommandReply::from(e),
            Some(Ok(cmd)) => {
                let inv = Invocation {
                    guild_id: msg.guild_id.map(|g| g.get()),
                    text_channel_id: msg.channel_id.get(),
                    user_name: msg.author.name.clone(),
                    voice_channel_id: self.voice_channel_of(msg.guild_id, msg.author.id),
                };
                self.commands.execute(cmd, &inv).await
            }
        };

        send_reply(&self.http, msg.channel_id, &reply).await
    }

    async fn on_interaction(&self, interaction: &Interaction) -> Result<(), Error> {
        let Some(InteractionData::MessageComponent(data)) = &interaction.data else {
            trace!("Ignoring non-component interaction {:?}", interaction.kind);
            return Ok(());
        };

        // Skip and stop can wait on a whole track acquisition.
        acknowledge_button(&self.http, self.application_id, interaction.id, &interaction.token).await?;

        let reply = match MusicCommand::from_button(&data.custom_id) {
            None => CommandReply::text("❔ That control is no longer supported."),
            Some(cmd) => {
                let (user_id, user_name) = match interaction.author() {
                    Some(user) => (Some(user.id), user.name.clone()),
                    None => (None, "unknown".to_string()),
                };
                let inv = Invocation {
                    guild_id: interaction.guild_id.map(|g| g.get()),
                    text_channel_id: interaction.channel.as_ref().map(|c| c.id.get()).unwrap_or_default(),
                    user_name,
                    voice_channel_id: user_id.and_then(|u| self.voice_channel_of(interaction.guild_id, u)),
                };
                self.commands.execute(cmd, &inv).await
            }
        };

        complete_button(&self.http, self.application_id, &interaction.token, &reply).await
    }

    fn voice_channel_of(&self, guild_id: Option<Id<GuildMarker>>, user_id: Id<UserMarker>) -> Option<u64> {
        let guild_id = guild_id?;
        self.cache
            .voice_state(user_id, guild_id)
            .map(|state| state.channel_id().get())
    }
}

fn user_tag(name: &str, discriminator: u16) -> String {
    if discriminator == 0 {
        name.to_string()
    } else {
        format!("{name}#{discriminator:04}")
    }
}

/// Reads events from one shard, feeds the cache and songbird, and hands
/// each event to the handler on its own task.
async fn shard_runner<B: AudioBackend>(
    mut shard: Shard,
    cache: Arc<InMemoryCache>,
    songbird: Arc<Songbird>,
    handler: Arc<DiscordEventHandler<B>>,
) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        match item {
            Ok(event) => {
                cache.update(&event);
                songbird.process(&event).await;

                let handler = handler.clone();
                tokio::spawn(async move {
                    handler.handle(shard_id, event).await;
                });
            }
            Err(err) => {
                error!("Shard {shard_id} => error receiving event: {err:?}");
                handler.reporter.report(StatusNotice::Error(err.to_string())).await;
            }
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

/// Twilight HTTP client, cache, gateway shards and the songbird voice
/// manager. Shards are created by `connect` and start reading in `start`.
pub struct DiscordPlatform {
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    songbird: Arc<Songbird>,
    application_id: Id<ApplicationMarker>,

    pending_shards: Vec<Shard>,
    shard_senders: Vec<MessageSender>,
    shard_tasks: Vec<JoinHandle<()>>,
}

impl DiscordPlatform {
    pub async fn connect(token: &str) -> Result<Self, Error> {
        if token.is_empty() {
            return Err(Error::Config("Discord token is empty".into()));
        }

        let http = Arc::new(
            ClientBuilder::new()
                .token(token.to_string())
                .timeout(Duration::from_secs(30))
                .build(),
        );

        let cache = Arc::new(
            InMemoryCache::builder()
                .resource_types(
                    ResourceType::GUILD
                        | ResourceType::CHANNEL
                        | ResourceType::MESSAGE
                        | ResourceType::VOICE_STATE,
                )
                .build(),
        );

        let user = http
            .current_user()
            .await
            .map_err(|e| Error::Platform(format!("Error fetching current user: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing current user: {e}")))?;
        let application_id = http
            .current_user_application()
            .await
            .map_err(|e| Error::Platform(format!("Error fetching application: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing application: {e}")))?
            .id;

        let presence = presence()?;
        let config = Config::new(
            token.to_string(),
            Intents::GUILDS
                | Intents::GUILD_MESSAGES
                | Intents::MESSAGE_CONTENT
                | Intents::GUILD_VOICE_STATES,
        );
        let shards: Vec<Shard> =
            gateway::create_recommended(&http, config, |_, b| b.presence(presence.clone()).build())
                .await
                .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?
                .collect();

        let shard_senders: Vec<MessageSender> = shards.iter().map(|s| s.sender()).collect();
        let senders: HashMap<u32, MessageSender> = shards
            .iter()
            .map(|s| (s.id().number(), s.sender()))
            .collect();
        let songbird = Arc::new(Songbird::twilight(Arc::new(TwilightMap::new(senders)), user.id));

        info!(
            "(DiscordPlatform) connected as {} with {} shard(s)",
            user.name,
            shards.len()
        );

        Ok(Self {
            http,
            cache,
            songbird,
            application_id,
            pending_shards: shards,
            shard_senders,
            shard_tasks: Vec::new(),
        })
    }

    pub fn http(&self) -> Arc<HttpClient> {
        self.http.clone()
    }

    pub fn songbird(&self) -> Arc<Songbird> {
        self.songbird.clone()
    }

    /// Spawn one runner per shard. Calling it again is a no-op.
    pub fn start<B: AudioBackend>(&mut self, handler: Arc<DiscordEventHandler<B>>) {
        for shard in self.pending_shards.drain(..) {
            let cache = self.cache.clone();
            let songbird = self.songbird.clone();
            let handler = handler.clone();
            self.shard_tasks.push(tokio::spawn(async move {
                shard_runner(shard, cache, songbird, handler).await;
            }));
        }
    }

    pub async fn disconnect(&mut self) {
        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        for task in self.shard_tasks.drain(..) {
            let _ = task.await;
        }
        self.shard_senders.clear();
        info!("(DiscordPlatform) disconnected");
    }
}

fn presence() -> Result<UpdatePresencePayload, Error> {
    let activity = MinimalActivity {
        kind: ActivityType::Playing,
        name: PRESENCE_TEXT.to_string(),
        url: None,
    };
    UpdatePresencePayload::new(vec![activity.into()], false, None, Status::Online)
        .map_err(|e| Error::Platform(format!("invalid presence: {e}")))
}
