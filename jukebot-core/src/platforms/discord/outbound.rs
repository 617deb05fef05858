// File: jukebot-core/src/platforms/discord/outbound.rs
//
// Everything the bot posts on its own: command replies, playback notices
// and status updates.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use twilight_http::Client as HttpClient;
use twilight_model::channel::message::Component;
use twilight_model::channel::message::embed::Embed;
use twilight_model::http::interaction::{InteractionResponse, InteractionResponseType};
use twilight_model::id::Id;
use twilight_model::id::marker::{ApplicationMarker, ChannelMarker, InteractionMarker};

use jukebot_common::models::playback::PlaybackNotice;

use crate::Error;
use crate::platforms::discord::controls::{control_components, now_playing_embed, notice_text};
use crate::services::music_commands::CommandReply;
use crate::services::status_reporter::StatusSink;

pub fn channel_key(raw: u64) -> Result<Id<ChannelMarker>, Error> {
    Id::new_checked(raw).ok_or_else(|| Error::Platform(format!("Invalid channel ID: {raw}")))
}

async fn post(
    http: &HttpClient,
    channel_id: Id<ChannelMarker>,
    content: &str,
    embeds: &[Embed],
    components: &[Component],
) -> Result<(), Error> {
    let mut request = http.create_message(channel_id).content(content);
    if !embeds.is_empty() {
        request = request.embeds(embeds);
    }
    if !components.is_empty() {
        request = request.components(components);
    }
    request
        .await
        .map_err(|e| Error::Platform(format!("Error sending Discord message: {e:?}")))?;
    Ok(())
}

/// Embeds and components that go out with a `CommandReply`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyParts {
    pub embeds: Vec<Embed>,
    pub components: Vec<Component>,
}

pub fn reply_parts(reply: &CommandReply) -> ReplyParts {
    ReplyParts {
        embeds: reply.now_playing.iter().map(now_playing_embed).collect(),
        components: if reply.with_controls { control_components() } else { Vec::new() },
    }
}

pub async fn send_reply(
    http: &HttpClient,
    channel_id: Id<ChannelMarker>,
    reply: &CommandReply,
) -> Result<(), Error> {
    let parts = reply_parts(reply);
    post(http, channel_id, &reply.content, &parts.embeds, &parts.components).await
}

/// Acknowledgement sent as soon as a button is pressed. The command's reply
/// replaces it later through `complete_button`.
pub fn deferred_ack() -> InteractionResponse {
    InteractionResponse {
        kind: InteractionResponseType::DeferredChannelMessageWithSource,
        data: None,
    }
}

pub async fn acknowledge_button(
    http: &HttpClient,
    application_id: Id<ApplicationMarker>,
    interaction_id: Id<InteractionMarker>,
    token: &str,
) -> Result<(), Error> {
    http.interaction(application_id)
        .create_response(interaction_id, token, &deferred_ack())
        .await
        .map_err(|e| Error::Platform(format!("Error acknowledging button: {e}")))?;
    Ok(())
}

/// Turns the deferred acknowledgement into the command's reply.
pub async fn complete_button(
    http: &HttpClient,
    application_id: Id<ApplicationMarker>,
    token: &str,
    reply: &CommandReply,
) -> Result<(), Error> {
    let parts = reply_parts(reply);
    let client = http.interaction(application_id);
    let mut request = client.update_response(token).content(Some(reply.content.as_str()));
    if !parts.embeds.is_empty() {
        request = request.embeds(Some(parts.embeds.as_slice()));
    }
    if !parts.components.is_empty() {
        request = request.components(Some(parts.components.as_slice()));
    }
    request
        .await
        .map_err(|e| Error::Platform(format!("Error completing button reply: {e}")))?;
    Ok(())
}

/// Posts each `PlaybackNotice` to the channel the session announces in.
/// Now-playing notices carry the embed and the control buttons.
pub fn spawn_notice_task(
    http: Arc<HttpClient>,
    mut notices: UnboundedReceiver<PlaybackNotice>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            let Some(raw) = notice.channel_id() else {
                debug!("(Notices) no announce channel for {notice:?}");
                continue;
            };
            let channel_id = match channel_key(raw) {
                Ok(id) => id,
                Err(e) => {
                    warn!("(Notices) {e}");
                    continue;
                }
            };

            let (embeds, components) = match &notice {
                PlaybackNotice::NowPlaying { track, .. } => {
                    (vec![now_playing_embed(track)], control_components())
                }
                _ => (Vec::new(), Vec::new()),
            };
            if let Err(e) = post(&http, channel_id, &notice_text(&notice), &embeds, &components).await {
                warn!("(Notices) failed to announce: {e}");
            }
        }
        info!("(Notices) notice channel closed");
    })
}

/// `StatusSink` that posts plain messages through the twilight HTTP client.
pub struct TwilightStatusSink {
    http: Arc<HttpClient>,
}

impl TwilightStatusSink {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StatusSink for TwilightStatusSink {
    async fn post(&self, channel_id: u64, text: &str) -> Result<(), Error> {
        post(&self.http, channel_key(channel_id)?, text, &[], &[]).await
    }
}
