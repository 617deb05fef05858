// File: jukebot-core/src/platforms/discord/controls.rs
//
// Now-playing cards and the two rows of playback buttons.

use twilight_model::channel::message::Component;
use twilight_model::channel::message::component::{ActionRow, Button, ButtonStyle};
use twilight_model::channel::message::embed::Embed;
use twilight_util::builder::embed::{EmbedBuilder, EmbedFieldBuilder, ImageSource};

use jukebot_common::models::playback::PlaybackNotice;
use jukebot_common::models::track::Track;

use crate::services::music_commands::CONTROL_ROWS;

const EMBED_COLOR: u32 = 0x1DB954;

pub fn now_playing_embed(track: &Track) -> Embed {
    let mut builder = EmbedBuilder::new()
        .title(format!("🎶 Now Playing: {}", track.title))
        .url(track.source_url.clone())
        .color(EMBED_COLOR)
        .field(EmbedFieldBuilder::new("Duration", track.duration_label.clone()).inline())
        .field(EmbedFieldBuilder::new("Requested by", track.requested_by.clone()).inline());

    if let Some(thumb) = track.thumbnail_url.as_deref() {
        match ImageSource::url(thumb) {
            Ok(source) => builder = builder.thumbnail(source),
            Err(e) => tracing::debug!("(Controls) skipping thumbnail {}: {}", thumb, e),
        }
    }

    builder.build()
}

/// Pause/resume/skip/stop/loop on the first row, volume and filters on the second.
pub fn control_components() -> Vec<Component> {
    CONTROL_ROWS
        .iter()
        .map(|row| {
            Component::ActionRow(ActionRow {
                components: row
                    .iter()
                    .map(|(custom_id, label)| {
                        Component::Button(Button {
                            custom_id: Some((*custom_id).to_string()),
                            disabled: false,
                            emoji: None,
                            label: Some((*label).to_string()),
                            style: button_style(custom_id),
                            url: None,
                            sku_id: None,
                        })
                    })
                    .collect(),
            })
        })
        .collect()
}

fn button_style(custom_id: &str) -> ButtonStyle {
    match custom_id {
        "music:stop" => ButtonStyle::Danger,
        "music:skip" | "music:resume" => ButtonStyle::Success,
        "music:pause" | "music:loop" => ButtonStyle::Primary,
        _ => ButtonStyle::Secondary,
    }
}

/// Plain-text part of a playback notice posted to the announce channel.
pub fn notice_text(notice: &PlaybackNotice) -> String {
    match notice {
        PlaybackNotice::NowPlaying { track, .. } => {
            format!("🎶 Now playing **{}** `{}`", track.title, track.duration_label)
        }
        PlaybackNotice::AcquisitionFailed { track, reason, .. } => {
            format!("⚠️ Skipping **{}**: {}", track.title, reason)
        }
        PlaybackNotice::QueueFinished { .. } => {
            "✅ Queue finished. Use the play command to add more songs.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::music_commands::MusicCommand;

    fn track(thumb: Option<&str>) -> Track {
        Track {
            id: "abc".into(),
            title: "Song".into(),
            source_url: "https://www.youtube.com/watch?v=abc".into(),
            duration_label: "3:05".into(),
            thumbnail_url: thumb.map(String::from),
            requested_by: "alice".into(),
        }
    }

    #[test]
    fn two_rows_of_five_buttons_that_all_parse() {
        let rows = control_components();
        assert_eq!(rows.len(), 2);
        for row in rows {
            let Component::ActionRow(row) = row else {
                panic!("expected an action row");
            };
            assert_eq!(row.components.len(), 5);
            for c in row.components {
                let Component::Button(b) = c else {
                    panic!("expected a button");
                };
                let id = b.custom_id.expect("button id");
                assert!(MusicCommand::from_button(&id).is_some(), "{id} not mapped");
            }
        }
    }

    #[test]
    fn embed_carries_track_details() {
        let embed = now_playing_embed(&track(Some("https://i.ytimg.com/vi/abc/hq.jpg")));
        assert_eq!(embed.title.as_deref(), Some("🎶 Now Playing: Song"));
        assert_eq!(embed.fields.len(), 2);
        assert_eq!(embed.fields[0].value, "3:05");
        assert_eq!(embed.fields[1].value, "alice");
        assert!(embed.thumbnail.is_some());

        assert!(now_playing_embed(&track(None)).thumbnail.is_none());
    }

    #[test]
    fn notice_texts() {
        let failed = PlaybackNotice::AcquisitionFailed {
            guild_id: 1,
            channel_id: Some(2),
            track: track(None),
            reason: "timed out".into(),
        };
        assert_eq!(notice_text(&failed), "⚠️ Skipping **Song**: timed out");
        let done = PlaybackNotice::QueueFinished { guild_id: 1, channel_id: None };
        assert!(notice_text(&done).starts_with("✅ Queue finished"));
    }
}
