use serde::{Deserialize, Serialize};

/// A resolved, playable audio item with display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub source_url: String,
    pub duration_label: String,
    pub thumbnail_url: Option<String>,
    pub requested_by: String,
}

/// One pending entry in a guild's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub track: Track,
    pub requested_by: String,
}

impl QueueEntry {
    pub fn new(track: Track) -> Self {
        let requested_by = track.requested_by.clone();
        Self { track, requested_by }
    }
}
