//! ytdlp.rs
//!
//! Thin wrapper over the `yt-dlp` executable: search/metadata lookup for the
//! track resolver, and direct media URL lookup for the audio source.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, trace};

use jukebot_common::error::Error;
use jukebot_common::models::track::Track;
use jukebot_common::traits::playback_traits::TrackResolver;

/// Subset of `yt-dlp --dump-json` we care about.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: String,
    title: String,
    webpage_url: Option<String>,
    original_url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
}

impl YtDlp {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Direct URL of the best audio-only format for `track`.
    pub async fn stream_url(&self, track: &Track) -> Result<String, Error> {
        let output = Command::new(&self.program)
            .args(["-f", "bestaudio/best", "-g", "--no-playlist", "--no-warnings", "-q"])
            .arg(&track.source_url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::AcquisitionFailure(format!("could not run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::AcquisitionFailure(first_line(&stderr).unwrap_or("yt-dlp failed").to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        first_line(&stdout)
            .map(str::to_string)
            .ok_or_else(|| Error::AcquisitionFailure(format!("no audio stream for {}", track.id)))
    }

    async fn dump_json(&self, target: &str) -> Result<String, Error> {
        let output = Command::new(&self.program)
            .args(["--dump-json", "--no-playlist", "--skip-download", "--no-warnings", "-q"])
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("(YtDlp) lookup for '{target}' failed: {}", stderr.trim());
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TrackResolver for YtDlp {
    async fn resolve(&self, query: &str, requested_by: &str) -> Result<Track, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::ResolutionFailure(query.to_string()));
        }
        let target = search_target(query);
        trace!("(YtDlp) resolving '{target}'");
        let raw = self.dump_json(&target).await?;
        parse_track(&raw, requested_by)?.ok_or_else(|| Error::ResolutionFailure(query.to_string()))
    }
}

/// URLs are looked up directly, anything else becomes a single-result search.
pub fn search_target(query: &str) -> String {
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("ytsearch1:{query}")
    }
}

/// Parse the first JSON line of `--dump-json` output. Empty output means no match.
pub fn parse_track(raw: &str, requested_by: &str) -> Result<Option<Track>, Error> {
    let Some(line) = first_line(raw) else {
        return Ok(None);
    };
    let info: VideoInfo = serde_json::from_str(line)?;
    let source_url = info
        .webpage_url
        .or(info.original_url)
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", info.id));
    Ok(Some(Track {
        id: info.id,
        title: info.title,
        source_url,
        duration_label: duration_label(info.duration),
        thumbnail_url: info.thumbnail,
        requested_by: requested_by.to_string(),
    }))
}

/// `m:ss` below an hour, `h:mm:ss` above, `live` when unknown.
pub fn duration_label(seconds: Option<f64>) -> String {
    let Some(secs) = seconds.filter(|s| s.is_finite() && *s >= 0.0) else {
        return "live".to_string();
    };
    let total = secs.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

fn first_line(s: &str) -> Option<&str> {
    s.lines().map(str::trim).find(|l| !l.is_empty())
}
