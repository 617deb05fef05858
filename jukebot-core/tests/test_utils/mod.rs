// File: jukebot-core/tests/test_utils/mod.rs
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use jukebot_common::models::playback::FilterStage;
use jukebot_common::models::track::{QueueEntry, Track};
use jukebot_common::traits::playback_traits::{
    AudioBackend, Filterable, PlaybackHandle, TrackResolver,
};
use jukebot_core::Error;

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {id}"),
        source_url: format!("https://www.youtube.com/watch?v={id}"),
        duration_label: "3:00".to_string(),
        thumbnail_url: None,
        requested_by: "tester".to_string(),
    }
}

pub fn entry(id: &str) -> QueueEntry {
    QueueEntry::new(track(id))
}

/// Stream handed out by `FakeBackend::open`; remembers the filter stages applied to it.
#[derive(Debug, Clone)]
pub struct FakeStream {
    pub track_id: String,
    pub stages: Vec<FilterStage>,
}

impl Filterable for FakeStream {
    fn bass_boost(mut self, gain_db: f32) -> Self {
        self.stages.push(FilterStage::BassBoost { gain_db });
        self
    }

    fn tempo(mut self, factor: f32) -> Self {
        self.stages.push(FilterStage::Tempo(factor));
        self
    }
}

/// Everything one `play` call produced, shared with the test.
#[derive(Debug)]
pub struct OutputRecord {
    pub track_id: String,
    pub token: u64,
    pub stages: Vec<FilterStage>,
    pub volume: Mutex<f32>,
    pub paused: AtomicBool,
    pub stopped: AtomicBool,
}

impl OutputRecord {
    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct FakeHandle(Arc<OutputRecord>);

impl PlaybackHandle for FakeHandle {
    fn pause(&self) -> Result<(), Error> {
        self.0.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), Error> {
        self.0.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<(), Error> {
        *self.0.volume.lock() = volume;
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        self.0.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory audio backend. Records every call in `calls` as
/// `connect:<guild>:<channel>`, `open:<track>`, `play:<track>` or `disconnect:<guild>`.
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<String>>,
    outputs: Mutex<Vec<Arc<OutputRecord>>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    play_gates: Mutex<HashMap<String, Arc<Notify>>>,
    fail_connect: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `open` for this track returns an acquisition failure.
    pub fn fail_track(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    /// `open` for this track never completes.
    pub fn hang_track(&self, id: &str) {
        self.hanging.lock().insert(id.to_string());
    }

    /// `open` for this track waits until the returned `Notify` fires.
    pub fn gate_track(&self, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(id.to_string(), gate.clone());
        gate
    }

    /// `play` for this track records its output, then waits until the returned
    /// `Notify` fires before handing the handle back.
    pub fn gate_play(&self, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.play_gates.lock().insert(id.to_string(), gate.clone());
        gate
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn outputs(&self) -> Vec<Arc<OutputRecord>> {
        self.outputs.lock().clone()
    }

    pub fn last_output(&self) -> Arc<OutputRecord> {
        self.outputs.lock().last().cloned().expect("nothing was played")
    }

    /// Poll until `open` has been called for `id`.
    pub async fn wait_for_open(&self, id: &str) {
        self.wait_for_call(&format!("open:{id}")).await;
    }

    /// Poll until `play` has been called for `id`.
    pub async fn wait_for_play(&self, id: &str) {
        self.wait_for_call(&format!("play:{id}")).await;
    }

    async fn wait_for_call(&self, needle: &str) {
        for _ in 0..1000 {
            if self.calls.lock().iter().any(|c| c == needle) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("{needle} was never called");
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    type Stream = FakeStream;

    async fn open(&self, track: &Track) -> Result<FakeStream, Error> {
        self.calls.lock().push(format!("open:{}", track.id));

        let gate = self.gates.lock().get(&track.id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.hanging.lock().contains(&track.id) {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().contains(&track.id) {
            return Err(Error::AcquisitionFailure(format!("{} is unavailable", track.id)));
        }
        Ok(FakeStream {
            track_id: track.id.clone(),
            stages: Vec::new(),
        })
    }

    async fn connect(&self, guild_id: u64, channel_id: u64) -> Result<(), Error> {
        self.calls.lock().push(format!("connect:{guild_id}:{channel_id}"));
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Voice("voice gateway unreachable".into()));
        }
        Ok(())
    }

    async fn play(
        &self,
        _guild_id: u64,
        stream: FakeStream,
        volume: f32,
        token: u64,
    ) -> Result<Box<dyn PlaybackHandle>, Error> {
        self.calls.lock().push(format!("play:{}", stream.track_id));
        let record = Arc::new(OutputRecord {
            track_id: stream.track_id,
            token,
            stages: stream.stages,
            volume: Mutex::new(volume),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });
        self.outputs.lock().push(record.clone());

        let gate = self.play_gates.lock().get(&record.track_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(Box::new(FakeHandle(record)))
    }

    async fn disconnect(&self, guild_id: u64) -> Result<(), Error> {
        self.calls.lock().push(format!("disconnect:{guild_id}"));
        Ok(())
    }
}

/// Resolves any query to a track whose id is the query itself, except `missing`.
pub struct FakeResolver;

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, query: &str, requested_by: &str) -> Result<Track, Error> {
        if query == "missing" {
            return Err(Error::ResolutionFailure(query.to_string()));
        }
        let mut t = track(query);
        t.requested_by = requested_by.to_string();
        Ok(t)
    }
}
