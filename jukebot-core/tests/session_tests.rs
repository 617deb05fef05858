// File: jukebot-core/tests/session_tests.rs

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::unbounded_channel;

use jukebot_common::models::playback::{
    FilterStage, PlaybackEvent, PlaybackEventKind, PlaybackNotice, PlaybackState, Volume,
};
use jukebot_core::Error;
use jukebot_core::audio::{EnqueueOutcome, Session, SessionConfig, StartReport};

use test_utils::{FakeBackend, entry, track};

const GUILD: u64 = 7;
const VOICE: u64 = 70;

fn session(backend: &Arc<FakeBackend>) -> Session<FakeBackend> {
    Session::new(GUILD, backend.clone(), SessionConfig::default(), None)
}

fn ids(entries: &[jukebot_common::models::track::QueueEntry]) -> Vec<String> {
    entries.iter().map(|e| e.track.id.clone()).collect()
}

fn started(outcome: EnqueueOutcome) -> StartReport {
    match outcome {
        EnqueueOutcome::Started(report) => report,
        other => panic!("expected the entry to start, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_enqueue_starts_and_later_ones_queue_in_order() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);

    let report = started(s.enqueue(entry("a"), VOICE).await?);
    assert_eq!(report.started, Some(track("a")));
    assert_eq!(s.playback_state(), PlaybackState::Playing);

    match s.enqueue(entry("b"), VOICE).await? {
        EnqueueOutcome::Queued { track: t, position } => {
            assert_eq!(t.id, "b");
            assert_eq!(position, 1);
        }
        other => panic!("expected queued, got {other:?}"),
    }
    s.enqueue(entry("c"), VOICE).await?;

    assert_eq!(ids(&s.list_queue()), vec!["b", "c"]);
    assert_eq!(s.now_playing().map(|e| e.track.id), Some("a".to_string()));
    assert_eq!(backend.count("connect:"), 1);
    assert_eq!(backend.calls()[0], format!("connect:{GUILD}:{VOICE}"));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_enqueues_are_all_kept() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = Arc::new(session(&backend));
    s.enqueue(entry("first"), VOICE).await?;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let s = s.clone();
        tasks.push(tokio::spawn(async move {
            s.enqueue(entry(&format!("t{i}")), VOICE).await
        }));
    }
    for t in tasks {
        t.await.expect("join")?;
    }

    let queue = s.list_queue();
    assert_eq!(queue.len(), 10);
    assert!(queue.iter().all(|e| e.track.id != "first"));
    Ok(())
}

#[tokio::test]
async fn test_interleaved_enqueues_keep_arrival_order() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = Arc::new(session(&backend));
    s.enqueue(entry("a"), VOICE).await?;

    for id in ["b", "c"] {
        let s = s.clone();
        tokio::spawn(async move { s.enqueue(entry(id), VOICE).await })
            .await
            .expect("join")?;
    }
    let a = backend.last_output();
    s.on_playback_ended(a.token).await.expect("current token");
    for id in ["d", "e"] {
        let s = s.clone();
        tokio::spawn(async move { s.enqueue(entry(id), VOICE).await })
            .await
            .expect("join")?;
    }

    assert_eq!(s.now_playing().map(|e| e.track.id), Some("b".to_string()));
    assert_eq!(ids(&s.list_queue()), vec!["c", "d", "e"]);
    Ok(())
}

#[tokio::test]
async fn test_natural_end_advances_then_goes_idle() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;

    let first = backend.last_output();
    let report = s.on_playback_ended(first.token).await.expect("current token");
    assert_eq!(report.started, Some(track("b")));
    assert!(s.list_queue().is_empty());

    let second = backend.last_output();
    assert_ne!(first.token, second.token);
    let report = s.on_playback_ended(second.token).await.expect("current token");
    assert_eq!(report, StartReport::default());
    assert_eq!(s.playback_state(), PlaybackState::Idle);
    assert!(s.now_playing().is_none());
    Ok(())
}

#[tokio::test]
async fn test_stale_end_events_are_ignored() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;
    s.enqueue(entry("c"), VOICE).await?;

    let a = backend.last_output();
    s.on_playback_ended(a.token).await;
    // A duplicate end for "a" must not skip "b".
    assert!(s.on_playback_ended(a.token).await.is_none());
    assert_eq!(s.now_playing().map(|e| e.track.id), Some("b".to_string()));
    assert_eq!(ids(&s.list_queue()), vec!["c"]);
    Ok(())
}

#[tokio::test]
async fn test_play_then_skip_scenario() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;

    let a = backend.last_output();
    let outcome = s.skip().await?;
    assert_eq!(outcome.skipped, Some(track("a")));
    assert_eq!(outcome.next.started, Some(track("b")));
    assert!(a.is_stopped());

    // The End event for the stopped "a" arrives late and is dropped.
    assert!(s.on_playback_ended(a.token).await.is_none());
    assert_eq!(s.now_playing().map(|e| e.track.id), Some("b".to_string()));

    let outcome = s.skip().await?;
    assert_eq!(outcome.skipped, Some(track("b")));
    assert!(outcome.next.started.is_none());
    assert_eq!(s.playback_state(), PlaybackState::Idle);

    assert!(matches!(s.skip().await, Err(Error::InvalidTransition(_))));
    Ok(())
}

#[tokio::test]
async fn test_loop_replays_on_end_but_skip_always_advances() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;
    assert!(s.toggle_loop());

    let a1 = backend.last_output();
    let report = s.on_playback_ended(a1.token).await.expect("current token");
    assert_eq!(report.started, Some(track("a")));
    assert_eq!(ids(&s.list_queue()), vec!["b"]);
    assert_eq!(backend.count("open:a"), 2);

    let outcome = s.skip().await?;
    assert_eq!(outcome.next.started, Some(track("b")));
    assert!(s.list_queue().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_stop_clears_queue_and_leaves_voice() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;
    let a = backend.last_output();

    s.stop().await;

    assert_eq!(s.playback_state(), PlaybackState::Idle);
    assert!(s.list_queue().is_empty());
    assert!(s.now_playing().is_none());
    assert!(a.is_stopped());
    assert_eq!(backend.count("disconnect:"), 1);

    // A natural end racing the stop must not resurrect "b".
    assert!(s.on_playback_ended(a.token).await.is_none());
    assert_eq!(s.playback_state(), PlaybackState::Idle);
    assert_eq!(backend.count("play:"), 1);

    // The next enqueue joins voice again.
    s.enqueue(entry("c"), VOICE).await?;
    assert_eq!(backend.count("connect:"), 2);
    Ok(())
}

#[tokio::test]
async fn test_skip_then_stop_never_resurrects_a_track() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let _gate = backend.gate_track("b");
    let s = Arc::new(session(&backend));
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;
    s.enqueue(entry("c"), VOICE).await?;

    let skipping = {
        let s = s.clone();
        tokio::spawn(async move { s.skip().await })
    };
    backend.wait_for_open("b").await;
    s.stop().await;

    let outcome = skipping.await.expect("join")?;
    assert_eq!(outcome.skipped, Some(track("a")));
    assert!(outcome.next.superseded);
    assert!(outcome.next.started.is_none());
    assert_eq!(s.playback_state(), PlaybackState::Idle);
    assert!(s.list_queue().is_empty());
    assert!(s.now_playing().is_none());
    assert_eq!(backend.count("play:"), 1);
    assert_eq!(backend.count("open:c"), 0);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_from_before_stop_does_not_drop_new_connection() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    let a = backend.last_output();
    s.stop().await;

    s.enqueue(entry("b"), VOICE).await?;
    s.enqueue(entry("c"), VOICE).await?;
    assert_eq!(backend.count("connect:"), 2);

    // The driver reports the old connection going away after we rejoined.
    let late = PlaybackEvent {
        guild_id: GUILD,
        token: a.token,
        kind: PlaybackEventKind::ConnectionLost("driver disconnected".into()),
    };
    assert!(s.handle_event(late).await.is_none());
    assert_eq!(s.now_playing().map(|e| e.track.id), Some("b".to_string()));

    let b = backend.last_output();
    let report = s.on_playback_ended(b.token).await.expect("current token");
    assert_eq!(report.started, Some(track("c")));
    assert_eq!(backend.count("connect:"), 2);
    Ok(())
}

#[tokio::test]
async fn test_end_before_attach_still_reports_started() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let gate = backend.gate_play("a");
    let s = Arc::new(session(&backend));

    let pending = {
        let s = s.clone();
        tokio::spawn(async move { s.enqueue(entry("a"), VOICE).await })
    };
    backend.wait_for_play("a").await;

    // ffmpeg exited at once; its End is handled before the handle attaches.
    let a = backend.last_output();
    s.on_playback_ended(a.token).await.expect("current token");
    gate.notify_one();

    let report = started(pending.await.expect("join")?);
    assert_eq!(report.started, Some(track("a")));
    assert!(!report.superseded);
    assert!(a.is_stopped());
    assert_eq!(s.playback_state(), PlaybackState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_stop_before_attach_reports_superseded() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let gate = backend.gate_play("a");
    let s = Arc::new(session(&backend));

    let pending = {
        let s = s.clone();
        tokio::spawn(async move { s.enqueue(entry("a"), VOICE).await })
    };
    backend.wait_for_play("a").await;
    s.stop().await;
    gate.notify_one();

    let report = started(pending.await.expect("join")?);
    assert!(report.superseded);
    assert!(report.started.is_none());
    assert!(backend.last_output().is_stopped());
    assert_eq!(s.playback_state(), PlaybackState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_pause_and_resume_transitions() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    assert!(matches!(s.pause(), Err(Error::InvalidTransition(_))));
    assert!(matches!(s.resume(), Err(Error::InvalidTransition(_))));

    s.enqueue(entry("a"), VOICE).await?;
    let out = backend.last_output();
    assert!(matches!(s.resume(), Err(Error::InvalidTransition(_))));

    s.pause()?;
    assert!(out.is_paused());
    assert_eq!(s.playback_state(), PlaybackState::Paused);
    assert!(matches!(s.pause(), Err(Error::InvalidTransition(_))));

    s.resume()?;
    assert!(!out.is_paused());
    assert_eq!(s.playback_state(), PlaybackState::Playing);
    Ok(())
}

#[tokio::test]
async fn test_skip_while_paused_starts_next_unpaused() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;
    s.pause()?;

    s.skip().await?;
    assert_eq!(s.playback_state(), PlaybackState::Playing);
    assert!(!backend.last_output().is_paused());
    Ok(())
}

#[tokio::test]
async fn test_volume_clamps_and_applies_live_and_to_next_track() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    assert_eq!(s.status().volume, Volume::default());

    // Adjusting while idle is allowed and carries into the first track.
    assert_eq!(s.set_volume(-0.2).percent(), 30);
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;
    let a = backend.last_output();
    assert!((a.volume() - 0.3).abs() < 1e-6);

    assert_eq!(s.set_volume(5.0).get(), 1.0);
    assert_eq!(a.volume(), 1.0);
    assert_eq!(s.set_volume(0.1).get(), 1.0);

    assert_eq!(s.set_volume(-3.0).get(), 0.0);
    assert_eq!(a.volume(), 0.0);

    s.on_playback_ended(a.token).await;
    assert_eq!(backend.last_output().volume(), 0.0);
    Ok(())
}

#[tokio::test]
async fn test_filter_toggle_applies_to_next_track_only() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;
    let a = backend.last_output();
    assert!(a.stages.is_empty());

    assert!(s.toggle_bass_boost());
    assert!(s.toggle_nightcore());
    assert!(s.status().filters.bass_boost);
    assert_eq!(backend.count("open:"), 1);

    s.on_playback_ended(a.token).await;
    let b = backend.last_output();
    assert_eq!(b.track_id, "b");
    assert_eq!(
        b.stages,
        vec![FilterStage::BassBoost { gain_db: 10.0 }, FilterStage::Tempo(1.2)]
    );

    assert!(!s.toggle_nightcore());
    assert!(s.toggle_vaporwave());
    assert!(!s.toggle_bass_boost());
    Ok(())
}

#[tokio::test]
async fn test_acquisition_failure_advances_to_next_entry() -> Result<(), Error> {
    let backend = FakeBackend::new();
    backend.fail_track("b");
    backend.fail_track("c");
    let s = session(&backend);

    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;
    s.enqueue(entry("c"), VOICE).await?;
    s.enqueue(entry("d"), VOICE).await?;

    let a = backend.last_output();
    let report = s.on_playback_ended(a.token).await.expect("current token");
    let failed: Vec<_> = report.failed.iter().map(|f| f.track.id.as_str()).collect();
    assert_eq!(failed, vec!["b", "c"]);
    assert_eq!(report.started, Some(track("d")));
    assert_eq!(backend.count("open:b"), 1);
    Ok(())
}

#[tokio::test]
async fn test_failure_with_empty_queue_goes_idle() -> Result<(), Error> {
    let backend = FakeBackend::new();
    backend.fail_track("a");
    let s = session(&backend);

    let report = started(s.enqueue(entry("a"), VOICE).await?);
    assert!(report.started.is_none());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(s.playback_state(), PlaybackState::Idle);

    // Not stuck: the next enqueue starts normally.
    let report = started(s.enqueue(entry("b"), VOICE).await?);
    assert_eq!(report.started, Some(track("b")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_acquisition_timeout_is_a_failure() -> Result<(), Error> {
    let backend = FakeBackend::new();
    backend.hang_track("slow");
    let config = SessionConfig {
        acquire_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };
    let s = Session::new(GUILD, backend.clone(), config, None);

    let report = started(s.enqueue(entry("slow"), VOICE).await?);
    assert!(report.started.is_none());
    assert!(report.failed[0].reason.contains("timed out"), "{:?}", report.failed);
    assert_eq!(s.playback_state(), PlaybackState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_stop_interrupts_acquisition() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let _gate = backend.gate_track("a");
    let s = Arc::new(session(&backend));

    let pending = {
        let s = s.clone();
        tokio::spawn(async move { s.enqueue(entry("a"), VOICE).await })
    };
    backend.wait_for_open("a").await;

    // State reads stay responsive while acquisition is in flight.
    assert_eq!(s.playback_state(), PlaybackState::Playing);
    s.stop().await;

    let report = started(pending.await.expect("join")?);
    assert!(report.superseded);
    assert!(report.started.is_none());
    assert_eq!(backend.count("play:"), 0);
    assert_eq!(s.playback_state(), PlaybackState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_pause_during_acquisition_is_honoured_on_attach() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let gate = backend.gate_track("a");
    let s = Arc::new(session(&backend));

    let pending = {
        let s = s.clone();
        tokio::spawn(async move { s.enqueue(entry("a"), VOICE).await })
    };
    backend.wait_for_open("a").await;
    s.pause()?;
    gate.notify_one();

    let report = started(pending.await.expect("join")?);
    assert_eq!(report.started, Some(track("a")));
    assert!(backend.last_output().is_paused());
    assert_eq!(s.playback_state(), PlaybackState::Paused);
    Ok(())
}

#[tokio::test]
async fn test_error_mid_stream_never_loops() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    s.toggle_loop();

    let a = backend.last_output();
    let event = PlaybackEvent {
        guild_id: GUILD,
        token: a.token,
        kind: PlaybackEventKind::Errored("decoder crashed".into()),
    };
    let report = s.handle_event(event).await.expect("current token");
    assert_eq!(report.failed[0].track.id, "a");
    assert!(report.started.is_none());
    assert_eq!(s.playback_state(), PlaybackState::Idle);
    assert_eq!(backend.count("open:a"), 1);
    Ok(())
}

#[tokio::test]
async fn test_connection_loss_advances_and_rejoins() -> Result<(), Error> {
    let backend = FakeBackend::new();
    let s = session(&backend);
    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;

    let a = backend.last_output();
    let event = PlaybackEvent {
        guild_id: GUILD,
        token: a.token,
        kind: PlaybackEventKind::ConnectionLost("driver disconnected".into()),
    };
    let report = s.handle_event(event).await.expect("current token");
    assert_eq!(report.started, Some(track("b")));
    assert_eq!(backend.count("connect:"), 2);
    Ok(())
}

#[tokio::test]
async fn test_voice_join_failure_changes_nothing() {
    let backend = FakeBackend::new();
    backend.fail_connect(true);
    let s = session(&backend);

    let res = s.enqueue(entry("a"), VOICE).await;
    assert!(matches!(res, Err(Error::ConnectionLost(_))));
    assert!(s.list_queue().is_empty());
    assert_eq!(s.playback_state(), PlaybackState::Idle);
    assert_eq!(backend.count("open:"), 0);
}

#[tokio::test]
async fn test_notices_follow_playback() -> Result<(), Error> {
    let backend = FakeBackend::new();
    backend.fail_track("b");
    let (tx, mut rx) = unbounded_channel();
    let s = Session::new(GUILD, backend.clone(), SessionConfig::default(), Some(tx));
    s.set_announce_channel(99);

    s.enqueue(entry("a"), VOICE).await?;
    s.enqueue(entry("b"), VOICE).await?;
    s.on_playback_ended(backend.last_output().token).await;

    assert_eq!(
        rx.try_recv().ok(),
        Some(PlaybackNotice::NowPlaying { guild_id: GUILD, channel_id: Some(99), track: track("a") })
    );
    assert!(matches!(
        rx.try_recv().ok(),
        Some(PlaybackNotice::AcquisitionFailed { track: ref t, .. }) if t.id == "b"
    ));
    assert_eq!(
        rx.try_recv().ok(),
        Some(PlaybackNotice::QueueFinished { guild_id: GUILD, channel_id: Some(99) })
    );
    Ok(())
}
