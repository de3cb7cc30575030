use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::mocks::{AdapterCall, MockAdapter, MockControls, RecordingSink};
use watchgate::adapter::ProviderAdapter;
use watchgate::player::controller::{GateHandle, GateSettings, WatchGateController};
use watchgate::player::state::{PlaybackState, SeekOrigin, SessionPhase};
use watchgate::reporter::ProgressReporter;
use watchgate::session::SessionEvent;

struct Harness {
    gate: GateHandle,
    controls: MockControls,
    sink: Arc<RecordingSink>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    driver: JoinHandle<()>,
}

fn start(duration: Option<f64>, settings: GateSettings, cadence: Duration) -> Harness {
    start_with(duration, settings, cadence, |_| {})
}

fn start_with(
    duration: Option<f64>,
    settings: GateSettings,
    cadence: Duration,
    prepare: impl FnOnce(&MockControls),
) -> Harness {
    let (adapter, controls) = MockAdapter::new(duration);
    prepare(&controls);

    let adapter_events = adapter.take_events().expect("fresh adapter");
    let (events_tx, events) = mpsc::unbounded_channel();
    let sink = RecordingSink::new();
    let reporter = ProgressReporter::new(sink.clone(), cadence, "vid-1", events_tx.clone());
    let (gate, controller) =
        WatchGateController::new(Box::new(adapter), adapter_events, reporter, events_tx, settings);
    let driver = tokio::spawn(controller.run());

    Harness {
        gate,
        controls,
        sink,
        events,
        driver,
    }
}

async fn wait_until(gate: &GateHandle, predicate: impl Fn(&PlaybackState) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = gate.snapshot().await.expect("controller alive");
            if predicate(&state) {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("state never converged");
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn forward_seeks_clamp_to_the_watched_ceiling() {
    let h = start(Some(100.0), GateSettings::default(), Duration::from_secs(60));
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ready).await;

    h.controls.time_update(40.0);
    wait_until(&h.gate, |s| s.max_watched_time == 40.0).await;

    // A timeline click past the ceiling lands at the ceiling
    assert_eq!(h.gate.seek(90.0, SeekOrigin::Click).await.unwrap(), 40.0);

    // Rewinding is free and leaves the ceiling alone
    assert_eq!(h.gate.seek(10.0, SeekOrigin::Click).await.unwrap(), 10.0);
    let snapshot = h.gate.snapshot().await.unwrap();
    assert_eq!(snapshot.max_watched_time, 40.0);

    // Playing forward past the old mark raises the ceiling
    for t in [30.0, 50.0, 70.0] {
        h.controls.time_update(t);
    }
    wait_until(&h.gate, |s| s.max_watched_time == 70.0).await;
    assert_eq!(h.gate.seek(90.0, SeekOrigin::Click).await.unwrap(), 70.0);

    assert_eq!(h.controls.seeks(), vec![40.0, 10.0, 70.0]);
}

#[tokio::test]
async fn skips_go_through_the_same_clamp() {
    let h = start(Some(100.0), GateSettings::default(), Duration::from_secs(60));
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ready).await;

    h.controls.time_update(40.0);
    wait_until(&h.gate, |s| s.max_watched_time == 40.0).await;

    assert_eq!(h.gate.seek(35.0, SeekOrigin::Click).await.unwrap(), 35.0);
    assert_eq!(h.gate.skip_forward().await.unwrap(), 40.0); // 45 clamped
    assert_eq!(h.gate.skip_forward().await.unwrap(), 40.0); // pinned at ceiling
    assert_eq!(h.gate.skip_back().await.unwrap(), 30.0);

    assert_eq!(h.gate.seek(5.0, SeekOrigin::Click).await.unwrap(), 5.0);
    assert_eq!(h.gate.skip_back().await.unwrap(), 0.0); // floored at zero
}

#[tokio::test]
async fn resume_position_is_applied_before_commands() {
    let settings = GateSettings {
        initial_progress: 120.0,
        ..Default::default()
    };
    let h = start(Some(300.0), settings, Duration::from_secs(60));
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ready).await;

    let state = h.gate.snapshot().await.unwrap();
    assert_eq!(state.current_time, 120.0);
    assert_eq!(state.max_watched_time, 120.0);
    assert_eq!(h.controls.seeks(), vec![120.0]);

    // Re-binding the same video with the same persisted progress resumes
    // no lower
    let rebound = start(Some(300.0), settings, Duration::from_secs(60));
    wait_until(&rebound.gate, |s| s.phase == SessionPhase::Ready).await;
    let state = rebound.gate.snapshot().await.unwrap();
    assert!(state.max_watched_time >= 120.0);
}

#[tokio::test]
async fn failed_resume_still_goes_ready() {
    let settings = GateSettings {
        initial_progress: 50.0,
        ..Default::default()
    };
    let h = start_with(Some(100.0), settings, Duration::from_secs(60), |controls| {
        controls.inject_error("embed detached");
    });
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ready).await;

    // The ceiling survives the failed resume seek
    let state = h.gate.snapshot().await.unwrap();
    assert_eq!(state.max_watched_time, 50.0);

    // The next user action proceeds once the provider recovers
    h.controls.clear_error();
    h.gate.play().await.unwrap();
    assert_eq!(h.gate.seek(80.0, SeekOrigin::Click).await.unwrap(), 50.0);
    assert!(h.controls.calls().contains(&AdapterCall::Play));
}

#[tokio::test]
async fn ended_reports_full_progress_then_completes() {
    let mut h = start(Some(100.0), GateSettings::default(), Duration::from_secs(60));
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ready).await;

    h.controls.time_update(95.0);
    wait_until(&h.gate, |s| s.max_watched_time == 95.0).await;

    h.controls.ended();
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ended).await;
    settle().await;

    // The ending forces the ceiling to the duration and reports 100%
    let state = h.gate.snapshot().await.unwrap();
    assert_eq!(state.max_watched_time, 100.0);
    assert_eq!(state.current_time, 100.0);
    assert_eq!(h.sink.percentages(), vec![95.0, 100.0]);

    // Completion is observed after the terminal report was initiated
    let events = drain(&mut h.events);
    let progress_idx = events
        .iter()
        .position(|e| matches!(e, SessionEvent::Progress { percentage, .. } if *percentage == 100.0))
        .expect("terminal progress emitted");
    let completed_idx = events
        .iter()
        .position(|e| matches!(e, SessionEvent::Completed))
        .expect("completion emitted");
    assert!(progress_idx < completed_idx);

    // A duplicate ended event and late time updates change nothing
    h.controls.ended();
    h.controls.time_update(55.0);
    settle().await;
    let state = h.gate.snapshot().await.unwrap();
    assert_eq!(state.current_time, 100.0);
    assert_eq!(h.sink.percentages(), vec![95.0, 100.0]);
    let completions = drain(&mut h.events)
        .iter()
        .filter(|e| matches!(e, SessionEvent::Completed))
        .count();
    assert_eq!(completions, 0);
}

#[tokio::test]
async fn teardown_flushes_the_last_unreported_progress() {
    let h = start(Some(100.0), GateSettings::default(), Duration::from_secs(60));
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ready).await;

    h.controls.time_update(30.0);
    wait_until(&h.gate, |s| s.max_watched_time == 30.0).await;
    // Within the cadence window: retained, not sent
    h.controls.time_update(42.0);
    wait_until(&h.gate, |s| s.max_watched_time == 42.0).await;

    h.gate.shutdown().await.unwrap();
    h.driver.await.unwrap();
    settle().await;

    assert_eq!(h.sink.seconds(), vec![30.0, 42.0]);
    assert!(h.controls.destroyed());

    // The controller is gone; nothing can produce further reports
    h.controls.time_update(60.0);
    settle().await;
    assert_eq!(h.sink.seconds(), vec![30.0, 42.0]);
}

#[tokio::test]
async fn scrub_commits_through_the_clamp() {
    let h = start(Some(100.0), GateSettings::default(), Duration::from_secs(60));
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ready).await;

    h.controls.time_update(40.0);
    wait_until(&h.gate, |s| s.max_watched_time == 40.0).await;

    h.gate.begin_scrub().await.unwrap();
    assert!(h.controls.calls().contains(&AdapterCall::Pause));

    // Playback that overlaps the drag raises the ceiling but leaves the
    // displayed position alone
    h.controls.time_update(45.0);
    wait_until(&h.gate, |s| s.max_watched_time == 45.0).await;
    let state = h.gate.snapshot().await.unwrap();
    assert!(state.is_scrubbing);
    assert_eq!(state.current_time, 40.0);

    // The committed release goes through the ordinary clamp
    assert_eq!(h.gate.commit_scrub(90.0).await.unwrap(), 45.0);
    let state = h.gate.snapshot().await.unwrap();
    assert!(!state.is_scrubbing);
    assert_eq!(state.current_time, 45.0);
}

#[tokio::test]
async fn toggle_and_volume_relay_to_the_provider() {
    let h = start(Some(100.0), GateSettings::default(), Duration::from_secs(60));
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ready).await;

    assert!(h.gate.toggle_playback().await.unwrap());
    assert!(!h.gate.toggle_playback().await.unwrap());
    assert!(h.controls.calls().contains(&AdapterCall::Play));
    assert!(h.controls.calls().contains(&AdapterCall::Pause));

    h.gate.set_volume(0.25).await.unwrap();
    assert!(h.controls.calls().contains(&AdapterCall::SetVolume(0.25)));

    h.gate.set_volume(1.5).await.unwrap();
    let volumes: Vec<f64> = h
        .controls
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            AdapterCall::SetVolume(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(volumes.last(), Some(&1.0));
}

#[tokio::test]
async fn duration_discovered_late_still_bounds_seeks() {
    // Provider metadata times out; duration arrives with a later report
    let h = start(None, GateSettings::default(), Duration::from_secs(60));
    wait_until(&h.gate, |s| s.phase == SessionPhase::Ready).await;

    h.controls.time_update_with_duration(20.0, 80.0);
    wait_until(&h.gate, |s| s.duration == Some(80.0)).await;

    let state = h.gate.snapshot().await.unwrap();
    assert_eq!(state.max_watched_time, 20.0);
    // The ceiling applies and the duration bounds the request
    assert_eq!(h.gate.seek(200.0, SeekOrigin::Click).await.unwrap(), 20.0);
}
