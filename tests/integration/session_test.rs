use std::time::Duration;
use tokio::sync::mpsc;

use crate::common::mocks::RecordingSink;
use watchgate::adapter::{EmbedSurface, ProviderKind};
use watchgate::config::Config;
use watchgate::error::BindError;
use watchgate::player::controller::GateHandle;
use watchgate::player::state::{PlaybackState, SeekOrigin, SessionPhase};
use watchgate::session::{PlayerSession, SessionConfig, SessionEvent};

/// Plays the embed's side of the wire protocol: answers getDuration with
/// a durationchange and confirms every setCurrentTime with a seeked.
fn spawn_embed_stub(
    mut to_embed: mpsc::UnboundedReceiver<String>,
    from_embed: mpsc::UnboundedSender<String>,
    duration: f64,
) {
    tokio::spawn(async move {
        while let Some(raw) = to_embed.recv().await {
            let Ok(message) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            match message["method"].as_str() {
                Some("getDuration") => {
                    let _ = from_embed.send(format!(
                        r#"{{"event":"durationchange","data":{{"duration":{duration}}}}}"#
                    ));
                }
                Some("setCurrentTime") => {
                    let seconds = message["value"].as_f64().unwrap_or_default();
                    let _ = from_embed.send(format!(
                        r#"{{"event":"seeked","data":{{"seconds":{seconds}}}}}"#
                    ));
                }
                _ => {}
            }
        }
    });
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

#[tokio::test]
async fn gated_session_runs_the_full_protocol() {
    let config = Config::default();
    let (surface, host) = EmbedSurface::open();
    let sink = RecordingSink::new();

    let mut session = PlayerSession::start(
        &config,
        SessionConfig {
            video_url: "https://vimeo.com/76979871".to_string(),
            ..Default::default()
        },
        surface,
        sink.clone(),
    )
    .unwrap();

    assert_eq!(session.provider_kind(), ProviderKind::Embed);
    assert_eq!(session.identity().video_id, "76979871");

    let mut events_rx = session.take_events().unwrap();
    let gate = session.gate().unwrap().clone();
    let pusher = host.from_embed.clone();
    spawn_embed_stub(host.to_embed, host.from_embed, 100.0);

    wait_until(&gate, |s| s.phase == SessionPhase::Ready).await;
    let state = gate.snapshot().await.unwrap();
    assert_eq!(state.duration, Some(100.0));

    pusher
        .send(r#"{"event":"timeupdate","data":{"seconds":40.0,"duration":100.0}}"#.to_string())
        .unwrap();
    wait_until(&gate, |s| s.max_watched_time == 40.0).await;

    assert_eq!(gate.seek(90.0, SeekOrigin::Click).await.unwrap(), 40.0);

    pusher.send(r#"{"event":"ended"}"#.to_string()).unwrap();
    wait_until(&gate, |s| s.phase == SessionPhase::Ended).await;
    settle().await;

    assert_eq!(sink.percentages(), vec![40.0, 100.0]);

    let mut saw_completed = false;
    while let Ok(event) = events_rx.try_recv() {
        if matches!(event, SessionEvent::Completed) {
            saw_completed = true;
        }
    }
    assert!(saw_completed);

    session.shutdown().await;
    settle().await;
    // The terminal flush already went out; teardown adds nothing
    assert_eq!(sink.percentages(), vec![40.0, 100.0]);
}

#[tokio::test]
async fn passthrough_session_bypasses_the_gate() {
    let config = Config::default();
    let (surface, host) = EmbedSurface::open();
    let sink = RecordingSink::new();

    let mut session = PlayerSession::start(
        &config,
        SessionConfig {
            video_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            ..Default::default()
        },
        surface,
        sink.clone(),
    )
    .unwrap();

    assert_eq!(session.provider_kind(), ProviderKind::Native);
    assert!(session.gate().is_none());

    let mut events_rx = session.take_events().unwrap();

    host.from_embed
        .send(r#"{"event":"timeupdate","data":{"seconds":12.0,"duration":60.0}}"#.to_string())
        .unwrap();
    host.from_embed
        .send(r#"{"event":"ended"}"#.to_string())
        .unwrap();

    let mut saw_completed = false;
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events_rx.recv().await {
            if matches!(event, SessionEvent::Completed) {
                saw_completed = true;
                break;
            }
        }
    });
    deadline.await.unwrap();
    assert!(saw_completed);

    // Native controls mean no gating and no reporting
    assert!(sink.reports().is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn unknown_host_is_rejected_at_bind() {
    let config = Config::default();
    let (surface, _host) = EmbedSurface::open();
    let sink = RecordingSink::new();

    let result = PlayerSession::start(
        &config,
        SessionConfig {
            video_url: "https://videos.example.net/clip/9".to_string(),
            ..Default::default()
        },
        surface,
        sink,
    );

    assert!(matches!(result, Err(BindError::UnsupportedProvider(_))));
}

#[tokio::test]
async fn explicit_provider_overrides_the_host_mapping() {
    let config = Config::default();
    let (surface, _host) = EmbedSurface::open();
    let sink = RecordingSink::new();

    let session = PlayerSession::start(
        &config,
        SessionConfig {
            video_url: "https://videos.example.net/clip/9".to_string(),
            video_id: Some("clip-9".to_string()),
            provider: Some(ProviderKind::Native),
            ..Default::default()
        },
        surface,
        sink,
    )
    .unwrap();

    assert_eq!(session.provider_kind(), ProviderKind::Native);
    assert_eq!(session.identity().video_id, "clip-9");
    session.shutdown().await;
}
