use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::adapter::{
    self, AdapterEvent, EmbedSurface, Provider, ProviderAdapter, ProviderKind,
};
use crate::config::Config;
use crate::error::BindError;
use crate::player::controller::{GateHandle, GateSettings, WatchGateController};
use crate::player::state::PlaybackState;
use crate::reporter::{ProgressReporter, ProgressSink};

/// Identifies which video a session is bound to. Equality decides whether
/// a rebind is a resume of the same video or a fresh session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub video_url: String,
    pub video_id: String,
}

/// Inbound configuration for one watch session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub video_url: String,
    /// Overrides id extraction from the URL
    pub video_id: Option<String>,
    /// Resume position in seconds, from previously persisted progress
    pub initial_progress: Option<f64>,
    /// Overrides provider selection by URL host
    pub provider: Option<ProviderKind>,
}

/// Outbound signal to the embedding UI.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Fresh state snapshot after a transition
    StateChanged(PlaybackState),
    /// Progress at reporter cadence points
    Progress { seconds: f64, percentage: f64 },
    /// The session reached the end of the video; fired exactly once
    Completed,
}

/// One bound watch session.
///
/// Gated providers get a [`WatchGateController`] between the UI and the
/// embed; pass-through providers keep their native controls and only
/// relay events outward. Dropping the session (or calling
/// [`shutdown`](PlayerSession::shutdown)) releases the adapter and, for
/// gated sessions, forces the final progress flush.
pub struct PlayerSession {
    identity: SessionIdentity,
    provider_kind: ProviderKind,
    gate: Option<GateHandle>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    driver: JoinHandle<()>,
    cancel: CancellationToken,
}

impl PlayerSession {
    /// Bind a new session. The only failures surfaced here are the bind
    /// errors: unresolved provider or video identity, or a dead surface.
    /// Everything after a successful bind degrades in place.
    pub fn start(
        config: &Config,
        session: SessionConfig,
        surface: EmbedSurface,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<PlayerSession, BindError> {
        let url = Url::parse(&session.video_url)?;
        let kind = adapter::resolve_provider(&config.providers, &url, session.provider)?;
        let video_id = adapter::resolve_video_id(&url, session.video_id.as_deref())?;
        let identity = SessionIdentity {
            video_url: session.video_url.clone(),
            video_id: video_id.clone(),
        };
        info!(video_id = %identity.video_id, ?kind, "starting session");

        let provider = Provider::bind(
            kind,
            &video_id,
            surface,
            config.playback.adapter_settings(),
        )?;
        let adapter_events = provider.take_events().ok_or(BindError::SurfaceClosed)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let (gate, driver) = match kind {
            ProviderKind::Embed => {
                let reporter = ProgressReporter::new(
                    sink,
                    config.reporting.cadence(),
                    &video_id,
                    events_tx.clone(),
                );
                let settings = GateSettings {
                    initial_progress: session.initial_progress.unwrap_or(0.0).max(0.0),
                    skip_step: config.playback.skip_step_secs,
                    initial_volume: config.playback.default_volume,
                };
                let (gate, controller) = WatchGateController::new(
                    Box::new(provider),
                    adapter_events,
                    reporter,
                    events_tx,
                    settings,
                );
                (Some(gate), tokio::spawn(controller.run()))
            }
            ProviderKind::Native => {
                let driver = tokio::spawn(relay(
                    provider,
                    adapter_events,
                    events_tx,
                    cancel.child_token(),
                ));
                (None, driver)
            }
        };

        Ok(PlayerSession {
            identity,
            provider_kind: kind,
            gate,
            events: Some(events_rx),
            driver,
            cancel,
        })
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider_kind
    }

    /// The control handle; absent for pass-through sessions.
    pub fn gate(&self) -> Option<&GateHandle> {
        self.gate.as_ref()
    }

    /// Take the outward event stream (can only be done once).
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    /// Tear the session down: final progress flush (gated sessions),
    /// adapter destroy, and cancellation of everything the session spawned.
    pub async fn shutdown(mut self) {
        if let Some(gate) = self.gate.take() {
            if let Err(e) = gate.shutdown().await {
                debug!("gate already gone at shutdown: {e}");
            }
        }
        self.cancel.cancel();
        if let Err(e) = (&mut self.driver).await {
            if !e.is_cancelled() {
                warn!("session driver failed: {e}");
            }
        }
        info!(video_id = %self.identity.video_id, "session torn down");
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        // Dropping the gate handle closes the command channel, which the
        // controller treats as teardown (final flush included); the token
        // stops the pass-through relay.
        self.cancel.cancel();
    }
}

/// Driver for pass-through sessions: no gating, no reporting. Events are
/// still relayed outward so the embedding UI can observe position and
/// completion.
async fn relay(
    provider: Provider,
    mut adapter_events: mpsc::UnboundedReceiver<AdapterEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    let mut state = PlaybackState::new(0.0);
    state.mark_ready();
    let mut completed = false;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = adapter_events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            AdapterEvent::Play => state.is_playing = true,
            AdapterEvent::Pause => state.is_playing = false,
            AdapterEvent::TimeUpdate {
                seconds,
                percent_hint,
                duration_hint,
            } => {
                state.record_time_update(seconds, percent_hint, duration_hint);
            }
            AdapterEvent::Ended => {
                state.mark_ended();
                if !completed {
                    completed = true;
                    let _ = events.send(SessionEvent::Completed);
                }
            }
        }
        let _ = events.send(SessionEvent::StateChanged(state.clone()));
    }

    provider.destroy();
    debug!("pass-through relay stopped");
}
