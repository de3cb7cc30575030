use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{AdapterEvent, AdapterSettings, EmbedSurface, ProviderAdapter};
use crate::error::{AdapterError, BindError};
use async_trait::async_trait;

/// Method calls sent to the embed, postMessage style.
#[derive(Debug, Serialize)]
#[serde(tag = "method", content = "value", rename_all = "camelCase")]
enum OutboundMessage {
    LoadVideo(String),
    Play,
    Pause,
    SetCurrentTime(f64),
    SetVolume(f64),
    GetDuration,
}

/// One message from the embed. Real players mix event notifications and
/// method responses on the same channel, so both shapes are accepted.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    event: Option<String>,
    method: Option<String>,
    #[serde(default)]
    data: EventData,
    value: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
    seconds: Option<f64>,
    percent: Option<f64>,
    duration: Option<f64>,
}

type PendingSeek = Arc<Mutex<Option<oneshot::Sender<f64>>>>;

struct EmbedInner {
    video_id: String,
    outbound: mpsc::UnboundedSender<String>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<AdapterEvent>>>,
    duration_rx: watch::Receiver<Option<f64>>,
    pending_seek: PendingSeek,
    destroyed: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    settings: AdapterSettings,
}

/// Gated embed provider: drives the remote player through a JSON message
/// bridge and hides its native controls behind the watch gate.
pub struct EmbedAdapter {
    inner: Arc<EmbedInner>,
}

impl EmbedAdapter {
    pub fn bind(
        video_id: &str,
        surface: EmbedSurface,
        settings: AdapterSettings,
    ) -> Result<Self, BindError> {
        if surface.outbound.is_closed() {
            return Err(BindError::SurfaceClosed);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (duration_tx, duration_rx) = watch::channel(None);
        let pending_seek: PendingSeek = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let pump = tokio::spawn(pump(
            surface.inbound,
            events_tx,
            duration_tx,
            pending_seek.clone(),
            cancel.clone(),
        ));

        let adapter = Self {
            inner: Arc::new(EmbedInner {
                video_id: video_id.to_string(),
                outbound: surface.outbound,
                events_rx: Mutex::new(Some(events_rx)),
                duration_rx,
                pending_seek,
                destroyed: AtomicBool::new(false),
                pump: Mutex::new(Some(pump)),
                cancel,
                settings,
            }),
        };

        adapter
            .send(&OutboundMessage::LoadVideo(video_id.to_string()))
            .map_err(|_| BindError::SurfaceClosed)?;
        debug!(video_id, "embed adapter bound");

        Ok(adapter)
    }

    fn send(&self, message: &OutboundMessage) -> Result<(), AdapterError> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(AdapterError::Detached);
        }
        let raw =
            serde_json::to_string(message).map_err(|e| AdapterError::Bridge(e.to_string()))?;
        self.inner
            .outbound
            .send(raw)
            .map_err(|_| AdapterError::Bridge("surface closed".to_string()))
    }
}

/// Reads inbound bridge messages and fans them out: events to the
/// subscriber channel, duration discoveries to the watch cell, seek
/// confirmations to whoever is waiting.
async fn pump(
    mut inbound: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<AdapterEvent>,
    duration_tx: watch::Sender<Option<f64>>,
    pending_seek: PendingSeek,
    cancel: CancellationToken,
) {
    loop {
        let raw = tokio::select! {
            _ = cancel.cancelled() => break,
            message = inbound.recv() => match message {
                Some(raw) => raw,
                None => break,
            },
        };

        let parsed: InboundMessage = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("dropping malformed bridge message: {e}");
                continue;
            }
        };

        if let Some(event) = parsed.event.as_deref() {
            match event {
                "play" => {
                    let _ = events_tx.send(AdapterEvent::Play);
                }
                "pause" => {
                    let _ = events_tx.send(AdapterEvent::Pause);
                }
                "ended" => {
                    let _ = events_tx.send(AdapterEvent::Ended);
                }
                "timeupdate" => {
                    publish_duration(&duration_tx, parsed.data.duration);
                    let _ = events_tx.send(AdapterEvent::TimeUpdate {
                        seconds: parsed.data.seconds,
                        percent_hint: parsed.data.percent,
                        duration_hint: parsed.data.duration,
                    });
                }
                "seeked" => {
                    if let Some(waiter) = pending_seek.lock().unwrap().take() {
                        let _ = waiter.send(parsed.data.seconds.unwrap_or_default());
                    }
                }
                "ready" | "loaded" | "durationchange" => {
                    publish_duration(&duration_tx, parsed.data.duration);
                }
                other => {
                    debug!(event = other, "ignoring unknown bridge event");
                }
            }
        } else if parsed.method.as_deref() == Some("getDuration") {
            publish_duration(&duration_tx, parsed.value);
        }
    }

    debug!("embed bridge pump stopped");
}

fn publish_duration(duration_tx: &watch::Sender<Option<f64>>, candidate: Option<f64>) {
    if let Some(duration) = candidate {
        if duration.is_finite() && duration > 0.0 {
            let _ = duration_tx.send_replace(Some(duration));
        }
    }
}

#[async_trait]
impl ProviderAdapter for EmbedAdapter {
    async fn ready(&self) -> Result<f64, AdapterError> {
        let mut duration_rx = self.inner.duration_rx.clone();
        if let Some(duration) = *duration_rx.borrow_and_update() {
            return Ok(duration);
        }

        self.send(&OutboundMessage::GetDuration)?;

        let wait = async move {
            loop {
                duration_rx
                    .changed()
                    .await
                    .map_err(|_| AdapterError::Detached)?;
                if let Some(duration) = *duration_rx.borrow_and_update() {
                    return Ok(duration);
                }
            }
        };

        timeout(self.inner.settings.ready_timeout, wait)
            .await
            .map_err(|_| AdapterError::Timeout("duration metadata"))?
    }

    async fn play(&self) -> Result<(), AdapterError> {
        self.send(&OutboundMessage::Play)
    }

    async fn pause(&self) -> Result<(), AdapterError> {
        self.send(&OutboundMessage::Pause)
    }

    async fn seek_to(&self, seconds: f64) -> Result<(), AdapterError> {
        let (confirm_tx, confirm_rx) = oneshot::channel();
        // A later seek replaces the waiter; the replaced caller observes
        // Superseded through its dropped receiver.
        *self.inner.pending_seek.lock().unwrap() = Some(confirm_tx);

        self.send(&OutboundMessage::SetCurrentTime(seconds))?;

        match timeout(self.inner.settings.seek_timeout, confirm_rx).await {
            Ok(Ok(landed)) => {
                debug!(requested = seconds, landed, "seek confirmed");
                Ok(())
            }
            Ok(Err(_)) => Err(AdapterError::Superseded("seek")),
            Err(_) => {
                warn!(
                    video_id = %self.inner.video_id,
                    seconds, "seek confirmation timed out"
                );
                Err(AdapterError::Timeout("seek confirmation"))
            }
        }
    }

    async fn set_volume(&self, volume: f64) -> Result<(), AdapterError> {
        self.send(&OutboundMessage::SetVolume(volume.clamp(0.0, 1.0)))
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AdapterEvent>> {
        self.inner.events_rx.lock().unwrap().take()
    }

    fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(video_id = %self.inner.video_id, "destroying embed adapter");
        self.inner.cancel.cancel();
        if let Some(pump) = self.inner.pump.lock().unwrap().take() {
            pump.abort();
        }
        self.inner.pending_seek.lock().unwrap().take();
    }
}

impl Drop for EmbedAdapter {
    fn drop(&mut self) {
        self.destroy();
    }
}
