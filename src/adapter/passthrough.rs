use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{AdapterEvent, AdapterSettings, EmbedSurface, ProviderAdapter};
use crate::error::{AdapterError, BindError};
use async_trait::async_trait;

struct PassthroughInner {
    video_id: String,
    outbound: mpsc::UnboundedSender<String>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<AdapterEvent>>>,
    duration_rx: watch::Receiver<Option<f64>>,
    destroyed: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

/// Pass-through provider: the embed renders its native controls and no
/// gating applies. Calls are relayed without confirmation tracking; events
/// are forwarded so the session can still observe completion.
pub struct PassthroughAdapter {
    inner: Arc<PassthroughInner>,
}

impl PassthroughAdapter {
    pub fn bind(video_id: &str, surface: EmbedSurface) -> Result<Self, BindError> {
        if surface.outbound.is_closed() {
            return Err(BindError::SurfaceClosed);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (duration_tx, duration_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let pump = tokio::spawn(relay(surface.inbound, events_tx, duration_tx, cancel.clone()));

        let adapter = Self {
            inner: Arc::new(PassthroughInner {
                video_id: video_id.to_string(),
                outbound: surface.outbound,
                events_rx: Mutex::new(Some(events_rx)),
                duration_rx,
                destroyed: AtomicBool::new(false),
                pump: Mutex::new(Some(pump)),
                cancel,
            }),
        };

        let load = serde_json::json!({
            "method": "loadVideo",
            "value": video_id,
            "controls": true,
        });
        adapter
            .send_raw(load.to_string())
            .map_err(|_| BindError::SurfaceClosed)?;
        debug!(video_id, "pass-through adapter bound");

        Ok(adapter)
    }

    fn send_raw(&self, raw: String) -> Result<(), AdapterError> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(AdapterError::Detached);
        }
        self.inner
            .outbound
            .send(raw)
            .map_err(|_| AdapterError::Bridge("surface closed".to_string()))
    }

    fn send_method(&self, method: &str, value: Option<f64>) -> Result<(), AdapterError> {
        let raw = match value {
            Some(value) => format!(r#"{{"method":"{method}","value":{value}}}"#),
            None => format!(r#"{{"method":"{method}"}}"#),
        };
        self.send_raw(raw)
    }
}

async fn relay(
    mut inbound: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<AdapterEvent>,
    duration_tx: watch::Sender<Option<f64>>,
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

        let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };
        let data = &value["data"];
        let duration = data["duration"].as_f64();
        if let Some(duration) = duration.filter(|d| d.is_finite() && *d > 0.0) {
            let _ = duration_tx.send_replace(Some(duration));
        }

        let event = match value["event"].as_str() {
            Some("play") => AdapterEvent::Play,
            Some("pause") => AdapterEvent::Pause,
            Some("ended") => AdapterEvent::Ended,
            Some("timeupdate") => AdapterEvent::TimeUpdate {
                seconds: data["seconds"].as_f64(),
                percent_hint: data["percent"].as_f64(),
                duration_hint: duration,
            },
            _ => continue,
        };
        let _ = events_tx.send(event);
    }

    debug!("pass-through relay stopped");
}

#[async_trait]
impl ProviderAdapter for PassthroughAdapter {
    async fn ready(&self) -> Result<f64, AdapterError> {
        let mut duration_rx = self.inner.duration_rx.clone();
        if let Some(duration) = *duration_rx.borrow_and_update() {
            return Ok(duration);
        }

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

        timeout(AdapterSettings::default().ready_timeout, wait)
            .await
            .map_err(|_| AdapterError::Timeout("duration metadata"))?
    }

    async fn play(&self) -> Result<(), AdapterError> {
        self.send_method("play", None)
    }

    async fn pause(&self) -> Result<(), AdapterError> {
        self.send_method("pause", None)
    }

    async fn seek_to(&self, seconds: f64) -> Result<(), AdapterError> {
        self.send_method("setCurrentTime", Some(seconds))
    }

    async fn set_volume(&self, volume: f64) -> Result<(), AdapterError> {
        self.send_method("setVolume", Some(volume.clamp(0.0, 1.0)))
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AdapterEvent>> {
        self.inner.events_rx.lock().unwrap().take()
    }

    fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(video_id = %self.inner.video_id, "destroying pass-through adapter");
        self.inner.cancel.cancel();
        if let Some(pump) = self.inner.pump.lock().unwrap().take() {
            pump.abort();
        }
    }
}

impl Drop for PassthroughAdapter {
    fn drop(&mut self) {
        self.destroy();
    }
}
