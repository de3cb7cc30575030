use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::player::state::ProgressEvent;
use crate::session::SessionEvent;

/// One progress record as the backend sees it.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub session_id: Uuid,
    pub video_id: String,
    pub seconds: f64,
    pub percentage: f64,
    pub reported_at: DateTime<Utc>,
}

/// Backend collaborator accepting progress records. Delivery failures are
/// the caller's to log and drop; the sink never retries.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn deliver(&self, report: &ProgressReport) -> Result<()>;
}

/// Posts progress records as JSON to a configured endpoint.
pub struct HttpProgressSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpProgressSink {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl ProgressSink for HttpProgressSink {
    async fn deliver(&self, report: &ProgressReport) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(report)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "progress endpoint returned {}",
                response.status()
            ));
        }

        debug!(
            seconds = report.seconds,
            percentage = report.percentage,
            "progress delivered"
        );
        Ok(())
    }
}

/// Converts the controller's continuous progress signal into bounded sink
/// calls: at most one per cadence interval, at most one in flight, with
/// unconditional immediate sends on completion and teardown.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    cadence: Duration,
    session_id: Uuid,
    video_id: String,
    events: mpsc::UnboundedSender<SessionEvent>,
    latest: Option<ProgressEvent>,
    dirty: bool,
    last_dispatch: Option<Instant>,
    in_flight: Option<JoinHandle<()>>,
    closed: bool,
}

impl ProgressReporter {
    pub fn new(
        sink: Arc<dyn ProgressSink>,
        cadence: Duration,
        video_id: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            sink,
            cadence,
            session_id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            events,
            latest: None,
            dirty: false,
            last_dispatch: None,
            in_flight: None,
            closed: false,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Offer a progress sample. Sends when the cadence interval has
    /// elapsed and no report is still in flight; otherwise the sample is
    /// retained as the latest known state for a later flush.
    pub fn offer(&mut self, event: ProgressEvent) {
        if self.closed {
            return;
        }
        self.latest = Some(event);
        self.dirty = true;

        let due = self
            .last_dispatch
            .is_none_or(|at| at.elapsed() >= self.cadence);
        if !due {
            return;
        }
        if let Some(in_flight) = &self.in_flight {
            if !in_flight.is_finished() {
                return;
            }
        }

        self.dispatch(event);
    }

    /// Unconditional immediate send, superseding any report still in
    /// flight (last-value-wins).
    pub fn flush(&mut self, event: ProgressEvent) {
        if self.closed {
            return;
        }
        self.latest = Some(event);
        self.dirty = true;
        self.supersede();
        self.dispatch(event);
    }

    /// Teardown flush. Sends the most recent unreported sample, then
    /// refuses further work. When the latest sample was already handed to
    /// a sink call, that call is left to finish as the final report.
    pub fn finalize(&mut self) {
        if self.closed {
            return;
        }
        if self.dirty {
            if let Some(event) = self.latest {
                self.supersede();
                self.dispatch(event);
            }
        }
        self.closed = true;
    }

    fn supersede(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            if !in_flight.is_finished() {
                debug!("superseding in-flight progress report");
                in_flight.abort();
            }
        }
    }

    fn dispatch(&mut self, event: ProgressEvent) {
        self.dirty = false;
        self.last_dispatch = Some(Instant::now());

        let _ = self.events.send(SessionEvent::Progress {
            seconds: event.seconds,
            percentage: event.percentage,
        });

        let report = ProgressReport {
            session_id: self.session_id,
            video_id: self.video_id.clone(),
            seconds: event.seconds,
            percentage: event.percentage,
            reported_at: Utc::now(),
        };
        let sink = self.sink.clone();
        self.in_flight = Some(tokio::spawn(async move {
            if let Err(e) = sink.deliver(&report).await {
                warn!("progress report dropped: {e:#}");
            }
        }));
    }
}
