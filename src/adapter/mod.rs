pub mod embed;
pub mod passthrough;

pub use embed::EmbedAdapter;
pub use passthrough::PassthroughAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use url::Url;

use crate::config::ProvidersConfig;
use crate::error::{AdapterError, BindError};

/// Events a bound provider pushes at its own cadence, not the controller's.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Play,
    Pause,
    Ended,
    /// Periodic position report. Fields mirror what embed players actually
    /// send: any of them can be absent or garbage, and the consumer decides
    /// what is usable.
    TimeUpdate {
        seconds: Option<f64>,
        percent_hint: Option<f64>,
        duration_hint: Option<f64>,
    },
}

/// Capability surface of one bound media provider.
///
/// Every call may fail; callers treat failures as non-fatal and retry on
/// the next user action.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Resolves with the duration in seconds once the provider has loaded
    /// metadata.
    async fn ready(&self) -> Result<f64, AdapterError>;

    async fn play(&self) -> Result<(), AdapterError>;

    async fn pause(&self) -> Result<(), AdapterError>;

    /// Seek to an absolute position. Resolves once the provider confirms
    /// the seek landed.
    async fn seek_to(&self, seconds: f64) -> Result<(), AdapterError>;

    /// Volume in `[0, 1]`; values outside the range are clamped.
    async fn set_volume(&self, volume: f64) -> Result<(), AdapterError>;

    /// Take the event receiver (can only be done once).
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AdapterEvent>>;

    /// Release the underlying binding and stop all event delivery.
    /// Safe to call more than once.
    fn destroy(&self);
}

/// Which control surface a provider gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Controls hidden, every intent forced through the watch gate
    Embed,
    /// The provider renders its own controls; no gating applies
    Native,
}

/// Transport handed to the adapter by the embedding host: one channel of
/// outbound JSON for the embed, one channel of inbound JSON from it.
pub struct EmbedSurface {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// The host's half of an embed surface.
pub struct SurfaceHost {
    pub to_embed: mpsc::UnboundedReceiver<String>,
    pub from_embed: mpsc::UnboundedSender<String>,
}

impl EmbedSurface {
    /// Open a connected surface/host pair.
    pub fn open() -> (EmbedSurface, SurfaceHost) {
        let (outbound, to_embed) = mpsc::unbounded_channel();
        let (from_embed, inbound) = mpsc::unbounded_channel();
        (
            EmbedSurface { outbound, inbound },
            SurfaceHost {
                to_embed,
                from_embed,
            },
        )
    }
}

/// Per-call acknowledgement windows for the message bridge.
#[derive(Debug, Clone, Copy)]
pub struct AdapterSettings {
    pub ready_timeout: Duration,
    pub seek_timeout: Duration,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(8),
            seek_timeout: Duration::from_secs(4),
        }
    }
}

/// Pick the provider for a session. An explicit discriminator wins;
/// otherwise the URL host decides. Unknown hosts are rejected rather than
/// falling back, so a mistyped URL cannot silently bypass the gate.
pub fn resolve_provider(
    providers: &ProvidersConfig,
    url: &Url,
    explicit: Option<ProviderKind>,
) -> Result<ProviderKind, BindError> {
    if let Some(kind) = explicit {
        return Ok(kind);
    }

    let host = url
        .host_str()
        .ok_or_else(|| BindError::UnsupportedProvider(url.to_string()))?;

    if providers.embed_hosts.iter().any(|h| host_matches(host, h)) {
        Ok(ProviderKind::Embed)
    } else if providers.native_hosts.iter().any(|h| host_matches(host, h)) {
        Ok(ProviderKind::Native)
    } else {
        Err(BindError::UnsupportedProvider(host.to_string()))
    }
}

fn host_matches(host: &str, entry: &str) -> bool {
    host.eq_ignore_ascii_case(entry)
        || host
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", entry.to_ascii_lowercase()))
}

/// Resolve the provider-side video identifier. A configured id overrides
/// extraction from the URL.
pub fn resolve_video_id(url: &Url, explicit: Option<&str>) -> Result<String, BindError> {
    if let Some(id) = explicit {
        let id = id.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }

    // Watch-page URLs carry the id in the query string
    if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "v") {
        if is_plausible_id(&id) {
            return Ok(id.into_owned());
        }
    }

    if let Some(segments) = url.path_segments() {
        if let Some(last) = segments.filter(|s| !s.is_empty()).last() {
            if is_plausible_id(last) {
                return Ok(last.to_string());
            }
        }
    }

    Err(BindError::UnresolvedVideo(url.to_string()))
}

fn is_plausible_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// One bound provider, selected once at bind time.
pub enum Provider {
    Embed(EmbedAdapter),
    Native(PassthroughAdapter),
}

impl Provider {
    pub fn bind(
        kind: ProviderKind,
        video_id: &str,
        surface: EmbedSurface,
        settings: AdapterSettings,
    ) -> Result<Self, BindError> {
        match kind {
            ProviderKind::Embed => {
                info!(video_id, "binding gated embed provider");
                Ok(Provider::Embed(EmbedAdapter::bind(
                    video_id, surface, settings,
                )?))
            }
            ProviderKind::Native => {
                info!(video_id, "binding pass-through provider");
                Ok(Provider::Native(PassthroughAdapter::bind(
                    video_id, surface,
                )?))
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for Provider {
    async fn ready(&self) -> Result<f64, AdapterError> {
        match self {
            Provider::Embed(p) => p.ready().await,
            Provider::Native(p) => p.ready().await,
        }
    }

    async fn play(&self) -> Result<(), AdapterError> {
        match self {
            Provider::Embed(p) => p.play().await,
            Provider::Native(p) => p.play().await,
        }
    }

    async fn pause(&self) -> Result<(), AdapterError> {
        match self {
            Provider::Embed(p) => p.pause().await,
            Provider::Native(p) => p.pause().await,
        }
    }

    async fn seek_to(&self, seconds: f64) -> Result<(), AdapterError> {
        match self {
            Provider::Embed(p) => p.seek_to(seconds).await,
            Provider::Native(p) => p.seek_to(seconds).await,
        }
    }

    async fn set_volume(&self, volume: f64) -> Result<(), AdapterError> {
        match self {
            Provider::Embed(p) => p.set_volume(volume).await,
            Provider::Native(p) => p.set_volume(volume).await,
        }
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AdapterEvent>> {
        match self {
            Provider::Embed(p) => p.take_events(),
            Provider::Native(p) => p.take_events(),
        }
    }

    fn destroy(&self) {
        match self {
            Provider::Embed(p) => p.destroy(),
            Provider::Native(p) => p.destroy(),
        }
    }
}
