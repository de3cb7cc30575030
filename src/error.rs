use thiserror::Error;

/// Errors that make a session unusable at bind time.
///
/// These are the only failures surfaced to the embedding UI; everything
/// after a successful bind degrades in place.
#[derive(Error, Debug)]
pub enum BindError {
    /// No configured provider handles the URL host
    #[error("no provider handles host: {0}")]
    UnsupportedProvider(String),

    /// A video id could not be resolved from the URL or config
    #[error("could not resolve a video id from: {0}")]
    UnresolvedVideo(String),

    /// The host closed the embed surface before the adapter attached
    #[error("embed surface is closed")]
    SurfaceClosed,

    #[error("invalid video url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Failures from a bound provider adapter.
///
/// The controller logs these and carries on; the next user action retries
/// from current state.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    /// The message bridge to the embed rejected a send
    #[error("bridge send failed: {0}")]
    Bridge(String),

    /// The provider never acknowledged within the configured window
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// A later call superseded this one before the provider answered
    #[error("superseded by a later {0}")]
    Superseded(&'static str),

    /// The adapter was already destroyed
    #[error("adapter detached")]
    Detached,
}

impl AdapterError {
    /// Check whether the next user action can reasonably retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, AdapterError::Detached)
    }
}
