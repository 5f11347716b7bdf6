//! # Error Taxonomy
//!
//! Two layers of errors, mirroring the two layers of the system:
//!
//! - [`AdapterError`] — what a single upstream backend call can produce.
//!   The dispatch engine consults [`AdapterError::failure_weight`] to
//!   classify each failure: transient ones cost the provider a single
//!   step toward the unhealthy threshold, provider-indicting ones demote
//!   it immediately. Both kinds hand the request to the next candidate.
//! - [`RouterError`] — what the router surfaces to its embedder. Note the
//!   deliberate distinction between [`RouterError::NoProviderAvailable`]
//!   (nothing passed filtering, no call was made) and
//!   [`RouterError::AllProvidersFailed`] (every candidate was tried).
//!
//! Cache and config-store failures have their own small enums because
//! their callers handle them differently: cache errors are logged and
//! swallowed, config-store errors during `initialize` propagate.

use thiserror::Error;

/// Failure of a single adapter operation.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Operation requires credentials that were never accepted.
    #[error("adapter not initialized")]
    NotInitialized,

    /// Invalid or rejected adapter configuration, including empty or
    /// refused credentials.
    #[error("adapter configuration error: {message}")]
    Config { message: String },

    /// The provider's quota or rate budget is exhausted.
    #[error("provider quota exceeded")]
    QuotaExceeded,

    /// The upstream service failed or is unreachable.
    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// The upstream rejected the request as malformed.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The call exceeded its time budget.
    #[error("request timed out")]
    Timeout,

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(reqwest::Error),

    /// The upstream response could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Upstream API error that maps to none of the variants above.
    #[error("api error: {code} - {message}")]
    Api { code: u16, message: String },
}

impl AdapterError {
    /// How far one failure moves the provider toward `Unhealthy`.
    ///
    /// Failures that indict the provider itself rather than this call
    /// (missing credentials, exhausted quota) jump straight to the
    /// threshold so the provider is demoted without burning four more
    /// requests on it. Transient failures — timeouts, 5xx, network
    /// errors — and request-level rejections count a single step.
    pub fn failure_weight(&self, threshold: u32) -> u32 {
        match self {
            AdapterError::NotInitialized
            | AdapterError::Config { .. }
            | AdapterError::QuotaExceeded => threshold,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::UpstreamUnavailable {
                message: err.to_string(),
            }
        } else {
            AdapterError::Http(err)
        }
    }
}

/// Failure surfaced by the router to its embedder.
#[derive(Debug, Error)]
pub enum RouterError {
    /// `initialize` was never called, or no provider accepted credentials.
    #[error("router not initialized")]
    NotInitialized,

    /// The router has been shut down and rejects dispatches.
    #[error("router is shut down")]
    ShutDown,

    /// No provider passed candidate filtering for this request.
    #[error("no provider available for {source_lang} -> {target_lang}")]
    NoProviderAvailable {
        source_lang: String,
        target_lang: String,
    },

    /// Every candidate was attempted and failed.
    #[error("all {attempted} candidate providers failed")]
    AllProvidersFailed {
        attempted: usize,
        #[source]
        last_error: AdapterError,
    },

    /// Invalid router configuration.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The config store could not be read during `initialize`.
    #[error("config store error: {0}")]
    ConfigStore(#[from] ConfigStoreError),
}

/// Failure reading tenant provider rows from the config store.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConfigStoreError {
    pub message: String,
}

impl ConfigStoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of a cache operation. Callers treat these as misses.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {message}")]
    Backend { message: String },

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend {
            message: err.to_string(),
        }
    }
}
