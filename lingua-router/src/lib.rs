//! # Lingua Router
//!
//! Intelligent provider routing for a multi-provider machine-translation
//! gateway. The crate models each upstream backend with live health and
//! load state, scores candidates per request under a caller-selected
//! strategy, dispatches with automatic fallback across the remaining
//! healthy backends, memoizes responses in a TTL cache, and aggregates
//! per-provider usage.
//!
//! This is a pure coordination layer: it performs no translation itself,
//! persists no user data, and binds to no transport. The HTTP surface,
//! authentication, and request validation live in the embedding gateway.
//!
//! ## Architecture
//!
//! - [`providers`] — the uniform [`providers::TranslationAdapter`]
//!   contract plus concrete adapters (Claude, OpenAI, DeepL,
//!   LibreTranslate).
//! - [`registry`] — the provider set with per-provider runtime state and
//!   the background health monitor.
//! - [`routing`] — candidate filtering and strategy ordering.
//! - [`router`] — the dispatch & fallback engine and the public API.
//! - [`cache`] — TTL key/value store (in-memory or Redis) backing
//!   response memoization and metrics.
//! - [`metrics`] — per-provider usage records in the cache.
//! - [`config`] — router tunables and the tenant credential store.
//!
//! ## Usage
//!
//! ```rust
//! use lingua_router::{
//!     InMemoryCache, RouterConfig, RoutingStrategy, StaticConfigStore,
//!     TranslationRequest, TranslationRouter,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(InMemoryCache::new(1024));
//! let router = TranslationRouter::new(RouterConfig::default(), cache)?;
//!
//! let store = StaticConfigStore::load("tenants.toml")?;
//! router.initialize(&store, "acme").await?;
//!
//! let request = TranslationRequest::new("hello world", "en", "es");
//! let response = router
//!     .translate(&request, Some(RoutingStrategy::balanced()))
//!     .await?;
//! println!("{} (via {})", response.translated_text, response.provider);
//!
//! router.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Routing strategies
//!
//! Callers pick one of four modes per request: `cost` (cheapest first),
//! `quality` (best score first), `speed` (least loaded first), or the
//! default `balanced` blend of all three. Strategies also carry optional
//! soft caps (`max_cost`, `min_quality`, `max_response_time_ms`) that
//! narrow the candidate set before ordering. Selection is deterministic
//! for equal provider states.
//!
//! ## Failure semantics
//!
//! Upstream failures never escape a `translate` call until every
//! candidate has been tried; the caller then sees
//! [`RouterError::AllProvidersFailed`] carrying the last cause. A
//! request with no eligible provider at all fails fast with
//! [`RouterError::NoProviderAvailable`]. Repeated failures demote a
//! provider to unhealthy; the background monitor promotes it back on the
//! first passing health check.

pub mod cache;
pub mod common;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod registry;
pub mod router;
pub mod routing;

pub use cache::{CacheClient, InMemoryCache, RedisCache};
pub use config::{
    BalancedWeights, ConfigStore, ProviderCredential, RouterConfig, StaticConfigStore,
};
pub use error::{AdapterError, CacheError, ConfigStoreError, RouterError};
pub use metrics::{MetricsAggregator, ProviderUsage};
pub use models::{
    Capabilities, ContextTurn, DetectedLanguage, LanguageSupport, Pricing, QualityTier,
    RoutingStrategy, StrategyMode, TranslationDomain, TranslationRequest, TranslationResponse,
};
pub use providers::{create_adapter, TranslationAdapter};
pub use registry::{ProviderEntry, ProviderRegistry, ProviderStatus};
pub use router::{ProviderStats, TranslationRouter};

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_defaults() {
        let request = TranslationRequest::new("hello", "en", "es");
        assert_eq!(request.text, "hello");
        assert_eq!(request.source_lang, "en");
        assert_eq!(request.target_lang, "es");
        assert!(request.quality.is_none());
        assert!(request.context.is_empty());
        assert!(request.preferred_provider.is_none());
    }

    #[test]
    fn strategy_constructors_set_modes() {
        assert_eq!(RoutingStrategy::cost().mode, StrategyMode::Cost);
        assert_eq!(RoutingStrategy::quality().mode, StrategyMode::Quality);
        assert_eq!(RoutingStrategy::speed().mode, StrategyMode::Speed);
        assert_eq!(RoutingStrategy::balanced().mode, StrategyMode::Balanced);
    }

    #[test]
    fn builtin_registry_matches_factory_ids() {
        let registry = ProviderRegistry::new(&RouterConfig::default());
        let ids: Vec<_> = registry.entries().iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["claude", "deepl", "libretranslate", "openai"]);
    }
}
