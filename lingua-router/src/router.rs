//! # Dispatch & Fallback Engine
//!
//! [`TranslationRouter`] is the crate's front door. One `translate` call
//! runs, in order: response-cache lookup, candidate scoring, dispatch to
//! the top candidate, fallback across the untried tail on failure, and a
//! metrics write per attempt outcome.
//!
//! ## Dispatch rules
//!
//! - The first attempt follows the strategy order; once anything fails,
//!   the untried tail is re-ordered by ascending priority so retries
//!   land on the cheapest-to-tolerate backups.
//! - Fallback never re-enters the scoring engine: it works the fixed
//!   candidate list, so a provider that just failed cannot be re-picked
//!   for the same request.
//! - Every attempt charges the provider's load counter through an RAII
//!   guard, so the slot is released whether the call succeeds, fails,
//!   times out, or the caller cancels mid-flight. On cancellation no
//!   metrics are written.
//! - Cache and metrics failures are logged and swallowed; they can
//!   degrade memoization and accounting but never a translation.

use crate::cache::CacheClient;
use crate::config::{ConfigStore, RouterConfig};
use crate::error::{AdapterError, RouterError};
use crate::metrics::{MetricsAggregator, ProviderUsage};
use crate::models::{
    DetectedLanguage, RoutingStrategy, TranslationRequest, TranslationResponse, UNKNOWN_LANG,
};
use crate::registry::{HealthMonitor, ProviderRegistry, ProviderStatus};
use crate::routing;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Snapshot of one provider's state plus its cached usage record,
/// as returned by [`TranslationRouter::get_provider_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub id: String,
    pub status: ProviderStatus,
    pub priority: u8,
    pub current_load: u32,
    pub max_load: u32,
    pub cost_per_char: f64,
    pub quality_score: f64,
    pub consecutive_errors: u32,
    pub last_health_check: Option<DateTime<Utc>>,
    pub usage: Option<ProviderUsage>,
}

/// The intelligent provider router.
pub struct TranslationRouter {
    registry: Arc<ProviderRegistry>,
    cache: Arc<dyn CacheClient>,
    metrics: MetricsAggregator,
    config: RouterConfig,
    monitor: Mutex<Option<HealthMonitor>>,
    initialized: AtomicBool,
    shut_down: AtomicBool,
}

impl TranslationRouter {
    /// Build a router over the built-in provider set.
    pub fn new(config: RouterConfig, cache: Arc<dyn CacheClient>) -> Result<Self, RouterError> {
        config.validate()?;
        let registry = ProviderRegistry::new(&config);
        Ok(Self::from_parts(registry, config, cache))
    }

    /// Build a router over an embedder-supplied provider set.
    pub fn with_registry(
        registry: ProviderRegistry,
        config: RouterConfig,
        cache: Arc<dyn CacheClient>,
    ) -> Result<Self, RouterError> {
        config.validate()?;
        Ok(Self::from_parts(registry, config, cache))
    }

    fn from_parts(
        registry: ProviderRegistry,
        config: RouterConfig,
        cache: Arc<dyn CacheClient>,
    ) -> Self {
        let metrics = MetricsAggregator::new(Arc::clone(&cache), config.metrics_ttl);
        Self {
            registry: Arc::new(registry),
            cache,
            metrics,
            config,
            monitor: Mutex::new(None),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Load the tenant's credentials from the config store, initialize
    /// each active provider, and start the health monitor.
    ///
    /// Per-provider failures are logged and skipped; the call only fails
    /// when the store itself cannot be read. The router becomes ready as
    /// soon as at least one provider holds credentials.
    pub async fn initialize(
        &self,
        store: &dyn ConfigStore,
        tenant_id: &str,
    ) -> Result<(), RouterError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(RouterError::ShutDown);
        }

        let accepted = self.registry.initialize(store, tenant_id).await?;
        if accepted == 0 {
            tracing::warn!(tenant = tenant_id, "no provider accepted credentials");
        }
        if self.registry.initialized_count() > 0 {
            self.initialized.store(true, Ordering::SeqCst);
        }

        let mut monitor = self.monitor.lock().unwrap();
        if monitor.is_none() {
            *monitor = Some(HealthMonitor::start(
                self.registry.entries(),
                self.config.health_check_interval,
                self.config.health_check_timeout,
            ));
            tracing::info!(
                interval_secs = self.config.health_check_interval.as_secs(),
                "health monitor started"
            );
        }
        Ok(())
    }

    /// Translate one request under the given strategy (`balanced` when
    /// none is supplied).
    pub async fn translate(
        &self,
        request: &TranslationRequest,
        strategy: Option<RoutingStrategy>,
    ) -> Result<TranslationResponse, RouterError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(RouterError::ShutDown);
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(RouterError::NotInitialized);
        }
        let strategy = strategy.unwrap_or_default();

        let cache_key = response_cache_key(request);
        if let Some(hit) = self.cache_lookup(&cache_key).await {
            return Ok(hit);
        }

        let mut remaining =
            routing::rank_candidates(&self.registry.entries(), request, &strategy, &self.config);

        let mut attempt_timeout = self.config.adapter_call_timeout;
        if let Some(cap_ms) = strategy.max_response_time_ms {
            attempt_timeout = attempt_timeout.min(Duration::from_millis(cap_ms));
        }

        let threshold = self.config.unhealthy_error_threshold;
        let mut attempted = 0usize;
        let mut last_error: Option<AdapterError> = None;

        while !remaining.is_empty() {
            let entry = remaining.remove(0);
            attempted += 1;

            let guard = entry.begin_dispatch();
            let outcome =
                tokio::time::timeout(attempt_timeout, entry.adapter.translate(request)).await;
            drop(guard);

            let result = match outcome {
                Ok(inner) => inner,
                Err(_) => Err(AdapterError::Timeout),
            };

            match result {
                Ok(mut response) => {
                    entry.record_dispatch_success();
                    response.cached = false;
                    self.metrics
                        .record_success(
                            &entry.id,
                            response.processing_time_ms,
                            response.cost.unwrap_or(0.0),
                        )
                        .await;
                    self.cache_store(&cache_key, &response).await;
                    tracing::debug!(
                        provider = %entry.id,
                        attempt = attempted,
                        elapsed_ms = response.processing_time_ms,
                        "translation dispatched"
                    );
                    return Ok(response);
                }
                Err(error) => {
                    tracing::warn!(
                        provider = %entry.id,
                        attempt = attempted,
                        error = %error,
                        "translation attempt failed"
                    );
                    let demoted = entry
                        .record_dispatch_failure(error.failure_weight(threshold), threshold);
                    if demoted {
                        tracing::warn!(
                            provider = %entry.id,
                            "provider marked unhealthy after repeated failures"
                        );
                    }
                    self.metrics.record_failure(&entry.id).await;
                    last_error = Some(error);
                    // From here on, retries prefer the cheapest-to-tolerate
                    // backups over the strategy's first pick.
                    routing::order_for_fallback(&mut remaining);
                }
            }
        }

        match last_error {
            Some(last_error) => Err(RouterError::AllProvidersFailed {
                attempted,
                last_error,
            }),
            None => Err(RouterError::NoProviderAvailable {
                source_lang: request.source_lang.clone(),
                target_lang: request.target_lang.clone(),
            }),
        }
    }

    /// Best-effort language detection through the highest-priority
    /// healthy provider. Degrades to `unknown` instead of raising.
    pub async fn detect_language(&self, text: &str) -> DetectedLanguage {
        if self.shut_down.load(Ordering::SeqCst) || !self.initialized.load(Ordering::SeqCst) {
            return DetectedLanguage::unknown();
        }
        let mut entries: Vec<_> = self
            .registry
            .entries()
            .into_iter()
            .filter(|entry| entry.status() == ProviderStatus::Healthy)
            .collect();
        entries.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

        for entry in entries {
            let detected = match tokio::time::timeout(
                self.config.adapter_call_timeout,
                entry.adapter.detect_language(text),
            )
            .await
            {
                Ok(detected) => detected,
                Err(_) => continue,
            };
            if detected.language != UNKNOWN_LANG {
                return detected;
            }
        }
        DetectedLanguage::unknown()
    }

    /// Snapshot of per-provider state plus cached usage records.
    pub async fn get_provider_stats(&self) -> Vec<ProviderStats> {
        let mut stats = Vec::new();
        for entry in self.registry.entries() {
            stats.push(ProviderStats {
                id: entry.id.clone(),
                status: entry.status(),
                priority: entry.priority,
                current_load: entry.current_load(),
                max_load: entry.max_load,
                cost_per_char: entry.cost_per_char,
                quality_score: entry.quality_score,
                consecutive_errors: entry.consecutive_errors(),
                last_health_check: entry.last_health_check(),
                usage: self.metrics.snapshot(&entry.id).await,
            });
        }
        stats
    }

    /// Stop the health monitor and mark every provider `Disabled`.
    /// Further dispatches are rejected. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let monitor = self.monitor.lock().unwrap().take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        self.registry.disable_all();
        tracing::info!("translation router shut down");
    }

    async fn cache_lookup(&self, key: &str) -> Option<TranslationResponse> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<TranslationResponse>(&bytes) {
                Ok(mut response) => {
                    response.cached = true;
                    tracing::debug!(key, provider = %response.provider, "response cache hit");
                    Some(response)
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "dropping undecodable cache entry");
                    let _ = self.cache.delete(key).await;
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "response cache read failed");
                None
            }
        }
    }

    async fn cache_store(&self, key: &str, response: &TranslationResponse) {
        match serde_json::to_vec(response) {
            Ok(bytes) => {
                if let Err(e) = self.cache.set(key, bytes, self.config.cache_ttl).await {
                    tracing::warn!(error = %e, "response cache write failed");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "response serialization for cache failed");
            }
        }
    }
}

/// Deterministic 64-bit key over the request fields that define a
/// cacheable unit of work.
fn response_cache_key(request: &TranslationRequest) -> String {
    let mut hasher = DefaultHasher::new();
    request.source_lang.hash(&mut hasher);
    request.target_lang.hash(&mut hasher);
    request.preferred_provider.hash(&mut hasher);
    request.text.hash(&mut hasher);
    format!("translation:{:x}", hasher.finish())
}
