//! # Metrics Aggregator
//!
//! Per-provider usage counters, persisted in the cache at
//! `provider:<id>:metrics` as a JSON blob with a rolling TTL. The record
//! is read-modify-written on each dispatch outcome; an absent record
//! reads as all-zero, and any cache failure is logged and swallowed so
//! accounting can never break translation.

use crate::cache::CacheClient;
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

fn metrics_key(provider_id: &str) -> String {
    format!("provider:{provider_id}:metrics")
}

/// Accumulated usage of one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub total_response_time_ms: u64,
    pub total_cost: f64,
}

impl ProviderUsage {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    pub fn average_response_time_ms(&self) -> f64 {
        if self.successful_requests == 0 {
            0.0
        } else {
            self.total_response_time_ms as f64 / self.successful_requests as f64
        }
    }
}

/// Writes dispatch outcomes into the cache, one record per provider.
pub struct MetricsAggregator {
    cache: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl MetricsAggregator {
    pub fn new(cache: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Record a successful dispatch.
    pub async fn record_success(&self, provider_id: &str, processing_time_ms: u64, cost: f64) {
        let mut usage = self.load(provider_id).await;
        usage.total_requests += 1;
        usage.successful_requests += 1;
        usage.total_response_time_ms += processing_time_ms;
        usage.total_cost += cost;
        self.store(provider_id, &usage).await;
    }

    /// Record a failed dispatch. Only the attempt counter moves.
    pub async fn record_failure(&self, provider_id: &str) {
        let mut usage = self.load(provider_id).await;
        usage.total_requests += 1;
        self.store(provider_id, &usage).await;
    }

    /// Current record for a provider, if one is cached.
    pub async fn snapshot(&self, provider_id: &str) -> Option<ProviderUsage> {
        match self.cache.get(&metrics_key(provider_id)).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(usage) => Some(usage),
                Err(e) => {
                    tracing::warn!(provider = provider_id, error = %e, "discarding undecodable metrics record");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(provider = provider_id, error = %e, "metrics read failed");
                None
            }
        }
    }

    async fn load(&self, provider_id: &str) -> ProviderUsage {
        self.snapshot(provider_id).await.unwrap_or_default()
    }

    async fn store(&self, provider_id: &str, usage: &ProviderUsage) {
        let result: Result<(), CacheError> = async {
            let bytes = serde_json::to_vec(usage)?;
            self.cache.set(&metrics_key(provider_id), bytes, self.ttl).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(provider = provider_id, error = %e, "metrics write failed");
        }
    }
}
