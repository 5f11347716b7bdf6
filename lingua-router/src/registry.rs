//! # Provider Registry & Health Monitor
//!
//! The registry owns the set of provider adapters plus the runtime state
//! the rest of the router reads and charges: the status machine, the
//! in-flight load counter, the consecutive-failure counter, and the
//! last-health-check timestamp.
//!
//! ## Status machine
//!
//! ```text
//! Uninitialized ──initialize ok──▶ Healthy ◀──passing check── Unhealthy
//!                                    │                            ▲
//!                                    └──failed check / threshold──┘
//!      any state ──shutdown──▶ Disabled (terminal)
//! ```
//!
//! A provider is a dispatch candidate iff its status is `Healthy`, it
//! has load headroom, and it supports the requested language pair.
//!
//! ## Shared state
//!
//! The provider set itself is frozen at construction; only per-entry
//! state mutates afterwards. `current_load` is an atomic counter charged
//! and released through the RAII [`LoadGuard`]; the status, the error
//! counter, and the check timestamp transition together and sit behind
//! one small mutex per provider.

use crate::config::{ConfigStore, RouterConfig};
use crate::error::RouterError;
use crate::models::LanguageSupport;
use crate::providers::{create_adapter, TranslationAdapter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle state of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Constructed, credentials not yet accepted.
    Uninitialized,
    Healthy,
    Unhealthy,
    /// Terminal; entered only on shutdown.
    Disabled,
}

#[derive(Debug)]
struct ProviderRuntime {
    status: ProviderStatus,
    consecutive_errors: u32,
    last_health_check: Option<DateTime<Utc>>,
}

/// One registered backend: the adapter plus scoring defaults and
/// runtime state.
pub struct ProviderEntry {
    pub id: String,
    pub adapter: Box<dyn TranslationAdapter>,
    /// Lower is preferred on fallback and tie-breaks.
    pub priority: u8,
    pub cost_per_char: f64,
    /// Quality score in [0, 1].
    pub quality_score: f64,
    pub language_support: LanguageSupport,
    /// Concurrent-call ceiling; a provider at the ceiling is invisible
    /// to selection rather than queued.
    pub max_load: u32,
    current_load: AtomicU32,
    runtime: Mutex<ProviderRuntime>,
}

impl ProviderEntry {
    pub fn new(
        id: impl Into<String>,
        adapter: Box<dyn TranslationAdapter>,
        priority: u8,
        cost_per_char: f64,
        quality_score: f64,
        max_load: u32,
    ) -> Self {
        let language_support = adapter.capabilities().supported_languages;
        Self {
            id: id.into(),
            adapter,
            priority,
            cost_per_char,
            quality_score,
            language_support,
            max_load,
            current_load: AtomicU32::new(0),
            runtime: Mutex::new(ProviderRuntime {
                status: ProviderStatus::Uninitialized,
                consecutive_errors: 0,
                last_health_check: None,
            }),
        }
    }

    pub fn status(&self) -> ProviderStatus {
        self.runtime.lock().unwrap().status
    }

    pub fn current_load(&self) -> u32 {
        self.current_load.load(Ordering::SeqCst)
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.runtime.lock().unwrap().consecutive_errors
    }

    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        self.runtime.lock().unwrap().last_health_check
    }

    /// Candidate predicate: healthy (which implies initialized), below
    /// the load ceiling, and able to translate the pair.
    pub fn is_candidate(&self, source: &str, target: &str) -> bool {
        self.status() == ProviderStatus::Healthy
            && self.current_load() < self.max_load
            && self.language_support.supports_pair(source, target)
    }

    /// Charge one in-flight call. The returned guard releases the slot
    /// on drop, whether the call succeeds, fails, or is cancelled.
    pub fn begin_dispatch(self: &Arc<Self>) -> LoadGuard {
        self.current_load.fetch_add(1, Ordering::SeqCst);
        LoadGuard {
            entry: Arc::clone(self),
        }
    }

    /// A successful dispatch clears the failure streak.
    pub fn record_dispatch_success(&self) {
        self.runtime.lock().unwrap().consecutive_errors = 0;
    }

    /// Charge a failed dispatch. Returns true when this failure demoted
    /// the provider to `Unhealthy`.
    pub fn record_dispatch_failure(&self, weight: u32, threshold: u32) -> bool {
        let mut runtime = self.runtime.lock().unwrap();
        runtime.consecutive_errors = runtime.consecutive_errors.saturating_add(weight);
        if runtime.consecutive_errors >= threshold && runtime.status == ProviderStatus::Healthy {
            runtime.status = ProviderStatus::Unhealthy;
            true
        } else {
            false
        }
    }

    /// Apply a health-check verdict. Returns the transition when one
    /// happened, for logging.
    pub fn apply_health_check(
        &self,
        healthy: bool,
        at: DateTime<Utc>,
    ) -> Option<(ProviderStatus, ProviderStatus)> {
        let mut runtime = self.runtime.lock().unwrap();
        runtime.last_health_check = Some(at);
        match (runtime.status, healthy) {
            (ProviderStatus::Healthy, false) => {
                runtime.status = ProviderStatus::Unhealthy;
                Some((ProviderStatus::Healthy, ProviderStatus::Unhealthy))
            }
            (ProviderStatus::Unhealthy, true) => {
                runtime.status = ProviderStatus::Healthy;
                runtime.consecutive_errors = 0;
                Some((ProviderStatus::Unhealthy, ProviderStatus::Healthy))
            }
            _ => None,
        }
    }

    pub(crate) fn mark_initialized(&self) {
        let mut runtime = self.runtime.lock().unwrap();
        if runtime.status == ProviderStatus::Uninitialized {
            runtime.status = ProviderStatus::Healthy;
        }
        runtime.consecutive_errors = 0;
    }

    fn disable(&self) {
        self.runtime.lock().unwrap().status = ProviderStatus::Disabled;
    }
}

/// RAII release of one in-flight slot.
pub struct LoadGuard {
    entry: Arc<ProviderEntry>,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        // Saturating: the counter never goes below zero even if a guard
        // outlives a registry reset.
        let _ = self
            .entry
            .current_load
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |load| {
                Some(load.saturating_sub(1))
            });
    }
}

/// The full provider set. Frozen after construction.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<ProviderEntry>>,
}

impl ProviderRegistry {
    /// Build the registry with the built-in provider set and its
    /// hard-coded scoring defaults. Everything starts `Uninitialized`.
    pub fn new(config: &RouterConfig) -> Self {
        let timeout = config.adapter_call_timeout;
        // id, priority, cost per char, quality score, max concurrent calls
        let defaults: &[(&str, u8, f64, f64, u32)] = &[
            ("deepl", 1, 2.5e-5, 0.94, 100),
            ("claude", 2, 2.4e-5, 0.95, 50),
            ("openai", 3, 2.0e-5, 0.92, 60),
            ("libretranslate", 4, 0.0, 0.70, 20),
        ];

        let mut providers = HashMap::new();
        for &(id, priority, cost, quality, max_load) in defaults {
            // The factory only fails on unknown ids; these are the known set.
            match create_adapter(id, timeout) {
                Ok(adapter) => {
                    let entry =
                        ProviderEntry::new(id, adapter, priority, cost, quality, max_load);
                    providers.insert(id.to_string(), Arc::new(entry));
                }
                Err(e) => {
                    tracing::error!(provider = id, error = %e, "failed to construct adapter");
                }
            }
        }
        Self { providers }
    }

    /// Build from an explicit entry set. Used by embedders that bring
    /// their own adapters, and by tests.
    pub fn with_entries(entries: Vec<ProviderEntry>) -> Self {
        Self {
            providers: entries
                .into_iter()
                .map(|entry| (entry.id.clone(), Arc::new(entry)))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ProviderEntry>> {
        self.providers.get(id)
    }

    /// All entries, in deterministic id order.
    pub fn entries(&self) -> Vec<Arc<ProviderEntry>> {
        let mut entries: Vec<_> = self.providers.values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub fn initialized_count(&self) -> usize {
        self.providers
            .values()
            .filter(|entry| entry.status() != ProviderStatus::Uninitialized)
            .count()
    }

    /// Read the tenant's credential rows and initialize each active
    /// provider. Per-provider failures are logged and leave that
    /// provider `Uninitialized`; only a store failure propagates.
    /// Returns how many providers accepted credentials in this pass.
    pub async fn initialize(
        &self,
        store: &dyn ConfigStore,
        tenant_id: &str,
    ) -> Result<usize, RouterError> {
        let rows = store.provider_credentials(tenant_id).await?;
        let mut accepted = 0;

        for row in rows.into_iter().filter(|row| row.active) {
            let Some(entry) = self.providers.get(&row.provider_id) else {
                tracing::warn!(
                    tenant = tenant_id,
                    provider = %row.provider_id,
                    "config store row references unknown provider"
                );
                continue;
            };
            match entry.adapter.initialize(&row.credential).await {
                Ok(()) => {
                    entry.mark_initialized();
                    accepted += 1;
                    tracing::info!(tenant = tenant_id, provider = %entry.id, "provider initialized");
                }
                Err(e) => {
                    tracing::warn!(
                        tenant = tenant_id,
                        provider = %entry.id,
                        error = %e,
                        "provider initialization failed"
                    );
                }
            }
        }
        Ok(accepted)
    }

    /// Terminal transition for every provider.
    pub fn disable_all(&self) {
        for entry in self.providers.values() {
            entry.disable();
        }
    }
}

/// Background task reconciling each provider's health flag.
pub struct HealthMonitor {
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the reconciler. Each tick probes every initialized
    /// provider concurrently, bounding each probe by `check_timeout`.
    pub fn start(
        providers: Vec<Arc<ProviderEntry>>,
        interval: Duration,
        check_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::sweep(&providers, check_timeout).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("health monitor stopped");
        });
        Self {
            shutdown_tx,
            handle,
        }
    }

    async fn sweep(providers: &[Arc<ProviderEntry>], check_timeout: Duration) {
        let probes = providers.iter().map(|entry| async move {
            match entry.status() {
                ProviderStatus::Uninitialized | ProviderStatus::Disabled => return,
                ProviderStatus::Healthy | ProviderStatus::Unhealthy => {}
            }
            let healthy =
                match tokio::time::timeout(check_timeout, entry.adapter.check_health()).await {
                    Ok(healthy) => healthy,
                    Err(_) => false,
                };
            if let Some((from, to)) = entry.apply_health_check(healthy, Utc::now()) {
                tracing::info!(
                    provider = %entry.id,
                    from = ?from,
                    to = ?to,
                    "provider health transition"
                );
            }
        });
        futures::future::join_all(probes).await;
    }

    /// Stop the monitor. Consumes the handle: a stopped monitor cannot
    /// be restarted or re-entered.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderCredential, StaticConfigStore};
    use crate::error::AdapterError;
    use crate::models::{
        Capabilities, DetectedLanguage, TranslationRequest, TranslationResponse,
    };
    use std::sync::atomic::AtomicBool;

    /// Adapter whose health verdict and init verdict are switchable.
    struct ScriptedAdapter {
        id: String,
        healthy: Arc<AtomicBool>,
        accept_init: bool,
    }

    impl ScriptedAdapter {
        fn entry(id: &str, healthy: Arc<AtomicBool>, accept_init: bool) -> ProviderEntry {
            ProviderEntry::new(
                id,
                Box::new(ScriptedAdapter {
                    id: id.to_string(),
                    healthy,
                    accept_init,
                }),
                1,
                1e-5,
                0.9,
                10,
            )
        }
    }

    #[async_trait::async_trait]
    impl TranslationAdapter for ScriptedAdapter {
        fn id(&self) -> &str {
            &self.id
        }

        async fn initialize(&self, credential: &str) -> Result<(), AdapterError> {
            if credential.is_empty() || !self.accept_init {
                return Err(AdapterError::Config {
                    message: "rejected".to_string(),
                });
            }
            Ok(())
        }

        async fn translate(
            &self,
            _request: &TranslationRequest,
        ) -> Result<TranslationResponse, AdapterError> {
            Err(AdapterError::UpstreamUnavailable {
                message: "not under test".to_string(),
            })
        }

        async fn detect_language(&self, _text: &str) -> DetectedLanguage {
            DetectedLanguage::unknown()
        }

        async fn check_health(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                supports_context: false,
                supports_batch: false,
                supports_glossary: false,
                max_text_length: 1000,
                supported_languages: crate::models::LanguageSupport::All,
                pricing: None,
            }
        }

        fn estimated_cost(&self, _char_count: usize) -> f64 {
            0.0
        }
    }

    fn store_for(rows: Vec<ProviderCredential>) -> StaticConfigStore {
        StaticConfigStore::new().with_tenant("acme", rows)
    }

    fn credential(provider: &str, active: bool) -> ProviderCredential {
        ProviderCredential {
            provider_id: provider.to_string(),
            credential: "cred".to_string(),
            active,
        }
    }

    #[test]
    fn builtin_registry_starts_uninitialized() {
        let registry = ProviderRegistry::new(&RouterConfig::default());
        let entries = registry.entries();
        assert_eq!(entries.len(), 4);
        assert!(entries
            .iter()
            .all(|e| e.status() == ProviderStatus::Uninitialized));
        assert_eq!(registry.initialized_count(), 0);
    }

    #[tokio::test]
    async fn initialize_skips_inactive_and_failing_rows() {
        let flag = Arc::new(AtomicBool::new(true));
        let registry = ProviderRegistry::with_entries(vec![
            ScriptedAdapter::entry("good", flag.clone(), true),
            ScriptedAdapter::entry("bad", flag.clone(), false),
            ScriptedAdapter::entry("off", flag.clone(), true),
        ]);
        let store = store_for(vec![
            credential("good", true),
            credential("bad", true),
            credential("off", false),
            credential("missing", true),
        ]);

        let accepted = registry.initialize(&store, "acme").await.unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(
            registry.get("good").unwrap().status(),
            ProviderStatus::Healthy
        );
        assert_eq!(
            registry.get("bad").unwrap().status(),
            ProviderStatus::Uninitialized
        );
        assert_eq!(
            registry.get("off").unwrap().status(),
            ProviderStatus::Uninitialized
        );
    }

    #[test]
    fn load_guard_restores_count_on_drop() {
        let flag = Arc::new(AtomicBool::new(true));
        let entry = Arc::new(ScriptedAdapter::entry("p", flag, true));
        assert_eq!(entry.current_load(), 0);
        {
            let _a = entry.begin_dispatch();
            let _b = entry.begin_dispatch();
            assert_eq!(entry.current_load(), 2);
        }
        assert_eq!(entry.current_load(), 0);
    }

    #[test]
    fn failure_streak_demotes_at_threshold() {
        let flag = Arc::new(AtomicBool::new(true));
        let entry = ScriptedAdapter::entry("p", flag, true);
        entry.mark_initialized();

        for _ in 0..4 {
            assert!(!entry.record_dispatch_failure(1, 5));
        }
        assert_eq!(entry.status(), ProviderStatus::Healthy);
        assert!(entry.record_dispatch_failure(1, 5));
        assert_eq!(entry.status(), ProviderStatus::Unhealthy);
    }

    #[test]
    fn success_resets_the_streak() {
        let flag = Arc::new(AtomicBool::new(true));
        let entry = ScriptedAdapter::entry("p", flag, true);
        entry.mark_initialized();

        entry.record_dispatch_failure(4, 5);
        entry.record_dispatch_success();
        assert!(!entry.record_dispatch_failure(4, 5));
        assert_eq!(entry.status(), ProviderStatus::Healthy);
    }

    #[test]
    fn single_passing_check_recovers_an_unhealthy_provider() {
        let flag = Arc::new(AtomicBool::new(true));
        let entry = ScriptedAdapter::entry("p", flag, true);
        entry.mark_initialized();
        entry.record_dispatch_failure(5, 5);
        assert_eq!(entry.status(), ProviderStatus::Unhealthy);

        let transition = entry.apply_health_check(true, Utc::now()).unwrap();
        assert_eq!(
            transition,
            (ProviderStatus::Unhealthy, ProviderStatus::Healthy)
        );
        assert_eq!(entry.consecutive_errors(), 0);
        assert!(entry.last_health_check().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_reconciles_health_and_stops() {
        let flag = Arc::new(AtomicBool::new(false));
        let entry = Arc::new(ScriptedAdapter::entry("p", flag.clone(), true));
        entry.mark_initialized();

        let monitor = HealthMonitor::start(
            vec![entry.clone()],
            Duration::from_secs(60),
            Duration::from_secs(10),
        );

        // First tick fires immediately and sees an unhealthy backend.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(entry.status(), ProviderStatus::Unhealthy);

        // Backend recovers; the next tick promotes it back.
        flag.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(entry.status(), ProviderStatus::Healthy);

        monitor.stop().await;

        // Stopped monitor no longer reacts.
        flag.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(entry.status(), ProviderStatus::Healthy);
    }

    #[test]
    fn disabled_is_terminal_for_candidacy() {
        let flag = Arc::new(AtomicBool::new(true));
        let entry = ScriptedAdapter::entry("p", flag, true);
        entry.mark_initialized();
        assert!(entry.is_candidate("en", "es"));
        entry.disable();
        assert!(!entry.is_candidate("en", "es"));
        // A later passing check must not resurrect a disabled provider.
        assert!(entry.apply_health_check(true, Utc::now()).is_none());
        assert_eq!(entry.status(), ProviderStatus::Disabled);
    }
}
