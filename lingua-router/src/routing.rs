//! # Scoring & Selection Engine
//!
//! Given a request and a strategy, produce the ordered candidate list
//! the dispatch engine works through. Selection is pure over a snapshot
//! of provider state, which makes it deterministic: the same provider
//! states and the same request always order the same way.
//!
//! ## Ordering per mode
//!
//! - `cost` — ascending estimated cost (`cost_per_char × len(text)`).
//! - `quality` — descending quality score.
//! - `speed` — ascending in-flight load.
//! - `balanced` — descending composite score
//!   `w_q·quality + w_s·(1 − load/max_load) + w_c·(1 − cost/ceiling)`,
//!   each term clamped to [0, 1] before weighting.
//!
//! Ties always break by ascending priority, then lexicographic id.

use crate::config::RouterConfig;
use crate::models::{RoutingStrategy, StrategyMode, TranslationRequest};
use crate::registry::ProviderEntry;
use std::cmp::Ordering;
use std::sync::Arc;

struct RankedCandidate {
    entry: Arc<ProviderEntry>,
    /// Sort key, lower is better. Load is snapshotted once so the sort
    /// sees a consistent picture.
    key: f64,
}

/// Filter and order the candidate set for one request.
///
/// Returns an empty vector when nothing qualifies; the caller turns
/// that into `NoProviderAvailable`.
pub fn rank_candidates(
    entries: &[Arc<ProviderEntry>],
    request: &TranslationRequest,
    strategy: &RoutingStrategy,
    config: &RouterConfig,
) -> Vec<Arc<ProviderEntry>> {
    let text_len = request.char_count();

    let mut ranked: Vec<RankedCandidate> = entries
        .iter()
        .filter(|entry| entry.is_candidate(&request.source_lang, &request.target_lang))
        .filter(|entry| passes_soft_caps(entry, strategy, text_len))
        .map(|entry| {
            let load = entry.current_load();
            let key = sort_key(entry, load, strategy.mode, text_len, config);
            RankedCandidate {
                entry: Arc::clone(entry),
                key,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.key
            .partial_cmp(&b.key)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.entry.priority.cmp(&b.entry.priority))
            .then_with(|| a.entry.id.cmp(&b.entry.id))
    });

    let mut ordered: Vec<Arc<ProviderEntry>> =
        ranked.into_iter().map(|candidate| candidate.entry).collect();

    // A caller-preferred provider jumps the queue when it qualified at all.
    if let Some(preferred) = &request.preferred_provider {
        if let Some(idx) = ordered.iter().position(|entry| &entry.id == preferred) {
            let entry = ordered.remove(idx);
            ordered.insert(0, entry);
        }
    }

    ordered
}

/// Re-order the untried tail for fallback: ascending priority, then id.
/// Fallback deliberately ignores the strategy so retries land on the
/// cheapest-to-tolerate backups.
pub fn order_for_fallback(remaining: &mut [Arc<ProviderEntry>]) {
    remaining.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
}

fn passes_soft_caps(entry: &ProviderEntry, strategy: &RoutingStrategy, text_len: usize) -> bool {
    if let Some(min_quality) = strategy.min_quality {
        if entry.quality_score < min_quality {
            return false;
        }
    }
    if let Some(max_cost) = strategy.max_cost {
        if entry.cost_per_char * text_len as f64 > max_cost {
            return false;
        }
    }
    true
}

fn sort_key(
    entry: &ProviderEntry,
    load: u32,
    mode: StrategyMode,
    text_len: usize,
    config: &RouterConfig,
) -> f64 {
    match mode {
        StrategyMode::Cost => entry.cost_per_char * text_len as f64,
        StrategyMode::Quality => -entry.quality_score,
        StrategyMode::Speed => load as f64,
        StrategyMode::Balanced => -balanced_score(entry, load, config),
    }
}

fn balanced_score(entry: &ProviderEntry, load: u32, config: &RouterConfig) -> f64 {
    let weights = &config.balanced_weights;

    let quality = entry.quality_score.clamp(0.0, 1.0);
    let headroom = if entry.max_load == 0 {
        0.0
    } else {
        (1.0 - load as f64 / entry.max_load as f64).clamp(0.0, 1.0)
    };
    let cost_advantage =
        (1.0 - entry.cost_per_char / config.cost_ceiling_per_char).clamp(0.0, 1.0);

    weights.quality * quality + weights.speed * headroom + weights.cost * cost_advantage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::models::{
        Capabilities, DetectedLanguage, LanguageSupport, TranslationResponse,
    };
    use crate::providers::TranslationAdapter;

    struct StubAdapter {
        id: String,
        languages: LanguageSupport,
    }

    #[async_trait::async_trait]
    impl TranslationAdapter for StubAdapter {
        fn id(&self) -> &str {
            &self.id
        }

        async fn initialize(&self, _credential: &str) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn translate(
            &self,
            _request: &TranslationRequest,
        ) -> Result<TranslationResponse, AdapterError> {
            unreachable!("selection never dispatches")
        }

        async fn detect_language(&self, _text: &str) -> DetectedLanguage {
            DetectedLanguage::unknown()
        }

        async fn check_health(&self) -> bool {
            true
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                supports_context: false,
                supports_batch: false,
                supports_glossary: false,
                max_text_length: 10_000,
                supported_languages: self.languages.clone(),
                pricing: None,
            }
        }

        fn estimated_cost(&self, _char_count: usize) -> f64 {
            0.0
        }
    }

    struct EntrySpec {
        id: &'static str,
        priority: u8,
        cost: f64,
        quality: f64,
        max_load: u32,
        load: u32,
        healthy: bool,
        languages: LanguageSupport,
    }

    impl Default for EntrySpec {
        fn default() -> Self {
            Self {
                id: "p",
                priority: 1,
                cost: 1e-5,
                quality: 0.9,
                max_load: 100,
                load: 0,
                healthy: true,
                languages: LanguageSupport::All,
            }
        }
    }

    fn entry(spec: EntrySpec) -> Arc<ProviderEntry> {
        let adapter = Box::new(StubAdapter {
            id: spec.id.to_string(),
            languages: spec.languages,
        });
        let entry = Arc::new(ProviderEntry::new(
            spec.id,
            adapter,
            spec.priority,
            spec.cost,
            spec.quality,
            spec.max_load,
        ));
        entry.mark_initialized();
        if !spec.healthy {
            entry.apply_health_check(false, chrono::Utc::now());
        }
        let guards: Vec<_> = (0..spec.load).map(|_| entry.begin_dispatch()).collect();
        std::mem::forget(guards);
        entry
    }

    fn request(text: &str) -> TranslationRequest {
        TranslationRequest::new(text, "en", "es")
    }

    #[test]
    fn cost_mode_picks_cheapest() {
        // S1: A at 2e-5 beats B at 3e-5 for the same text.
        let a = entry(EntrySpec {
            id: "a",
            cost: 2e-5,
            quality: 0.92,
            ..EntrySpec::default()
        });
        let b = entry(EntrySpec {
            id: "b",
            cost: 3e-5,
            quality: 0.95,
            ..EntrySpec::default()
        });
        let ordered = rank_candidates(
            &[b, a],
            &request("hello"),
            &RoutingStrategy::cost(),
            &RouterConfig::default(),
        );
        assert_eq!(ordered[0].id, "a");
        assert_eq!(ordered[1].id, "b");
    }

    #[test]
    fn quality_mode_picks_highest_score() {
        let a = entry(EntrySpec {
            id: "a",
            quality: 0.92,
            ..EntrySpec::default()
        });
        let b = entry(EntrySpec {
            id: "b",
            quality: 0.95,
            ..EntrySpec::default()
        });
        let ordered = rank_candidates(
            &[a, b],
            &request("hello"),
            &RoutingStrategy::quality(),
            &RouterConfig::default(),
        );
        assert_eq!(ordered[0].id, "b");
    }

    #[test]
    fn speed_mode_prefers_idle_providers() {
        let busy = entry(EntrySpec {
            id: "busy",
            load: 10,
            ..EntrySpec::default()
        });
        let idle = entry(EntrySpec {
            id: "idle",
            load: 1,
            ..EntrySpec::default()
        });
        let ordered = rank_candidates(
            &[busy, idle],
            &request("hello"),
            &RoutingStrategy::speed(),
            &RouterConfig::default(),
        );
        assert_eq!(ordered[0].id, "idle");
    }

    #[test]
    fn balanced_mode_weighs_quality_load_and_cost() {
        // An idle C wins its composite ≈ 0.4·0.98 + 0.3·1.0 + 0.3·0.5 =
        // 0.842 against loaded rivals whose headroom term collapses.
        let a = entry(EntrySpec {
            id: "a",
            cost: 2e-5,
            quality: 0.92,
            max_load: 100,
            load: 50,
            ..EntrySpec::default()
        });
        let b = entry(EntrySpec {
            id: "b",
            cost: 3e-5,
            quality: 0.95,
            max_load: 100,
            load: 50,
            ..EntrySpec::default()
        });
        let c = entry(EntrySpec {
            id: "c",
            cost: 2.5e-5,
            quality: 0.98,
            max_load: 200,
            ..EntrySpec::default()
        });
        let ordered = rank_candidates(
            &[a, b, c],
            &request("hello"),
            &RoutingStrategy::balanced(),
            &RouterConfig::default(),
        );
        assert_eq!(ordered[0].id, "c");
        // a's cost edge (0.18 vs 0.15 weighted) cannot offset the
        // headroom gap; it still beats b on cost and quality combined.
        assert_eq!(ordered[1].id, "a");
    }

    #[test]
    fn balanced_selection_is_deterministic() {
        let make_set = || {
            vec![
                entry(EntrySpec {
                    id: "a",
                    cost: 2e-5,
                    quality: 0.92,
                    ..EntrySpec::default()
                }),
                entry(EntrySpec {
                    id: "b",
                    cost: 2e-5,
                    quality: 0.92,
                    ..EntrySpec::default()
                }),
            ]
        };
        let config = RouterConfig::default();
        let first = rank_candidates(
            &make_set(),
            &request("hello"),
            &RoutingStrategy::balanced(),
            &config,
        );
        for _ in 0..10 {
            let again = rank_candidates(
                &make_set(),
                &request("hello"),
                &RoutingStrategy::balanced(),
                &config,
            );
            let ids: Vec<_> = again.iter().map(|e| e.id.clone()).collect();
            let first_ids: Vec<_> = first.iter().map(|e| e.id.clone()).collect();
            assert_eq!(ids, first_ids);
        }
        // Equal scores break by priority then id, so "a" leads.
        assert_eq!(first[0].id, "a");
    }

    #[test]
    fn unhealthy_saturated_and_unsupporting_providers_are_invisible() {
        let unhealthy = entry(EntrySpec {
            id: "unhealthy",
            healthy: false,
            ..EntrySpec::default()
        });
        let saturated = entry(EntrySpec {
            id: "saturated",
            max_load: 2,
            load: 2,
            ..EntrySpec::default()
        });
        let wrong_langs = entry(EntrySpec {
            id: "wrong",
            languages: LanguageSupport::from_codes(["fr", "de"]),
            ..EntrySpec::default()
        });
        let ok = entry(EntrySpec {
            id: "ok",
            ..EntrySpec::default()
        });

        let ordered = rank_candidates(
            &[unhealthy, saturated, wrong_langs, ok],
            &request("hello"),
            &RoutingStrategy::balanced(),
            &RouterConfig::default(),
        );
        let ids: Vec<_> = ordered.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
    }

    #[test]
    fn soft_caps_filter_before_ordering() {
        let cheap_poor = entry(EntrySpec {
            id: "cheap",
            cost: 1e-6,
            quality: 0.6,
            ..EntrySpec::default()
        });
        let pricey_good = entry(EntrySpec {
            id: "good",
            cost: 4e-5,
            quality: 0.97,
            ..EntrySpec::default()
        });

        let strategy = RoutingStrategy {
            min_quality: Some(0.9),
            ..RoutingStrategy::cost()
        };
        let ordered = rank_candidates(
            &[cheap_poor.clone(), pricey_good.clone()],
            &request("hello"),
            &strategy,
            &RouterConfig::default(),
        );
        let ids: Vec<_> = ordered.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);

        let strategy = RoutingStrategy {
            max_cost: Some(1e-4),
            ..RoutingStrategy::quality()
        };
        // 5 chars × 4e-5 = 2e-4 busts the cap; 5 × 1e-6 does not.
        let ordered = rank_candidates(
            &[cheap_poor, pricey_good],
            &request("hello"),
            &strategy,
            &RouterConfig::default(),
        );
        let ids: Vec<_> = ordered.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["cheap"]);
    }

    #[test]
    fn preferred_provider_jumps_the_queue() {
        let a = entry(EntrySpec {
            id: "a",
            cost: 1e-5,
            ..EntrySpec::default()
        });
        let b = entry(EntrySpec {
            id: "b",
            cost: 3e-5,
            ..EntrySpec::default()
        });
        let mut req = request("hello");
        req.preferred_provider = Some("b".to_string());
        let ordered = rank_candidates(
            &[a, b],
            &req,
            &RoutingStrategy::cost(),
            &RouterConfig::default(),
        );
        assert_eq!(ordered[0].id, "b");

        // A preferred provider that did not qualify is ignored.
        let mut req = request("hello");
        req.preferred_provider = Some("nope".to_string());
        let only = entry(EntrySpec::default());
        let ordered = rank_candidates(
            &[only],
            &req,
            &RoutingStrategy::cost(),
            &RouterConfig::default(),
        );
        assert_eq!(ordered[0].id, "p");
    }

    #[test]
    fn fallback_order_is_priority_then_id() {
        let mut remaining = vec![
            entry(EntrySpec {
                id: "z",
                priority: 1,
                ..EntrySpec::default()
            }),
            entry(EntrySpec {
                id: "a",
                priority: 2,
                ..EntrySpec::default()
            }),
            entry(EntrySpec {
                id: "m",
                priority: 1,
                ..EntrySpec::default()
            }),
        ];
        order_for_fallback(&mut remaining);
        let ids: Vec<_> = remaining.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z", "a"]);
    }
}
