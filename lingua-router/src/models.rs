//! # Data Model
//!
//! Wire-visible types shared across the router: translation requests and
//! responses, language detection results, routing strategies, and the
//! capability record every adapter publishes.
//!
//! All types here are plain data. Behavior lives in the adapters
//! (`crate::providers`), the selection engine (`crate::routing`), and the
//! dispatch engine (`crate::router`).
//!
//! ## Language codes
//!
//! Languages are ISO-639-1 codes (`"en"`, `"de"`, `"zh"`). The source
//! language additionally accepts the sentinel [`AUTO_LANG`] (`"auto"`),
//! which asks the chosen backend to detect the source itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sentinel source language requesting upstream auto-detection.
pub const AUTO_LANG: &str = "auto";

/// Language returned when detection fails.
pub const UNKNOWN_LANG: &str = "unknown";

/// Requested translation quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Fast, cheaper rendition.
    Standard,
    /// Best available rendition, typically a larger model or engine.
    Quality,
}

/// Subject-matter domain of the text, used by prompt-based adapters to
/// steer terminology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationDomain {
    Legal,
    Medical,
    Creative,
    Technical,
    General,
}

impl TranslationDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationDomain::Legal => "legal",
            TranslationDomain::Medical => "medical",
            TranslationDomain::Creative => "creative",
            TranslationDomain::Technical => "technical",
            TranslationDomain::General => "general",
        }
    }
}

/// One prior turn of the surrounding conversation, oldest first.
///
/// Context-aware adapters feed these to the upstream model so pronouns
/// and elisions resolve correctly; context-unaware adapters ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTurn {
    /// Speaker label, e.g. a username. Opaque to the router.
    pub speaker: String,
    pub text: String,
}

/// A single translation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// Text to translate. Never empty; validated by the caller.
    pub text: String,
    /// ISO-639-1 source code, or [`AUTO_LANG`].
    pub source_lang: String,
    /// ISO-639-1 target code.
    pub target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<TranslationDomain>,
    /// Prior conversation turns, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ContextTurn>,
    /// Terms that must survive translation verbatim. Glossary-aware
    /// adapters bracket these before sending upstream.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glossary: Vec<String>,
    /// Provider the caller would like to handle this request. Participates
    /// in the cache key; promoted to the head of the candidate list when
    /// it survives filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            quality: None,
            domain: None,
            context: Vec::new(),
            glossary: Vec::new(),
            preferred_provider: None,
        }
    }

    /// True when the caller asked the backend to detect the source language.
    pub fn wants_auto_detect(&self) -> bool {
        self.source_lang == AUTO_LANG
    }

    /// Character count used for cost estimation.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A completed translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub translated_text: String,
    /// Source language as resolved by the backend (the request value
    /// unless the backend detected something more specific).
    pub source_lang: String,
    pub target_lang: String,
    /// Id of the provider that produced this response.
    pub provider: String,
    /// True when served from the response cache. Adapters always leave
    /// this false; the router flips it on a hit.
    pub cached: bool,
    /// Wall-clock time spent inside the adapter, entry to return.
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Backend confidence in [0, 1], when the backend reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Detected source language when the request asked for auto-detection
    /// and the backend resolved it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_source_lang: Option<String>,
}

/// Result of a language-detection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    pub language: String,
    /// Confidence in [0, 1]; 0.0 when detection failed.
    pub confidence: f64,
}

impl DetectedLanguage {
    /// The failure value: detection never raises, it degrades to this.
    pub fn unknown() -> Self {
        Self {
            language: UNKNOWN_LANG.to_string(),
            confidence: 0.0,
        }
    }
}

/// Preference function used to order candidate providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// Cheapest estimated cost for this text first.
    Cost,
    /// Highest quality score first.
    Quality,
    /// Least loaded first.
    Speed,
    /// Weighted blend of quality, load headroom, and cost.
    #[default]
    Balanced,
}

/// Caller-selected routing strategy: a mode plus optional soft caps that
/// narrow the candidate set before ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStrategy {
    #[serde(default)]
    pub mode: StrategyMode,
    /// Exclude providers whose estimated cost for this text exceeds this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    /// Exclude providers below this quality score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<f64>,
    /// Tighten the per-attempt dispatch timeout below the configured one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_time_ms: Option<u64>,
}

impl RoutingStrategy {
    pub fn cost() -> Self {
        Self {
            mode: StrategyMode::Cost,
            ..Self::default()
        }
    }

    pub fn quality() -> Self {
        Self {
            mode: StrategyMode::Quality,
            ..Self::default()
        }
    }

    pub fn speed() -> Self {
        Self {
            mode: StrategyMode::Speed,
            ..Self::default()
        }
    }

    pub fn balanced() -> Self {
        Self::default()
    }
}

/// Which languages a provider accepts.
///
/// Serialized as the string `"all"` or as a tagged set of ISO-639-1
/// codes. An adapter that declares an empty set is treated as
/// all-accepting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageSupport {
    All,
    Set(BTreeSet<String>),
}

impl LanguageSupport {
    /// Build from an explicit code list. An empty list means "all".
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = codes.into_iter().map(Into::into).collect();
        if set.is_empty() {
            LanguageSupport::All
        } else {
            LanguageSupport::Set(set)
        }
    }

    pub fn supports(&self, code: &str) -> bool {
        match self {
            LanguageSupport::All => true,
            LanguageSupport::Set(codes) => codes.contains(code),
        }
    }

    /// Pair check used by the candidate filter. An `"auto"` source is
    /// accepted whenever the provider can detect, i.e. always at this
    /// layer; detection capability is the adapter's concern.
    pub fn supports_pair(&self, source: &str, target: &str) -> bool {
        (source == AUTO_LANG || self.supports(source)) && self.supports(target)
    }
}

/// Per-character pricing a provider publishes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub cost_per_char: f64,
    /// Characters included before billing starts, for freemium backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_chars_per_month: Option<u64>,
}

/// Immutable capability record an adapter publishes at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_context: bool,
    pub supports_batch: bool,
    pub supports_glossary: bool,
    /// Longest text, in characters, a single call accepts.
    pub max_text_length: usize,
    pub supported_languages: LanguageSupport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_support_from_empty_list_is_all() {
        let support = LanguageSupport::from_codes(Vec::<String>::new());
        assert_eq!(support, LanguageSupport::All);
        assert!(support.supports("xx"));
    }

    #[test]
    fn language_support_pair_accepts_auto_source() {
        let support = LanguageSupport::from_codes(["en", "de"]);
        assert!(support.supports_pair("auto", "de"));
        assert!(support.supports_pair("en", "de"));
        assert!(!support.supports_pair("fr", "de"));
        assert!(!support.supports_pair("auto", "fr"));
    }

    #[test]
    fn strategy_default_is_balanced() {
        let strategy = RoutingStrategy::default();
        assert_eq!(strategy.mode, StrategyMode::Balanced);
        assert!(strategy.max_cost.is_none());
        assert!(strategy.min_quality.is_none());
    }

    #[test]
    fn request_auto_detect_flag() {
        let request = TranslationRequest::new("hello", "auto", "es");
        assert!(request.wants_auto_detect());
        let request = TranslationRequest::new("hello", "en", "es");
        assert!(!request.wants_auto_detect());
    }

    #[test]
    fn response_round_trips_through_json() {
        let response = TranslationResponse {
            translated_text: "hola".to_string(),
            source_lang: "en".to_string(),
            target_lang: "es".to_string(),
            provider: "deepl".to_string(),
            cached: false,
            processing_time_ms: 42,
            cost: Some(1.25e-4),
            confidence: Some(0.97),
            detected_source_lang: None,
        };
        let bytes = serde_json::to_vec(&response).unwrap();
        let parsed: TranslationResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, response);
    }
}
