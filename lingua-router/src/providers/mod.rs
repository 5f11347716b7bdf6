//! # Provider Adapters
//!
//! Uniform wrappers around the upstream machine-translation backends.
//! Every backend implements [`TranslationAdapter`]; the registry owns one
//! boxed adapter per provider and the dispatch engine only ever talks to
//! the trait.
//!
//! ## Contract
//!
//! - `initialize` accepts an opaque credential blob and must reject an
//!   empty one with a configuration error. Adapters are constructed
//!   uninitialized and refuse to translate until credentials land.
//! - `translate` stamps the adapter's own id on the response, measures
//!   `processing_time_ms` from entry to return, and leaves `cached`
//!   false (the router flips it on a hit).
//! - `detect_language` degrades to `{unknown, 0.0}` on any failure
//!   instead of raising.
//! - `check_health` never raises; internal failures read as unhealthy.
//!
//! ## Glossary handling
//!
//! Glossary-aware adapters protect caller-supplied terms by wrapping
//! them in `[[double brackets]]` before sending upstream and stripping
//! the brackets from the reply. Glossary-unaware adapters ignore the
//! field entirely.

use crate::error::AdapterError;
use crate::models::{Capabilities, DetectedLanguage, TranslationRequest, TranslationResponse};
use std::time::Duration;

pub mod claude;
pub mod deepl;
pub mod http_client;
pub mod libretranslate;
pub mod openai;

/// Uniform surface of one upstream translation backend.
#[async_trait::async_trait]
pub trait TranslationAdapter: Send + Sync {
    /// Stable short id, e.g. `"deepl"`.
    fn id(&self) -> &str;

    /// Accept credentials. Called once per tenant init; may be called
    /// again to rotate credentials.
    async fn initialize(&self, credential: &str) -> Result<(), AdapterError>;

    /// Translate one request.
    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, AdapterError>;

    /// Best-effort language detection. Never raises.
    async fn detect_language(&self, text: &str) -> DetectedLanguage;

    /// Liveness probe. Never raises.
    async fn check_health(&self) -> bool;

    /// Immutable capability record.
    fn capabilities(&self) -> Capabilities;

    /// Estimated cost of translating `char_count` characters.
    fn estimated_cost(&self, char_count: usize) -> f64;

    /// Whether this backend can translate `source` into `target`.
    fn supports_language_pair(&self, source: &str, target: &str) -> bool {
        self.capabilities()
            .supported_languages
            .supports_pair(source, target)
    }
}

/// Instantiate a known adapter by id. `timeout` bounds each upstream
/// HTTP call from inside the adapter, independent of the router's own
/// dispatch timeout.
pub fn create_adapter(
    id: &str,
    timeout: Duration,
) -> Result<Box<dyn TranslationAdapter>, AdapterError> {
    match id {
        "claude" => Ok(Box::new(claude::ClaudeAdapter::new(timeout))),
        "openai" => Ok(Box::new(openai::OpenAiAdapter::new(timeout))),
        "deepl" => Ok(Box::new(deepl::DeepLAdapter::new(timeout))),
        "libretranslate" => Ok(Box::new(libretranslate::LibreTranslateAdapter::new(timeout))),
        _ => Err(AdapterError::Config {
            message: format!("unknown provider: {id}"),
        }),
    }
}

/// Wrap every glossary term occurring in `text` with `[[...]]`.
pub(crate) fn bracket_glossary_terms(text: &str, glossary: &[String]) -> String {
    let mut out = text.to_string();
    for term in glossary {
        if term.is_empty() {
            continue;
        }
        out = out.replace(term.as_str(), &format!("[[{term}]]"));
    }
    out
}

/// Remove the `[[...]]` protection an adapter added before upload.
pub(crate) fn strip_glossary_brackets(text: &str) -> String {
    text.replace("[[", "").replace("]]", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brackets_wrap_each_occurrence() {
        let glossary = vec!["Rocket.Chat".to_string()];
        let bracketed = bracket_glossary_terms("Rocket.Chat rocks, use Rocket.Chat", &glossary);
        assert_eq!(bracketed, "[[Rocket.Chat]] rocks, use [[Rocket.Chat]]");
    }

    #[test]
    fn strip_restores_plain_text() {
        let stripped = strip_glossary_brackets("[[Rocket.Chat]] mola, usa [[Rocket.Chat]]");
        assert_eq!(stripped, "Rocket.Chat mola, usa Rocket.Chat");
    }

    #[test]
    fn empty_glossary_leaves_text_untouched() {
        assert_eq!(bracket_glossary_terms("hello", &[]), "hello");
        assert_eq!(
            bracket_glossary_terms("hello", &[String::new()]),
            "hello"
        );
    }

    #[test]
    fn factory_knows_the_builtin_providers() {
        let timeout = Duration::from_secs(5);
        for id in ["claude", "openai", "deepl", "libretranslate"] {
            let adapter = create_adapter(id, timeout).unwrap();
            assert_eq!(adapter.id(), id);
        }
        assert!(create_adapter("bing", timeout).is_err());
    }
}
