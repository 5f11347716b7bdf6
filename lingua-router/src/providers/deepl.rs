//! DeepL adapter. Unlike the prompt-based adapters this talks to a
//! native machine-translation API: form-encoded requests, an explicit
//! language list, and real source-language detection in the response.
//!
//! Keys ending in `:fx` belong to the free tier and live on a separate
//! host, so the base URL is picked from the credential itself.

use crate::error::AdapterError;
use crate::models::{
    Capabilities, DetectedLanguage, LanguageSupport, Pricing, TranslationRequest,
    TranslationResponse,
};
use crate::providers::TranslationAdapter;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::http_client::{AuthStrategy, HttpProviderClient};

const COST_PER_CHAR: f64 = 2.5e-5;
const PRO_BASE: &str = "https://api.deepl.com";
const FREE_BASE: &str = "https://api-free.deepl.com";

const SUPPORTED_LANGUAGES: &[&str] = &[
    "bg", "cs", "da", "de", "el", "en", "es", "et", "fi", "fr", "hu", "id", "it", "ja", "ko",
    "lt", "lv", "nb", "nl", "pl", "pt", "ro", "ru", "sk", "sl", "sv", "tr", "uk", "zh",
];

pub struct DeepLAdapter {
    http: RwLock<Option<HttpProviderClient>>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(default)]
    detected_source_language: Option<String>,
    text: String,
}

impl DeepLAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: RwLock::new(None),
            timeout,
        }
    }

    fn client(&self) -> Result<HttpProviderClient, AdapterError> {
        self.http
            .read()
            .unwrap()
            .clone()
            .ok_or(AdapterError::NotInitialized)
    }

    async fn call_translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Translation, AdapterError> {
        let http = self.client()?;
        let mut form: Vec<(&str, String)> = vec![
            ("text", text.to_string()),
            ("target_lang", target_lang.to_uppercase()),
        ];
        if source_lang != crate::models::AUTO_LANG {
            form.push(("source_lang", source_lang.to_uppercase()));
        }
        let mut response: TranslateResponse = http.post_form("/v2/translate", &form).await?;
        if response.translations.is_empty() {
            return Err(AdapterError::UpstreamUnavailable {
                message: "empty translations array".to_string(),
            });
        }
        Ok(response.translations.remove(0))
    }
}

#[async_trait::async_trait]
impl TranslationAdapter for DeepLAdapter {
    fn id(&self) -> &str {
        "deepl"
    }

    async fn initialize(&self, credential: &str) -> Result<(), AdapterError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AdapterError::Config {
                message: "empty credential".to_string(),
            });
        }
        let base = if credential.ends_with(":fx") {
            FREE_BASE
        } else {
            PRO_BASE
        };
        let http = HttpProviderClient::new(
            self.timeout,
            None,
            base,
            &HashMap::new(),
            AuthStrategy::Header {
                name: "Authorization".to_string(),
                value: format!("DeepL-Auth-Key {credential}"),
            },
        )?;
        *self.http.write().unwrap() = Some(http);
        Ok(())
    }

    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, AdapterError> {
        let started = Instant::now();
        let translation = self
            .call_translate(&request.text, &request.source_lang, &request.target_lang)
            .await?;

        let detected = translation
            .detected_source_language
            .as_deref()
            .map(str::to_lowercase);
        let source_lang = if request.wants_auto_detect() {
            detected
                .clone()
                .unwrap_or_else(|| request.source_lang.clone())
        } else {
            request.source_lang.clone()
        };

        Ok(TranslationResponse {
            translated_text: translation.text,
            source_lang,
            target_lang: request.target_lang.clone(),
            provider: self.id().to_string(),
            cached: false,
            processing_time_ms: started.elapsed().as_millis() as u64,
            cost: Some(self.estimated_cost(request.char_count())),
            confidence: Some(0.9),
            detected_source_lang: request.wants_auto_detect().then_some(detected).flatten(),
        })
    }

    async fn detect_language(&self, text: &str) -> DetectedLanguage {
        // DeepL has no standalone detection endpoint; a translation into
        // English reports the detected source as a side effect.
        match self.call_translate(text, crate::models::AUTO_LANG, "en").await {
            Ok(translation) => match translation.detected_source_language {
                Some(code) => DetectedLanguage {
                    language: code.to_lowercase(),
                    confidence: 0.9,
                },
                None => DetectedLanguage::unknown(),
            },
            Err(_) => DetectedLanguage::unknown(),
        }
    }

    async fn check_health(&self) -> bool {
        let http = match self.client() {
            Ok(http) => http,
            Err(_) => return false,
        };
        http.get_json::<serde_json::Value>("/v2/usage").await.is_ok()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_context: false,
            supports_batch: true,
            supports_glossary: false,
            max_text_length: 30_000,
            supported_languages: LanguageSupport::from_codes(SUPPORTED_LANGUAGES.iter().copied()),
            pricing: Some(Pricing {
                cost_per_char: COST_PER_CHAR,
                free_chars_per_month: Some(500_000),
            }),
        }
    }

    fn estimated_cost(&self, char_count: usize) -> f64 {
        COST_PER_CHAR * char_count as f64
    }
}
