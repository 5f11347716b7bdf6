//! LibreTranslate adapter, for self-hosted instances. The credential
//! blob is the instance base URL (such deployments usually run without
//! an API key), which makes this the zero-cost local fallback in the
//! default provider set.

use crate::error::AdapterError;
use crate::models::{
    Capabilities, DetectedLanguage, LanguageSupport, TranslationRequest, TranslationResponse,
    AUTO_LANG,
};
use crate::providers::TranslationAdapter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::http_client::{AuthStrategy, HttpProviderClient};

const SUPPORTED_LANGUAGES: &[&str] = &[
    "ar", "az", "ca", "cs", "da", "de", "el", "en", "eo", "es", "fa", "fi", "fr", "ga", "he",
    "hi", "hu", "id", "it", "ja", "ko", "nl", "pl", "pt", "ru", "sk", "sv", "th", "tr", "uk",
    "zh",
];

pub struct LibreTranslateAdapter {
    http: RwLock<Option<HttpProviderClient>>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct TranslateRequest {
    q: String,
    source: String,
    target: String,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
    #[serde(rename = "detectedLanguage")]
    detected_language: Option<Detection>,
}

#[derive(Debug, Deserialize)]
struct Detection {
    /// Percentage in [0, 100].
    confidence: f64,
    language: String,
}

#[derive(Debug, Serialize)]
struct DetectRequest {
    q: String,
}

impl LibreTranslateAdapter {
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
}

#[async_trait::async_trait]
impl TranslationAdapter for LibreTranslateAdapter {
    fn id(&self) -> &str {
        "libretranslate"
    }

    async fn initialize(&self, credential: &str) -> Result<(), AdapterError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AdapterError::Config {
                message: "empty credential".to_string(),
            });
        }
        if !credential.starts_with("http://") && !credential.starts_with("https://") {
            return Err(AdapterError::Config {
                message: format!("expected an instance base URL, got: {credential}"),
            });
        }
        let http = HttpProviderClient::new(
            self.timeout,
            Some(credential.to_string()),
            "http://localhost:5000",
            &HashMap::new(),
            AuthStrategy::None,
        )?;
        *self.http.write().unwrap() = Some(http);
        Ok(())
    }

    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, AdapterError> {
        let started = Instant::now();
        let http = self.client()?;
        let body = TranslateRequest {
            q: request.text.clone(),
            source: request.source_lang.clone(),
            target: request.target_lang.clone(),
            format: "text",
        };
        let response: TranslateResponse = http.post_json("/translate", &body).await?;

        let detected = response
            .detected_language
            .as_ref()
            .map(|d| d.language.to_lowercase());
        let source_lang = if request.wants_auto_detect() {
            detected
                .clone()
                .unwrap_or_else(|| AUTO_LANG.to_string())
        } else {
            request.source_lang.clone()
        };

        Ok(TranslationResponse {
            translated_text: response.translated_text,
            source_lang,
            target_lang: request.target_lang.clone(),
            provider: self.id().to_string(),
            cached: false,
            processing_time_ms: started.elapsed().as_millis() as u64,
            cost: Some(0.0),
            confidence: response
                .detected_language
                .map(|d| (d.confidence / 100.0).clamp(0.0, 1.0)),
            detected_source_lang: request.wants_auto_detect().then_some(detected).flatten(),
        })
    }

    async fn detect_language(&self, text: &str) -> DetectedLanguage {
        let http = match self.client() {
            Ok(http) => http,
            Err(_) => return DetectedLanguage::unknown(),
        };
        let body = DetectRequest { q: text.to_string() };
        match http.post_json::<_, Vec<Detection>>("/detect", &body).await {
            Ok(mut detections) if !detections.is_empty() => {
                let best = detections.remove(0);
                DetectedLanguage {
                    language: best.language.to_lowercase(),
                    confidence: (best.confidence / 100.0).clamp(0.0, 1.0),
                }
            }
            _ => DetectedLanguage::unknown(),
        }
    }

    async fn check_health(&self) -> bool {
        let http = match self.client() {
            Ok(http) => http,
            Err(_) => return false,
        };
        http.get_json::<serde_json::Value>("/languages").await.is_ok()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_context: false,
            supports_batch: false,
            supports_glossary: false,
            max_text_length: 5_000,
            supported_languages: LanguageSupport::from_codes(SUPPORTED_LANGUAGES.iter().copied()),
            pricing: None,
        }
    }

    fn estimated_cost(&self, _char_count: usize) -> f64 {
        0.0
    }
}
