//! Anthropic Claude adapter. Translation is prompt-based: the request is
//! rendered into a system prompt plus a single user message, and the
//! model is instructed to reply with the translation alone.

use crate::error::AdapterError;
use crate::models::{
    Capabilities, DetectedLanguage, LanguageSupport, Pricing, QualityTier, TranslationRequest,
    TranslationResponse,
};
use crate::providers::{bracket_glossary_terms, strip_glossary_brackets, TranslationAdapter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::http_client::{AuthStrategy, HttpProviderClient};

const COST_PER_CHAR: f64 = 2.4e-5;
const STANDARD_MODEL: &str = "claude-3-5-haiku-20241022";
const QUALITY_MODEL: &str = "claude-3-5-sonnet-20241022";

pub struct ClaudeAdapter {
    http: RwLock<Option<HttpProviderClient>>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl ClaudeAdapter {
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

    fn model_for(&self, quality: Option<QualityTier>) -> &'static str {
        match quality {
            Some(QualityTier::Quality) => QUALITY_MODEL,
            _ => STANDARD_MODEL,
        }
    }

    fn build_system_prompt(request: &TranslationRequest) -> String {
        let source = if request.wants_auto_detect() {
            "the language you detect".to_string()
        } else {
            format!("the language with ISO-639-1 code '{}'", request.source_lang)
        };
        let mut prompt = format!(
            "You are a professional translator. Translate the user's message from {source} \
             into the language with ISO-639-1 code '{}'.",
            request.target_lang
        );
        if let Some(domain) = request.domain {
            prompt.push_str(&format!(
                " The text is from the {} domain; use its terminology.",
                domain.as_str()
            ));
        }
        if !request.glossary.is_empty() {
            prompt.push_str(
                " Text wrapped in [[double brackets]] is protected terminology: \
                 keep it verbatim, brackets included.",
            );
        }
        if !request.context.is_empty() {
            prompt.push_str("\n\nConversation so far, for context only:\n");
            for turn in &request.context {
                prompt.push_str(&format!("{}: {}\n", turn.speaker, turn.text));
            }
        }
        prompt.push_str("\n\nReply with the translation only, no commentary.");
        prompt
    }

    async fn complete(&self, system: String, user: String, model: &str) -> Result<String, AdapterError> {
        let http = self.client()?;
        let body = MessagesRequest {
            model: model.to_string(),
            max_tokens: 2048,
            system,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: user,
            }],
            temperature: 0.0,
        };
        let response: MessagesResponse = http.post_json("/v1/messages", &body).await?;
        Ok(response
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[async_trait::async_trait]
impl TranslationAdapter for ClaudeAdapter {
    fn id(&self) -> &str {
        "claude"
    }

    async fn initialize(&self, credential: &str) -> Result<(), AdapterError> {
        if credential.trim().is_empty() {
            return Err(AdapterError::Config {
                message: "empty credential".to_string(),
            });
        }
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".to_string(), "2023-06-01".to_string());
        let http = HttpProviderClient::new(
            self.timeout,
            None,
            "https://api.anthropic.com",
            &headers,
            AuthStrategy::Header {
                name: "x-api-key".to_string(),
                value: credential.to_string(),
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
        let system = Self::build_system_prompt(request);
        let user = bracket_glossary_terms(&request.text, &request.glossary);
        let model = self.model_for(request.quality);

        let raw = self.complete(system, user, model).await?;
        let translated_text = strip_glossary_brackets(raw.trim());

        Ok(TranslationResponse {
            translated_text,
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
            provider: self.id().to_string(),
            cached: false,
            processing_time_ms: started.elapsed().as_millis() as u64,
            cost: Some(self.estimated_cost(request.char_count())),
            confidence: None,
            detected_source_lang: None,
        })
    }

    async fn detect_language(&self, text: &str) -> DetectedLanguage {
        let system = "Identify the language of the user's message. \
                      Reply with its ISO-639-1 code only."
            .to_string();
        match self.complete(system, text.to_string(), STANDARD_MODEL).await {
            Ok(raw) => {
                let code = raw.trim().to_lowercase();
                if code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase()) {
                    DetectedLanguage {
                        language: code,
                        confidence: 0.85,
                    }
                } else {
                    DetectedLanguage::unknown()
                }
            }
            Err(_) => DetectedLanguage::unknown(),
        }
    }

    async fn check_health(&self) -> bool {
        let system = "Reply with the single word ok.".to_string();
        self.complete(system, "ok".to_string(), STANDARD_MODEL)
            .await
            .is_ok()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_context: true,
            supports_batch: false,
            supports_glossary: true,
            max_text_length: 10_000,
            supported_languages: LanguageSupport::All,
            pricing: Some(Pricing {
                cost_per_char: COST_PER_CHAR,
                free_chars_per_month: None,
            }),
        }
    }

    fn estimated_cost(&self, char_count: usize) -> f64 {
        COST_PER_CHAR * char_count as f64
    }
}
