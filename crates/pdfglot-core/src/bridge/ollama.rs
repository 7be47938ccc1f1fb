use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::limiter::RateLimiter;
use super::traits::{Translator, TranslatorInfo};
use crate::config::{BridgeConfig, Lang};
use crate::error::{Error, Result};

/// Timeout for cheap probe requests (version, model list)
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A single message in a chat exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user" or "assistant"
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling options forwarded to the model
#[derive(Debug, Clone, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
}

/// Request body for `POST /api/chat`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Always false; responses are consumed as a single JSON document
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            options: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options = Some(ChatOptions { temperature });
        self
    }
}

/// Response body for `POST /api/chat` (non-streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
}

/// Response body for `GET /api/tags`
#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

/// A model installed on the inference server
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    /// Full model identifier, e.g. "qwen2.5:14b"
    pub name: String,
    /// Size on disk in bytes
    pub size: Option<u64>,
    pub modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

/// Result of a connectivity probe
#[derive(Debug, Clone)]
pub struct ServerStatus {
    /// Server version, when the server reports one
    pub version: Option<String>,
    /// Number of installed models
    pub model_count: usize,
}

/// Client for an Ollama-compatible inference server.
///
/// All translation traffic funnels through [`chat`](Self::chat), which applies
/// the rate limiter and retry policy. Probe endpoints (`/api/tags`,
/// `/api/version`) bypass the limiter and use a short timeout.
pub struct OllamaClient {
    client: Client,
    /// Server base URL without trailing slash
    base_url: String,
    api_key: Option<String>,
    model: String,
    retry_count: u32,
    retry_delay_ms: u64,
    limiter: RateLimiter,
}

impl OllamaClient {
    /// Create a client from bridge configuration.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be created, which should only happen
    /// in extreme circumstances (e.g., TLS backend unavailable on the system).
    #[allow(clippy::expect_used)]
    pub fn new(config: &BridgeConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retry_count: config.retry_count,
            retry_delay_ms: config.retry_delay_ms,
            limiter: RateLimiter::per_second(config.qps),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {key}")),
            None => req,
        }
    }

    /// Send a chat request, applying rate limiting and the retry policy.
    ///
    /// A missing model (HTTP 404) fails immediately; retrying cannot help.
    /// Rate-limit responses (HTTP 429) honor the `Retry-After` header before
    /// the next attempt.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage> {
        let url = self.endpoint("/api/chat");
        let mut last_error = None;

        for attempt in 0..self.retry_count {
            self.limiter.acquire().await;
            debug!(
                "Chat request attempt {}/{} to {}",
                attempt + 1,
                self.retry_count,
                url
            );

            let req = self.authorized(self.client.post(&url).json(request));

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.json::<ChatResponse>().await {
                            Ok(chat) => {
                                if chat.message.content.trim().is_empty() {
                                    last_error = Some(Error::InvalidResponse(
                                        "empty message content".to_string(),
                                    ));
                                } else {
                                    return Ok(chat.message);
                                }
                            }
                            Err(e) => {
                                warn!("Failed to parse chat response: {}", e);
                                last_error = Some(Error::InvalidResponse(e.to_string()));
                            }
                        }
                    } else if status.as_u16() == 404 {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::Model {
                            model: request.model.clone(),
                            reason: if body.is_empty() {
                                "not found on server".to_string()
                            } else {
                                body
                            },
                        });
                    } else if status.as_u16() == 429 {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse().ok());

                        warn!("Rate limited by server, retry after {:?}s", retry_after);
                        last_error = Some(Error::RateLimited { retry_after });

                        tokio::time::sleep(rate_limit_backoff(retry_after)).await;
                        continue;
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        warn!("Server error: {} - {}", status, body);
                        last_error =
                            Some(Error::InvalidResponse(format!("HTTP {status}: {body}")));
                    }
                }
                Err(e) => {
                    warn!("Chat request failed: {}", e);
                    last_error = Some(Error::Connectivity(e.to_string()));
                }
            }

            if attempt + 1 < self.retry_count {
                tokio::time::sleep(Duration::from_millis(self.retry_delay_ms)).await;
            }
        }

        error!("Chat request failed after {} attempts", self.retry_count);
        Err(last_error.unwrap_or(Error::MaxRetriesExceeded))
    }

    /// List models installed on the server, sorted by name.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags");
        let req = self.authorized(self.client.get(&url).timeout(PROBE_TIMEOUT));

        let response = req
            .send()
            .await
            .map_err(|e| Error::Connectivity(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::InvalidResponse(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let mut models = tags.models;
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    /// Whether the configured model (or the given override) is installed.
    pub async fn has_model(&self, name: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| model_matches(&m.name, name)))
    }

    /// Probe the server: version endpoint plus installed model count.
    pub async fn check_connection(&self) -> Result<ServerStatus> {
        let url = self.endpoint("/api/version");
        let req = self.authorized(self.client.get(&url).timeout(PROBE_TIMEOUT));

        let response = req
            .send()
            .await
            .map_err(|e| Error::Connectivity(e.to_string()))?;

        // Some proxies block /api/version while /api/tags works; treat a
        // non-success status as an unknown version rather than a failure.
        let version = if response.status().is_success() {
            response
                .json::<VersionResponse>()
                .await
                .ok()
                .map(|v| v.version)
        } else {
            None
        };

        let model_count = self.list_models().await?.len();
        Ok(ServerStatus {
            version,
            model_count,
        })
    }
}

/// Longest wait honored for a 429's Retry-After header
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Backoff before retrying a rate-limited request. The header value is
/// untrusted input; cap it instead of sleeping arbitrarily long.
fn rate_limit_backoff(retry_after: Option<u64>) -> Duration {
    Duration::from_secs(retry_after.unwrap_or(5).min(MAX_RETRY_AFTER_SECS))
}

/// Match an installed model name against a requested one.
///
/// "qwen2.5" matches both "qwen2.5" and "qwen2.5:14b"; a request with an
/// explicit tag only matches exactly.
fn model_matches(installed: &str, wanted: &str) -> bool {
    if installed == wanted {
        return true;
    }
    !wanted.contains(':') && installed.split(':').next() == Some(wanted)
}

/// Translator backed by an Ollama-compatible server.
pub struct OllamaTranslator {
    client: Arc<OllamaClient>,
}

impl OllamaTranslator {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }

    /// Create translation prompt
    fn create_prompt(text: &str, source: &Lang, target: &Lang) -> String {
        let source_hint = if source.as_str() == "auto" {
            String::new()
        } else {
            format!(" from {}", language_name(source))
        };
        format!(
            "Translate the following text{} into {}. Output only the translation, no explanations.\n\nText: \"{}\"",
            source_hint,
            language_name(target),
            text
        )
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    fn info(&self) -> TranslatorInfo {
        TranslatorInfo {
            name: "Ollama",
            endpoint: self.client.base_url().to_string(),
            model: self.client.model().to_string(),
        }
    }

    async fn translate(&self, text: &str, source: &Lang, target: &Lang) -> Result<String> {
        // Skip empty text
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        // Skip if source and target are the same
        if source.as_str() == target.as_str() && source.as_str() != "auto" {
            return Ok(text.to_string());
        }

        let prompt = Self::create_prompt(text, source, target);
        let request = ChatRequest::new(self.client.model(), vec![ChatMessage::user(prompt)])
            .with_temperature(0.3); // Lower temperature for more consistent translations

        let message = self
            .client
            .chat(&request)
            .await
            .map_err(Error::unavailable)?;

        let translated = message.content.trim();
        // Remove quotes if the model wrapped the response
        Ok(translated
            .trim_start_matches('"')
            .trim_end_matches('"')
            .to_string())
    }
}

/// Convert language code to human-readable name for prompts
fn language_name(lang: &Lang) -> &'static str {
    match lang.as_str() {
        "en" => "English",
        "zh" | "zh-CN" => "Simplified Chinese",
        "zh-TW" => "Traditional Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "th" => "Thai",
        "vi" => "Vietnamese",
        // For unknown languages, the LLM should still understand most ISO codes
        _ => "the specified language",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_name() {
        assert_eq!(language_name(&Lang::new("en")), "English");
        assert_eq!(language_name(&Lang::new("zh")), "Simplified Chinese");
        assert_eq!(language_name(&Lang::new("zh-TW")), "Traditional Chinese");
        assert_eq!(language_name(&Lang::new("unknown")), "the specified language");
    }

    #[test]
    fn test_create_prompt() {
        let prompt =
            OllamaTranslator::create_prompt("Hello", &Lang::new("en"), &Lang::new("zh"));
        assert!(prompt.contains("from English"));
        assert!(prompt.contains("into Simplified Chinese"));
        assert!(prompt.ends_with("Text: \"Hello\""));

        let auto = OllamaTranslator::create_prompt("Hello", &Lang::new("auto"), &Lang::new("fr"));
        assert!(!auto.contains("from"));
        assert!(auto.contains("into French"));
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest::new("qwen2.5:14b", vec![ChatMessage::user("hi")])
            .with_temperature(0.3);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "qwen2.5:14b");
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hi");
        assert!((value["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_rate_limit_backoff_is_clamped() {
        assert_eq!(rate_limit_backoff(None), Duration::from_secs(5));
        assert_eq!(rate_limit_backoff(Some(2)), Duration::from_secs(2));
        assert_eq!(rate_limit_backoff(Some(u64::MAX)), Duration::from_secs(60));
    }

    #[test]
    fn test_model_matches() {
        assert!(model_matches("qwen2.5:14b", "qwen2.5:14b"));
        assert!(model_matches("qwen2.5:14b", "qwen2.5"));
        assert!(model_matches("qwen2.5", "qwen2.5"));
        assert!(!model_matches("qwen2.5:14b", "qwen2.5:7b"));
        assert!(!model_matches("llama3:8b", "qwen2.5"));
    }
}
