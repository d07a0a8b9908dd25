// Provider backends: OpenAI, Anthropic, Ollama (local), and Gemini (triage).

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{BackendConfig, ProviderMode, SiftConfig};
use crate::error::{ConfigError, ProviderError, SiftError};

use super::{GenerateRequest, Generation, LlmProvider};

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    crate::http::client(timeout).map_err(|e| ProviderError::Config(format!("HTTP client: {e}")))
}

/// Send a prepared request and decode a JSON body, classifying failures.
async fn send_json<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, ProviderError> {
    let resp = req
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(&e))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::Api { status, body });
    }

    // A body cut off mid-read is a transport fault; only a complete body can fail to parse.
    let body = resp.bytes().await.map_err(|e| ProviderError::Network {
        message: e.to_string(),
        transient: true,
    })?;
    serde_json::from_slice(&body).map_err(|e| ProviderError::Parse(e.to_string()))
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn chat_messages(request: &GenerateRequest) -> Vec<ChatMessage<'_>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });
    messages
}

// ── OpenAI Provider ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    total_tokens: u64,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = OpenAiRequest {
            model: &self.model,
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
            messages: chat_messages(request),
        };

        debug!(model = %self.model, "Calling OpenAI API");

        let result: OpenAiResponse = send_json(
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body),
        )
        .await?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Parse("OpenAI response had no choices".into()))?;

        Ok(Generation {
            text,
            tokens: result.usage.map(|u| u.total_tokens),
            model: result.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

// ── Anthropic Provider ──────────────────────────────────────────────

#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            model,
            base_url: "https://api.anthropic.com".to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
            system: request.system.as_deref(),
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        debug!(model = %self.model, "Calling Anthropic API");

        let result: AnthropicResponse = send_json(
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&body),
        )
        .await?;

        let text: String = result.content.iter().map(|c| c.text.as_str()).collect();

        Ok(Generation {
            text,
            tokens: result.usage.map(|u| u.input_tokens + u.output_tokens),
            model: self.model.clone(),
        })
    }
}

// ── Ollama Provider ─────────────────────────────────────────────────

/// Local model served by Ollama. No credentials required.
#[derive(Debug)]
pub struct OllamaProvider {
    client: Client,
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(model: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            model,
            base_url: "http://localhost:11434".to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaRequest {
            model: &self.model,
            messages: chat_messages(request),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_output_tokens,
            },
        };

        debug!(model = %self.model, "Calling Ollama");

        let result: OllamaResponse = send_json(self.client.post(&url).json(&body)).await?;

        let tokens = match (result.prompt_eval_count, result.eval_count) {
            (None, None) => None,
            (p, e) => Some(p.unwrap_or(0) + e.unwrap_or(0)),
        };

        Ok(Generation {
            text: result.message.map(|m| m.content).unwrap_or_default(),
            tokens,
            model: self.model.clone(),
        })
    }
}

// ── Gemini Provider ─────────────────────────────────────────────────

/// Google Gemini, used as the primary triage classifier.
#[derive(Debug)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            model,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    total_token_count: Option<u64>,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: &request.prompt,
                }],
            }],
            system_instruction: request.system.as_deref().map(|text| GeminiContent {
                parts: vec![GeminiPart { text }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        debug!(model = %self.model, "Calling Gemini API");

        let result: GeminiResponse = send_json(
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body),
        )
        .await?;

        let candidate = result
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("Gemini response had no candidates".into()))?;
        let text: String = candidate
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();

        Ok(Generation {
            text: text.trim().to_string(),
            tokens: result.usage_metadata.and_then(|u| u.total_token_count),
            model: self.model.clone(),
        })
    }
}

// ── Provider Factory ────────────────────────────────────────────────

/// Create a summarization provider for `mode` with an already-resolved key.
pub fn create_provider(
    mode: ProviderMode,
    backend: &BackendConfig,
    api_key: Option<String>,
    timeout: Duration,
) -> crate::error::Result<Box<dyn LlmProvider>> {
    let model = backend.model.clone();
    let base_url = backend.base_url.clone();
    let require_key = |key: Option<String>| {
        key.ok_or_else(|| {
            SiftError::Config(ConfigError::MissingCredential(
                backend
                    .api_key_env
                    .clone()
                    .unwrap_or_else(|| format!("{} API key", mode.as_str())),
            ))
        })
    };

    let provider: Box<dyn LlmProvider> = match mode {
        ProviderMode::OpenAi => {
            let mut p = OpenAiProvider::new(require_key(api_key)?, model, timeout)?;
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Box::new(p)
        }
        ProviderMode::Anthropic => {
            let mut p = AnthropicProvider::new(require_key(api_key)?, model, timeout)?;
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Box::new(p)
        }
        ProviderMode::Ollama => {
            let mut p = OllamaProvider::new(model, timeout)?;
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Box::new(p)
        }
    };
    Ok(provider)
}

/// Create the configured summarization provider, reading credentials from the environment.
pub fn provider_from_config(config: &SiftConfig) -> crate::error::Result<Box<dyn LlmProvider>> {
    let backend = config.provider.active();
    let key = backend.api_key()?;
    create_provider(
        config.provider.mode,
        backend,
        key,
        config.provider.request_timeout(),
    )
}

/// Create the cheap fallback classifier: the default provider family with
/// that family's triage fallback model.
pub fn fallback_triage_from_config(
    config: &SiftConfig,
) -> crate::error::Result<Box<dyn LlmProvider>> {
    let backend = fallback_backend(config);
    let key = backend.api_key()?;
    create_provider(
        config.provider.mode,
        &backend,
        key,
        config.provider.request_timeout(),
    )
}

fn fallback_backend(config: &SiftConfig) -> BackendConfig {
    let mut backend = config.provider.active().clone();
    if let Some(model) = config.triage.fallback_models.for_mode(config.provider.mode) {
        backend.model = model.to_string();
    }
    backend
}

/// Create the primary triage classifier (Gemini). Missing credentials are
/// returned as an error so the caller can record the classifier as unavailable.
pub fn primary_triage_from_config(
    config: &SiftConfig,
) -> crate::error::Result<Box<dyn LlmProvider>> {
    let backend = &config.triage.primary;
    let key = backend.api_key()?.ok_or_else(|| {
        ConfigError::MissingCredential("triage.primary.api_key_env".to_string())
    })?;
    let mut p = GeminiProvider::new(key, backend.model.clone(), config.provider.request_timeout())?;
    if let Some(url) = &backend.base_url {
        p = p.with_base_url(url.clone());
    }
    Ok(Box::new(p))
}

// ── Tests ───────────────────────────────────────────────────────────
