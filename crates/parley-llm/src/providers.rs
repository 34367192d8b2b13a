//! LLM Provider implementations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::*;

/// Trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Get the provider kind
    fn kind(&self) -> ProviderKind;

    /// Check if the provider is available
    async fn is_available(&self) -> bool;

    /// Complete a conversation
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ============================================================================
// Chat-completions wire format (OpenAI-compatible servers, Mistral)
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// POST a chat-completions request and map the reply
async fn chat_completions(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    default_model: &str,
    request: CompletionRequest,
) -> Result<CompletionResponse> {
    let mut messages: Vec<ChatMessage> = Vec::with_capacity(request.messages.len() + 1);

    if let Some(ref system) = request.system {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system.clone(),
        });
    }
    for msg in &request.messages {
        messages.push(ChatMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        });
    }

    let model = request.model.unwrap_or_else(|| default_model.to_string());
    let chat_request = ChatRequest {
        model: model.clone(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: false,
        response_format: request
            .json_mode
            .then(|| serde_json::json!({"type": "json_object"})),
    };

    let mut req = client.post(url).json(&chat_request);
    if let Some(key) = api_key {
        req = req.bearer_auth(key);
    }

    let response = req.send().await.map_err(|e| LLMError::NetworkError {
        message: e.to_string(),
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_seconds = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        return Err(LLMError::RateLimited { retry_after_seconds });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LLMError::RequestFailed {
            message: format!("HTTP {}: {}", status, body),
        });
    }

    let chat_response: ChatResponse = response.json().await.map_err(|e| LLMError::InvalidResponse {
        message: e.to_string(),
    })?;

    let content = chat_response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| LLMError::InvalidResponse {
            message: "response contained no choices".to_string(),
        })?;

    let usage = chat_response.usage.unwrap_or_default();

    Ok(CompletionResponse {
        content,
        usage: TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        },
        model: Some(model),
    })
}

// ============================================================================
// OpenAI-Compatible Provider
// ============================================================================

/// Configuration for OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for OpenAICompatConfig {
    fn default() -> Self {
        Self {
            base_url: env_or("PARLEY_OPENAI_COMPAT_BASE_URL", "http://localhost:8000/v1"),
            api_key: std::env::var("PARLEY_OPENAI_COMPAT_API_KEY").ok(),
            model: env_or("PARLEY_OPENAI_COMPAT_MODEL", "default"),
        }
    }
}

/// OpenAI-compatible API provider (OpenAI itself, vLLM, llama.cpp, Ollama's `/v1`)
pub struct OpenAICompatProvider {
    config: OpenAICompatConfig,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(config: OpenAICompatConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(OpenAICompatConfig::default())
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatProvider {
    fn name(&self) -> &'static str {
        "OpenAI-Compatible"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAICompat
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.config.base_url);
        let mut req = self.client.get(&url);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }
        req.send().await.is_ok()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        chat_completions(
            &self.client,
            &url,
            self.config.api_key.as_deref(),
            &self.config.model,
            request,
        )
        .await
    }
}

// ============================================================================
// Mistral Provider
// ============================================================================

/// Default Mistral model
pub const MISTRAL_DEFAULT_MODEL: &str = "mistral-large-latest";

/// Configuration for Mistral provider
#[derive(Debug, Clone)]
pub struct MistralConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl MistralConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: MISTRAL_DEFAULT_MODEL.to_string(),
            base_url: "https://api.mistral.ai/v1".to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let mut config = Self::new(std::env::var("MISTRAL_API_KEY").ok()?);
        config.model = env_or("PARLEY_MISTRAL_MODEL", MISTRAL_DEFAULT_MODEL);
        Some(config)
    }
}

/// Mistral chat-completions provider
pub struct MistralProvider {
    config: MistralConfig,
    client: reqwest::Client,
}

impl MistralProvider {
    pub fn new(config: MistralConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Option<Self> {
        Some(Self::new(MistralConfig::from_env()?))
    }
}

#[async_trait]
impl LLMProvider for MistralProvider {
    fn name(&self) -> &'static str {
        "Mistral"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Mistral
    }

    async fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        chat_completions(
            &self.client,
            &url,
            Some(&self.config.api_key),
            &self.config.model,
            request,
        )
        .await
    }
}

// ============================================================================
// Deterministic Provider (Fallback)
// ============================================================================

/// Reply returned by [`DeterministicProvider`] for conversational requests
pub const DETERMINISTIC_REPLY: &str =
    "No language model is configured. I will hold my current position until one is available.";

/// Deterministic fallback when no LLM is available.
///
/// JSON-mode requests get an empty object; everything else gets
/// [`DETERMINISTIC_REPLY`].
pub struct DeterministicProvider;

impl DeterministicProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeterministicProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for DeterministicProvider {
    fn name(&self) -> &'static str {
        "Deterministic"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Deterministic
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let content = if request.json_mode { "{}" } else { DETERMINISTIC_REPLY };
        Ok(CompletionResponse {
            content: content.to_string(),
            usage: TokenUsage::default(),
            model: Some("deterministic".to_string()),
        })
    }
}
