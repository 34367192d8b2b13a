//! LLM Router - selects the provider and bounds every call with a timeout

use std::sync::Arc;
use std::time::Duration;

use crate::providers::*;
use crate::scripted::ScriptedProvider;
use crate::types::*;

/// Default upper bound on a single oracle call
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(60);

/// The LLM Router owns one provider and enforces a finite timeout
pub struct LLMRouter {
    provider: Arc<dyn LLMProvider>,
    kind: ProviderKind,
    timeout: Duration,
}

impl LLMRouter {
    /// Create a router with a specific provider
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        let kind = provider.kind();
        Self {
            provider,
            kind,
            timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    /// Replace the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a router from environment variables
    ///
    /// Reads `PARLEY_LLM_PROVIDER` to select the provider:
    /// - `mistral` (default): Mistral API (`MISTRAL_API_KEY`)
    /// - `openai_compat`: any chat-completions server (`PARLEY_OPENAI_COMPAT_*`)
    /// - `deterministic`: No LLM, deterministic fallback
    pub fn from_env() -> Self {
        // Try to load .env file (ignore errors)
        let _ = dotenvy::dotenv();

        let provider_name =
            std::env::var("PARLEY_LLM_PROVIDER").unwrap_or_else(|_| "mistral".to_string());

        let kind = ProviderKind::from_str(&provider_name).unwrap_or_else(|| {
            tracing::warn!(provider = %provider_name, "Unknown LLM provider, using mistral");
            ProviderKind::Mistral
        });

        Self::from_kind(kind)
    }

    /// Create a router for a specific provider kind
    pub fn from_kind(kind: ProviderKind) -> Self {
        let provider: Arc<dyn LLMProvider> = match kind {
            ProviderKind::OpenAICompat => Arc::new(OpenAICompatProvider::from_env()),
            ProviderKind::Mistral => match MistralProvider::from_env() {
                Some(p) => Arc::new(p),
                None => {
                    tracing::warn!("Mistral API key not found, using deterministic fallback");
                    Arc::new(DeterministicProvider::new())
                }
            },
            ProviderKind::Scripted => {
                tracing::warn!("Scripted provider has no replies outside tests, using deterministic fallback");
                Arc::new(DeterministicProvider::new())
            }
            ProviderKind::Deterministic => Arc::new(DeterministicProvider::new()),
        };

        Self::new(provider)
    }

    /// Get the current provider
    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    /// Get the provider kind
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check if the provider is available
    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await
    }

    /// Complete a request, failing with [`LLMError::Timeout`] past the deadline
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    provider = %self.kind,
                    timeout_secs = self.timeout.as_secs(),
                    "Oracle call timed out"
                );
                Err(LLMError::Timeout {
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }

    /// Complete and return only the generated text
    pub async fn complete_text(&self, request: CompletionRequest) -> Result<String> {
        Ok(self.complete(request).await?.content)
    }
}

impl Default for LLMRouter {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Builder for LLM router with explicit configuration
pub struct LLMRouterBuilder {
    kind: Option<ProviderKind>,
    timeout: Duration,
    openai_compat_config: Option<OpenAICompatConfig>,
    mistral_config: Option<MistralConfig>,
    scripted: Option<Arc<ScriptedProvider>>,
}

impl LLMRouterBuilder {
    pub fn new() -> Self {
        Self {
            kind: None,
            timeout: DEFAULT_ORACLE_TIMEOUT,
            openai_compat_config: None,
            mistral_config: None,
            scripted: None,
        }
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_openai_compat(mut self, config: OpenAICompatConfig) -> Self {
        self.openai_compat_config = Some(config);
        self.kind = Some(ProviderKind::OpenAICompat);
        self
    }

    pub fn with_mistral(mut self, config: MistralConfig) -> Self {
        self.mistral_config = Some(config);
        self.kind = Some(ProviderKind::Mistral);
        self
    }

    pub fn with_scripted(mut self, provider: Arc<ScriptedProvider>) -> Self {
        self.scripted = Some(provider);
        self.kind = Some(ProviderKind::Scripted);
        self
    }

    pub fn build(self) -> LLMRouter {
        let kind = self.kind.unwrap_or(ProviderKind::Deterministic);

        let provider: Arc<dyn LLMProvider> = match kind {
            ProviderKind::OpenAICompat => {
                Arc::new(OpenAICompatProvider::new(self.openai_compat_config.unwrap_or_default()))
            }
            ProviderKind::Mistral => match self.mistral_config.or_else(MistralConfig::from_env) {
                Some(config) => Arc::new(MistralProvider::new(config)),
                None => {
                    tracing::warn!("Mistral API key not found, using deterministic fallback");
                    Arc::new(DeterministicProvider::new())
                }
            },
            ProviderKind::Scripted => match self.scripted {
                Some(provider) => provider as Arc<dyn LLMProvider>,
                None => Arc::new(DeterministicProvider::new()),
            },
            ProviderKind::Deterministic => Arc::new(DeterministicProvider::new()),
        };

        LLMRouter::new(provider).with_timeout(self.timeout)
    }
}

impl Default for LLMRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_router() {
        let router = LLMRouter::from_kind(ProviderKind::Deterministic);
        assert!(router.is_available().await);

        let request = CompletionRequest::new(vec![Message::user("Hello")]);
        let response = router.complete(request).await.unwrap();

        assert_eq!(response.content, DETERMINISTIC_REPLY);
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(ProviderKind::from_str("Mistral"), Some(ProviderKind::Mistral));
        assert_eq!(ProviderKind::from_str("openai-compat"), Some(ProviderKind::OpenAICompat));
        assert_eq!(ProviderKind::from_str("none"), Some(ProviderKind::Deterministic));
        assert_eq!(ProviderKind::from_str("unknown"), None);

        for kind in [ProviderKind::OpenAICompat, ProviderKind::Mistral, ProviderKind::Deterministic] {
            assert_eq!(ProviderKind::from_str(&kind.to_string()), Some(kind));
        }
    }

    #[test]
    fn test_router_builder() {
        let router = LLMRouterBuilder::new()
            .with_kind(ProviderKind::Deterministic)
            .with_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(router.kind(), ProviderKind::Deterministic);
        assert_eq!(router.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let slow = Arc::new(
            ScriptedProvider::new()
                .with_fallback("too late")
                .with_latency(Duration::from_secs(5)),
        );
        let router = LLMRouterBuilder::new()
            .with_scripted(slow)
            .with_timeout(Duration::from_millis(20))
            .build();

        let result = router
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await;
        assert!(matches!(result, Err(LLMError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_scripted_router_passes_through() {
        let scripted = Arc::new(ScriptedProvider::new().with_replies(["hello back"]));
        let router = LLMRouterBuilder::new().with_scripted(scripted.clone()).build();

        let text = router
            .complete_text(CompletionRequest::new(vec![Message::user("hello")]))
            .await
            .unwrap();
        assert_eq!(text, "hello back");
        assert_eq!(scripted.call_count(), 1);
    }
}
