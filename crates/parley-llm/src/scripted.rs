//! Scripted provider: canned oracle replies for tests and offline demos

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::providers::LLMProvider;
use crate::types::*;

struct Rule {
    needle: String,
    reply: String,
}

/// Replays canned replies.
///
/// Rules registered with [`ScriptedProvider::when_contains`] are checked
/// first (first match wins, rules are reusable); otherwise the next queued
/// reply is consumed. Every request is recorded for later inspection.
pub struct ScriptedProvider {
    rules: Vec<Rule>,
    queue: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    latency: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            fallback: None,
            latency: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies consumed in order
    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(replies.into_iter().map(Into::into));
        }
        self
    }

    /// Answer any request whose prompt contains `needle`
    pub fn when_contains(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: reply.into(),
        });
        self
    }

    /// Reply used once rules and queue are exhausted
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Sleep before answering (exercises router timeouts)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Append a reply to the queue
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(reply.into());
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_reply(&self, request: &CompletionRequest) -> Option<String> {
        let prompt = request.prompt_text();
        if let Some(rule) = self.rules.iter().find(|r| prompt.contains(&r.needle)) {
            return Some(rule.reply.clone());
        }

        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        queued.or_else(|| self.fallback.clone())
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Scripted
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let reply = self.next_reply(&request);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let content = reply.ok_or_else(|| LLMError::RequestFailed {
            message: "scripted replies exhausted".to_string(),
        })?;

        Ok(CompletionResponse {
            content,
            usage: TokenUsage::default(),
            model: Some("scripted".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let provider = ScriptedProvider::new()
            .with_replies(["first", "second"])
            .with_fallback("again");

        let ask = || CompletionRequest::new(vec![Message::user("hi")]);
        assert_eq!(provider.complete(ask()).await.unwrap().content, "first");
        assert_eq!(provider.complete(ask()).await.unwrap().content, "second");
        assert_eq!(provider.complete(ask()).await.unwrap().content, "again");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_rules_take_priority() {
        let provider = ScriptedProvider::new()
            .with_replies(["queued"])
            .when_contains("verification", "records[0].offer_amount > 1");

        let verify = CompletionRequest::new(vec![Message::user("run verification now")]);
        assert_eq!(
            provider.complete(verify).await.unwrap().content,
            "records[0].offer_amount > 1"
        );

        let chat = CompletionRequest::new(vec![Message::user("hello")]);
        assert_eq!(provider.complete(chat).await.unwrap().content, "queued");
    }

    #[tokio::test]
    async fn test_exhausted_is_error() {
        let provider = ScriptedProvider::new();
        let result = provider
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await;
        assert!(matches!(result, Err(LLMError::RequestFailed { .. })));
    }
}
