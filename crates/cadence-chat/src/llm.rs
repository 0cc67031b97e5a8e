//! Language-model client.
//!
//! [`LanguageModel`] is the raw transport seam and may fail.
//! [`ModelClient`] wraps it with the never-fail policy: any failure becomes
//! a fixed apology reply, tagged as [`CompletionSource::Fallback`] and
//! published as [`DomainEvent::ModelFallback`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cadence_core::config::LlmConfig;
use cadence_core::events::{DomainEvent, EventBus};
use cadence_core::types::{ChatTurn, Timestamp};

use crate::error::ChatError;

/// Reply used when the model call fails.
pub const FALLBACK_REPLY: &str = "I'm sorry, I'm having trouble right now.";

/// Reply used when the model answers with no content.
pub const EMPTY_COMPLETION_REPLY: &str = "I'm sorry, I couldn't process that.";

/// A chat-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the system instruction followed by the conversation, return the reply text.
    async fn chat(&self, system: &str, turns: &[ChatTurn]) -> Result<String, ChatError>;
}

// ── Wire format ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

// ── OpenAI-compatible transport ───────────────────────────────

/// Chat Completions client (`POST {base_url}/v1/chat/completions`).
///
/// Single attempt, no streaming, no retry.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| {
            ChatError::UpstreamRequestFailure(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: config.api_key.clone(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_request<'a>(&'a self, system: &'a str, turns: &'a [ChatTurn]) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: system,
        });
        messages.extend(turns.iter().map(|t| WireMessage {
            role: t.role.as_str(),
            content: &t.content,
        }));
        CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        }
    }
}

/// Extract an error message from an OpenAI-style error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn chat(&self, system: &str, turns: &[ChatTurn]) -> Result<String, ChatError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ChatError::MissingCredential("OPENAI_API_KEY"))?;

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.build_request(system, turns))
            .send()
            .await
            .map_err(|e| ChatError::UpstreamRequestFailure(format!("model request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body);
            return Err(match status.as_u16() {
                401 | 403 => ChatError::UpstreamAuthFailure(format!(
                    "model HTTP {}: {message}",
                    status.as_u16()
                )),
                code => ChatError::UpstreamRequestFailure(format!("model HTTP {code}: {message}")),
            });
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            ChatError::UpstreamRequestFailure(format!("invalid model response: {e}"))
        })?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}

// ── Never-fail wrapper ────────────────────────────────────────

/// Where a completion's text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionSource {
    Model,
    Fallback { reason: String },
}

/// Reply text plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub source: CompletionSource,
}

impl Completion {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, CompletionSource::Fallback { .. })
    }
}

/// Applies the fallback policy on top of a [`LanguageModel`].
#[derive(Clone)]
pub struct ModelClient {
    model: Arc<dyn LanguageModel>,
    events: EventBus,
}

impl ModelClient {
    pub fn new(model: Arc<dyn LanguageModel>, events: EventBus) -> Self {
        Self { model, events }
    }

    /// Always returns text; failures come back as the fallback reply.
    pub async fn complete(&self, system: &str, turns: &[ChatTurn]) -> Completion {
        match self.model.chat(system, turns).await {
            Ok(text) if !text.trim().is_empty() => Completion {
                content: text,
                source: CompletionSource::Model,
            },
            Ok(_) => {
                tracing::warn!("Language model returned an empty completion");
                self.fallback(EMPTY_COMPLETION_REPLY, "empty completion".to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Language model call failed, using fallback reply");
                self.fallback(FALLBACK_REPLY, e.to_string())
            }
        }
    }

    fn fallback(&self, text: &str, reason: String) -> Completion {
        self.events.publish(DomainEvent::ModelFallback {
            reason: reason.clone(),
            timestamp: Timestamp::now(),
        });
        Completion {
            content: text.to_string(),
            source: CompletionSource::Fallback { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            base_url: server.uri(),
            api_key: api_key.map(String::from),
            ..LlmConfig::default()
        }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    struct Scripted(Result<String, ()>);

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn chat(&self, _system: &str, _turns: &[ChatTurn]) -> Result<String, ChatError> {
            self.0
                .clone()
                .map_err(|_| ChatError::UpstreamRequestFailure("boom".into()))
        }
    }

    // ── Contract tests ──

    #[tokio::test]
    async fn test_request_carries_model_messages_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "temperature": 0.7,
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "a song please"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Clocks - Coldplay")))
            .expect(1)
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(&config_for(&server, Some("sk-test"))).unwrap();
        let turns = vec![
            ChatTurn::user("hi"),
            ChatTurn::assistant("hello"),
            ChatTurn::user("a song please"),
        ];
        let reply = model.chat("be brief", &turns).await.unwrap();
        assert_eq!(reply, "Clocks - Coldplay");
    }

    #[tokio::test]
    async fn test_non_success_status_is_request_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"message": "server melted"}
            })))
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(&config_for(&server, Some("sk-test"))).unwrap();
        let err = model.chat("sys", &[ChatTurn::user("hi")]).await.unwrap_err();
        match err {
            ChatError::UpstreamRequestFailure(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("server melted"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(&config_for(&server, Some("bad"))).unwrap();
        let err = model.chat("sys", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::UpstreamAuthFailure(_)));
    }

    #[tokio::test]
    async fn test_missing_key_never_calls_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("x")))
            .expect(0)
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(&config_for(&server, None)).unwrap();
        let err = model.chat("sys", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::MissingCredential("OPENAI_API_KEY")));
    }

    #[tokio::test]
    async fn test_missing_choices_yield_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(&config_for(&server, Some("k"))).unwrap();
        assert_eq!(model.chat("sys", &[]).await.unwrap(), "");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = LlmConfig {
            api_key: Some("sk-super-secret".into()),
            ..LlmConfig::default()
        };
        let model = OpenAiChatModel::new(&config).unwrap();
        let dbg = format!("{:?}", model);
        assert!(!dbg.contains("sk-super-secret"));
        assert!(dbg.contains("has_api_key: true"));
    }

    // ── Fallback policy ──

    #[tokio::test]
    async fn test_model_reply_passes_through() {
        let client = ModelClient::new(Arc::new(Scripted(Ok("hello".into()))), EventBus::default());
        let completion = client.complete("sys", &[]).await;
        assert_eq!(completion.content, "hello");
        assert_eq!(completion.source, CompletionSource::Model);
        assert!(!completion.is_fallback());
    }

    #[tokio::test]
    async fn test_failure_becomes_fallback_and_emits_event() {
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let client = ModelClient::new(Arc::new(Scripted(Err(()))), events);

        let completion = client.complete("sys", &[ChatTurn::user("hi")]).await;
        assert_eq!(completion.content, FALLBACK_REPLY);
        assert!(completion.is_fallback());

        match rx.recv().await.unwrap() {
            DomainEvent::ModelFallback { reason, .. } => assert!(reason.contains("boom")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_reply_becomes_empty_completion_fallback() {
        let client = ModelClient::new(Arc::new(Scripted(Ok("   ".into()))), EventBus::default());
        let completion = client.complete("sys", &[]).await;
        assert_eq!(completion.content, EMPTY_COMPLETION_REPLY);
        assert_eq!(
            completion.source,
            CompletionSource::Fallback {
                reason: "empty completion".into()
            }
        );
    }
}
