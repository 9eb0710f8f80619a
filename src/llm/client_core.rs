use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::LlmConfig;
use crate::llm::error::GatewayError;
use crate::llm::gateway::ModelGateway;
use crate::llm::types::{ChatMessage, ChoiceMessage, SamplingParams, ToolDef};

mod network;

/// Gateway for OpenAI-compatible `chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    pub base_url: String,
    pub api_key: String,
    pub(crate) inner: reqwest::Client,
    pub llm_cfg: LlmConfig,
    /// Tracks total tokens used by this client
    pub tokens_used: Arc<AtomicU32>,
    /// Tracks prompt tokens used by this client
    pub prompt_tokens_used: Arc<AtomicU32>,
}

impl OpenAIClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let inner = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            inner,
            llm_cfg: LlmConfig::default(),
            tokens_used: Arc::new(AtomicU32::new(0)),
            prompt_tokens_used: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn with_llm_config(mut self, cfg: LlmConfig) -> Self {
        // The hard per-call deadline is enforced in `network`; only the
        // connect phase is bounded at the reqwest level.
        let builder =
            reqwest::Client::builder().connect_timeout(Duration::from_millis(cfg.connect_timeout_ms));
        if let Ok(c) = builder.build() {
            self.inner = c;
        }
        self.llm_cfg = cfg;
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let mut base = self.base_url.trim_end_matches('/').to_string();
        if let Some(pos) = base.rfind("/v1") {
            base.truncate(pos);
            base = base.trim_end_matches('/').to_string();
        }
        format!("{base}/v1/chat/completions")
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_cfg.request_timeout_ms)
    }

    /// Get the total number of tokens used by this client
    pub fn get_tokens_used(&self) -> u32 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    pub fn add_tokens(&self, tokens: u32) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    /// Get the total number of prompt tokens used by this client
    pub fn get_prompt_tokens_used(&self) -> u32 {
        self.prompt_tokens_used.load(Ordering::Relaxed)
    }

    pub fn add_prompt_tokens(&self, tokens: u32) {
        self.prompt_tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }
}

#[async_trait]
impl ModelGateway for OpenAIClient {
    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        sampling: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<ChoiceMessage, GatewayError> {
        network::chat_once(self, model, messages, tools, sampling, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};

    fn client_for(server: &Server) -> OpenAIClient {
        OpenAIClient::new(format!("{}/", server.url_str("")), "test-key")
            .unwrap()
            .with_llm_config(LlmConfig {
                request_timeout_ms: 2_000,
                ..LlmConfig::default()
            })
    }

    async fn send_hi(client: &OpenAIClient) -> Result<ChoiceMessage, GatewayError> {
        client
            .send(
                "gpt-test",
                &[ChatMessage::user("hi")],
                &[],
                &SamplingParams::default(),
                &CancellationToken::new(),
            )
            .await
    }

    #[tokio::test]
    async fn send_happy_path() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/v1/chat/completions"),
                request::headers(contains(key("authorization"))),
            ])
            .respond_with(json_encoded(serde_json::json!({
                "id": "test",
                "choices": [
                    {"index":0, "message": {"role":"assistant","content":"hello"}}
                ],
                "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
            }))),
        );

        let client = client_for(&server);
        let msg = send_hi(&client).await.unwrap();
        assert_eq!(msg.content.as_deref(), Some("hello"));
        assert_eq!(client.get_tokens_used(), 10);
        assert_eq!(client.get_prompt_tokens_used(), 7);
    }

    #[tokio::test]
    async fn native_tool_calls_are_decoded() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(json_encoded(serde_json::json!({
                    "choices": [{"index":0, "message": {
                        "role":"assistant",
                        "content": null,
                        "tool_calls": [{"id":"c1","type":"function",
                            "function":{"name":"read_file","arguments":"{\"path\":\"a\"}"}}]
                    }}]
                }))),
        );
        let msg = send_hi(&client_for(&server)).await.unwrap();
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].id, "c1");
    }

    #[tokio::test]
    async fn null_tool_calls_is_a_text_reply() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(json_encoded(serde_json::json!({
                    "choices": [{"index":0, "message": {
                        "role":"assistant",
                        "content": "plain answer",
                        "tool_calls": null
                    }}]
                }))),
        );
        let msg = send_hi(&client_for(&server)).await.unwrap();
        assert_eq!(msg.content.as_deref(), Some("plain answer"));
        assert!(msg.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn empty_choices_is_protocol_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(json_encoded(serde_json::json!({"id": "x", "choices": []}))),
        );
        let err = send_hi(&client_for(&server)).await.unwrap_err();
        assert_eq!(err, GatewayError::Protocol("missing choices".into()));
    }

    #[tokio::test]
    async fn message_without_content_or_calls_is_protocol_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(json_encoded(serde_json::json!({
                    "choices": [{"index":0, "message": {"role":"assistant"}}]
                }))),
        );
        let err = send_hi(&client_for(&server)).await.unwrap_err();
        assert_eq!(err, GatewayError::Protocol("empty message".into()));
    }

    #[tokio::test]
    async fn non_json_body_is_protocol_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(status_code(200).body("<html>gateway</html>")),
        );
        let err = send_hi(&client_for(&server)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[tokio::test]
    async fn server_error_is_transport_and_not_retried_here() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .times(1)
                .respond_with(status_code(503).body("overloaded")),
        );
        let err = send_hi(&client_for(&server)).await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn bad_request_is_protocol_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(status_code(400).body("bad")),
        );
        let err = send_hi(&client_for(&server)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[tokio::test]
    async fn slow_response_hits_hard_timeout() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/chat/completions"))
                .respond_with(delay_and_then(
                    Duration::from_secs(2),
                    status_code(200).body("{}"),
                )),
        );
        let client = OpenAIClient::new(server.url_str(""), "k")
            .unwrap()
            .with_llm_config(LlmConfig {
                request_timeout_ms: 100,
                ..LlmConfig::default()
            });
        let err = send_hi(&client).await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_as_transport() {
        let client = OpenAIClient::new("http://127.0.0.1:9", "k").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .send("m", &[], &[], &SamplingParams::default(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::transport("request aborted"));
    }

    #[test]
    fn endpoint_normalization() {
        let c = OpenAIClient::new("https://api.example.com/v1/", "x").unwrap();
        assert_eq!(c.endpoint(), "https://api.example.com/v1/chat/completions");
        let c2 = OpenAIClient::new("https://api.example.com/", "x").unwrap();
        assert_eq!(c2.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
