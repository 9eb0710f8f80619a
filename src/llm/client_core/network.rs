use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::OpenAIClient;
use crate::llm::error::GatewayError;
use crate::llm::types::{
    ChatMessage, ChatRequest, ChatResponse, ChoiceMessage, SamplingParams, ToolDef,
};

pub async fn chat_once(
    client: &OpenAIClient,
    model: &str,
    messages: &[ChatMessage],
    tools: &[ToolDef],
    sampling: &SamplingParams,
    cancel: &CancellationToken,
) -> Result<ChoiceMessage, GatewayError> {
    let url = client.endpoint();
    let req = ChatRequest {
        model: model.to_string(),
        messages: messages.to_vec(),
        tools: tools.to_vec(),
        sampling: sampling.clone(),
    };

    if let Ok(payload) = serde_json::to_string_pretty(&req) {
        debug!(payload=%payload, endpoint=%url, "sending chat.completions payload");
    }

    let timeout = client.request_timeout();
    let exchange = async {
        let resp = client
            .inner
            .post(&url)
            .bearer_auth(&client.api_key)
            .header("X-Title", "agent-loop")
            .json(&req)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            error!(status=%status.as_u16(), body=%text, "llm chat_once non-success status");
            return Err(GatewayError::from_status(status, &text));
        }
        Ok(text)
    };

    // Dropping `exchange` on either early branch releases the connection.
    let response_text = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("chat_once aborted");
            return Err(GatewayError::transport("request aborted"));
        }
        res = tokio::time::timeout(timeout, exchange) => match res {
            Ok(res) => res?,
            Err(_) => {
                error!(timeout_ms = timeout.as_millis() as u64, "llm chat_once timed out");
                return Err(GatewayError::transport(format!(
                    "request timed out after {}ms",
                    timeout.as_millis()
                )));
            }
        },
    };

    debug!(response_body=%response_text, "llm chat_once response");
    decode_envelope(client, &response_text)
}

/// Checks the envelope shape before anything reads from it.
fn decode_envelope(client: &OpenAIClient, text: &str) -> Result<ChoiceMessage, GatewayError> {
    let body: ChatResponse = serde_json::from_str(text)
        .map_err(|e| GatewayError::protocol(format!("parse chat response: {e}")))?;

    if let Some(usage) = &body.usage {
        client.add_tokens(usage.total_tokens);
        client.add_prompt_tokens(usage.prompt_tokens);
    }

    let choice = body
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| GatewayError::protocol("missing choices"))?;
    let message = choice
        .message
        .ok_or_else(|| GatewayError::protocol("missing message"))?;

    let has_text = message.content.as_deref().is_some_and(|c| !c.is_empty());
    if !has_text && message.tool_calls.is_empty() {
        return Err(GatewayError::protocol("empty message"));
    }
    Ok(message)
}
