use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::llm::error::GatewayError;
use crate::llm::types::{ChatMessage, ChoiceMessage, SamplingParams, ToolDef};

/// One request/response exchange with an inference service.
///
/// Implementations make exactly one attempt per call and report failures as
/// [`GatewayError`]; retrying belongs to the caller. When `cancel` fires the
/// call returns a transport error and drops whatever it was holding.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        sampling: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<ChoiceMessage, GatewayError>;
}
