use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

use crate::llm::types::ToolCall;
use crate::tools::error::ToolError;
use crate::tools::registry::ToolRegistry;

/// Result of one requested call, tagged with the request id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutcome {
    pub id: String,
    pub name: String,
    pub result: Result<Value, ToolError>,
}

impl ToolCallOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Text stored in the tool message: the JSON payload, or `{"error": ...}`.
    pub fn to_message_content(&self) -> String {
        match &self.result {
            Ok(v) => v.to_string(),
            Err(e) => json!({ "error": e.to_string() }).to_string(),
        }
    }
}

/// Runs batches of tool calls against a registry.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, default_timeout: Duration) -> Self {
        Self {
            registry,
            default_timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Starts every call at once and waits for all of them to settle.
    ///
    /// Returns exactly one outcome per request, in request order. Failures of
    /// any kind, including a panicking tool, become that call's outcome.
    /// Dropping the returned future aborts the calls still running.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolCallOutcome> {
        let mut slots: Vec<Option<Result<Value, ToolError>>> = vec![None; calls.len()];
        let mut join_set = JoinSet::new();
        let mut task_slots = HashMap::with_capacity(calls.len());

        for (idx, call) in calls.iter().enumerate() {
            let registry = self.registry.clone();
            let default_timeout = self.default_timeout;
            let call = call.clone();
            let handle = join_set.spawn(async move {
                let started = Instant::now();
                let result = execute_one(&registry, &call, default_timeout).await;
                debug!(
                    tool = %call.name(),
                    id = %call.id,
                    ok = result.is_ok(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool call settled"
                );
                (idx, result)
            });
            task_slots.insert(handle.id(), idx);
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => {
                    let message = join_failure_message(&e);
                    if e.is_panic() {
                        error!("{message}");
                    } else {
                        warn!("{message}");
                    }
                    if let Some(&idx) = task_slots.get(&e.id()) {
                        slots[idx] = Some(Err(ToolError::Execution {
                            tool: calls[idx].name().to_string(),
                            message,
                        }));
                    }
                }
            }
        }

        calls
            .iter()
            .zip(slots)
            .map(|(call, slot)| ToolCallOutcome {
                id: call.id.clone(),
                name: call.name().to_string(),
                result: slot.unwrap_or_else(|| {
                    Err(ToolError::Execution {
                        tool: call.name().to_string(),
                        message: "tool task did not report a result".into(),
                    })
                }),
            })
            .collect()
    }
}

fn join_failure_message(e: &JoinError) -> String {
    if e.is_panic() {
        format!("tool task panicked: {e}")
    } else {
        format!("tool task cancelled: {e}")
    }
}

async fn execute_one(
    registry: &ToolRegistry,
    call: &ToolCall,
    default_timeout: Duration,
) -> Result<Value, ToolError> {
    let name = call.name();
    let tool = registry.get(name).ok_or_else(|| ToolError::UnknownTool {
        name: name.to_string(),
    })?;

    let raw = call.function.arguments.trim();
    let payload: Value = if raw.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(raw).map_err(|e| ToolError::ArgumentParse {
            tool: name.to_string(),
            message: e.to_string(),
        })?
    };

    let args = tool
        .shape()
        .validate(payload)
        .map_err(|issues| ToolError::Validation {
            tool: name.to_string(),
            issues,
        })?;

    let limit = tool.timeout().unwrap_or(default_timeout);
    match tokio::time::timeout(limit, tool.invoke(args)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ToolError::Execution {
            tool: name.to_string(),
            message: format!("{e:#}"),
        }),
        Err(_) => Err(ToolError::Timeout {
            tool: name.to_string(),
            after: limit,
        }),
    }
}
