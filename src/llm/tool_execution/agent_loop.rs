use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::llm::error::{AgentError, GatewayError};
use crate::llm::gateway::ModelGateway;
use crate::llm::history::ConversationState;
use crate::llm::model_select::{DefaultModelSelector, ModelSelector};
use crate::llm::normalize::normalize;
use crate::llm::tool_execution::dispatch::ToolDispatcher;
use crate::llm::tool_runtime::RuntimeSettings;
use crate::llm::types::{ChatMessage, ChoiceMessage, ToolCall, ToolDef};
use crate::tools::registry::ToolRegistry;

/// Per-run overrides of the agent's settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub system_prompt: Option<String>,
    pub model_id: Option<String>,
    pub max_iterations: Option<usize>,
    pub max_retries: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedResult {
    pub iterations: usize,
    /// Last non-empty assistant text seen before the cap was hit.
    pub partial_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(String),
    /// The iteration cap was reached while the model still wanted tools.
    Truncated(TruncatedResult),
}

impl RunOutcome {
    pub fn text(&self) -> &str {
        match self {
            RunOutcome::Completed(t) => t,
            RunOutcome::Truncated(t) => &t.partial_text,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, RunOutcome::Truncated(_))
    }
}

/// Counters of the run in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationContext {
    pub iteration: usize,
    pub max_iterations: usize,
    /// Retries spent on the current model call.
    pub retry: usize,
    pub max_retries: usize,
}

enum Phase {
    Requesting,
    Normalizing(ChoiceMessage),
    ExecutingTools(Vec<ToolCall>),
    Done(String),
}

/// Drives one conversation: model call, text normalization, tool fan-out,
/// repeat until the model answers without tools or a limit is hit.
///
/// The agent owns its [`ConversationState`]; callers only read it.
pub struct Agent {
    gateway: Arc<dyn ModelGateway>,
    dispatcher: ToolDispatcher,
    selector: Arc<dyn ModelSelector>,
    settings: RuntimeSettings,
    state: ConversationState,
    last_thinking: Option<String>,
    cancel: CancellationToken,
    rng: fastrand::Rng,
}

impl Agent {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        registry: Arc<ToolRegistry>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            gateway,
            dispatcher: ToolDispatcher::new(registry, settings.tool_timeout),
            selector: Arc::new(DefaultModelSelector::default()),
            settings,
            state: ConversationState::new(),
            last_thinking: None,
            cancel: CancellationToken::new(),
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn ModelSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn history(&self) -> &[ChatMessage] {
        self.state.messages()
    }

    pub fn last_thinking(&self) -> Option<&str> {
        self.last_thinking.as_deref()
    }

    /// Token that aborts the current or next run. Once cancelled it stays
    /// cancelled until [`Agent::reset`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Clears the conversation between independent tasks.
    pub fn reset(&mut self, preserve_system: bool) {
        self.state.reset(preserve_system);
        self.last_thinking = None;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }

    pub async fn run(&mut self, input: &str, opts: RunOptions) -> Result<RunOutcome, AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let model = self
            .selector
            .select(opts.model_id.as_deref(), input)
            .ok_or(AgentError::NoModel)?;
        if let Some(system) = opts.system_prompt {
            self.state.set_system_prompt(system);
        }
        self.state.push_user(input);

        let mut ctx = IterationContext {
            iteration: 0,
            max_iterations: opts.max_iterations.unwrap_or(self.settings.max_iterations),
            retry: 0,
            max_retries: opts.max_retries.unwrap_or(self.settings.max_retries),
        };
        let tools = self.dispatcher.registry().tool_defs();
        let mut partial_text = String::new();
        let mut phase = Phase::Requesting;

        loop {
            phase = match phase {
                Phase::Requesting => {
                    if ctx.iteration >= ctx.max_iterations {
                        warn!(iterations = ctx.iteration, "iteration cap reached; run truncated");
                        return Ok(RunOutcome::Truncated(TruncatedResult {
                            iterations: ctx.iteration,
                            partial_text,
                        }));
                    }
                    ctx.iteration += 1;
                    ctx.retry = 0;
                    info!(
                        iteration = ctx.iteration,
                        max = ctx.max_iterations,
                        model = %model,
                        "agent loop iteration"
                    );
                    if let Some(report) = self.state.compress(&self.settings.compression) {
                        debug!(before = report.before, after = report.after, "history compressed");
                    }
                    let reply = self.request_with_retry(&model, &tools, &mut ctx).await?;
                    Phase::Normalizing(reply)
                }
                Phase::Normalizing(reply) => {
                    let normalized = normalize(reply, self.dispatcher.registry());
                    let message = normalized.message;
                    if message.thinking.is_some() {
                        self.last_thinking = message.thinking.clone();
                    }
                    let text = message.text().to_string();
                    if !text.trim().is_empty() {
                        partial_text = text.clone();
                    }
                    let calls = message.tool_calls.clone();
                    self.state.push_assistant(message);
                    if calls.is_empty() {
                        Phase::Done(text)
                    } else {
                        debug!(count = calls.len(), source = ?normalized.source, "tool calls requested");
                        Phase::ExecutingTools(calls)
                    }
                }
                Phase::ExecutingTools(calls) => {
                    let outcomes = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            warn!("run cancelled during tool execution");
                            return Err(AgentError::Cancelled);
                        }
                        outcomes = self.dispatcher.execute_all(&calls) => outcomes,
                    };
                    for outcome in outcomes {
                        match &outcome.result {
                            Ok(_) => info!(tool = %outcome.name, id = %outcome.id, "tool ok"),
                            Err(e) => warn!(tool = %outcome.name, id = %outcome.id, error = %e, "tool failed"),
                        }
                        self.state
                            .push_tool_result(&outcome.id, outcome.to_message_content())?;
                    }
                    Phase::Requesting
                }
                Phase::Done(text) => {
                    info!(iterations = ctx.iteration, "run completed");
                    return Ok(RunOutcome::Completed(text));
                }
            };
        }
    }

    /// One model call with the retry policy applied. Only transport faults
    /// are retried, unless protocol retries are switched on.
    async fn request_with_retry(
        &mut self,
        model: &str,
        tools: &[ToolDef],
        ctx: &mut IterationContext,
    ) -> Result<ChoiceMessage, AgentError> {
        loop {
            let result = self
                .gateway
                .send(
                    model,
                    self.state.messages(),
                    tools,
                    &self.settings.sampling,
                    &self.cancel,
                )
                .await;
            let err = match result {
                Ok(reply) => return Ok(reply),
                Err(e) => e,
            };
            if self.cancel.is_cancelled() {
                warn!("run cancelled during model call");
                return Err(AgentError::Cancelled);
            }
            let retryable = err.is_transport() || self.settings.retry_protocol_errors;
            if !retryable {
                error!(error = %err, "model call failed; not retrying");
                return Err(AgentError::Gateway(err));
            }
            if ctx.retry >= ctx.max_retries {
                error!(attempts = ctx.retry + 1, error = %err, "model call retries exhausted");
                return Err(AgentError::RetryExhausted {
                    attempts: ctx.retry + 1,
                    last: err,
                });
            }

            let wait = self
                .settings
                .backoff
                .delay_with_jitter(ctx.retry as u32, &mut self.rng);
            ctx.retry += 1;
            warn!(
                attempt = ctx.retry,
                kind = error_kind(&err),
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "model call failed; retrying"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("run cancelled during backoff");
                    return Err(AgentError::Cancelled);
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

fn error_kind(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::Transport { .. } => "transport",
        GatewayError::Protocol(_) => "protocol",
    }
}
