use thiserror::Error;
use tracing::info;

use crate::llm::types::{ChatMessage, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("system message at position {index}; it must be the only one and come first")]
    SystemNotFirst { index: usize },
    #[error("tool result {id} does not answer any earlier tool call")]
    DanglingToolResult { id: String },
}

/// When and how far to shrink a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionPolicy {
    /// Compress once the conversation holds more messages than this.
    pub max_messages: usize,
    /// Minimum number of most-recent messages kept by a count-triggered pass.
    pub keep_recent: usize,
    /// Optional budget in estimated tokens.
    pub max_tokens: Option<usize>,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            max_messages: 50,
            keep_recent: 30,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionReport {
    pub before: usize,
    pub after: usize,
}

/// Ordered message log of one agent.
///
/// Holds at most one system message, always first, and only accepts tool
/// results that answer a call made by an earlier assistant message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a state from stored messages, checking both ordering rules.
    pub fn from_messages(messages: Vec<ChatMessage>) -> Result<Self, HistoryError> {
        let mut state = Self::new();
        for (index, msg) in messages.into_iter().enumerate() {
            match msg.role {
                Role::System if index != 0 => return Err(HistoryError::SystemNotFirst { index }),
                Role::Tool => {
                    let id = msg.tool_call_id.clone().unwrap_or_default();
                    state.check_answers_call(&id)?;
                    state.messages.push(msg);
                }
                _ => state.messages.push(msg),
            }
        }
        Ok(state)
    }

    /// Sets or replaces the system message.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let msg = ChatMessage::system(prompt);
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => *first = msg,
            _ => self.messages.insert(0, msg),
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.text())
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, mut msg: ChatMessage) {
        msg.role = Role::Assistant;
        msg.tool_call_id = None;
        self.messages.push(msg);
    }

    pub fn push_tool_result(
        &mut self,
        id: &str,
        content: impl Into<String>,
    ) -> Result<(), HistoryError> {
        self.check_answers_call(id)?;
        self.messages.push(ChatMessage::tool_result(id, content));
        Ok(())
    }

    fn check_answers_call(&self, id: &str) -> Result<(), HistoryError> {
        let known = !id.is_empty()
            && self
                .messages
                .iter()
                .filter(|m| m.role == Role::Assistant)
                .any(|m| m.tool_calls.iter().any(|c| c.id == id));
        if known {
            Ok(())
        } else {
            Err(HistoryError::DanglingToolResult { id: id.to_string() })
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(ChatMessage::estimated_tokens).sum()
    }

    /// Clears the log, optionally keeping the system message.
    pub fn reset(&mut self, preserve_system: bool) {
        let system = self
            .messages
            .first()
            .filter(|m| preserve_system && m.role == Role::System)
            .cloned();
        self.messages.clear();
        self.messages.extend(system);
    }

    fn over_budget(&self, policy: &CompressionPolicy) -> bool {
        self.messages.len() > policy.max_messages
            || policy
                .max_tokens
                .is_some_and(|max| self.estimated_tokens() > max)
    }

    /// Drops the oldest non-system messages when `policy` is exceeded.
    ///
    /// Keeps the system message and a contiguous suffix of at least
    /// `keep_recent` messages. The cut is moved earlier so the suffix never
    /// opens with tool results cut off from their assistant message. With a
    /// token budget the suffix is then shortened a whole user turn at a time,
    /// never past the newest user turn.
    pub fn compress(&mut self, policy: &CompressionPolicy) -> Option<CompressionReport> {
        if !self.over_budget(policy) {
            return None;
        }
        let before = self.messages.len();
        let head = usize::from(self.system_prompt().is_some());
        let body = &self.messages[head..];
        if body.is_empty() {
            return None;
        }

        let mut cut = body.len().saturating_sub(policy.keep_recent.max(1));
        while cut > 0 && body[cut].role == Role::Tool {
            cut -= 1;
        }

        if let Some(max_tokens) = policy.max_tokens {
            let head_tokens: usize = self.messages[..head]
                .iter()
                .map(ChatMessage::estimated_tokens)
                .sum();
            let newest_turn = body.iter().rposition(|m| m.role == Role::User);
            let mut kept_tokens: usize =
                body[cut..].iter().map(ChatMessage::estimated_tokens).sum();
            while head_tokens + kept_tokens > max_tokens {
                let Some(next) = body[cut + 1..]
                    .iter()
                    .position(|m| m.role == Role::User)
                    .map(|i| cut + 1 + i)
                else {
                    break;
                };
                if newest_turn.is_some_and(|newest| next > newest) {
                    break;
                }
                kept_tokens -= body[cut..next]
                    .iter()
                    .map(ChatMessage::estimated_tokens)
                    .sum::<usize>();
                cut = next;
            }
        }

        if cut == 0 {
            return None;
        }
        self.messages.drain(head..head + cut);
        let report = CompressionReport {
            before,
            after: self.messages.len(),
        };
        info!(before = report.before, after = report.after, "compressed conversation");
        Some(report)
    }
}
