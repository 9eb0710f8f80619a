//! Turns a raw assistant reply into a canonical [`ChatMessage`]: private
//! reasoning split off, and tool calls recovered from text when the provider
//! did not return structured ones.

pub mod call_syntax;
pub mod markup;
pub mod thinking;

use serde_json::{Map, Value};
use tracing::debug;

use crate::llm::types::{ChatMessage, ChoiceMessage, Role, ToolCall, new_call_id};
use crate::tools::registry::ToolRegistry;
use crate::tools::shape::ArgShape;

pub use thinking::{THINKING_DELIMITERS, extract_thinking, split_thinking};

/// Where the tool calls of a normalized message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSource {
    Native,
    Markup,
    CallSyntax,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    pub message: ChatMessage,
    pub source: CallSource,
}

/// Normalizes one reply against the names in `registry`.
///
/// Native structured calls are kept as they are (only an empty id is filled).
/// Without them the visible text is scanned for markup calls, and only if
/// none of those name a registered tool, for `name(k=v)` calls. Candidates
/// naming unregistered tools are dropped. The visible text is not altered
/// by call recovery.
pub fn normalize(reply: ChoiceMessage, registry: &ToolRegistry) -> NormalizedResponse {
    let mut message = ChatMessage {
        role: Role::Assistant,
        content: reply.content,
        thinking: None,
        tool_calls: reply.tool_calls,
        tool_call_id: None,
    };

    extract_thinking(&mut message);
    if message.thinking.is_none()
        && let Some(reasoning) = reply.reasoning_content
        && !reasoning.trim().is_empty()
    {
        message.thinking = Some(reasoning.trim().to_string());
    }

    if !message.tool_calls.is_empty() {
        for call in &mut message.tool_calls {
            if call.id.is_empty() {
                call.id = new_call_id();
            }
        }
        return NormalizedResponse {
            message,
            source: CallSource::Native,
        };
    }

    let (calls, source) = recover_calls(message.text(), registry);
    if !calls.is_empty() {
        debug!(count = calls.len(), notation = ?source, "recovered tool calls from text");
    }
    message.tool_calls = calls;
    NormalizedResponse { message, source }
}

fn recover_calls(text: &str, registry: &ToolRegistry) -> (Vec<ToolCall>, CallSource) {
    if text.is_empty() {
        return (vec![], CallSource::None);
    }

    let from_markup: Vec<ToolCall> = markup::scan(text)
        .into_iter()
        .filter_map(|c| {
            let shape = registered_shape(registry, &c.name)?;
            let args = match c.args {
                markup::RawArgs::Json(map) => map,
                markup::RawArgs::Params(params) => params
                    .into_iter()
                    .map(|(k, p)| {
                        let v = match p {
                            markup::RawParam::Text(t) => shape.decode_text_value(&k, &t),
                            markup::RawParam::Nested(children) => nested_object(children),
                        };
                        (k, v)
                    })
                    .collect(),
            };
            Some(recovered(c.name, args))
        })
        .collect();
    if !from_markup.is_empty() {
        return (from_markup, CallSource::Markup);
    }

    let from_syntax: Vec<ToolCall> = call_syntax::scan(text)
        .into_iter()
        .filter_map(|c| {
            let shape = registered_shape(registry, &c.name)?;
            let args = c
                .args
                .into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        call_syntax::CallValue::Quoted(s) => Value::String(s),
                        call_syntax::CallValue::Bare(s) => shape.decode_text_value(&k, &s),
                    };
                    (k, v)
                })
                .collect();
            Some(recovered(c.name, args))
        })
        .collect();
    if !from_syntax.is_empty() {
        return (from_syntax, CallSource::CallSyntax);
    }

    (vec![], CallSource::None)
}

fn registered_shape<'a>(registry: &'a ToolRegistry, name: &str) -> Option<&'a ArgShape> {
    let shape = registry.shape(name);
    if shape.is_none() {
        debug!(tool = name, "dropping text tool call for unregistered tool");
    }
    shape
}

fn recovered(name: String, args: Map<String, Value>) -> ToolCall {
    let arguments = Value::Object(args).to_string();
    ToolCall::new(new_call_id(), name, arguments)
}

/// Nested parameters carry no declared kind, so leaves are decoded loosely.
fn nested_object(children: Vec<(String, markup::RawParam)>) -> Value {
    let map = children
        .into_iter()
        .map(|(k, p)| {
            let v = match p {
                markup::RawParam::Text(t) => loose_value(&t),
                markup::RawParam::Nested(inner) => nested_object(inner),
            };
            (k, v)
        })
        .collect();
    Value::Object(map)
}

fn loose_value(text: &str) -> Value {
    match text.trim() {
        "True" => Value::Bool(true),
        "False" => Value::Bool(false),
        "None" => Value::Null,
        t => serde_json::from_str(t).unwrap_or_else(|_| Value::String(text.to_string())),
    }
}
