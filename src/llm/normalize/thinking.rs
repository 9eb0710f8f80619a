use crate::llm::types::ChatMessage;

/// Accepted reasoning wrappers, in precedence order.
pub const THINKING_DELIMITERS: &[(&str, &str)] = &[
    ("<think>", "</think>"),
    ("<thinking>", "</thinking>"),
    ("<reasoning>", "</reasoning>"),
    ("[THINKING]", "[/THINKING]"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingSplit {
    pub visible: String,
    pub thinking: String,
}

/// Removes the first accepted wrapper from `text`.
///
/// Pairs are tried in [`THINKING_DELIMITERS`] order and the first pair with an
/// opening tag followed by a closing tag wins, regardless of where other pairs
/// appear. Only that one occurrence is removed; repeated or nested wrappers
/// are left in the visible text.
pub fn split_thinking(text: &str) -> Option<ThinkingSplit> {
    for (open, close) in THINKING_DELIMITERS {
        let Some(start) = text.find(open) else {
            continue;
        };
        let inner_start = start + open.len();
        let Some(len) = text[inner_start..].find(close) else {
            continue;
        };
        let inner_end = inner_start + len;
        let mut visible = String::with_capacity(text.len());
        visible.push_str(&text[..start]);
        visible.push_str(&text[inner_end + close.len()..]);
        return Some(ThinkingSplit {
            visible: visible.trim().to_string(),
            thinking: text[inner_start..inner_end].trim().to_string(),
        });
    }
    None
}

/// Moves wrapped reasoning out of `msg.content` into `msg.thinking`.
///
/// A message that already carries thinking is left untouched, so applying
/// this twice is the same as applying it once. Returns whether anything moved.
pub fn extract_thinking(msg: &mut ChatMessage) -> bool {
    if msg.thinking.is_some() {
        return false;
    }
    let Some(split) = msg.content.as_deref().and_then(split_thinking) else {
        return false;
    };
    msg.content = Some(split.visible);
    msg.thinking = Some(split.thinking);
    true
}
