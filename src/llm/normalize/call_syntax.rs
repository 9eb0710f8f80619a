//! Function-call notation in free text: `name(key=value, key2="text")`.

use regex::Regex;
use std::sync::LazyLock;

static CALL_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call head pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallValue {
    /// A quoted literal, already unescaped. Always a string.
    Quoted(String),
    /// Unquoted text, decoded later against the tool's declared kind.
    Bare(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxCall {
    pub name: String,
    pub args: Vec<(String, CallValue)>,
    pub start: usize,
}

/// Finds every well-formed `name(k=v, ...)` in `text`, in text order.
///
/// A candidate whose argument list is not entirely `key=value` pairs is
/// rejected as a whole, so ordinary prose such as `f(x)` yields nothing.
pub fn scan(text: &str) -> Vec<SyntaxCall> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let Some(caps) = CALL_HEAD.captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let args_start = whole.end();
        match matching_paren(text, args_start).and_then(|end| {
            parse_args(&text[args_start..end]).map(|args| (end, args))
        }) {
            Some((end, args)) => {
                out.push(SyntaxCall {
                    name: name.as_str().to_string(),
                    args,
                    start: whole.start(),
                });
                pos = end + 1;
            }
            None => pos = args_start,
        }
    }
    out
}

/// Index of the `)` closing a list that starts at `from`, honoring quotes
/// and bracket nesting.
fn matching_paren(text: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in text[from..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' if depth == 0 => return Some(from + i),
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut last = 0;
    for (i, ch) in list.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&list[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[last..]);
    parts
}

fn parse_args(list: &str) -> Option<Vec<(String, CallValue)>> {
    if list.trim().is_empty() {
        return Some(vec![]);
    }
    let mut args: Vec<(String, CallValue)> = Vec::new();
    for piece in split_top_level(list) {
        let (key, value) = piece.split_once('=')?;
        let key = key.trim();
        if !is_identifier(key) {
            return None;
        }
        let value = parse_value(value.trim())?;
        args.retain(|(k, _)| k != key);
        args.push((key.to_string(), value));
    }
    Some(args)
}

fn parse_value(raw: &str) -> Option<CallValue> {
    if raw.is_empty() {
        return None;
    }
    let mut chars = raw.chars();
    let first = chars.next()?;
    if first == '"' || first == '\'' {
        let inner = raw.strip_prefix(first)?.strip_suffix(first)?;
        return Some(CallValue::Quoted(unescape(inner)));
    }
    Some(CallValue::Bare(raw.to_string()))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
