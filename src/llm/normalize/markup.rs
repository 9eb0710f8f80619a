//! Tag-style tool-call notations, e.g.
//!
//! ```text
//! <function=read_file><parameter=path>a.txt</parameter></function>
//! <invoke name="read_file"><parameter name="path">a.txt</parameter></invoke>
//! ```
//!
//! Scanning is done with plain substring search rather than one large
//! expression so that a single broken element only loses itself.

use serde_json::{Map, Value};

/// Delimiters of one markup notation.
#[derive(Debug)]
pub struct Dialect {
    pub name: &'static str,
    open: &'static str,
    name_end: &'static str,
    close: &'static str,
    param_open: &'static str,
    param_name_end: &'static str,
    param_close: &'static str,
}

pub const DIALECTS: &[Dialect] = &[
    Dialect {
        name: "function",
        open: "<function=",
        name_end: ">",
        close: "</function>",
        param_open: "<parameter=",
        param_name_end: ">",
        param_close: "</parameter>",
    },
    Dialect {
        name: "invoke",
        open: "<invoke name=\"",
        name_end: "\">",
        close: "</invoke>",
        param_open: "<parameter name=\"",
        param_name_end: "\">",
        param_close: "</parameter>",
    },
];

#[derive(Debug, Clone, PartialEq)]
pub enum RawParam {
    Text(String),
    Nested(Vec<(String, RawParam)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawArgs {
    /// Parameter elements; leaf values are still untyped text.
    Params(Vec<(String, RawParam)>),
    /// A JSON object body in place of parameter elements.
    Json(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkupCall {
    pub name: String,
    pub args: RawArgs,
    pub dialect: &'static str,
    /// Byte offset of the opening tag, used to keep text order.
    pub start: usize,
}

/// Finds every markup call in `text`, across all dialects, in text order.
/// Names are not checked here.
pub fn scan(text: &str) -> Vec<MarkupCall> {
    let mut calls = Vec::new();
    for dialect in DIALECTS {
        scan_dialect(text, dialect, &mut calls);
    }
    calls.sort_by_key(|c| c.start);
    calls
}

fn scan_dialect(text: &str, d: &'static Dialect, out: &mut Vec<MarkupCall>) {
    let mut from = 0;
    while let Some(rel) = text[from..].find(d.open) {
        let start = from + rel;
        let name_start = start + d.open.len();
        let Some(name_len) = text[name_start..].find(d.name_end) else {
            break;
        };
        let name = text[name_start..name_start + name_len].trim().to_string();
        let body_start = name_start + name_len + d.name_end.len();

        // A missing close tag ends the body at the next call or end of text.
        let close = text[body_start..].find(d.close).map(|i| body_start + i);
        let next_open = text[body_start..].find(d.open).map(|i| body_start + i);
        let (body_end, resume) = match (close, next_open) {
            (Some(c), Some(o)) if o < c => (o, o),
            (Some(c), _) => (c, c + d.close.len()),
            (None, Some(o)) => (o, o),
            (None, None) => (text.len(), text.len()),
        };
        from = resume;

        if name.is_empty() || name.contains(char::is_whitespace) {
            continue;
        }
        if let Some(args) = parse_body(&text[body_start..body_end], d) {
            out.push(MarkupCall {
                name,
                args,
                dialect: d.name,
                start,
            });
        }
    }
}

fn parse_body(body: &str, d: &Dialect) -> Option<RawArgs> {
    if body.contains(d.param_open) {
        return Some(RawArgs::Params(parse_params(body, d)));
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Some(RawArgs::Params(vec![]));
    }
    if trimmed.starts_with('{') {
        return match serde_json::from_str::<Map<String, Value>>(trimmed) {
            Ok(map) => Some(RawArgs::Json(map)),
            Err(e) => {
                tracing::debug!(error = %e, "markup call body is not a JSON object");
                None
            }
        };
    }
    None
}

fn parse_params(body: &str, d: &Dialect) -> Vec<(String, RawParam)> {
    let mut out: Vec<(String, RawParam)> = Vec::new();
    let mut pos = 0;
    while let Some(rel) = body[pos..].find(d.param_open) {
        let name_start = pos + rel + d.param_open.len();
        let Some(name_len) = body[name_start..].find(d.param_name_end) else {
            break;
        };
        let key = body[name_start..name_start + name_len].trim().to_string();
        let value_start = name_start + name_len + d.param_name_end.len();

        let Some(close_at) = matching_close(body, value_start, d) else {
            // Unclosed: drop this element and resume inside it, so siblings
            // that follow are still picked up.
            pos = value_start;
            continue;
        };
        let raw = &body[value_start..close_at];
        pos = close_at + d.param_close.len();
        if key.is_empty() {
            continue;
        }

        let children = if raw.contains(d.param_open) {
            parse_params(raw, d)
        } else {
            vec![]
        };
        let param = if children.is_empty() {
            RawParam::Text(strip_edge_newlines(raw).to_string())
        } else {
            RawParam::Nested(children)
        };
        // Repeated keys: the later element wins.
        out.retain(|(k, _)| *k != key);
        out.push((key, param));
    }
    out
}

/// Position of the close tag pairing with an element whose value starts at
/// `from`, skipping over nested elements.
fn matching_close(body: &str, from: usize, d: &Dialect) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = from;
    loop {
        let close = body[i..].find(d.param_close).map(|x| i + x)?;
        match body[i..].find(d.param_open).map(|x| i + x) {
            Some(open) if open < close => {
                depth += 1;
                i = open + d.param_open.len();
            }
            _ => {
                if depth == 0 {
                    return Some(close);
                }
                depth -= 1;
                i = close + d.param_close.len();
            }
        }
    }
}

fn strip_edge_newlines(s: &str) -> &str {
    let s = s
        .strip_prefix("\r\n")
        .or_else(|| s.strip_prefix('\n'))
        .unwrap_or(s);
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> RawParam {
        RawParam::Text(s.to_string())
    }

    fn params(call: &MarkupCall) -> &[(String, RawParam)] {
        match &call.args {
            RawArgs::Params(p) => p,
            RawArgs::Json(_) => panic!("expected params"),
        }
    }

    #[test]
    fn single_function_call() {
        let calls = scan("<function=read_file><parameter=path>a.txt</parameter></function>");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].dialect, "function");
        assert_eq!(params(&calls[0]), &[("path".to_string(), text("a.txt"))]);
    }

    #[test]
    fn multiline_values_lose_only_edge_newlines() {
        let calls = scan(
            "<tool_call>\n<function=write>\n<parameter=content>\nline1\nline2\n</parameter>\n</function>\n</tool_call>",
        );
        assert_eq!(params(&calls[0]), &[("content".to_string(), text("line1\nline2"))]);
    }

    #[test]
    fn unclosed_parameter_keeps_siblings() {
        let calls = scan(
            "<function=f><parameter=a>1</parameter><parameter=b>oops<parameter=c>3</parameter></function>",
        );
        assert_eq!(
            params(&calls[0]),
            &[("a".to_string(), text("1")), ("c".to_string(), text("3"))]
        );
    }

    #[test]
    fn unclosed_last_parameter_is_dropped() {
        let calls = scan("<function=f><parameter=a>1</parameter><parameter=b>2</function>");
        assert_eq!(params(&calls[0]), &[("a".to_string(), text("1"))]);
    }

    #[test]
    fn nested_parameters_become_nested() {
        let calls = scan(
            "<function=f><parameter=opts><parameter=x>1</parameter><parameter=y>2</parameter></parameter></function>",
        );
        assert_eq!(
            params(&calls[0]),
            &[(
                "opts".to_string(),
                RawParam::Nested(vec![
                    ("x".to_string(), text("1")),
                    ("y".to_string(), text("2")),
                ])
            )]
        );
    }

    #[test]
    fn repeated_calls_and_dialects_in_text_order() {
        let calls = scan(
            r#"<invoke name="b"><parameter name="k">v</parameter></invoke> then <function=a></function>"#,
        );
        let names: Vec<_> = calls.iter().map(|c| (c.name.as_str(), c.dialect)).collect();
        assert_eq!(names, vec![("b", "invoke"), ("a", "function")]);
        assert_eq!(params(&calls[0]), &[("k".to_string(), text("v"))]);
        assert!(params(&calls[1]).is_empty());
    }

    #[test]
    fn json_body_is_accepted() {
        let calls = scan(r#"<function=web_search>{"query":"rust","n":2}</function>"#);
        assert_eq!(
            calls[0].args,
            RawArgs::Json(json!({"query":"rust","n":2}).as_object().unwrap().clone())
        );
    }

    #[test]
    fn junk_body_is_skipped() {
        assert!(scan("<function=f>not json</function>").is_empty());
        assert!(scan("<function=f>{broken</function>").is_empty());
    }

    #[test]
    fn missing_function_close_ends_at_next_call() {
        let calls = scan(
            "<function=a><parameter=x>1</parameter>\n<function=b><parameter=y>2</parameter></function>",
        );
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "a");
        assert_eq!(calls[1].name, "b");
    }

    #[test]
    fn prose_without_markup_finds_nothing() {
        assert!(scan("I would use <b>bold</b> here").is_empty());
    }
}
