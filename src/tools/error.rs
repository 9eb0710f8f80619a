use std::time::Duration;
use thiserror::Error;

use crate::tools::shape::FieldIssue;

/// Failure of one tool call. Always captured into that call's outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid tool args for {tool}: {message}")]
    ArgumentParse { tool: String, message: String },

    #[error("invalid arguments for {tool}: {}", format_issues(.issues))]
    Validation {
        tool: String,
        issues: Vec<FieldIssue>,
    },

    #[error("tool {tool} timed out after {}ms", .after.as_millis())]
    Timeout { tool: String, after: Duration },

    #[error("tool {tool} failed: {message}")]
    Execution { tool: String, message: String },
}

fn format_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_display() {
        let error = ToolError::Validation {
            tool: "read_file".into(),
            issues: vec![
                FieldIssue {
                    field: "path".into(),
                    problem: "missing required field".into(),
                },
                FieldIssue {
                    field: "limit".into(),
                    problem: "expected integer, got string".into(),
                },
            ],
        };
        assert_eq!(
            error.to_string(),
            "invalid arguments for read_file: path: missing required field; limit: expected integer, got string"
        );

        let error = ToolError::Timeout {
            tool: "slow".into(),
            after: Duration::from_millis(250),
        };
        assert_eq!(error.to_string(), "tool slow timed out after 250ms");
    }
}
