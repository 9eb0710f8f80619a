use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use tokio::process::Command;

use crate::tools::registry::Tool;
use crate::tools::shape::{ArgShape, FieldKind, ToolArgs};

pub struct ExecuteBashTool {
    root: PathBuf,
    shape: ArgShape,
}

impl ExecuteBashTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shape: ArgShape::new().required("command", FieldKind::String, "Shell command to run"),
        }
    }

    async fn execute_bash(&self, command: &str) -> Result<String> {
        // kill_on_drop: a timed-out call must not leave the child running.
        let output = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute command: {command}"))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            anyhow::bail!("Command failed with status {}: {}", output.status, stderr)
        }
    }
}

#[async_trait]
impl Tool for ExecuteBashTool {
    fn name(&self) -> &str {
        "execute_bash"
    }

    fn description(&self) -> &str {
        "Runs a bash command in the project root and returns its stdout. A non-zero exit status is reported as an error carrying stderr."
    }

    fn shape(&self) -> &ArgShape {
        &self.shape
    }

    async fn invoke(&self, args: ToolArgs) -> Result<serde_json::Value> {
        let command = args.str("command").unwrap_or_default();
        let stdout = self.execute_bash(command).await?;
        Ok(json!({ "ok": true, "stdout": stdout }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_execute_bash_success() {
        let dir = tempdir().unwrap();
        let tool = ExecuteBashTool::new(dir.path());

        let result = tool.execute_bash("echo 'hello'").await.unwrap();
        assert_eq!(result.trim(), "hello");
    }

    #[tokio::test]
    async fn test_execute_bash_with_stderr() {
        let dir = tempdir().unwrap();
        let tool = ExecuteBashTool::new(dir.path());

        let result = tool.execute_bash("echo 'test error' >&2; exit 1").await;
        let error_message = result.err().unwrap().to_string();
        assert!(error_message.contains("test error"));
    }

    #[tokio::test]
    async fn test_invoke_wraps_stdout() {
        let dir = tempdir().unwrap();
        let tool = ExecuteBashTool::new(dir.path());
        let args = tool
            .shape()
            .validate(json!({"command": "printf ok"}))
            .unwrap();

        let res = tool.invoke(args).await.unwrap();
        assert_eq!(res, json!({"ok": true, "stdout": "ok"}));
    }
}
