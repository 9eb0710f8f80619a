use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::tools::registry::Tool;
use crate::tools::shape::{ArgShape, FieldKind, ToolArgs};

const DEFAULT_LIST_DEPTH: usize = 1;

/// Resolves `rel` under `root`, refusing anything that escapes it.
fn resolve_in_root(root: &Path, rel: &str) -> Result<PathBuf> {
    let root_canon = root.canonicalize().context("canonicalize root")?;
    let candidate = if Path::new(rel).is_absolute() {
        PathBuf::from(rel)
    } else {
        root_canon.join(rel)
    };
    let canon = candidate
        .canonicalize()
        .with_context(|| format!("canonicalize {rel}"))?;
    if !canon.starts_with(&root_canon) {
        bail!("path escapes project root");
    }
    Ok(canon)
}

pub struct ReadFileTool {
    root: PathBuf,
    shape: ArgShape,
}

impl ReadFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shape: ArgShape::new()
                .required("path", FieldKind::String, "File path relative to the project root")
                .optional("offset", FieldKind::Integer, "First line to return (0-based)")
                .optional("limit", FieldKind::Integer, "Maximum number of lines to return"),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a text file inside the project root. Use offset and limit to read a window of lines from large files."
    }

    fn shape(&self) -> &ArgShape {
        &self.shape
    }

    async fn invoke(&self, args: ToolArgs) -> Result<serde_json::Value> {
        let rel = args.str("path").unwrap_or_default();
        let path = resolve_in_root(&self.root, rel)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("metadata {}", path.display()))?;
        if !meta.is_file() {
            bail!("not a file: {rel}");
        }
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let total_lines = text.lines().count();
        let content = match (args.i64("offset"), args.i64("limit")) {
            (None, None) => text,
            (offset, limit) => text
                .lines()
                .skip(offset.unwrap_or(0).max(0) as usize)
                .take(limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        Ok(json!({ "path": rel, "content": content, "total_lines": total_lines }))
    }
}

pub struct ListDirTool {
    root: PathBuf,
    shape: ArgShape,
}

impl ListDirTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shape: ArgShape::new()
                .optional("path", FieldKind::String, "Directory relative to the project root")
                .optional("max_depth", FieldKind::Integer, "Recursion depth, default 1")
                .optional("pattern", FieldKind::String, "Glob applied to file names"),
        }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "Lists files and directories under a path inside the project root, honoring .gitignore. Optionally filters names by a glob pattern."
    }

    fn shape(&self) -> &ArgShape {
        &self.shape
    }

    async fn invoke(&self, args: ToolArgs) -> Result<serde_json::Value> {
        let rel = args.str("path").unwrap_or(".").to_string();
        let max_depth = args
            .i64("max_depth")
            .map(|d| d.max(1) as usize)
            .unwrap_or(DEFAULT_LIST_DEPTH);
        let pattern = args
            .str("pattern")
            .map(glob::Pattern::new)
            .transpose()
            .context("invalid glob pattern")?;
        let root = self.root.clone();

        let entries = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let root_canon = root.canonicalize().context("canonicalize root")?;
            let dir = resolve_in_root(&root, &rel)?;
            let mut out = Vec::new();
            for entry in ignore::WalkBuilder::new(&dir)
                .max_depth(Some(max_depth))
                .build()
                .filter_map(|e| e.ok())
            {
                if entry.depth() == 0 {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if let Some(p) = &pattern
                    && !p.matches(&name)
                {
                    continue;
                }
                let shown = entry
                    .path()
                    .strip_prefix(&root_canon)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .to_string();
                out.push(shown);
            }
            out.sort();
            Ok(out)
        })
        .await
        .context("list_dir task failed")??;

        Ok(json!({ "entries": entries }))
    }
}
