use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::llm::types::{ToolDef, ToolFunctionDef};
use crate::tools::shape::{ArgShape, ToolArgs};

/// A capability the model may call by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn shape(&self) -> &ArgShape;

    /// Per-call deadline; `None` uses the dispatcher default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn invoke(&self, args: ToolArgs) -> anyhow::Result<serde_json::Value>;
}

/// Name-keyed set of tools. Shared read-only between agents.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tool`, replacing any tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> &mut Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn shape(&self, name: &str) -> Option<&ArgShape> {
        self.tools.get(name).map(|t| t.shape())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas in the form the chat endpoint expects.
    pub fn tool_defs(&self) -> Vec<ToolDef> {
        self.tools
            .values()
            .map(|t| ToolDef {
                kind: "function".into(),
                function: ToolFunctionDef {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.shape().to_json_schema(),
                },
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A tool backed by an async closure.
pub struct FnTool<F> {
    name: String,
    description: String,
    shape: ArgShape,
    timeout: Option<Duration>,
    f: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    pub fn new(name: &str, description: &str, shape: ArgShape, f: F) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            shape,
            timeout: None,
            f,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn shape(&self) -> &ArgShape {
        &self.shape
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn invoke(&self, args: ToolArgs) -> anyhow::Result<serde_json::Value> {
        (self.f)(args).await
    }
}
