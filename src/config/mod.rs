use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PROJECT_CONFIG_DIR: &str = ".agent-loop";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub project_root: PathBuf,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            api_key: None,
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub connect_timeout_ms: u64,
    /// Hard deadline for one model call, body included.
    pub request_timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub retry_base_ms: u64,
    pub retry_multiplier: f64,
    pub retry_max_delay_ms: u64,
    /// Jitter as a fraction of the computed delay, applied in both directions.
    pub retry_jitter: f64,
    pub retry_protocol_errors: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 120_000,
            max_retries: 3,
            retry_base_ms: 500,
            retry_multiplier: 2.0,
            retry_max_delay_ms: 30_000,
            retry_jitter: 0.2,
            retry_protocol_errors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub tool_timeout_ms: u64,
    pub compress_max_messages: usize,
    pub compress_keep_recent: usize,
    pub compress_max_tokens: Option<usize>,
    pub system_prompt: Option<String>,
    pub models: Vec<String>,
    pub model_rules: Vec<ModelRule>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tool_timeout_ms: 60_000,
            compress_max_messages: 50,
            compress_keep_recent: 30,
            compress_max_tokens: None,
            system_prompt: None,
            models: vec![],
            model_rules: vec![],
        }
    }
}

/// Picks `model` when the task text contains `keyword` (case-insensitive).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelRule {
    pub keyword: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub llm: Option<PartialLlmConfig>,
    pub agent: Option<PartialAgentConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialLlmConfig {
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub retry_base_ms: Option<u64>,
    pub retry_multiplier: Option<f64>,
    pub retry_max_delay_ms: Option<u64>,
    pub retry_jitter: Option<f64>,
    pub retry_protocol_errors: Option<bool>,
}

impl PartialLlmConfig {
    /// Fields set here win over `other`.
    fn or(self, other: Self) -> Self {
        Self {
            connect_timeout_ms: self.connect_timeout_ms.or(other.connect_timeout_ms),
            request_timeout_ms: self.request_timeout_ms.or(other.request_timeout_ms),
            max_retries: self.max_retries.or(other.max_retries),
            retry_base_ms: self.retry_base_ms.or(other.retry_base_ms),
            retry_multiplier: self.retry_multiplier.or(other.retry_multiplier),
            retry_max_delay_ms: self.retry_max_delay_ms.or(other.retry_max_delay_ms),
            retry_jitter: self.retry_jitter.or(other.retry_jitter),
            retry_protocol_errors: self.retry_protocol_errors.or(other.retry_protocol_errors),
        }
    }

    fn resolve(self) -> LlmConfig {
        let d = LlmConfig::default();
        LlmConfig {
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(d.connect_timeout_ms),
            request_timeout_ms: self.request_timeout_ms.unwrap_or(d.request_timeout_ms),
            max_retries: self.max_retries.unwrap_or(d.max_retries),
            retry_base_ms: self.retry_base_ms.unwrap_or(d.retry_base_ms),
            retry_multiplier: self.retry_multiplier.unwrap_or(d.retry_multiplier),
            retry_max_delay_ms: self.retry_max_delay_ms.unwrap_or(d.retry_max_delay_ms),
            retry_jitter: self.retry_jitter.unwrap_or(d.retry_jitter),
            retry_protocol_errors: self
                .retry_protocol_errors
                .unwrap_or(d.retry_protocol_errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialAgentConfig {
    pub max_iterations: Option<usize>,
    pub tool_timeout_ms: Option<u64>,
    pub compress_max_messages: Option<usize>,
    pub compress_keep_recent: Option<usize>,
    pub compress_max_tokens: Option<usize>,
    pub system_prompt: Option<String>,
    pub models: Option<Vec<String>>,
    pub model_rules: Option<Vec<ModelRule>>,
}

impl PartialAgentConfig {
    fn or(self, other: Self) -> Self {
        Self {
            max_iterations: self.max_iterations.or(other.max_iterations),
            tool_timeout_ms: self.tool_timeout_ms.or(other.tool_timeout_ms),
            compress_max_messages: self.compress_max_messages.or(other.compress_max_messages),
            compress_keep_recent: self.compress_keep_recent.or(other.compress_keep_recent),
            compress_max_tokens: self.compress_max_tokens.or(other.compress_max_tokens),
            system_prompt: self.system_prompt.or(other.system_prompt),
            models: self.models.or(other.models),
            model_rules: self.model_rules.or(other.model_rules),
        }
    }

    fn resolve(self) -> AgentConfig {
        let d = AgentConfig::default();
        AgentConfig {
            max_iterations: self.max_iterations.unwrap_or(d.max_iterations),
            tool_timeout_ms: self.tool_timeout_ms.unwrap_or(d.tool_timeout_ms),
            compress_max_messages: self.compress_max_messages.unwrap_or(d.compress_max_messages),
            compress_keep_recent: self.compress_keep_recent.unwrap_or(d.compress_keep_recent),
            compress_max_tokens: self.compress_max_tokens.or(d.compress_max_tokens),
            system_prompt: self.system_prompt.or(d.system_prompt),
            models: self.models.unwrap_or(d.models),
            model_rules: self.model_rules.unwrap_or(d.model_rules),
        }
    }
}

/// Values supplied on the command line; `None` defers to the lower layers.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub max_iterations: Option<usize>,
    pub max_retries: Option<usize>,
    pub project_root: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(cli: CliOverrides) -> Result<Self> {
        let cwd = std::env::current_dir().context("resolve current dir")?;
        let project_cfg = load_project_config(&cwd).unwrap_or_default();
        let file_cfg = load_file_config().unwrap_or_default();
        let env = EnvOverrides::from_process();
        Ok(Self::merge(cli, env, project_cfg, file_cfg, cwd))
    }

    /// Priority: CLI, then environment, then project file, then user file.
    fn merge(
        cli: CliOverrides,
        env: EnvOverrides,
        project_cfg: FileConfig,
        file_cfg: FileConfig,
        cwd: PathBuf,
    ) -> Self {
        let base_url = cli
            .base_url
            .or(env.base_url)
            .or(project_cfg.base_url)
            .or(file_cfg.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = cli
            .model
            .or(env.model)
            .or(project_cfg.model)
            .or(file_cfg.model);
        let api_key = cli
            .api_key
            .or(env.api_key)
            .or(project_cfg.api_key)
            .or(file_cfg.api_key);

        let mut llm = project_cfg
            .llm
            .unwrap_or_default()
            .or(file_cfg.llm.unwrap_or_default())
            .resolve();
        if let Some(n) = cli.max_retries {
            llm.max_retries = n;
        }

        let mut agent = project_cfg
            .agent
            .unwrap_or_default()
            .or(file_cfg.agent.unwrap_or_default())
            .resolve();
        if let Some(n) = cli.max_iterations {
            agent.max_iterations = n;
        }
        if cli.system_prompt.is_some() {
            agent.system_prompt = cli.system_prompt;
        }

        Self {
            base_url,
            model,
            api_key,
            project_root: cli.project_root.unwrap_or(cwd),
            llm,
            agent,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
}

impl EnvOverrides {
    fn from_process() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        Self {
            base_url: var("OPENAI_BASE_URL"),
            model: var("OPENAI_MODEL"),
            api_key: var("OPENAI_API_KEY"),
        }
    }
}

fn parse_config_file(path: &Path) -> Result<Option<FileConfig>> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    match toml::from_str::<FileConfig>(&s) {
        Ok(cfg) => {
            info!(path=%path.display(), "loaded config file");
            Ok(Some(cfg))
        }
        Err(e) => {
            warn!(path=%path.display(), error=%e.to_string(), "parse config failed");
            Ok(None)
        }
    }
}

/// Load the user-level configuration file.
pub fn load_file_config() -> Result<FileConfig> {
    let mut candidates = Vec::new();
    if let Ok(p) = std::env::var("AGENT_LOOP_CONFIG") {
        candidates.push(PathBuf::from(p));
    }
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("agent-loop").join("config.toml"));
    }

    for p in candidates {
        if p.exists()
            && let Some(cfg) = parse_config_file(&p)?
        {
            return Ok(cfg);
        }
    }
    Ok(FileConfig::default())
}

/// Load project-specific configuration from .agent-loop/config.toml
pub fn load_project_config(project_root: &Path) -> Result<FileConfig> {
    let path = project_root.join(PROJECT_CONFIG_DIR).join("config.toml");
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    Ok(parse_config_file(&path)?.unwrap_or_default())
}

#[cfg(test)]
mod tests;
