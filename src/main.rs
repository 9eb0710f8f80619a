use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use agent_loop::config::{AppConfig, CliOverrides};
use agent_loop::llm::{
    Agent, DefaultModelSelector, OpenAIClient, RunOptions, RunOutcome, RuntimeSettings,
};
use agent_loop::logging::init_logging;
use agent_loop::tools::builtin_registry;
use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use dotenvy::dotenv;
use tracing::{info, warn};

const TRUNCATED_EXIT_CODE: i32 = 2;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "agent-loop",
    version,
    about = "Run one task through a tool-using LLM agent"
)]
struct Cli {
    /// Task text; read from stdin when omitted
    prompt: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// API key (set via env OPENAI_API_KEY recommended)
    #[arg(long)]
    api_key: Option<String>,

    /// System prompt for the run
    #[arg(long)]
    system: Option<String>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Retries after the first attempt of each model call
    #[arg(long)]
    max_retries: Option<usize>,

    /// Print the model's private reasoning to stderr
    #[arg(long, action = ArgAction::SetTrue)]
    show_thinking: bool,

    /// Log filter (error,warn,info,debug,trace or a full directive)
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, action = ArgAction::SetTrue)]
    log_json: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Directory the built-in file tools are confined to
    #[arg(long)]
    root: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            system_prompt: self.system.clone(),
            max_iterations: self.max_iterations,
            max_retries: self.max_retries,
            project_root: self.root.clone(),
        }
    }
}

fn read_prompt(arg: Option<String>) -> Result<String> {
    let prompt = match arg {
        Some(p) => p,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("read prompt from stdin")?;
            buf
        }
    };
    if prompt.trim().is_empty() {
        bail!("empty prompt");
    }
    Ok(prompt)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.log_json, cli.log_file.as_deref())?;

    let cfg = AppConfig::load(cli.overrides())?;
    info!(base_url = %cfg.base_url, model = ?cfg.model, root = %cfg.project_root.display(), "app config");
    let prompt = read_prompt(cli.prompt.clone())?;

    let api_key = cfg
        .api_key
        .clone()
        .context("no API key: set OPENAI_API_KEY or pass --api-key")?;
    let client = OpenAIClient::new(cfg.base_url.clone(), api_key)?.with_llm_config(cfg.llm.clone());
    let registry = Arc::new(builtin_registry(&cfg.project_root));

    let mut agent = Agent::new(
        Arc::new(client.clone()),
        registry,
        RuntimeSettings::from_config(&cfg),
    )
    .with_selector(Arc::new(DefaultModelSelector::from_config(&cfg)));

    let token = agent.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            token.cancel();
        }
    });

    let opts = RunOptions {
        system_prompt: cfg.agent.system_prompt.clone(),
        ..RunOptions::default()
    };
    let outcome = agent.run(&prompt, opts).await?;

    if cli.show_thinking
        && let Some(thinking) = agent.last_thinking()
    {
        eprintln!("[thinking]\n{thinking}\n");
    }
    println!("{}", outcome.text());
    info!(
        total_tokens = client.get_tokens_used(),
        prompt_tokens = client.get_prompt_tokens_used(),
        "token usage"
    );

    if let RunOutcome::Truncated(t) = &outcome {
        eprintln!("[stopped after {} iterations without a final answer]", t.iterations);
        std::process::exit(TRUNCATED_EXIT_CODE);
    }
    Ok(())
}
