use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_ENV: &str = "AGENT_LOOP_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Filter directive: the explicit level, else `AGENT_LOOP_LOG`, else `info`.
fn filter_directive(level: Option<&str>, env: Option<String>) -> String {
    level
        .map(str::to_string)
        .or(env)
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

/// Installs the global subscriber. Lines go to stderr unless `file` is set.
pub fn init_logging(level: Option<&str>, json: bool, file: Option<&Path>) -> Result<()> {
    let directive = filter_directive(level, std::env::var(LOG_ENV).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let writer = match file {
        Some(path) => {
            let f = std::fs::File::create(path)
                .with_context(|| format!("create log file {}", path.display()))?;
            BoxMakeWriter::new(Arc::new(f))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(file.is_none())
        .with_target(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()?;
    }
    info!(filter = %directive, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_beats_env() {
        assert_eq!(filter_directive(Some("debug"), Some("warn".into())), "debug");
    }

    #[test]
    fn env_used_when_no_level() {
        assert_eq!(
            filter_directive(None, Some("agent_loop=trace".into())),
            "agent_loop=trace"
        );
    }

    #[test]
    fn defaults_to_info() {
        assert_eq!(filter_directive(None, None), "info");
        assert_eq!(filter_directive(Some(" "), None), "info");
    }
}
