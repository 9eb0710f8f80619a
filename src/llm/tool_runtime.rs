use std::time::Duration;

use crate::config::AppConfig;
use crate::llm::history::CompressionPolicy;
use crate::llm::tool_execution::retry::BackoffPolicy;
use crate::llm::types::SamplingParams;

const MAX_ITERATIONS: usize = 25;
const MAX_RETRIES: usize = 3;
const TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Limits and policies one agent runs under.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub max_iterations: usize,
    /// Retries after the first attempt of each model call.
    pub max_retries: usize,
    pub retry_protocol_errors: bool,
    pub backoff: BackoffPolicy,
    pub tool_timeout: Duration,
    pub compression: CompressionPolicy,
    pub sampling: SamplingParams,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            max_retries: MAX_RETRIES,
            retry_protocol_errors: false,
            backoff: BackoffPolicy::default(),
            tool_timeout: TOOL_TIMEOUT,
            compression: CompressionPolicy::default(),
            sampling: SamplingParams::default(),
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.agent.max_iterations,
            max_retries: cfg.llm.max_retries,
            retry_protocol_errors: cfg.llm.retry_protocol_errors,
            backoff: BackoffPolicy::from_config(&cfg.llm),
            tool_timeout: Duration::from_millis(cfg.agent.tool_timeout_ms),
            compression: CompressionPolicy {
                max_messages: cfg.agent.compress_max_messages,
                keep_recent: cfg.agent.compress_keep_recent,
                max_tokens: cfg.agent.compress_max_tokens,
            },
            sampling: SamplingParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_values_flow_through() {
        let mut cfg = AppConfig::default();
        cfg.agent.max_iterations = 7;
        cfg.agent.tool_timeout_ms = 1_500;
        cfg.agent.compress_max_tokens = Some(4_000);
        cfg.llm.max_retries = 1;
        cfg.llm.retry_base_ms = 10;

        let s = RuntimeSettings::from_config(&cfg);
        assert_eq!(s.max_iterations, 7);
        assert_eq!(s.max_retries, 1);
        assert_eq!(s.tool_timeout, Duration::from_millis(1_500));
        assert_eq!(s.compression.max_tokens, Some(4_000));
        assert_eq!(s.backoff.base, Duration::from_millis(10));
    }

    #[test]
    fn defaults_match_config_defaults() {
        assert_eq!(
            RuntimeSettings::default(),
            RuntimeSettings::from_config(&AppConfig::default())
        );
    }
}
