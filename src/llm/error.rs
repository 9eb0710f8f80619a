use reqwest::StatusCode;
use thiserror::Error;

use crate::llm::history::HistoryError;

/// Failure of a single exchange with the inference service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The service could not be reached in time: network fault, timeout,
    /// abort, or an overloaded/unavailable status. Retryable.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },
    /// The service answered, but the exchange is unusable as-is.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Maps a non-success HTTP status to the error kind the retry policy acts on.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = format!("chat error: {} - {}", status, body.trim());
        if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            Self::Transport {
                message,
                status: Some(status.as_u16()),
            }
        } else {
            Self::Protocol(message)
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Protocol(format!("decode response: {e}"));
        }
        Self::Transport {
            message: e.to_string(),
            status: e.status().map(|s| s.as_u16()),
        }
    }
}

/// Why a run ended without an answer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    /// A model call failed in a way that is not retried.
    #[error("model call failed: {0}")]
    Gateway(GatewayError),

    #[error("model call failed after {attempts} attempts: {last}")]
    RetryExhausted { attempts: usize, last: GatewayError },

    #[error("run cancelled")]
    Cancelled,

    #[error("no model selected and none configured")]
    NoModel,

    #[error(transparent)]
    History(#[from] HistoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_are_transport() {
        for code in [408u16, 429, 500, 502, 503] {
            let st = StatusCode::from_u16(code).unwrap();
            let err = GatewayError::from_status(st, "busy");
            assert!(err.is_transport(), "{code} should be transport");
        }
    }

    #[test]
    fn client_errors_are_protocol() {
        let err = GatewayError::from_status(StatusCode::BAD_REQUEST, "bad field");
        assert_eq!(
            err,
            GatewayError::Protocol("chat error: 400 Bad Request - bad field".into())
        );
    }

    #[test]
    fn exhausted_retries_report_attempts_and_cause() {
        let err = AgentError::RetryExhausted {
            attempts: 4,
            last: GatewayError::transport("connection reset"),
        };
        assert_eq!(
            err.to_string(),
            "model call failed after 4 attempts: transport error: connection reset"
        );
    }
}
