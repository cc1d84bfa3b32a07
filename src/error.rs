use std::time::Duration;

use thiserror::Error;

/// Failure of a single call to the translation endpoint.
///
/// These are never retried by the protocol layer; the poller treats them as
/// terminal for the current job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timeout ({0}ms exceeded)")]
    Timeout(u64),

    #[error("connection reset, try using a proxy with --proxy")]
    ConnectionReset,

    #[error("request failed with status {0}")]
    HttpStatus(u16),

    #[error("request failed: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum DubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Translation service error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Protocol(String),

    #[error("Translation timeout after {attempts} attempts ({} minutes). Try again later.", minutes(.elapsed))]
    PendingRetryExceeded { attempts: u32, elapsed: Duration },

    #[error("{tool} is not installed. {hint}")]
    ToolMissing { tool: String, hint: String },

    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    ToolTimeout { tool: String, timeout: Duration },

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("{0}")]
    DependencyUnmet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    #[error("Unsupported link: {0}")]
    UnsupportedLink(String),
}

pub type Result<T> = std::result::Result<T, DubError>;

/// Minutes as a plain number: `5`, `2.5`
fn minutes(elapsed: &Duration) -> f64 {
    elapsed.as_secs_f64() / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_exceeded_message_reports_minutes() {
        let err = DubError::PendingRetryExceeded {
            attempts: 10,
            elapsed: Duration::from_millis(300_000),
        };
        assert_eq!(
            err.to_string(),
            "Translation timeout after 10 attempts (5 minutes). Try again later."
        );
    }

    #[test]
    fn test_retry_exceeded_message_keeps_fractional_minutes() {
        let err = DubError::PendingRetryExceeded {
            attempts: 5,
            elapsed: Duration::from_secs(150),
        };
        assert_eq!(
            err.to_string(),
            "Translation timeout after 5 attempts (2.5 minutes). Try again later."
        );
    }

    #[test]
    fn test_transport_error_wraps_into_dub_error() {
        let err: DubError = TransportError::HttpStatus(403).into();
        assert!(err.to_string().contains("status 403"));
    }
}
