use std::time::Duration;
use thiserror::Error;

/// Comprehensive error categorization for the retrieval pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (permanent failures)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // I/O errors (potentially transient)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors (usually permanent)
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // Network errors (transient - should retry)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Transient upstream failures (429/5xx) surfaced after retries exhausted
    #[error("Request to {source_name} failed with status {status}: {message}")]
    RequestFailed {
        source_name: String,
        status: u16,
        message: String,
    },

    #[error("Rate limit exceeded: retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    // 403 from the institutional source - never retried. The message tells the
    // caller whether credentials were attempted at all.
    #[error("Access denied: {message}")]
    AccessDenied {
        message: String,
        credentials_attempted: bool,
    },

    // Client errors (permanent - don't retry)
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Interactive authentication timed out after {timeout:?}")]
    AuthenticationTimeout { timeout: Duration },

    // MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(String),

    // Server errors (transient - should retry)
    #[error("Service temporarily unavailable: {service} - {reason}")]
    ServiceUnavailable { service: String, reason: String },

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Timeout error: operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    // Parse errors
    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    // General service error
    #[error("Service error: {0}")]
    Service(String),
}

/// Error categorization for retry strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permanent errors - should not retry
    Permanent,
    /// Transient errors - safe to retry
    Transient,
    /// Rate limited - retry with backoff
    RateLimited,
}

impl Error {
    /// Categorize error for retry logic
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            // Permanent errors - don't retry
            Error::Config(_)
            | Error::InvalidInput { .. }
            | Error::AccessDenied { .. }
            | Error::AuthenticationFailed(_)
            | Error::AuthenticationTimeout { .. }
            | Error::Mcp(_)
            | Error::Parse { .. }
            | Error::Serde(_) => ErrorCategory::Permanent,

            // Rate limited - retry with backoff
            Error::RateLimitExceeded { .. } => ErrorCategory::RateLimited,

            // Upstream HTTP failures categorized by status
            Error::RequestFailed { status, .. } => match *status {
                429 => ErrorCategory::RateLimited,
                500..=599 => ErrorCategory::Transient,
                _ => ErrorCategory::Permanent,
            },

            // Transient errors - retry with exponential backoff
            Error::Http(_)
            | Error::ServiceUnavailable { .. }
            | Error::InternalServerError(_)
            | Error::Timeout { .. }
            | Error::Io(_)
            | Error::Service(_) => ErrorCategory::Transient,
        }
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::RateLimited
        )
    }

    /// Stable machine-readable code for the error envelope
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput { .. } => "INVALID_PARAMETERS",
            Error::AccessDenied { .. } => "ACCESS_DENIED",
            Error::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Error::AuthenticationTimeout { .. } => "AUTHENTICATION_TIMEOUT",
            Error::RateLimitExceeded { .. } | Error::RequestFailed { status: 429, .. } => {
                "RATE_LIMITED"
            }
            Error::RequestFailed { .. } | Error::Http(_) => "REQUEST_FAILED",
            Error::Config(_) => "CONFIGURATION_ERROR",
            Error::Parse { .. } => "PARSE_ERROR",
            _ => "SEARCH_EXECUTION_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_is_permanent() {
        let err = Error::AccessDenied {
            message: "no cookies".to_string(),
            credentials_attempted: false,
        };
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_request_failed_categorization() {
        let transient = Error::RequestFailed {
            source_name: "scholar".to_string(),
            status: 503,
            message: "upstream".to_string(),
        };
        assert_eq!(transient.category(), ErrorCategory::Transient);

        let rate_limited = Error::RequestFailed {
            source_name: "scholar".to_string(),
            status: 429,
            message: "slow down".to_string(),
        };
        assert_eq!(rate_limited.category(), ErrorCategory::RateLimited);

        let permanent = Error::RequestFailed {
            source_name: "scholar".to_string(),
            status: 404,
            message: "not found".to_string(),
        };
        assert_eq!(permanent.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn test_error_codes_are_stable() {
        let err = Error::AuthenticationTimeout {
            timeout: Duration::from_secs(300),
        };
        assert_eq!(err.code(), "AUTHENTICATION_TIMEOUT");
    }
}
