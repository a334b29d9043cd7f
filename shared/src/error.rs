//! Error types for the marketing insights engine.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can surface from the insights engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Query text, date range or model preference rejected before any network call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The selected model could not produce insights (cause is logged, not surfaced)
    #[error("AI service unavailable. Please try again later.")]
    AiServiceUnavailable,

    /// The end-to-end query deadline elapsed
    #[error("Query timed out after {0} seconds")]
    Timeout(u64),

    /// Cache backend could not be read or written
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Report delivery error
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::AiServiceUnavailable => 503,
            Error::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// Message safe to hand back to a caller.
    ///
    /// Only the caller-facing taxonomy keeps its text; everything else is
    /// collapsed so upstream bodies and connection strings stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Error::InvalidInput(_) | Error::AiServiceUnavailable | Error::Timeout(_) => {
                self.to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::InvalidInput("bad date".into()).status_code(), 400);
        assert_eq!(Error::AiServiceUnavailable.status_code(), 503);
        assert_eq!(Error::Timeout(90).status_code(), 504);
        assert_eq!(Error::Config("missing".into()).status_code(), 500);
    }

    #[test]
    fn test_public_message_hides_internal_detail() {
        let err = Error::Aws("arn:aws:secretsmanager:us-east-1:123:secret:db".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = Error::InvalidInput("Query cannot be empty".into());
        assert_eq!(err.public_message(), "Invalid input: Query cannot be empty");
    }
}
