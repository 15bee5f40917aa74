//! Error taxonomy for the generation pipeline

use thiserror::Error;

/// Errors surfaced by providers, the normalizer, and the orchestrator
#[derive(Debug, Error)]
pub enum GenError {
    /// User-initiated abort. Never retried; reported to callers as a
    /// neutral "stopped" outcome rather than a failure.
    #[error("generation cancelled")]
    Cancelled,

    /// Backend failure: nonzero process exit, HTTP error, unreachable host.
    #[error("{0}")]
    Provider(String),

    /// Model output could not be coerced into the expected JSON shape
    /// after all recovery tiers.
    #[error("failed to parse model response: {0}")]
    Format(String),

    /// Structurally valid response missing required semantic fields
    /// (empty title/summary, empty design list).
    #[error("{0}")]
    Validation(String),
}

impl GenError {
    pub fn provider(msg: impl Into<String>) -> Self {
        GenError::Provider(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        GenError::Format(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GenError::Validation(msg.into())
    }

    /// Whether this error is the cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenError::Cancelled)
    }
}

pub type GenResult<T> = Result<T, GenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_detection() {
        assert!(GenError::Cancelled.is_cancelled());
        assert!(!GenError::provider("boom").is_cancelled());
        assert!(!GenError::validation("no designs generated").is_cancelled());
    }

    #[test]
    fn test_format_display_names_parse_failure() {
        let err = GenError::format("expected value at line 1 column 2");
        assert!(err.to_string().contains("failed to parse model response"));
    }
}
