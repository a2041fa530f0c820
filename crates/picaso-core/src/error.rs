//! Error Types

use thiserror::Error;

use crate::domain::ValidationError;
use crate::generation::GenerationError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Caller-facing pipeline errors
///
/// Raw provider errors are converted into one of these at the pipeline
/// boundary and never cross it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Bad input, rejected before any network call
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Quota denied for the current window
    #[error("Quota exceeded until {reset_at}")]
    QuotaExceeded { reset_at: i64 },

    /// Image generation failed
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Persistence hit a failure no fallback can work around
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Invalid pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Check if re-invoking the pipeline may succeed
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(_) => "Please enter at least 3 words for your prompt.".into(),
            Self::QuotaExceeded { .. } => {
                "You've reached your generation limit. Please try again after the reset.".into()
            }
            Self::Generation(e) => e.user_message().into(),
            Self::Persistence(_) => {
                "We couldn't save your artwork. Please try again later.".into()
            }
            Self::Config(_) => "Service configuration error.".into(),
        }
    }

    /// Stable machine-readable code for API responses
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::Generation(GenerationError::ContentPolicyViolation(_)) => "CONTENT_POLICY",
            Self::Generation(GenerationError::RateLimited(_)) => "RATE_LIMITED",
            Self::Generation(GenerationError::TransientNetwork(_)) => "NETWORK_ERROR",
            Self::Generation(GenerationError::Upstream(_)) => "UPSTREAM_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_follows_generation_category() {
        assert!(PipelineError::Generation(GenerationError::RateLimited("x".into())).is_retryable());
        assert!(!PipelineError::QuotaExceeded { reset_at: 0 }.is_retryable());
        assert!(!PipelineError::Persistence("unauthorized".into()).is_retryable());
    }
}
