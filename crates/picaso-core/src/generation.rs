//! Image Generator Strategy
//!
//! Common interface for image generation backends (Replicate, OpenAI, ...).
//! Adapters translate their wire-level failures into [`GenerationError`] so
//! the pipeline never inspects provider-specific error payloads.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use picaso_core::generation::ImageGenerator;
//!
//! let generator = ReplicateGenerator::from_env()?;
//! let url = generator.generate("A gallery-quality fox in snow").await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for generation calls
pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

/// Normalized generation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Rejected by the upstream moderation layer
    #[error("Content policy violation: {0}")]
    ContentPolicyViolation(String),

    /// Upstream throttling
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Connectivity problem or timeout
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// Any other non-2xx or malformed response
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl GenerationError {
    /// Check if re-invoking the pipeline may succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::TransientNetwork(_))
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::ContentPolicyViolation(_) => {
                "This prompt violates content policy. Please try a different prompt."
            }
            Self::RateLimited(_) => "Service busy. Please try again in a moment.",
            Self::TransientNetwork(_) => {
                "Failed to generate image. Please check your connection and try again."
            }
            Self::Upstream(_) => "Failed to generate image. Please try again.",
        }
    }

    /// Machine-readable category name
    pub const fn category(&self) -> &'static str {
        match self {
            Self::ContentPolicyViolation(_) => "content_policy",
            Self::RateLimited(_) => "rate_limited",
            Self::TransientNetwork(_) => "transient_network",
            Self::Upstream(_) => "upstream",
        }
    }
}

/// Generator metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorInfo {
    /// Provider name (e.g., "Replicate", "OpenAI")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Whether returned URLs expire on the provider side
    pub urls_expire: bool,
}

/// Strategy trait for image generators
///
/// One call, one attempt. Retrying is the caller's decision.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Provider information
    fn info(&self) -> GeneratorInfo;

    /// Generate an image for the composed prompt and return its URL
    async fn generate(&self, prompt: &str) -> GenerationResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_categories() {
        assert!(GenerationError::RateLimited("429".into()).is_retryable());
        assert!(GenerationError::TransientNetwork("timeout".into()).is_retryable());
        assert!(!GenerationError::ContentPolicyViolation("nsfw".into()).is_retryable());
        assert!(!GenerationError::Upstream("500".into()).is_retryable());
    }

    #[test]
    fn test_user_messages_hide_details() {
        let err = GenerationError::Upstream("raw provider body".into());
        assert!(!err.user_message().contains("raw provider body"));
        assert_eq!(err.category(), "upstream");
    }
}
