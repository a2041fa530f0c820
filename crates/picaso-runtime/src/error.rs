//! Error Types for picaso-runtime

use picaso_core::GenerationError;
use thiserror::Error;

/// Backend configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Read a required, non-empty environment variable
pub(crate) fn required_env(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(var))
}

/// Map a transport-level failure to a generation category
pub(crate) fn transport_error(e: &reqwest::Error) -> GenerationError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        GenerationError::TransientNetwork(e.to_string())
    } else {
        GenerationError::Upstream(e.to_string())
    }
}

/// Whether an upstream message describes a moderation rejection
pub(crate) fn mentions_content_policy(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["content policy", "content_policy", "nsfw", "safety"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Whether an upstream message describes throttling
pub(crate) fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("429")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_classifiers() {
        assert!(mentions_content_policy("NSFW content detected. Try a different prompt."));
        assert!(mentions_content_policy("Blocked by safety checker"));
        assert!(!mentions_content_policy("CUDA out of memory"));
        assert!(mentions_rate_limit("Request was throttled: rate limit reached"));
    }
}
