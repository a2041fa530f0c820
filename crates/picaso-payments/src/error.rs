//! Checkout Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout failures, one per provider error category
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// Card declined
    #[error("Card error: {0}")]
    Card(String),

    /// Provider throttling
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Malformed request or rejected input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Provider-side failure
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Could not reach the provider
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Credentials rejected by the provider
    #[error("Provider authentication failed: {0}")]
    Misconfiguration(String),

    /// Local configuration missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CheckoutError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::ProviderOutage(_) | Self::Connectivity(_)
        )
    }

    /// Whether an operator needs to act on this error
    pub const fn requires_operator_alert(&self) -> bool {
        matches!(self, Self::Misconfiguration(_) | Self::Config(_))
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Card(_) => "Payment failed. Please try again.",
            Self::RateLimited(_) => "Too many requests. Please try again shortly.",
            Self::InvalidRequest(_) => "Invalid request. Please check your data.",
            Self::ProviderOutage(_) => "Payment service unavailable. Please try again.",
            Self::Connectivity(_) => "Network error. Please try again.",
            Self::Misconfiguration(_) => "Payment system error. Please contact support.",
            Self::Config(_) => "Service configuration error.",
        }
    }

    /// HTTP status the server responds with
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Card(_) | Self::InvalidRequest(_) => 400,
            Self::RateLimited(_) => 429,
            _ => 500,
        }
    }

    /// Stable machine-readable code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Card(_) => "CARD_ERROR",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ProviderOutage(_) => "PROVIDER_OUTAGE",
            Self::Connectivity(_) => "NETWORK_ERROR",
            Self::Misconfiguration(_) => "PAYMENT_MISCONFIGURED",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}
