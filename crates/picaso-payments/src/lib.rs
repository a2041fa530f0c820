//! # picaso-payments
//!
//! Checkout for printed artworks through Stripe's hosted checkout page.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │   Review    │────▶│  Stripe Hosted  │────▶│ success.html     │
//! │   (artwork) │     │  Checkout Page  │     │ or review.html   │
//! └─────────────┘     └─────────────────┘     └──────────────────┘
//! ```
//!
//! [`CheckoutRequestBuilder`] turns an `Artwork` into a provider-neutral
//! [`SessionRequest`]; [`StripeClient`] submits it. Completion and cancel
//! handling decide what happens to the artwork snapshot afterwards.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use picaso_payments::{CheckoutConfig, CheckoutRequestBuilder, CheckoutService, StripeClient};
//!
//! let builder = CheckoutRequestBuilder::new(CheckoutConfig::from_env(), clock);
//! let service = CheckoutService::new(builder, Arc::new(StripeClient::from_env()?));
//!
//! let session = service.create_checkout(&artwork).await?;
//! // Redirect the buyer to: session.url
//! ```

mod checkout;
mod completion;
mod error;
mod stripe_checkout;

pub use checkout::{
    CheckoutConfig, CheckoutRequestBuilder, CheckoutService, CheckoutSession, LineItem,
    PaymentSessionService, PrintProduct, SessionRequest,
};
pub use completion::{
    estimated_delivery, handle_cancel, handle_success, CancelNotice, OrderConfirmation,
    DELIVERY_BUSINESS_DAYS,
};
pub use error::{CheckoutError, Result};
pub use stripe_checkout::{classify as classify_stripe_error, StripeClient};
