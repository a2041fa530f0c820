//! Checkout Sessions
//!
//! Turns a reviewed [`Artwork`] into a hosted-checkout session request and
//! hands it to a [`PaymentSessionService`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use picaso_core::{Artwork, Clock};
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// The printed product on offer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintProduct {
    pub name: String,
    pub description: String,
    /// Price in the smallest currency unit
    pub unit_amount: i64,
    pub currency: String,
    pub sku: String,
    pub size: String,
    pub material: String,
    pub finish: String,
}

impl Default for PrintProduct {
    fn default() -> Self {
        Self {
            name: "Custom AI Art Print (12x12)".into(),
            description: "High-quality AI-generated artwork printed on premium matte canvas with Ayous wood frame".into(),
            unit_amount: 9900,
            currency: "usd".into(),
            sku: "ai-art-print".into(),
            size: "12x12".into(),
            material: "Ayous wood frame".into(),
            finish: "Matte Canvas".into(),
        }
    }
}

/// Checkout configuration
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    /// Public origin the checkout redirects back to
    pub public_url: String,

    /// ISO 3166-1 alpha-2 shipping destinations
    pub allowed_countries: Vec<String>,

    /// Maximum prompt length stored in session metadata, in characters
    pub prompt_limit: usize,

    pub product: PrintProduct,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:3000".into(),
            allowed_countries: vec!["US".into(), "CA".into()],
            prompt_limit: 500,
            product: PrintProduct::default(),
        }
    }
}

impl CheckoutConfig {
    /// Load from `PICASO_PUBLIC_URL` and `PICASO_SHIPPING_COUNTRIES`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("PICASO_PUBLIC_URL") {
            config.public_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(countries) = std::env::var("PICASO_SHIPPING_COUNTRIES") {
            let parsed: Vec<String> = countries
                .split(',')
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.allowed_countries = parsed;
            }
        }
        config
    }

    pub fn success_url(&self) -> String {
        format!("{}/success.html?session_id={{CHECKOUT_SESSION_ID}}", self.public_url)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/review.html", self.public_url)
    }
}

/// Single purchasable line
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub description: String,
    pub unit_amount: i64,
    pub currency: String,
    pub quantity: u64,
    /// Shown next to the line item on the hosted page
    pub image_url: String,
}

/// Provider-neutral session request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub line_item: LineItem,
    pub success_url: String,
    pub cancel_url: String,
    pub allowed_countries: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Created session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    /// Hosted checkout page to redirect the buyer to
    pub url: String,
}

/// Payment provider seam
#[async_trait]
pub trait PaymentSessionService: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession>;
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Builds [`SessionRequest`]s from artworks
pub struct CheckoutRequestBuilder {
    config: CheckoutConfig,
    clock: Arc<dyn Clock>,
}

impl CheckoutRequestBuilder {
    pub fn new(config: CheckoutConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub const fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    pub fn build(&self, artwork: &Artwork) -> Result<SessionRequest> {
        let image_url = artwork.image_url.trim();
        if !(image_url.starts_with("http://") || image_url.starts_with("https://")) {
            return Err(CheckoutError::InvalidRequest("invalid imageUrl format".into()));
        }
        let prompt = artwork.prompt.trim();
        if prompt.is_empty() {
            return Err(CheckoutError::InvalidRequest("prompt is required".into()));
        }

        let product = &self.config.product;
        let generated_at = Utc
            .timestamp_millis_opt(self.clock.now_ms())
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        let mut metadata = BTreeMap::new();
        metadata.insert("prompt".into(), truncate_chars(prompt, self.config.prompt_limit));
        metadata.insert("imageUrl".into(), image_url.to_string());
        metadata.insert("product".into(), product.sku.clone());
        metadata.insert("size".into(), product.size.clone());
        metadata.insert("material".into(), product.material.clone());
        metadata.insert("finish".into(), product.finish.clone());
        metadata.insert("generated_at".into(), generated_at);

        Ok(SessionRequest {
            line_item: LineItem {
                name: product.name.clone(),
                description: product.description.clone(),
                unit_amount: product.unit_amount,
                currency: product.currency.clone(),
                quantity: 1,
                image_url: image_url.to_string(),
            },
            success_url: self.config.success_url(),
            cancel_url: self.config.cancel_url(),
            allowed_countries: self.config.allowed_countries.clone(),
            metadata,
        })
    }
}

/// Builds and submits checkout sessions
pub struct CheckoutService {
    builder: CheckoutRequestBuilder,
    provider: Arc<dyn PaymentSessionService>,
}

impl CheckoutService {
    pub fn new(builder: CheckoutRequestBuilder, provider: Arc<dyn PaymentSessionService>) -> Self {
        Self { builder, provider }
    }

    pub async fn create_checkout(&self, artwork: &Artwork) -> Result<CheckoutSession> {
        let request = self.builder.build(artwork)?;

        match self.provider.create_session(&request).await {
            Ok(session) => {
                tracing::info!(session_id = %session.session_id, "Checkout session created");
                Ok(session)
            }
            Err(e) if e.requires_operator_alert() => {
                tracing::error!(alert = "operator", error = %e, "Payment provider misconfigured, check API keys");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "Checkout session creation failed");
                Err(e)
            }
        }
    }
}
