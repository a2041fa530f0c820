//! Stripe Checkout Integration
//!
//! Hosted checkout: the buyer is redirected to Stripe's page and back to the
//! configured success or cancel URL.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionBillingAddressCollection,
    CheckoutSessionMode, Client, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionPaymentMethodTypes, CreateCheckoutSessionShippingAddressCollection,
    Currency, ErrorType, StripeError,
};

use crate::checkout::{CheckoutSession, PaymentSessionService, SessionRequest};
use crate::error::{CheckoutError, Result};

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Create from `STRIPE_SECRET_KEY`
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| CheckoutError::Config("STRIPE_SECRET_KEY not set".into()))?;
        Ok(Self::new(&secret_key))
    }
}

/// Parse a lowercase or uppercase code into one of Stripe's string enums
fn stripe_enum<T: DeserializeOwned>(code: &str, what: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(code.to_string()))
        .map_err(|_| CheckoutError::Config(format!("unsupported {what} '{code}'")))
}

/// Map a Stripe failure onto the checkout taxonomy
pub fn classify(error: StripeError) -> CheckoutError {
    match error {
        StripeError::Stripe(request) => {
            let message = request
                .message
                .clone()
                .unwrap_or_else(|| format!("HTTP {}", request.http_status));
            match request.error_type {
                ErrorType::Card => CheckoutError::Card(message),
                ErrorType::RateLimit => CheckoutError::RateLimited(message),
                ErrorType::InvalidRequest => CheckoutError::InvalidRequest(message),
                ErrorType::Authentication => CheckoutError::Misconfiguration(message),
                ErrorType::Connection => CheckoutError::Connectivity(message),
                _ if request.http_status == 429 => CheckoutError::RateLimited(message),
                _ => CheckoutError::ProviderOutage(message),
            }
        }
        StripeError::Timeout => CheckoutError::Connectivity("request timed out".into()),
        StripeError::ClientError(message) => CheckoutError::Connectivity(message),
        other => CheckoutError::ProviderOutage(other.to_string()),
    }
}

#[async_trait]
impl PaymentSessionService for StripeClient {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession> {
        let item = &request.line_item;
        let currency: Currency = stripe_enum(&item.currency.to_ascii_lowercase(), "currency")?;
        let allowed_countries = request
            .allowed_countries
            .iter()
            .map(|c| stripe_enum(&c.to_ascii_uppercase(), "shipping country"))
            .collect::<Result<Vec<_>>>()?;

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.billing_address_collection = Some(CheckoutSessionBillingAddressCollection::Auto);
        params.shipping_address_collection = Some(CreateCheckoutSessionShippingAddressCollection {
            allowed_countries,
        });
        params.metadata = Some(
            request
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>(),
        );
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(item.quantity),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency,
                unit_amount: Some(item.unit_amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: item.name.clone(),
                    description: Some(item.description.clone()),
                    images: Some(vec![item.image_url.clone()]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(classify)?;

        let url = session
            .url
            .ok_or_else(|| CheckoutError::ProviderOutage("no checkout URL returned".into()))?;

        Ok(CheckoutSession {
            session_id: session.id.to_string(),
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stripe::{CreateCheckoutSessionShippingAddressCollectionAllowedCountries, RequestError};

    fn request_error(kind: &str, message: &str) -> StripeError {
        let error: RequestError =
            serde_json::from_value(json!({ "type": kind, "message": message })).unwrap();
        StripeError::Stripe(error)
    }

    #[test]
    fn test_classify_provider_categories() {
        assert!(matches!(
            classify(request_error("card_error", "Your card was declined.")),
            CheckoutError::Card(_)
        ));
        assert!(matches!(
            classify(request_error("rate_limit_error", "slow down")),
            CheckoutError::RateLimited(_)
        ));
        assert!(matches!(
            classify(request_error("invalid_request_error", "bad param")),
            CheckoutError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify(request_error("api_error", "oops")),
            CheckoutError::ProviderOutage(_)
        ));
        assert!(matches!(
            classify(request_error("authentication_error", "Invalid API Key provided")),
            CheckoutError::Misconfiguration(_)
        ));
        assert!(matches!(classify(StripeError::Timeout), CheckoutError::Connectivity(_)));
    }

    #[test]
    fn test_string_enums() {
        let currency: Currency = stripe_enum("usd", "currency").unwrap();
        assert_eq!(currency, Currency::USD);

        let country: CreateCheckoutSessionShippingAddressCollectionAllowedCountries =
            stripe_enum("CA", "shipping country").unwrap();
        assert_eq!(
            serde_json::to_value(country).unwrap(),
            json!("CA")
        );
        assert!(stripe_enum::<Currency>("zzz", "currency").is_err());
    }
}
