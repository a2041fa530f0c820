//! Replicate Image Generator
//!
//! Implementation of `ImageGenerator` on the Replicate predictions API.
//! Requests ask the API to hold the connection open until the prediction
//! settles; predictions still running after that are polled.

use std::time::Duration;

use async_trait::async_trait;
use picaso_core::generation::{GenerationError, GenerationResult, GeneratorInfo, ImageGenerator};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{
    mentions_content_policy, mentions_rate_limit, required_env, transport_error, ConfigError,
};

/// Replicate provider configuration
#[derive(Clone, Debug)]
pub struct ReplicateConfig {
    /// API token
    pub api_token: String,

    /// API base URL
    pub base_url: String,

    /// Model as `owner/name`
    pub model: String,

    /// Delay between status polls
    pub poll_interval: Duration,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Upper bound on polling a prediction that has not settled
    pub max_wait: Duration,
}

impl ReplicateConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: "https://api.replicate.com/v1".into(),
            model: "black-forest-labs/flux-schnell".into(),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(60),
            max_wait: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(required_env("REPLICATE_API_TOKEN")?);
        if let Ok(model) = std::env::var("REPLICATE_MODEL") {
            config.model = model;
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

/// Replicate image generator
pub struct ReplicateGenerator {
    client: reqwest::Client,
    config: ReplicateConfig,
}

impl ReplicateGenerator {
    pub fn new(config: ReplicateConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ReplicateConfig::from_env()?)
    }

    async fn read_prediction(response: reqwest::Response) -> GenerationResult<Prediction> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }
        response
            .json::<Prediction>()
            .await
            .map_err(|e| GenerationError::Upstream(format!("malformed prediction: {e}")))
    }

    /// Poll until the prediction settles or `max_wait` runs out
    async fn settle(&self, prediction: Prediction) -> GenerationResult<Prediction> {
        let id = prediction.id.clone();
        let max_wait = self.config.max_wait;
        tokio::time::timeout(max_wait, self.poll(prediction))
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(id = %id, "Prediction did not settle in time");
                Err(GenerationError::TransientNetwork(format!(
                    "prediction {id} still running after {max_wait:?}"
                )))
            })
    }

    async fn poll(&self, mut prediction: Prediction) -> GenerationResult<Prediction> {
        loop {
            match prediction.status.as_str() {
                "succeeded" | "failed" | "canceled" => return Ok(prediction),
                _ => {}
            }

            let Some(poll_url) = prediction.urls.as_ref().map(|u| u.get.clone()) else {
                return Err(GenerationError::Upstream(format!(
                    "prediction {} is {} with no status URL",
                    prediction.id, prediction.status
                )));
            };

            tracing::debug!(id = %prediction.id, status = %prediction.status, "Polling prediction");
            tokio::time::sleep(self.config.poll_interval).await;

            let response = self
                .client
                .get(&poll_url)
                .bearer_auth(&self.config.api_token)
                .send()
                .await
                .map_err(|e| transport_error(&e))?;
            prediction = Self::read_prediction(response).await?;
        }
    }
}

fn classify_status(status: u16, body: &str) -> GenerationError {
    if status == 429 || mentions_rate_limit(body) {
        GenerationError::RateLimited(format!("HTTP {status}"))
    } else if (400..500).contains(&status) && mentions_content_policy(body) {
        GenerationError::ContentPolicyViolation(body.to_string())
    } else {
        GenerationError::Upstream(format!("HTTP {status}: {body}"))
    }
}

fn first_output_url(output: Option<&Value>) -> Option<String> {
    match output? {
        Value::String(url) => Some(url.clone()),
        Value::Array(items) => items.first()?.as_str().map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl ImageGenerator for ReplicateGenerator {
    fn info(&self) -> GeneratorInfo {
        GeneratorInfo {
            provider: "Replicate".into(),
            model: self.config.model.clone(),
            urls_expire: true,
        }
    }

    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let url = format!(
            "{}/models/{}/predictions",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        tracing::info!(model = %self.config.model, "Requesting image from Replicate");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .header("Prefer", "wait")
            .json(&json!({ "input": { "prompt": prompt } }))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let prediction = Self::read_prediction(response).await?;
        let prediction = self.settle(prediction).await?;

        if prediction.status != "succeeded" {
            let message = prediction
                .error
                .unwrap_or_else(|| format!("prediction {}", prediction.status));
            return Err(if mentions_content_policy(&message) {
                GenerationError::ContentPolicyViolation(message)
            } else {
                GenerationError::Upstream(message)
            });
        }

        first_output_url(prediction.output.as_ref()).ok_or_else(|| {
            GenerationError::Upstream("unexpected response format from image generation service".into())
        })
    }
}
