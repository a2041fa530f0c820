//! OpenAI Image Generator
//!
//! DALL-E 3 via the images API. Returned URLs expire after roughly an hour,
//! so persistence matters more here than for most providers.

use std::time::Duration;

use async_trait::async_trait;
use picaso_core::generation::{GenerationError, GenerationResult, GeneratorInfo, ImageGenerator};
use serde::Deserialize;
use serde_json::json;

use crate::error::{required_env, transport_error, ConfigError};

/// OpenAI provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub size: String,
    pub quality: String,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".into(),
            model: "dall-e-3".into(),
            size: "1024x1024".into(),
            quality: "hd".into(),
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(required_env("OPENAI_API_KEY")?))
    }
}

#[derive(Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

/// OpenAI image generator
pub struct OpenAiImageGenerator {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiImageGenerator {
    pub fn new(config: OpenAiConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(OpenAiConfig::from_env()?)
    }
}

fn classify(status: u16, body: &str) -> GenerationError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let code = detail.as_ref().and_then(|d| d.error.code.as_deref());
    let message = detail
        .as_ref()
        .map_or_else(|| body.to_string(), |d| d.error.message.clone());

    match (status, code) {
        (400, Some("content_policy_violation")) => GenerationError::ContentPolicyViolation(message),
        (429, _) => GenerationError::RateLimited(message),
        _ => GenerationError::Upstream(format!("HTTP {status}: {message}")),
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    fn info(&self) -> GeneratorInfo {
        GeneratorInfo {
            provider: "OpenAI".into(),
            model: self.config.model.clone(),
            urls_expire: true,
        }
    }

    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let url = format!(
            "{}/images/generations",
            self.config.base_url.trim_end_matches('/')
        );
        tracing::info!(model = %self.config.model, "Requesting image from OpenAI");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "prompt": prompt,
                "n": 1,
                "size": self.config.size,
                "quality": self.config.quality,
            }))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status.as_u16(), &body));
        }

        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Upstream(format!("malformed response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or_else(|| GenerationError::Upstream("no image was generated".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OpenAiImageGenerator {
        let mut config = OpenAiConfig::new("sk-test");
        config.base_url = server.uri();
        OpenAiImageGenerator::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_returns_first_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(body_partial_json(json!({ "model": "dall-e-3", "size": "1024x1024", "quality": "hd" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "url": "https://oaidalle.example/img.png" }]
            })))
            .mount(&server)
            .await;

        let url = generator(&server).generate("a red fox").await.unwrap();
        assert_eq!(url, "https://oaidalle.example/img.png");
    }

    #[tokio::test]
    async fn test_content_policy_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": "content_policy_violation", "message": "rejected" }
            })))
            .mount(&server)
            .await;

        let err = generator(&server).generate("x y z").await.unwrap_err();
        assert_eq!(err, GenerationError::ContentPolicyViolation("rejected".into()));
    }

    #[tokio::test]
    async fn test_other_client_errors_are_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": "invalid_size", "message": "bad size" }
            })))
            .mount(&server)
            .await;

        let err = generator(&server).generate("x y z").await.unwrap_err();
        assert!(matches!(err, GenerationError::Upstream(_)));
    }

    #[test]
    fn test_classify_rate_limit_without_json() {
        assert!(matches!(classify(429, "slow down"), GenerationError::RateLimited(_)));
    }
}
