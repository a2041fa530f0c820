//! Image Fetchers
//!
//! Byte fetchers for the transfer strategies: one reads the source URL
//! directly, the other goes through a relay that rewrites cross-origin
//! responses.

use std::time::Duration;

use async_trait::async_trait;
use picaso_core::persistence::{FetchedImage, ImageFetcher, PersistError};

use crate::error::ConfigError;

/// Default relay prefix; the URL-encoded source is appended
pub const DEFAULT_RELAY: &str = "https://corsproxy.io/?url=";

fn build_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<FetchedImage, PersistError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| PersistError::Fetch(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PersistError::Fetch(format!("HTTP {status}")));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(ct) = content_type.as_deref() {
        if !(ct.starts_with("image/") || ct.starts_with("application/octet-stream")) {
            return Err(PersistError::Fetch(format!("unexpected content type {ct}")));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PersistError::Fetch(e.to_string()))?;

    Ok(FetchedImage {
        bytes: bytes.to_vec(),
        content_type,
    })
}

/// Fetch the source URL as-is
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, PersistError> {
        fetch_bytes(&self.client, url).await
    }
}

/// Fetch through a relay prefix such as `https://corsproxy.io/?url=`
pub struct RelayFetcher {
    client: reqwest::Client,
    prefix: String,
}

impl RelayFetcher {
    pub fn new(prefix: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        url::Url::parse(&prefix).map_err(|e| ConfigError::Invalid {
            var: "PICASO_RELAY_URL",
            reason: e.to_string(),
        })?;
        Ok(Self {
            client: build_client(timeout)?,
            prefix,
        })
    }

    /// Relay URL for `source`
    pub fn relay_url(&self, source: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(source.as_bytes()).collect();
        format!("{}{encoded}", self.prefix)
    }
}

#[async_trait]
impl ImageFetcher for RelayFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, PersistError> {
        let relayed = self.relay_url(url);
        tracing::debug!(source = %url, "Fetching through relay");
        fetch_bytes(&self.client, &relayed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_direct_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fox.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1, 2, 3]),
            )
            .mount(&server)
            .await;

        let fetched = HttpImageFetcher::new(TIMEOUT)
            .unwrap()
            .fetch(&format!("{}/fox.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(fetched.bytes, vec![1, 2, 3]);
        assert_eq!(fetched.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_html_error_page_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html>blocked</html>"),
            )
            .mount(&server)
            .await;

        let err = HttpImageFetcher::new(TIMEOUT)
            .unwrap()
            .fetch(&server.uri())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_expired_source_is_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = HttpImageFetcher::new(TIMEOUT)
            .unwrap()
            .fetch(&server.uri())
            .await
            .unwrap_err();
        assert_eq!(err, PersistError::Fetch("HTTP 403 Forbidden".into()));
    }

    #[tokio::test]
    async fn test_relay_encodes_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/relay"))
            .and(query_param("url", "https://gen.example/a b.png?sig=1&x=2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9]))
            .mount(&server)
            .await;

        let relay = RelayFetcher::new(format!("{}/relay?url=", server.uri()), TIMEOUT).unwrap();
        let fetched = relay
            .fetch("https://gen.example/a b.png?sig=1&x=2")
            .await
            .unwrap();
        assert_eq!(fetched.bytes, vec![9]);
    }

    #[test]
    fn test_relay_url_shape() {
        let relay = RelayFetcher::new(DEFAULT_RELAY, TIMEOUT).unwrap();
        assert_eq!(
            relay.relay_url("https://x.io/a.png?s=1"),
            "https://corsproxy.io/?url=https%3A%2F%2Fx.io%2Fa.png%3Fs%3D1"
        );
        assert!(RelayFetcher::new("not a url", TIMEOUT).is_err());
    }
}
