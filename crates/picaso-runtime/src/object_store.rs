//! HTTP Object Store
//!
//! Durable storage over plain `PUT {upload_url}/{key}`, the shape shared by
//! S3-compatible presigned buckets and most storage gateways. Object
//! metadata travels as `x-meta-*` headers.

use std::time::Duration;

use async_trait::async_trait;
use picaso_core::persistence::{ObjectStore, ObjectWrite, PersistError};

use crate::error::{required_env, ConfigError};

/// Object store configuration
#[derive(Clone, Debug)]
pub struct ObjectStoreConfig {
    /// Base URL objects are uploaded to
    pub upload_url: String,

    /// Base URL objects are served from
    pub public_url: String,

    /// Optional bearer token for uploads
    pub token: Option<String>,

    pub request_timeout: Duration,
}

impl ObjectStoreConfig {
    pub fn new(upload_url: impl Into<String>) -> Self {
        let upload_url = upload_url.into().trim_end_matches('/').to_string();
        Self {
            public_url: upload_url.clone(),
            upload_url,
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(required_env("PICASO_STORE_UPLOAD_URL")?);
        if let Ok(public) = std::env::var("PICASO_STORE_PUBLIC_URL") {
            config.public_url = public.trim_end_matches('/').to_string();
        }
        config.token = std::env::var("PICASO_STORE_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Ok(config)
    }
}

/// `PUT`-based object store
pub struct HttpObjectStore {
    client: reqwest::Client,
    config: ObjectStoreConfig,
}

impl HttpObjectStore {
    pub fn new(config: ObjectStoreConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn write(&self, object: ObjectWrite) -> Result<String, PersistError> {
        let target = format!("{}/{}", self.config.upload_url, object.key);

        let mut request = self
            .client
            .put(&target)
            .header(reqwest::header::CONTENT_TYPE, &object.content_type);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        for (name, value) in &object.metadata {
            request = request.header(format!("x-meta-{}", name.to_ascii_lowercase()), value);
        }

        let response = request
            .body(object.bytes)
            .send()
            .await
            .map_err(|e| PersistError::StoreUnavailable(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {
                let url = format!("{}/{}", self.config.public_url, object.key);
                tracing::debug!(url = %url, "Object written");
                Ok(url)
            }
            401 | 403 => Err(PersistError::Unauthorized(format!("HTTP {status}"))),
            413 | 507 => Err(PersistError::QuotaExceeded(format!("HTTP {status}"))),
            _ => Err(PersistError::StoreUnavailable(format!("HTTP {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn object() -> ObjectWrite {
        let mut metadata = BTreeMap::new();
        metadata.insert("sourceUrl".into(), "https://gen.example/a.png".into());
        ObjectWrite {
            key: "images/1700000000000-abcdef123456.png".into(),
            bytes: vec![0x89, b'P', b'N', b'G'],
            content_type: "image/png".into(),
            metadata,
        }
    }

    fn store(server: &MockServer) -> HttpObjectStore {
        let mut config = ObjectStoreConfig::new(format!("{}/bucket/", server.uri()));
        config.public_url = "https://cdn.example".into();
        config.token = Some("secret".into());
        HttpObjectStore::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_put_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/bucket/images/\d+-[0-9a-f]{12}\.png$"))
            .and(header("authorization", "Bearer secret"))
            .and(header("content-type", "image/png"))
            .and(header("x-meta-sourceurl", "https://gen.example/a.png"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = store(&server).write(object()).await.unwrap();
        assert_eq!(url, "https://cdn.example/images/1700000000000-abcdef123456.png");
    }

    #[tokio::test]
    async fn test_rejections_are_not_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = store(&server).write(object()).await.unwrap_err();
        assert!(matches!(err, PersistError::Unauthorized(_)));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_full_bucket_is_quota_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(507))
            .mount(&server)
            .await;

        let err = store(&server).write(object()).await.unwrap_err();
        assert!(matches!(err, PersistError::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = store(&server).write(object()).await.unwrap_err();
        assert!(err.is_recoverable());
    }
}
