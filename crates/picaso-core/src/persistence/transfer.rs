//! Transfer strategy: fetch bytes, re-encode as PNG, write to an object store.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use image::ImageFormat;

use super::{PersistError, PersistenceStrategy, Placement};
use crate::clock::Clock;
use crate::progress::{Checkpoint, CheckpointTracker};

/// Raw bytes fetched from a source URL
#[derive(Clone, Debug)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Fetches image bytes, either directly or through a relay
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, PersistError>;
}

/// One object written to durable storage
#[derive(Clone, Debug)]
pub struct ObjectWrite {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

/// Durable object storage
///
/// Implementations return the public URL of the written object and map
/// authorization or quota rejections to the non-recoverable
/// [`PersistError`] variants.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn write(&self, object: ObjectWrite) -> Result<String, PersistError>;
}

/// Build a unique object key, e.g. `images/1700000000000-3f2a9c81d0e4.png`
pub fn object_key(prefix: &str, now_ms: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}/{now_ms}-{}.png", &suffix[..12])
}

/// Decode arbitrary image bytes and re-encode them as PNG
pub async fn transcode_png(bytes: Vec<u8>) -> Result<Vec<u8>, PersistError> {
    tokio::task::spawn_blocking(move || encode_png(&bytes))
        .await
        .map_err(|e| PersistError::Convert(e.to_string()))?
}

fn encode_png(bytes: &[u8]) -> Result<Vec<u8>, PersistError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| PersistError::Convert(e.to_string()))?;
    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| PersistError::Convert(e.to_string()))?;
    Ok(out.into_inner())
}

/// Fetch, re-encode and upload
///
/// The same strategy serves both the direct and the proxied step; only the
/// fetcher differs.
pub struct TransferStrategy {
    name: String,
    fetcher: Arc<dyn ImageFetcher>,
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl TransferStrategy {
    pub fn new(
        name: impl Into<String>,
        fetcher: Arc<dyn ImageFetcher>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            fetcher,
            store,
            clock,
            key_prefix: "images".into(),
        }
    }

    /// Fetch straight from the source URL
    pub fn direct(
        fetcher: Arc<dyn ImageFetcher>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new("direct", fetcher, store, clock)
    }

    /// Fetch through a relay that sidesteps cross-origin restrictions
    pub fn proxied(
        relay: Arc<dyn ImageFetcher>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new("proxied", relay, store, clock)
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

#[async_trait]
impl PersistenceStrategy for TransferStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(
        &self,
        source_url: &str,
        progress: &mut CheckpointTracker<'_>,
    ) -> Result<Placement, PersistError> {
        progress.reach(Checkpoint::Fetching);
        let fetched = self.fetcher.fetch(source_url).await?;
        tracing::debug!(
            strategy = %self.name,
            bytes = fetched.bytes.len(),
            content_type = ?fetched.content_type,
            "Fetched source image"
        );

        progress.reach(Checkpoint::Converting);
        let png = transcode_png(fetched.bytes).await?;

        progress.reach(Checkpoint::Uploading);
        let now = self.clock.now_ms();
        let uploaded_at = Utc
            .timestamp_millis_opt(now)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        let mut metadata = BTreeMap::new();
        metadata.insert("sourceUrl".to_string(), source_url.to_string());
        metadata.insert("strategy".to_string(), self.name.clone());
        metadata.insert("uploadedAt".to_string(), uploaded_at);

        let url = self
            .store
            .write(ObjectWrite {
                key: object_key(&self.key_prefix, now),
                bytes: png,
                content_type: "image/png".into(),
                metadata,
            })
            .await?;

        Ok(Placement {
            url,
            is_permanent: true,
        })
    }
}

/// Object held by [`MemoryObjectStore`]
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

/// In-memory object store for development and testing
pub struct MemoryObjectStore {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn write(&self, object: ObjectWrite) -> Result<String, PersistError> {
        let url = format!("{}/{}", self.base_url, object.key);
        let mut objects = self
            .objects
            .write()
            .map_err(|_| PersistError::StoreUnavailable("lock poisoned".into()))?;
        objects.insert(
            object.key,
            StoredObject {
                bytes: object.bytes,
                content_type: object.content_type,
                metadata: object.metadata,
            },
        );
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::progress::{NoProgress, ProgressRange};
    use crate::testing::{sample_jpeg, ScriptedFetcher};

    #[test]
    fn test_object_key_shape() {
        let a = object_key("images", 1_700_000_000_000);
        let b = object_key("images", 1_700_000_000_000);

        assert!(a.starts_with("images/1700000000000-"));
        assert!(a.ends_with(".png"));
        assert_eq!(a.len(), "images/1700000000000-".len() + 12 + ".png".len());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_transcode_rejects_garbage() {
        let err = transcode_png(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, PersistError::Convert(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_transfer_converts_jpeg_and_records_metadata() {
        let store = Arc::new(MemoryObjectStore::new("https://store.example/"));
        let strategy = TransferStrategy::direct(
            Arc::new(ScriptedFetcher::ok(sample_jpeg())),
            store.clone(),
            Arc::new(ManualClock::new(1_700_000_000_000)),
        );

        let mut tracker = CheckpointTracker::new(&NoProgress, ProgressRange::new(0, 90));
        let placement = strategy
            .attempt("https://gen.example/fox.jpg", &mut tracker)
            .await
            .unwrap();

        assert!(placement.is_permanent);
        assert_eq!(tracker.reached(), Some(Checkpoint::Uploading));

        let key = placement
            .url
            .strip_prefix("https://store.example/")
            .unwrap();
        let stored = store.get(key).unwrap();
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(
            image::guess_format(&stored.bytes).unwrap(),
            ImageFormat::Png
        );
        assert_eq!(stored.metadata["sourceUrl"], "https://gen.example/fox.jpg");
        assert_eq!(stored.metadata["strategy"], "direct");
        assert!(stored.metadata["uploadedAt"].starts_with("2023-11-14T"));
    }
}
