//! Session State
//!
//! Per-profile identity and the snapshot of the most recent artwork,
//! handed from generation to review and checkout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Artwork;
use crate::store::{KeyValueStore, StoreResult};

/// Store key holding the artwork snapshot
pub const ARTWORK_KEY: &str = "generatedArtwork";

/// Identifies the browser profile that owns quota and snapshot state
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Artwork snapshot for one profile
pub struct ArtworkSession {
    store: Arc<dyn KeyValueStore>,
}

impl ArtworkSession {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn save(&self, artwork: &Artwork) -> StoreResult<()> {
        let encoded = serde_json::to_string(artwork).map_err(|e| {
            crate::store::StoreError::Corrupt {
                key: ARTWORK_KEY.into(),
                reason: e.to_string(),
            }
        })?;
        self.store.set(ARTWORK_KEY, &encoded)
    }

    /// Current snapshot; an undecodable one reads as absent
    pub fn load(&self) -> StoreResult<Option<Artwork>> {
        let Some(raw) = self.store.get(ARTWORK_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(artwork) => Ok(Some(artwork)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable artwork snapshot");
                Ok(None)
            }
        }
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.store.delete(ARTWORK_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FilterCategory, Filters};
    use crate::store::MemoryKeyValueStore;

    fn artwork() -> Artwork {
        Artwork {
            image_url: "https://store.example/images/1-abc.png".into(),
            prompt: "a red fox in snow".into(),
            filters: Filters::new().with(FilterCategory::Tone, "warm"),
            timestamp: 1_700_000_000_000,
            is_permanent: true,
        }
    }

    #[test]
    fn test_save_load_clear() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let session = ArtworkSession::new(store.clone());

        assert_eq!(session.load().unwrap(), None);
        session.save(&artwork()).unwrap();
        assert_eq!(session.load().unwrap(), Some(artwork()));

        let raw = store.get(ARTWORK_KEY).unwrap().unwrap();
        assert!(raw.contains("\"imageUrl\""));
        assert!(raw.contains("\"isPermanent\":true"));

        session.clear().unwrap();
        assert_eq!(session.load().unwrap(), None);
    }

    #[test]
    fn test_corrupt_snapshot_reads_as_absent() {
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(ARTWORK_KEY, "{\"imageUrl\":").unwrap();
        assert_eq!(ArtworkSession::new(store).load().unwrap(), None);
    }
}
