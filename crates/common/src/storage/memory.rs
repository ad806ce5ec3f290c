//! In-process blob store

use super::{BlobStore, StoredBlob};
use crate::errors::{AppError, Result, StoreKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct MemoryBlob {
    bytes: Vec<u8>,
    content_type: String,
    created_at: DateTime<Utc>,
}

/// Blob store keeping every object in a map
pub struct MemoryBlobStore {
    public_base: String,
    blobs: RwLock<BTreeMap<String, MemoryBlob>>,
}

impl MemoryBlobStore {
    /// `public_base` is the URL prefix keys are served under
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into().trim_end_matches('/').to_string(),
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Stored bytes for a key
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(key).map(|b| b.bytes.clone())
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.read().await.get(key).map(|b| b.content_type.clone())
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.blobs.read().await.contains_key(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Insert a blob with an explicit creation time
    pub async fn insert_at(&self, key: &str, bytes: Vec<u8>, created_at: DateTime<Utc>) {
        self.blobs.write().await.insert(
            key.to_string(),
            MemoryBlob {
                bytes,
                content_type: crate::records::PDF_CONTENT_TYPE.to_string(),
                created_at,
            },
        );
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://papers")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(key) {
            return Err(AppError::upstream(
                StoreKind::BlobStore,
                format!("object {} already exists", key),
            ));
        }

        blobs.insert(
            key.to_string(),
            MemoryBlob {
                bytes,
                content_type: content_type.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, urlencoding::encode(key))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match self.blobs.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(AppError::upstream(
                StoreKind::BlobStore,
                format!("object {} not found", key),
            )),
        }
    }

    async fn list(&self) -> Result<Vec<StoredBlob>> {
        Ok(self
            .blobs
            .read()
            .await
            .iter()
            .map(|(key, blob)| StoredBlob {
                key: key.clone(),
                size: Some(blob.bytes.len() as u64),
                created_at: Some(blob.created_at),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_upload_then_remove() {
        let store = MemoryBlobStore::default();

        let url = assert_ok!(store.upload("a.pdf", b"%PDF".to_vec(), "application/pdf").await);
        assert_eq!(url, "memory://papers/a.pdf");
        assert_eq!(store.get("a.pdf").await, Some(b"%PDF".to_vec()));
        assert_eq!(store.content_type("a.pdf").await.as_deref(), Some("application/pdf"));

        assert_ok!(store.remove("a.pdf").await);
        assert!(!store.contains("a.pdf").await);
        assert_err!(store.remove("a.pdf").await);
    }

    #[tokio::test]
    async fn test_upload_does_not_overwrite() {
        let store = MemoryBlobStore::default();
        store.upload("a.pdf", vec![1], "application/pdf").await.unwrap();

        let err = assert_err!(store.upload("a.pdf", vec![2], "application/pdf").await);
        assert!(err.is_upstream());
        assert_eq!(store.get("a.pdf").await, Some(vec![1]));
    }

    #[tokio::test]
    async fn test_list_reports_size_and_age() {
        let store = MemoryBlobStore::default();
        let then = Utc::now() - chrono::Duration::hours(2);
        store.insert_at("old.pdf", vec![0; 3], then).await;

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, Some(3));
        assert_eq!(listed[0].created_at, Some(then));
    }
}
