//! Blob storage for uploaded PDFs
//!
//! Provides:
//! - The `BlobStore` abstraction the lifecycle manager writes through
//! - Supabase Storage over its REST API
//! - An in-process store for development and tests
//! - Storage key construction

mod memory;
mod supabase;

pub use memory::MemoryBlobStore;
pub use supabase::SupabaseBlobStore;

use crate::errors::Result;
use crate::records::RecordId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A blob as reported by a store listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub key: String,
    pub size: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Storage key for a record's PDF, unique per upload.
///
/// The random suffix keeps two uploads for one record in the same
/// millisecond from landing on the same object.
pub fn blob_key(id: &RecordId, unix_millis: i64) -> String {
    format!("study-{}-{}-{}.pdf", id, unix_millis, Uuid::new_v4().simple())
}

/// Object storage holding one public bucket of PDFs
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return its public URL
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Public URL a stored key resolves at
    fn public_url(&self, key: &str) -> String;

    /// Recover the key from a URL produced by `public_url`.
    ///
    /// `None` for URLs that point somewhere else.
    fn key_from_url(&self, url: &str) -> Option<String> {
        let prefix = self.public_url("");
        let encoded = url.strip_prefix(prefix.as_str())?;
        if encoded.is_empty() {
            return None;
        }
        urlencoding::decode(encoded).ok().map(|key| key.into_owned())
    }

    /// Remove a stored key
    async fn remove(&self, key: &str) -> Result<()>;

    /// Every blob in the bucket
    async fn list(&self) -> Result<Vec<StoredBlob>>;

    /// Create the bucket as public and PDF-only when it does not exist yet
    async fn ensure_bucket(&self) -> Result<()> {
        Ok(())
    }
}
