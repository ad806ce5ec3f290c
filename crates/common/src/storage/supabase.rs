//! Supabase Storage over its REST API

use super::{BlobStore, StoredBlob};
use crate::config::StorageConfig;
use crate::errors::{AppError, Result, StoreKind};
use crate::records::PDF_CONTENT_TYPE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const LIST_PAGE_SIZE: usize = 1000;

/// Blob store backed by a public Supabase Storage bucket
pub struct SupabaseBlobStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Serialize)]
struct CreateBucket<'a> {
    id: &'a str,
    name: &'a str,
    public: bool,
    allowed_mime_types: [&'static str; 1],
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    /// Folder placeholders come back without an id
    id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    metadata: Option<ObjectMetadata>,
}

#[derive(Deserialize)]
struct ObjectMetadata {
    size: Option<u64>,
}

impl SupabaseBlobStore {
    /// Create a client from storage configuration
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let service_key = config
            .service_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "storage.service_key is required for the supabase driver".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            service_key,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(key)
        )
    }

    fn list_url(&self) -> String {
        format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket)
    }

    fn bucket_url(&self) -> String {
        format!("{}/storage/v1/bucket", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", &self.service_key)
    }

    /// Turn a non-2xx response into an upstream error carrying status and body
    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::upstream(
            StoreKind::BlobStore,
            format!("{} failed with {}: {}", action, status, body),
        ))
    }
}

#[async_trait]
impl BlobStore for SupabaseBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let size = bytes.len();
        let response = self
            .authorized(self.client.post(self.object_url(key)))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        Self::check(response, "upload").await?;

        tracing::debug!(blob_key = %key, size, bucket = %self.bucket, "Blob uploaded");
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(key)
        )
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.object_url(key)))
            .send()
            .await?;
        Self::check(response, "remove").await?;

        tracing::debug!(blob_key = %key, bucket = %self.bucket, "Blob removed");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredBlob>> {
        let mut blobs = Vec::new();
        let mut offset = 0;

        loop {
            let request = ListRequest {
                prefix: "",
                limit: LIST_PAGE_SIZE,
                offset,
                sort_by: SortBy {
                    column: "name",
                    order: "asc",
                },
            };

            let response = self
                .authorized(self.client.post(self.list_url()))
                .json(&request)
                .send()
                .await?;
            let page: Vec<ListedObject> = Self::check(response, "list").await?.json().await?;
            let fetched = page.len();

            blobs.extend(page.into_iter().filter(|o| o.id.is_some()).map(|o| StoredBlob {
                key: o.name,
                size: o.metadata.and_then(|m| m.size),
                created_at: o.created_at,
            }));

            if fetched < LIST_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }

        Ok(blobs)
    }

    async fn ensure_bucket(&self) -> Result<()> {
        let lookup = format!("{}/{}", self.bucket_url(), self.bucket);
        let response = self
            .authorized(self.client.get(lookup))
            .send()
            .await?;

        // Storage answers a missing bucket with 400 or 404
        match response.status() {
            status if status.is_success() => {
                tracing::debug!(bucket = %self.bucket, "Bucket exists");
                return Ok(());
            }
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {}
            _ => {
                Self::check(response, "bucket lookup").await?;
                return Ok(());
            }
        }

        let request = CreateBucket {
            id: &self.bucket,
            name: &self.bucket,
            public: true,
            allowed_mime_types: [PDF_CONTENT_TYPE],
        };
        let response = self
            .authorized(self.client.post(self.bucket_url()))
            .json(&request)
            .send()
            .await?;
        Self::check(response, "bucket create").await?;

        tracing::info!(bucket = %self.bucket, "Bucket created");
        Ok(())
    }
}
