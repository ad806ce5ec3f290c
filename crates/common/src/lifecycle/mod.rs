//! Record lifecycle manager
//!
//! Keeps a `studies` row and its PDF blob consistent across create, update
//! and delete. The two stores share no transaction, so every operation runs
//! its steps in a fixed order:
//!
//! - a new blob is uploaded before any row references it
//! - an old blob is removed only after the row stops referencing it
//!
//! A failed step aborts the operation unless the row is already in its final
//! state. Cleanup failures after that point are logged as orphaned blobs and
//! swallowed. `reconcile::sweep` removes such blobs out of band, and
//! `import::import_studies` loads the legacy catalogue through `create`.

pub mod import;
pub mod reconcile;

use crate::config::AppConfig;
use crate::errors::{AppError, Result, StoreKind};
use crate::metrics;
use crate::records::{
    ListOrder, PdfUpload, RecordId, RecordInput, RecordPatch, RecordStore, ResearchRecord,
    PDF_CONTENT_TYPE,
};
use crate::storage::{blob_key, BlobStore};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Why a blob was left without an owning record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanReason {
    InsertFailed,
    UpdateFailed,
    OldBlobCleanupFailed,
    DeleteCleanupFailed,
}

impl OrphanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrphanReason::InsertFailed => "insert_failed",
            OrphanReason::UpdateFailed => "update_failed",
            OrphanReason::OldBlobCleanupFailed => "old_blob_cleanup_failed",
            OrphanReason::DeleteCleanupFailed => "delete_cleanup_failed",
        }
    }
}

/// A blob uploaded during the current operation
struct UploadedBlob {
    key: String,
    url: String,
}

/// Sole writer of research records and their PDFs
#[derive(Clone)]
pub struct RecordLifecycle {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    call_timeout: Duration,
    max_upload_bytes: usize,
}

impl RecordLifecycle {
    pub fn new(records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let defaults = AppConfig::default();
        Self {
            records,
            blobs,
            call_timeout: defaults.call_timeout(),
            max_upload_bytes: defaults.server.max_upload_bytes,
        }
    }

    pub fn from_config(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: &AppConfig,
    ) -> Self {
        Self::new(records, blobs)
            .with_call_timeout(config.call_timeout())
            .with_max_upload_bytes(config.server.max_upload_bytes)
    }

    /// Bound applied to every individual store call
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn records(&self) -> Arc<dyn RecordStore> {
        self.records.clone()
    }

    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        self.blobs.clone()
    }

    /// Create a record, uploading its PDF first when one is given
    pub async fn create(&self, input: RecordInput, file: Option<PdfUpload>) -> Result<RecordId> {
        let start = Instant::now();
        let result = self.create_inner(input, file).await;
        finish("create", start, &result);
        result
    }

    /// Replace a record's metadata and optionally its PDF.
    ///
    /// `expected_version` rejects the update when the row has moved on.
    pub async fn update(
        &self,
        id: &RecordId,
        input: RecordInput,
        file: Option<PdfUpload>,
        expected_version: Option<i32>,
    ) -> Result<ResearchRecord> {
        let start = Instant::now();
        let result = self.update_inner(id, input, file, expected_version).await;
        finish("update", start, &result);
        result
    }

    /// Delete a record, then its PDF
    pub async fn delete(&self, id: &RecordId, expected_version: Option<i32>) -> Result<()> {
        let start = Instant::now();
        let result = self.delete_inner(id, expected_version).await;
        finish("delete", start, &result);
        result
    }

    pub async fn get(&self, id: &RecordId) -> Result<ResearchRecord> {
        self.bounded(StoreKind::RecordStore, "get", self.records.get_by_id(id))
            .await?
            .ok_or_else(|| AppError::RecordNotFound { id: id.to_string() })
    }

    /// Every record, oldest first
    pub async fn list(&self) -> Result<Vec<ResearchRecord>> {
        self.bounded(
            StoreKind::RecordStore,
            "list",
            self.records.list_all(Some(ListOrder::CreatedAsc)),
        )
        .await
    }

    pub async fn ping(&self) -> Result<()> {
        self.bounded(StoreKind::RecordStore, "ping", self.records.ping())
            .await
    }

    async fn create_inner(&self, input: RecordInput, file: Option<PdfUpload>) -> Result<RecordId> {
        let fields = input.into_fields()?;
        if let Some(file) = &file {
            file.validate(self.max_upload_bytes)?;
        }

        let id = RecordId::generate();
        let uploaded = match file {
            Some(file) => Some(self.upload(&id, file).await?),
            None => None,
        };

        let record = ResearchRecord::new(id.clone(), fields, uploaded.as_ref().map(|u| u.url.clone()));
        if let Err(e) = self
            .bounded(StoreKind::RecordStore, "insert", self.records.insert(record))
            .await
        {
            if let Some(blob) = uploaded {
                report_orphan(&id, &blob.key, OrphanReason::InsertFailed, &e);
            }
            return Err(e);
        }

        info!(record_id = %id, with_pdf = uploaded.is_some(), "Record created");
        Ok(id)
    }

    async fn update_inner(
        &self,
        id: &RecordId,
        input: RecordInput,
        file: Option<PdfUpload>,
        expected_version: Option<i32>,
    ) -> Result<ResearchRecord> {
        let fields = input.into_fields()?;
        if let Some(file) = &file {
            file.validate(self.max_upload_bytes)?;
        }

        // Capture the reference being replaced before the row changes
        let current = self.get(id).await?;
        if let Some(expected) = expected_version {
            if expected != current.version {
                return Err(AppError::VersionMismatch {
                    id: id.to_string(),
                    expected,
                    actual: current.version,
                });
            }
        }

        let uploaded = match file {
            Some(file) => Some(self.upload(id, file).await?),
            None => None,
        };

        let patch = RecordPatch {
            fields,
            pdf_reference: uploaded.as_ref().map(|u| u.url.clone()),
            expected_version,
        };
        let updated = match self
            .bounded(StoreKind::RecordStore, "update", self.records.update(id, patch))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(blob) = uploaded {
                    report_orphan(id, &blob.key, OrphanReason::UpdateFailed, &e);
                }
                return Err(e);
            }
        };

        if let (Some(new), Some(old_url)) = (&uploaded, current.pdf_reference.as_deref()) {
            if new.url != old_url {
                self.discard(id, old_url, OrphanReason::OldBlobCleanupFailed)
                    .await;
            }
        }

        info!(
            record_id = %id,
            version = updated.version,
            replaced_pdf = uploaded.is_some(),
            "Record updated"
        );
        Ok(updated)
    }

    async fn delete_inner(&self, id: &RecordId, expected_version: Option<i32>) -> Result<()> {
        let current = self.get(id).await?;
        if let Some(expected) = expected_version {
            if expected != current.version {
                return Err(AppError::VersionMismatch {
                    id: id.to_string(),
                    expected,
                    actual: current.version,
                });
            }
        }

        self.bounded(
            StoreKind::RecordStore,
            "delete",
            self.records.delete(id, expected_version),
        )
        .await?;

        if let Some(url) = current.pdf_reference.as_deref() {
            self.discard(id, url, OrphanReason::DeleteCleanupFailed).await;
        }

        info!(record_id = %id, "Record deleted");
        Ok(())
    }

    async fn upload(&self, id: &RecordId, file: PdfUpload) -> Result<UploadedBlob> {
        let key = blob_key(id, Utc::now().timestamp_millis());
        let size = file.len();
        let url = self
            .bounded(
                StoreKind::BlobStore,
                "upload",
                self.blobs.upload(&key, file.bytes, PDF_CONTENT_TYPE),
            )
            .await?;

        debug!(record_id = %id, blob_key = %key, size, "PDF uploaded");
        Ok(UploadedBlob { key, url })
    }

    /// Best-effort removal of a blob no row references any more
    async fn discard(&self, id: &RecordId, url: &str, reason: OrphanReason) {
        let Some(key) = self.blobs.key_from_url(url) else {
            warn!(
                record_id = %id,
                pdf_reference = %url,
                "PDF reference is not in the blob store, leaving it in place"
            );
            return;
        };

        match self
            .bounded(StoreKind::BlobStore, "remove", self.blobs.remove(&key))
            .await
        {
            Ok(()) => debug!(record_id = %id, blob_key = %key, "Old PDF removed"),
            Err(e) => report_orphan(id, &key, reason, &e),
        }
    }

    /// Run a store call under the per-call timeout
    async fn bounded<T>(
        &self,
        store: StoreKind,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::UpstreamTimeout {
                store,
                operation,
                timeout_ms: self.call_timeout.as_millis() as u64,
            }),
        }
    }
}

fn finish<T>(operation: &'static str, start: Instant, result: &Result<T>) {
    metrics::record_operation(
        operation,
        metrics::outcome_label(result),
        start.elapsed().as_secs_f64(),
    );
}

fn report_orphan(id: &RecordId, key: &str, reason: OrphanReason, error: &AppError) {
    warn!(
        record_id = %id,
        blob_key = %key,
        reason = reason.as_str(),
        error = %error,
        "Blob orphaned"
    );
    metrics::record_orphan_blob(reason.as_str());
}
