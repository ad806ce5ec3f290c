//! Out-of-band orphan blob sweep
//!
//! Lists the bucket, subtracts every key a record still references and
//! removes what is left once it is older than the grace period. Blobs from
//! in-flight creates and updates are younger than the grace period and are
//! never touched.

use crate::config::AppConfig;
use crate::errors::Result;
use crate::metrics;
use crate::records::RecordStore;
use crate::storage::{BlobStore, StoredBlob};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Unreferenced blobs younger than this are kept
    pub grace_period: Duration,
    /// Report what would be removed without removing it
    pub dry_run: bool,
    /// Concurrent removals
    pub concurrency: usize,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(3600),
            dry_run: false,
            concurrency: 4,
        }
    }
}

impl SweepOptions {
    pub fn from_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            grace_period: config.sweep_grace_period(),
            dry_run,
            concurrency: config.sweeper.concurrency,
        }
    }
}

/// Counts from one sweep.
///
/// In a dry run `removed` counts the blobs that would have been removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub referenced: usize,
    pub removed: usize,
    pub kept_recent: usize,
    pub failed: usize,
    pub dry_run: bool,
}

/// Remove blobs no record references
pub async fn sweep(
    records: &dyn RecordStore,
    blobs: &dyn BlobStore,
    options: &SweepOptions,
) -> Result<SweepReport> {
    let referenced: HashSet<String> = records
        .list_all(None)
        .await?
        .iter()
        .filter_map(|r| r.pdf_reference.as_deref())
        .filter_map(|url| blobs.key_from_url(url))
        .collect();

    let listed = blobs.list().await?;
    let grace = chrono::Duration::from_std(options.grace_period).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now().checked_sub_signed(grace);

    let mut report = SweepReport {
        scanned: listed.len(),
        dry_run: options.dry_run,
        ..SweepReport::default()
    };

    let mut candidates: Vec<StoredBlob> = Vec::new();
    for blob in listed {
        if referenced.contains(&blob.key) {
            report.referenced += 1;
            continue;
        }
        match (blob.created_at, cutoff) {
            (Some(created), Some(cutoff)) if created <= cutoff => candidates.push(blob),
            // unknown age counts as recent
            _ => report.kept_recent += 1,
        }
    }

    if options.dry_run {
        for blob in &candidates {
            info!(blob_key = %blob.key, size = ?blob.size, "Would remove unreferenced blob");
        }
        report.removed = candidates.len();
        return Ok(report);
    }

    let outcomes: Vec<bool> = stream::iter(candidates)
        .map(|blob| async move {
            match blobs.remove(&blob.key).await {
                Ok(()) => {
                    info!(blob_key = %blob.key, "Removed unreferenced blob");
                    true
                }
                Err(e) => {
                    warn!(blob_key = %blob.key, error = %e, "Failed to remove unreferenced blob");
                    false
                }
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    report.removed = outcomes.iter().filter(|ok| **ok).count();
    report.failed = outcomes.len() - report.removed;
    metrics::record_blobs_swept(report.removed as u64);

    Ok(report)
}
