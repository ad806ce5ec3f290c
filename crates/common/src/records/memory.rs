//! In-process record store used for local development and tests

use super::{ListOrder, RecordId, RecordPatch, RecordStore, ResearchRecord};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Record store backed by an insertion-ordered vector
#[derive(Default)]
pub struct MemoryRecordStore {
    rows: RwLock<Vec<ResearchRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. with fixture records
    pub fn with_records(records: Vec<ResearchRecord>) -> Self {
        Self {
            rows: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn check_version(row: &ResearchRecord, expected: Option<i32>) -> Result<()> {
    match expected {
        Some(expected) if expected != row.version => Err(AppError::VersionMismatch {
            id: row.id.to_string(),
            expected,
            actual: row.version,
        }),
        _ => Ok(()),
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: ResearchRecord) -> Result<ResearchRecord> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|r| r.id == record.id) {
            return Err(AppError::Conflict {
                message: format!("record {} already exists", record.id),
            });
        }
        rows.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<ResearchRecord> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| AppError::RecordNotFound { id: id.to_string() })?;

        check_version(row, patch.expected_version)?;
        row.apply(patch);
        Ok(row.clone())
    }

    async fn delete(&self, id: &RecordId, expected_version: Option<i32>) -> Result<()> {
        let mut rows = self.rows.write().await;
        let index = rows
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| AppError::RecordNotFound { id: id.to_string() })?;

        check_version(&rows[index], expected_version)?;
        rows.remove(index);
        Ok(())
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<Option<ResearchRecord>> {
        Ok(self.rows.read().await.iter().find(|r| &r.id == id).cloned())
    }

    async fn list_all(&self, order: Option<ListOrder>) -> Result<Vec<ResearchRecord>> {
        let mut rows = self.rows.read().await.clone();
        match order.unwrap_or_default() {
            ListOrder::CreatedAsc => {}
            ListOrder::CreatedDesc => rows.reverse(),
            ListOrder::TitleAsc => rows.sort_by(|a, b| a.title.cmp(&b.title)),
            ListOrder::YearDesc => rows.sort_by(|a, b| b.year.cmp(&a.year)),
        }
        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
