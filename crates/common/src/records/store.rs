//! Record store abstraction
//!
//! The relational backing store for research records. Implementations own
//! the mapping between their row shape and `ResearchRecord`.

use super::{Course, RecordId, ResearchRecord, Sections};
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata columns written on insert and replaced wholesale on update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFields {
    pub title: String,
    pub authors: Vec<String>,
    pub year: i32,
    pub course: Course,
    pub abstract_text: String,
    pub date_published: String,
    pub sections: Sections,
}

/// A row update
#[derive(Debug, Clone)]
pub struct RecordPatch {
    pub fields: RecordFields,
    /// New PDF reference; `None` leaves the stored reference unchanged
    pub pdf_reference: Option<String>,
    /// Reject the update unless the row is still at this version
    pub expected_version: Option<i32>,
}

/// Ordering hint for `list_all`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    #[default]
    CreatedAsc,
    CreatedDesc,
    TitleAsc,
    YearDesc,
}

/// Trait for the research-record row store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new row
    async fn insert(&self, record: ResearchRecord) -> Result<ResearchRecord>;

    /// Update a row; `RecordNotFound` when absent, `VersionMismatch` on a stale version
    async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<ResearchRecord>;

    /// Delete a row; `RecordNotFound` when absent, `VersionMismatch` on a stale version
    async fn delete(&self, id: &RecordId, expected_version: Option<i32>) -> Result<()>;

    /// Fetch a single row
    async fn get_by_id(&self, id: &RecordId) -> Result<Option<ResearchRecord>>;

    /// Fetch every row
    async fn list_all(&self, order: Option<ListOrder>) -> Result<Vec<ResearchRecord>>;

    /// Check connectivity
    async fn ping(&self) -> Result<()>;
}
