//! PUP STAR Common Library
//!
//! Shared code for the PUP STAR research repository services including:
//! - Research record model and input validation
//! - Record store (Postgres via SeaORM, in-memory)
//! - Blob store (Supabase Storage, in-memory)
//! - Record lifecycle manager and orphan reconciliation
//! - Listing, search and pagination
//! - Error types and handling
//! - Configuration management
//! - Admin authentication
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod lifecycle;
pub mod listing;
pub mod metrics;
pub mod records;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use lifecycle::RecordLifecycle;
pub use records::{RecordId, ResearchRecord};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
