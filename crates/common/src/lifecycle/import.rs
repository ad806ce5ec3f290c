//! Import of the legacy static studies catalogue
//!
//! The old site shipped its studies as a JSON map keyed by id, with PDFs
//! served from `/papers/`. Every study goes through `RecordLifecycle::create`,
//! so its PDF is uploaded under a fresh key before the row references it.
//! Studies whose title is already on file are skipped, so a rerun only
//! writes what is missing.

use super::RecordLifecycle;
use crate::errors::{AppError, Result};
use crate::records::{AuthorList, PdfUpload, RecordInput, PDF_CONTENT_TYPE};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const LEGACY_PDF_PREFIX: &str = "/papers/";

/// Legacy ids were strings in the bundled data and integers in database exports
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LegacyId {
    Text(String),
    Number(i64),
}

impl fmt::Display for LegacyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegacyId::Text(id) => f.write_str(id),
            LegacyId::Number(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacySections {
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub results: String,
}

/// One entry of the legacy catalogue.
///
/// Entries edited through the first database carry snake_case columns next
/// to the camelCase fields of the bundled data, sometimes both at once.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyStudy {
    pub id: LegacyId,
    pub title: String,
    pub course: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default, rename = "pdfUrl")]
    pub pdf_url: Option<String>,
    #[serde(default, rename = "pdf_url")]
    pub pdf_url_column: Option<String>,
    #[serde(default, rename = "datePublished")]
    pub date_published: Option<String>,
    #[serde(default, rename = "date_published")]
    pub date_published_column: Option<String>,
    #[serde(default)]
    pub sections: Option<LegacySections>,
    #[serde(default)]
    pub introduction: Option<String>,
    #[serde(default)]
    pub methodology: Option<String>,
    #[serde(default, rename = "results_and_discussion")]
    pub results: Option<String>,
}

impl LegacyStudy {
    pub fn pdf_reference(&self) -> Option<&str> {
        non_blank(self.pdf_url.as_deref()).or_else(|| non_blank(self.pdf_url_column.as_deref()))
    }

    /// File name of a PDF the old site served from `/papers/`
    pub fn legacy_pdf_name(&self) -> Option<&str> {
        let rest = self.pdf_reference()?.strip_prefix(LEGACY_PDF_PREFIX)?;
        Path::new(rest).file_name()?.to_str()
    }

    /// `YYYY-MM-DD` for the submission form.
    ///
    /// Legacy dates are month precision (`June, 2023`) and land on the first
    /// of the month. Without a readable date the study year is used.
    pub fn publication_date(&self) -> Option<String> {
        let published = non_blank(self.date_published.as_deref())
            .or_else(|| non_blank(self.date_published_column.as_deref()));

        if let Some(published) = published {
            if let Ok(date) = NaiveDate::parse_from_str(published, "%Y-%m-%d") {
                return Some(date.format("%Y-%m-%d").to_string());
            }
            if let Ok(date) = NaiveDate::parse_from_str(&format!("01 {}", published), "%d %B, %Y") {
                return Some(date.format("%Y-%m-%d").to_string());
            }
        }

        self.year.map(|year| format!("{:04}-01-01", year))
    }

    pub fn into_input(self) -> RecordInput {
        let date = self.publication_date().unwrap_or_default();
        let sections = self.sections.unwrap_or_default();

        RecordInput {
            title: self.title,
            authors: AuthorList::List(self.authors),
            date,
            course: self.course,
            introduction: prefer(sections.introduction, self.introduction),
            methodology: prefer(sections.methodology, self.methodology),
            results: prefer(sections.results, self.results),
            abstract_text: self.abstract_text,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn prefer(primary: String, fallback: Option<String>) -> String {
    if primary.trim().is_empty() {
        fallback.unwrap_or(primary)
    } else {
        primary
    }
}

fn title_key(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Directory holding the files the old site served from `/papers/`
    pub papers_dir: PathBuf,
    /// Validate every study without writing anything
    pub dry_run: bool,
}

/// Counts from one import.
///
/// In a dry run `imported` and `pdfs_uploaded` count what would have been
/// written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub total: usize,
    pub imported: usize,
    pub pdfs_uploaded: usize,
    pub missing_pdfs: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dry_run: bool,
}

/// Split a catalogue into its entries: a map keyed by legacy id or a list
pub fn catalogue_entries(catalogue: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(catalogue)? {
        Value::Object(map) => Ok(map.into_iter().map(|(_, study)| study).collect()),
        Value::Array(studies) => Ok(studies),
        _ => Err(AppError::InvalidFormat {
            message: "studies catalogue must be a JSON object or array".to_string(),
        }),
    }
}

/// Look up a study's legacy PDF on disk
async fn load_pdf(study: &LegacyStudy, papers_dir: &Path) -> Option<PdfUpload> {
    let Some(name) = study.legacy_pdf_name() else {
        if let Some(reference) = study.pdf_reference() {
            warn!(
                legacy_id = %study.id,
                pdf_reference = %reference,
                "PDF reference is not a /papers/ path, importing without it"
            );
        }
        return None;
    };

    let path = papers_dir.join(name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Some(PdfUpload::new(name, Some(PDF_CONTENT_TYPE.to_string()), bytes)),
        Err(e) => {
            warn!(
                legacy_id = %study.id,
                path = %path.display(),
                error = %e,
                "Legacy PDF not found, importing without it"
            );
            None
        }
    }
}

/// Write every study of a legacy catalogue through the lifecycle manager.
///
/// An entry that cannot be read or stored is logged and counted; only an
/// unreadable catalogue or an unreachable store aborts the run.
pub async fn import_studies(
    lifecycle: &RecordLifecycle,
    catalogue: &str,
    options: &ImportOptions,
) -> Result<ImportReport> {
    let entries = catalogue_entries(catalogue)?;
    let mut report = ImportReport {
        total: entries.len(),
        dry_run: options.dry_run,
        ..ImportReport::default()
    };
    info!(studies = report.total, dry_run = options.dry_run, "Importing legacy studies");

    if !options.dry_run {
        lifecycle.blobs().ensure_bucket().await?;
    }

    let mut on_file: HashSet<String> = lifecycle
        .list()
        .await?
        .iter()
        .map(|record| title_key(&record.title))
        .collect();

    for (index, entry) in entries.into_iter().enumerate() {
        let position = index + 1;
        let study: LegacyStudy = match serde_json::from_value(entry) {
            Ok(study) => study,
            Err(e) => {
                error!(position, error = %e, "Unreadable study entry");
                report.failed += 1;
                continue;
            }
        };

        let key = title_key(&study.title);
        if on_file.contains(&key) {
            info!(legacy_id = %study.id, title = %study.title, "Study already on file, skipping");
            report.skipped += 1;
            continue;
        }

        info!(position, total = report.total, legacy_id = %study.id, title = %study.title, "Importing study");
        let file = load_pdf(&study, &options.papers_dir).await;
        if file.is_none() && study.pdf_reference().is_some() {
            report.missing_pdfs += 1;
        }
        let with_pdf = file.is_some();
        let legacy_id = study.id.clone();
        let input = study.into_input();

        let outcome = if options.dry_run {
            check_study(lifecycle, input, file.as_ref()).map(|_| None)
        } else {
            lifecycle.create(input, file).await.map(Some)
        };

        match outcome {
            Ok(record_id) => {
                match record_id {
                    Some(record_id) => info!(%legacy_id, %record_id, with_pdf, "Study imported"),
                    None => info!(%legacy_id, with_pdf, "Study would be imported"),
                }
                report.imported += 1;
                if with_pdf {
                    report.pdfs_uploaded += 1;
                }
                on_file.insert(key);
            }
            Err(e) => {
                error!(%legacy_id, error = %e, "Failed to import study");
                report.failed += 1;
            }
        }
    }

    info!(
        imported = report.imported,
        pdfs_uploaded = report.pdfs_uploaded,
        missing_pdfs = report.missing_pdfs,
        skipped = report.skipped,
        failed = report.failed,
        "Import complete"
    );
    Ok(report)
}

/// The checks `create` runs before it touches a store
fn check_study(lifecycle: &RecordLifecycle, input: RecordInput, file: Option<&PdfUpload>) -> Result<()> {
    input.into_fields()?;
    if let Some(file) = file {
        file.validate(lifecycle.max_upload_bytes())?;
    }
    Ok(())
}
