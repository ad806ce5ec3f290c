//! Submitted metadata and PDF uploads
//!
//! The admin form posts its fields as a JSON part next to an optional file.
//! Both are validated here before the lifecycle manager touches any store.

use super::{Course, RecordFields, Sections};
use crate::errors::{AppError, Result};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use validator::Validate;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const MAX_TITLE_LEN: u64 = 1000;

/// Authors as submitted: a JSON list or the form's comma-separated string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AuthorList {
    List(Vec<String>),
    Joined(String),
}

impl AuthorList {
    /// Trimmed, non-empty names in submission order
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            AuthorList::List(names) => names.iter().map(String::as_str).collect(),
            AuthorList::Joined(joined) => joined.split(',').collect(),
        };

        raw.into_iter()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Record metadata as submitted by the admin console
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordInput {
    #[validate(length(min = 1, max = 1000))]
    pub title: String,

    pub authors: AuthorList,

    /// Full date, `YYYY-MM-DD`
    #[serde(alias = "datePublished")]
    pub date: String,

    pub course: String,

    #[serde(default)]
    pub introduction: String,

    #[serde(default)]
    pub methodology: String,

    #[serde(default, alias = "resultsAndDiscussion")]
    pub results: String,

    #[serde(default, rename = "abstract", alias = "abstractText")]
    pub abstract_text: Option<String>,
}

impl RecordInput {
    /// Validate and normalize into the fields a row is written with
    pub fn into_fields(self) -> Result<RecordFields> {
        self.validate()?;

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::validation("title", "Title must not be blank"));
        }
        if title.chars().count() as u64 > MAX_TITLE_LEN {
            return Err(AppError::validation("title", "Title is too long"));
        }

        let authors = self.authors.names();
        if authors.is_empty() {
            return Err(AppError::validation("authors", "At least one author is required"));
        }

        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|_| {
            AppError::validation("date", format!("'{}' is not a YYYY-MM-DD date", self.date))
        })?;

        let course: Course = self
            .course
            .parse()
            .map_err(|e: String| AppError::validation("course", e))?;

        // The public site shows the introduction wherever an abstract is expected
        let abstract_text = self
            .abstract_text
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| self.introduction.clone());

        Ok(RecordFields {
            title,
            authors,
            year: date.year(),
            course,
            abstract_text,
            date_published: date.format("%B, %Y").to_string(),
            sections: Sections {
                introduction: self.introduction,
                methodology: self.methodology,
                results: self.results,
            },
        })
    }
}

/// A PDF file submitted alongside record metadata
#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl PdfUpload {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reject anything that is not a readable PDF within the size limit.
    ///
    /// Returns the page count of the parsed document.
    pub fn validate(&self, max_bytes: usize) -> Result<usize> {
        let declared_pdf = match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => {
                ct.eq_ignore_ascii_case(PDF_CONTENT_TYPE)
            }
            _ => self.filename.to_ascii_lowercase().ends_with(".pdf"),
        };
        if !declared_pdf {
            return Err(AppError::validation("file", "Only PDF files are accepted"));
        }

        if self.is_empty() {
            return Err(AppError::validation("file", "Uploaded file is empty"));
        }

        if self.len() > max_bytes {
            return Err(AppError::PayloadTooLarge {
                size: self.len(),
                limit: max_bytes,
            });
        }

        let doc = lopdf::Document::load_mem(&self.bytes).map_err(|e| AppError::InvalidFormat {
            message: format!("'{}' is not a readable PDF: {}", self.filename, e),
        })?;

        let pages = doc.get_pages().len();
        if pages == 0 {
            return Err(AppError::validation("file", "PDF has no pages"));
        }

        tracing::debug!(filename = %self.filename, size = self.len(), pages, "PDF upload validated");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_input, sample_pdf};

    #[test]
    fn test_form_payload_normalization() {
        let input: RecordInput = serde_json::from_value(serde_json::json!({
            "title": "  Beyond the Itch  ",
            "authors": "Ruzel, Gian , ,Kevin",
            "date": "2023-06-19",
            "course": "computer-science",
            "introduction": "Eczema subtypes",
            "methodology": "CNN",
            "resultsAndDiscussion": "92% accuracy"
        }))
        .unwrap();

        let fields = input.into_fields().unwrap();
        assert_eq!(fields.title, "Beyond the Itch");
        assert_eq!(fields.authors, vec!["Ruzel", "Gian", "Kevin"]);
        assert_eq!(fields.year, 2023);
        assert_eq!(fields.date_published, "June, 2023");
        assert_eq!(fields.course, Course::ComputerScience);
        assert_eq!(fields.abstract_text, "Eczema subtypes");
        assert_eq!(fields.sections.results, "92% accuracy");
    }

    #[test]
    fn test_explicit_abstract_wins_over_introduction() {
        let mut input = sample_input("A");
        input.abstract_text = Some("Short abstract".into());
        assert_eq!(input.into_fields().unwrap().abstract_text, "Short abstract");
    }

    #[test]
    fn test_invalid_metadata_names_the_field() {
        let mut blank_title = sample_input("   ");
        blank_title.title = "   ".into();
        let err = blank_title.into_fields().unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "title"));

        let mut no_authors = sample_input("A");
        no_authors.authors = AuthorList::Joined(" , ".into());
        let err = no_authors.into_fields().unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "authors"));

        let mut bad_date = sample_input("A");
        bad_date.date = "June 2023".into();
        let err = bad_date.into_fields().unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "date"));

        let mut bad_course = sample_input("A");
        bad_course.course = "Nursing".into();
        let err = bad_course.into_fields().unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "course"));
    }

    #[test]
    fn test_pdf_upload_validation() {
        let pdf = PdfUpload::new("paper.pdf", Some(PDF_CONTENT_TYPE.into()), sample_pdf(&["one", "two"]));
        assert_eq!(pdf.validate(1024 * 1024).unwrap(), 2);

        let untyped = PdfUpload::new("paper.PDF", None, sample_pdf(&["one"]));
        assert!(untyped.validate(1024 * 1024).is_ok());

        let word = PdfUpload::new("paper.docx", Some("application/msword".into()), vec![1, 2, 3]);
        assert!(matches!(word.validate(1024), Err(AppError::Validation { .. })));

        let fake = PdfUpload::new("paper.pdf", Some(PDF_CONTENT_TYPE.into()), b"not a pdf".to_vec());
        assert!(matches!(fake.validate(1024), Err(AppError::InvalidFormat { .. })));

        let big = PdfUpload::new("paper.pdf", Some(PDF_CONTENT_TYPE.into()), sample_pdf(&["one"]));
        assert!(matches!(big.validate(16), Err(AppError::PayloadTooLarge { .. })));
    }
}
