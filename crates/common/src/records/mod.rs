//! Research record domain model
//!
//! `ResearchRecord` is the canonical shape every store adapter maps to and
//! every HTTP response serializes from.

mod input;
mod memory;
mod store;

pub use input::{AuthorList, PdfUpload, RecordInput, PDF_CONTENT_TYPE};
pub use memory::MemoryRecordStore;
pub use store::{ListOrder, RecordFields, RecordPatch, RecordStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable record identifier, assigned at creation and never reused
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh, time-ordered identifier
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wrap an identifier read back from a store or a request path
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Degree programme a paper belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Course {
    ComputerScience,
    InformationTechnology,
}

impl Course {
    pub const ALL: [Course; 2] = [Course::ComputerScience, Course::InformationTechnology];

    /// Display name, also the persisted form
    pub fn display_name(&self) -> &'static str {
        match self {
            Course::ComputerScience => "Computer Science",
            Course::InformationTechnology => "Information Technology",
        }
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Course {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "computerscience" | "cs" => Ok(Course::ComputerScience),
            "informationtechnology" | "it" => Ok(Course::InformationTechnology),
            _ => Err(format!("unknown course '{}'", s.trim())),
        }
    }
}

impl Serialize for Course {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

impl<'de> Deserialize<'de> for Course {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Structured body text of a paper
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sections {
    pub introduction: String,
    pub methodology: String,
    #[serde(alias = "resultsAndDiscussion")]
    pub results: String,
}

/// A persisted research paper entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRecord {
    pub id: RecordId,
    pub title: String,
    pub authors: Vec<String>,
    pub year: i32,
    pub course: Course,
    pub abstract_text: String,
    pub date_published: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_reference: Option<String>,
    pub sections: Sections,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchRecord {
    /// Build a brand-new record at version 1
    pub fn new(id: RecordId, fields: RecordFields, pdf_reference: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: fields.title,
            authors: fields.authors,
            year: fields.year,
            course: fields.course,
            abstract_text: fields.abstract_text,
            date_published: fields.date_published,
            pdf_reference,
            sections: fields.sections,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a row update the way every record store does
    pub fn apply(&mut self, patch: RecordPatch) {
        let RecordPatch { fields, pdf_reference, .. } = patch;
        self.title = fields.title;
        self.authors = fields.authors;
        self.year = fields.year;
        self.course = fields.course;
        self.abstract_text = fields.abstract_text;
        self.date_published = fields.date_published;
        self.sections = fields.sections;
        if let Some(url) = pdf_reference {
            self.pdf_reference = Some(url);
        }
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_accepts_every_submitted_spelling() {
        for raw in ["Computer Science", "computer-science", "ComputerScience", "CS", "cs"] {
            assert_eq!(raw.parse::<Course>().unwrap(), Course::ComputerScience, "{raw}");
        }
        for raw in ["Information Technology", "information-technology", "IT"] {
            assert_eq!(raw.parse::<Course>().unwrap(), Course::InformationTechnology, "{raw}");
        }
        assert!("Nursing".parse::<Course>().is_err());
    }

    #[test]
    fn test_course_serializes_as_display_name() {
        let json = serde_json::to_string(&Course::InformationTechnology).unwrap();
        assert_eq!(json, "\"Information Technology\"");
    }

    #[test]
    fn test_record_wire_shape() {
        let fields = RecordFields {
            title: "A".into(),
            authors: vec!["X".into()],
            year: 2024,
            course: Course::ComputerScience,
            abstract_text: "intro".into(),
            date_published: "March, 2024".into(),
            sections: Sections::default(),
        };
        let record = ResearchRecord::new(RecordId::new("r1"), fields, None);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["id"], "r1");
        assert_eq!(value["abstractText"], "intro");
        assert_eq!(value["datePublished"], "March, 2024");
        assert_eq!(value["course"], "Computer Science");
        assert_eq!(value["version"], 1);
        assert!(value.get("pdfReference").is_none());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }
}
