//! Listing and query service
//!
//! Filtering, sorting and pagination over an already fetched set of records.
//! Everything here is a pure function of its inputs.

use crate::records::{Course, RecordId, ResearchRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Browse-page sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Title, A to Z
    #[serde(alias = "name")]
    Title,
    /// Year, newest first
    #[serde(alias = "date")]
    Year,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" | "name" => Ok(SortKey::Title),
            "year" | "date" => Ok(SortKey::Year),
            other => Err(format!("unknown sort key '{}'", other)),
        }
    }
}

/// Search and filter state of a browse page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    /// Case-insensitive substring matched against title and abstract
    pub q: String,
    /// Empty means every course
    pub courses: BTreeSet<Course>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    /// `None` keeps the input order
    pub sort: Option<SortKey>,
    /// 1-based
    pub page: usize,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            q: String::new(),
            courses: BTreeSet::new(),
            year_from: None,
            year_to: None,
            sort: None,
            page: 1,
        }
    }
}

impl ListingQuery {
    /// Whether a record passes every filter
    pub fn matches(&self, record: &ResearchRecord) -> bool {
        let needle = self.q.trim().to_lowercase();
        let text_ok = needle.is_empty() || contains_folded(record, &needle);
        let course_ok = self.courses.is_empty() || self.courses.contains(&record.course);
        let from_ok = self.year_from.map_or(true, |from| record.year >= from);
        let to_ok = self.year_to.map_or(true, |to| record.year <= to);

        text_ok && course_ok && from_ok && to_ok
    }
}

fn contains_folded(record: &ResearchRecord, needle: &str) -> bool {
    record.title.to_lowercase().contains(needle)
        || record.abstract_text.to_lowercase().contains(needle)
}

/// One page of a filtered listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Filter, sort and paginate `records`
pub fn apply(records: &[ResearchRecord], query: &ListingQuery, page_size: usize) -> Page<ResearchRecord> {
    let page_size = page_size.max(1);
    let page = query.page.max(1);

    let mut matched: Vec<&ResearchRecord> = records.iter().filter(|r| query.matches(r)).collect();
    match query.sort {
        Some(SortKey::Title) => matched.sort_by(|a, b| compare_titles(&a.title, &b.title)),
        Some(SortKey::Year) => matched.sort_by(|a, b| b.year.cmp(&a.year)),
        None => {}
    }

    let total_items = matched.len();
    let total_pages = total_items.div_ceil(page_size);
    let items = matched
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();

    Page {
        items,
        page,
        page_size,
        total_items,
        total_pages,
    }
}

/// Case-folded order with the raw title as tie-break
fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// A search-box suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub id: RecordId,
    pub title: String,
    pub course: Course,
    pub year: i32,
}

/// Records whose title or abstract contains `q`, capped at `limit`
pub fn suggest(records: &[ResearchRecord], q: &str, limit: usize) -> Vec<Suggestion> {
    let needle = q.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    records
        .iter()
        .filter(|r| contains_folded(r, &needle))
        .take(limit)
        .map(|r| Suggestion {
            id: r.id.clone(),
            title: r.title.clone(),
            course: r.course,
            year: r.year,
        })
        .collect()
}
