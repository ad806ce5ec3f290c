//! Research record handlers

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::AppState;
use pupstar_common::{
    auth::AdminContext,
    errors::{AppError, Result},
    listing::{self, ListingQuery, Page, SortKey, Suggestion},
    records::{Course, PdfUpload, RecordId, RecordInput, ResearchRecord},
};

/// Response after creating a record
#[derive(Serialize)]
pub struct CreateRecordResponse {
    pub success: bool,
    pub id: RecordId,
}

#[derive(Serialize)]
pub struct DeleteRecordResponse {
    pub success: bool,
}

/// All records, oldest first
pub async fn list_records(State(state): State<AppState>) -> Result<Json<Vec<ResearchRecord>>> {
    Ok(Json(state.lifecycle.list().await?))
}

/// Get a record by ID
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResearchRecord>> {
    Ok(Json(state.lifecycle.get(&RecordId::new(id)).await?))
}

/// Create a record from a multipart submission
pub async fn create_record(
    State(state): State<AppState>,
    admin: AdminContext,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<CreateRecordResponse>> {
    let limit = BodyLimit::new(&state, &headers);
    let (input, file) = read_submission(multipart, limit).await?;
    let id = state.lifecycle.create(input, file).await?;

    tracing::info!(record_id = %id, admin = %admin.username, "Record submitted");
    Ok(Json(CreateRecordResponse { success: true, id }))
}

/// `PUT /records` without an id
pub async fn update_without_id(_admin: AdminContext) -> Result<Json<ResearchRecord>> {
    Err(AppError::MissingField {
        field: "id".to_string(),
    })
}

/// Replace a record's metadata and optionally its PDF
pub async fn update_record(
    State(state): State<AppState>,
    admin: AdminContext,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ResearchRecord>> {
    let id = RecordId::new(id);
    let expected_version = expected_version(&headers)?;
    let limit = BodyLimit::new(&state, &headers);
    let (input, file) = read_submission(multipart, limit).await?;

    let updated = state
        .lifecycle
        .update(&id, input, file, expected_version)
        .await?;

    tracing::info!(record_id = %id, admin = %admin.username, "Record edited");
    Ok(Json(updated))
}

/// Delete a record and its PDF
pub async fn delete_record(
    State(state): State<AppState>,
    admin: AdminContext,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DeleteRecordResponse>> {
    let id = RecordId::new(id);
    let expected_version = expected_version(&headers)?;

    state.lifecycle.delete(&id, expected_version).await?;

    tracing::info!(record_id = %id, admin = %admin.username, "Record removed");
    Ok(Json(DeleteRecordResponse { success: true }))
}

/// Filtered, sorted and paginated listing
pub async fn search_records(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Page<ResearchRecord>>> {
    let query = listing_query(params)?;
    let records = state.lifecycle.list().await?;

    Ok(Json(listing::apply(&records, &query, state.config.listing.page_size)))
}

/// Header search box suggestions
pub async fn suggest_records(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Suggestion>>> {
    let q = params
        .into_iter()
        .find(|(key, _)| key == "q")
        .map(|(_, value)| value)
        .unwrap_or_default();
    if q.trim().is_empty() {
        return Ok(Json(Vec::new()));
    }

    let records = state.lifecycle.list().await?;
    Ok(Json(listing::suggest(
        &records,
        &q,
        state.config.listing.suggestion_limit,
    )))
}

/// Request body limit, with the size the client declared
#[derive(Debug, Clone, Copy)]
struct BodyLimit {
    limit: usize,
    declared: Option<usize>,
}

impl BodyLimit {
    fn new(state: &AppState, headers: &HeaderMap) -> Self {
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        Self {
            limit: state.body_limit(),
            declared,
        }
    }

    /// 413 once the body limit is hit, 400 for anything malformed
    fn error(&self, e: MultipartError, part: &str) -> AppError {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge {
                size: self
                    .declared
                    .filter(|size| *size > self.limit)
                    .unwrap_or(self.limit.saturating_add(1)),
                limit: self.limit,
            };
        }
        AppError::InvalidFormat {
            message: format!("invalid {}: {}", part, e.body_text()),
        }
    }
}

/// Read the `metadata` (or `studyData`) JSON part and the optional `file` part
async fn read_submission(
    mut multipart: Multipart,
    limit: BodyLimit,
) -> Result<(RecordInput, Option<PdfUpload>)> {
    let mut input: Option<RecordInput> = None;
    let mut file: Option<PdfUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| limit.error(e, "multipart payload"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "metadata" | "studyData" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| limit.error(e, &format!("{} field", name)))?;
                let parsed = serde_json::from_str(&text).map_err(|e| {
                    AppError::validation(&name, format!("metadata is not valid JSON: {}", e))
                })?;
                input = Some(parsed);
            }
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| limit.error(e, "file field"))?;

                // Browsers send an empty, unnamed part when no file was picked
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                file = Some(PdfUpload::new(filename, content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let input = input.ok_or_else(|| AppError::MissingField {
        field: "metadata".to_string(),
    })?;
    Ok((input, file))
}

/// Version from an `If-Match` header; `*` or no header means unconditional
fn expected_version(headers: &HeaderMap) -> Result<Option<i32>> {
    let Some(value) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };

    let raw = value
        .to_str()
        .map_err(|_| AppError::validation("If-Match", "If-Match must be ASCII"))?
        .trim();
    if raw == "*" {
        return Ok(None);
    }

    let tag = raw.strip_prefix("W/").unwrap_or(raw).trim_matches('"');
    tag.parse::<i32>()
        .map(Some)
        .map_err(|_| AppError::validation("If-Match", format!("'{}' is not a record version", raw)))
}

/// Build a listing query from repeated query-string pairs
fn listing_query(params: Vec<(String, String)>) -> Result<ListingQuery> {
    let mut query = ListingQuery::default();
    let mut courses = BTreeSet::new();

    for (key, value) in params {
        let value = value.trim();
        match key.as_str() {
            "q" => query.q = value.to_string(),
            "course" | "courses" => {
                for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let course: Course = part
                        .parse()
                        .map_err(|e: String| AppError::validation("course", e))?;
                    courses.insert(course);
                }
            }
            "year_from" | "yearFrom" if !value.is_empty() => {
                query.year_from = Some(parse_number(&key, value)?);
            }
            "year_to" | "yearTo" if !value.is_empty() => {
                query.year_to = Some(parse_number(&key, value)?);
            }
            "sort" if !value.is_empty() => {
                let sort: SortKey = value
                    .parse()
                    .map_err(|e: String| AppError::validation("sort", e))?;
                query.sort = Some(sort);
            }
            "page" if !value.is_empty() => query.page = parse_number(&key, value)?,
            _ => {}
        }
    }

    query.courses = courses;
    Ok(query)
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| AppError::validation(field, format!("'{}' is not a number", value)))
}
