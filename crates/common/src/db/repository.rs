//! Repository pattern for database operations
//!
//! All mapping between `studies` rows and `ResearchRecord` lives here.

use crate::auth::{AccountStore, AdminAccount};
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::records::{
    ListOrder, RecordFields, RecordId, RecordPatch, RecordStore, ResearchRecord, Sections,
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    /// Explain why a guarded write touched no rows
    async fn missing_or_stale(&self, id: &RecordId, expected: Option<i32>) -> AppError {
        let current = StudyEntity::find_by_id(id.as_str()).one(self.conn()).await;
        match (current, expected) {
            (Ok(Some(row)), Some(expected)) => AppError::VersionMismatch {
                id: id.to_string(),
                expected,
                actual: row.version,
            },
            (Ok(_), _) => AppError::RecordNotFound { id: id.to_string() },
            (Err(e), _) => e.into(),
        }
    }
}

fn unique_violation(err: DbErr, what: String) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Conflict {
            message: format!("{} already exists", what),
        },
        _ => err.into(),
    }
}

/// Map a stored row to the canonical record shape
pub(crate) fn study_to_record(row: Study) -> Result<ResearchRecord> {
    let authors: Vec<String> = serde_json::from_value(row.authors)?;
    let sections: Sections = if row.sections.is_null() {
        Sections::default()
    } else {
        serde_json::from_value(row.sections)?
    };
    let course = row.course.parse().map_err(|e: String| AppError::Internal {
        message: format!("study {} has {}", row.id, e),
    })?;

    Ok(ResearchRecord {
        id: RecordId::new(row.id),
        title: row.title,
        authors,
        year: row.year,
        course,
        abstract_text: row.abstract_text,
        date_published: row.date_published.unwrap_or_default(),
        pdf_reference: row.pdf_url,
        sections,
        version: row.version,
        created_at: row.created_at.with_timezone(&Utc),
        updated_at: row.updated_at.with_timezone(&Utc),
    })
}

fn sections_json(sections: &Sections) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(sections)?)
}

fn account_from_row(row: AdminAccountRow) -> AdminAccount {
    AdminAccount {
        id: row.id,
        username: row.username,
        password_hash: row.password_hash,
        security_code_hash: row.security_code_hash,
        created_at: row.created_at.with_timezone(&Utc),
        updated_at: row.updated_at.with_timezone(&Utc),
    }
}

#[async_trait]
impl RecordStore for Repository {
    async fn insert(&self, record: ResearchRecord) -> Result<ResearchRecord> {
        let row = StudyActiveModel {
            id: Set(record.id.to_string()),
            title: Set(record.title.clone()),
            course: Set(record.course.display_name().to_string()),
            year: Set(record.year),
            authors: Set(serde_json::to_value(&record.authors)?),
            abstract_text: Set(record.abstract_text.clone()),
            pdf_url: Set(record.pdf_reference.clone()),
            date_published: Set(Some(record.date_published.clone())),
            sections: Set(sections_json(&record.sections)?),
            version: Set(record.version),
            created_at: Set(record.created_at.into()),
            updated_at: Set(record.updated_at.into()),
        };

        let inserted = row
            .insert(self.conn())
            .await
            .map_err(|e| unique_violation(e, format!("record {}", record.id)))?;
        study_to_record(inserted)
    }

    async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<ResearchRecord> {
        let RecordPatch {
            fields,
            pdf_reference,
            expected_version,
        } = patch;
        let RecordFields {
            title,
            authors,
            year,
            course,
            abstract_text,
            date_published,
            sections,
        } = fields;

        let mut query = StudyEntity::update_many()
            .col_expr(StudyColumn::Title, Expr::value(title))
            .col_expr(StudyColumn::Course, Expr::value(course.display_name()))
            .col_expr(StudyColumn::Year, Expr::value(year))
            .col_expr(StudyColumn::Authors, Expr::value(serde_json::to_value(&authors)?))
            .col_expr(StudyColumn::AbstractText, Expr::value(abstract_text))
            .col_expr(StudyColumn::DatePublished, Expr::value(date_published))
            .col_expr(StudyColumn::Sections, Expr::value(sections_json(&sections)?))
            .col_expr(StudyColumn::Version, Expr::col(StudyColumn::Version).add(1))
            .col_expr(StudyColumn::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(StudyColumn::Id.eq(id.as_str()));

        if let Some(url) = pdf_reference {
            query = query.col_expr(StudyColumn::PdfUrl, Expr::value(url));
        }
        // Version guard is part of the UPDATE predicate
        if let Some(expected) = expected_version {
            query = query.filter(StudyColumn::Version.eq(expected));
        }

        let mut updated = query.exec_with_returning(self.conn()).await?;
        match updated.pop() {
            Some(row) => study_to_record(row),
            None => Err(self.missing_or_stale(id, expected_version).await),
        }
    }

    async fn delete(&self, id: &RecordId, expected_version: Option<i32>) -> Result<()> {
        let mut query = StudyEntity::delete_many().filter(StudyColumn::Id.eq(id.as_str()));
        if let Some(expected) = expected_version {
            query = query.filter(StudyColumn::Version.eq(expected));
        }

        let result = query.exec(self.conn()).await?;
        if result.rows_affected == 0 {
            return Err(self.missing_or_stale(id, expected_version).await);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<Option<ResearchRecord>> {
        StudyEntity::find_by_id(id.as_str())
            .one(self.conn())
            .await?
            .map(study_to_record)
            .transpose()
    }

    async fn list_all(&self, order: Option<ListOrder>) -> Result<Vec<ResearchRecord>> {
        let query = match order.unwrap_or_default() {
            ListOrder::CreatedAsc => StudyEntity::find()
                .order_by_asc(StudyColumn::CreatedAt)
                .order_by_asc(StudyColumn::Id),
            ListOrder::CreatedDesc => StudyEntity::find()
                .order_by_desc(StudyColumn::CreatedAt)
                .order_by_desc(StudyColumn::Id),
            ListOrder::TitleAsc => StudyEntity::find()
                .order_by_asc(StudyColumn::Title)
                .order_by_asc(StudyColumn::Id),
            ListOrder::YearDesc => StudyEntity::find()
                .order_by_desc(StudyColumn::Year)
                .order_by_asc(StudyColumn::CreatedAt),
        };

        query
            .all(self.conn())
            .await?
            .into_iter()
            .map(study_to_record)
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[async_trait]
impl AccountStore for Repository {
    async fn find_by_username(&self, username: &str) -> Result<Option<AdminAccount>> {
        Ok(AdminAccountEntity::find()
            .filter(AdminAccountColumn::Username.eq(username))
            .one(self.conn())
            .await?
            .map(account_from_row))
    }

    async fn primary_account(&self) -> Result<Option<AdminAccount>> {
        Ok(AdminAccountEntity::find()
            .order_by_asc(AdminAccountColumn::Id)
            .one(self.conn())
            .await?
            .map(account_from_row))
    }

    async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        security_code_hash: &str,
    ) -> Result<AdminAccount> {
        let now = Utc::now().fixed_offset();
        let row = AdminAccountActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash.to_string()),
            security_code_hash: Set(security_code_hash.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let inserted = row
            .insert(self.conn())
            .await
            .map_err(|e| unique_violation(e, format!("account {}", username)))?;
        Ok(account_from_row(inserted))
    }

    async fn update_password_hash(&self, id: i32, password_hash: &str) -> Result<()> {
        let result = AdminAccountEntity::update_many()
            .col_expr(AdminAccountColumn::PasswordHash, Expr::value(password_hash))
            .col_expr(AdminAccountColumn::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(AdminAccountColumn::Id.eq(id))
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound {
                resource_type: "admin_account".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
