//! Study entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "studies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Course display name
    #[sea_orm(column_type = "Text")]
    pub course: String,

    pub year: i32,

    /// Author names as a JSON array
    #[sea_orm(column_type = "JsonBinary")]
    pub authors: Json,

    #[sea_orm(column_name = "abstract", column_type = "Text")]
    pub abstract_text: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub pdf_url: Option<String>,

    /// Null on rows created before the column existed
    #[sea_orm(column_type = "Text", nullable)]
    pub date_published: Option<String>,

    /// `{introduction, methodology, results}`
    #[sea_orm(column_type = "JsonBinary")]
    pub sections: Json,

    pub version: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
