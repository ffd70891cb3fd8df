use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Condition {
    New,
    Excellent,
    Good,
    Mediocre,
    NeedsRepair,
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Condition::New),
            "excellent" => Ok(Condition::Excellent),
            "good" => Ok(Condition::Good),
            "mediocre" => Ok(Condition::Mediocre),
            "needs_repair" => Ok(Condition::NeedsRepair),
            other => Err(format!("'{}' is not a known condition", other)),
        }
    }
}

/// Full projection used by the detail view, joined with the display names of every reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: i64,
    pub article_ref: String,
    pub name: String,
    pub description: Option<String>,
    pub season: Option<String>,
    pub condition: Option<Condition>,
    pub size: Option<String>,
    pub weight_grams: Option<i64>,
    pub category_type_id: i64,
    pub category_type_name: Option<String>,
    pub brand_id: Option<i64>,
    pub brand_name: Option<String>,
    pub primary_color_id: Option<i64>,
    pub primary_color_name: Option<String>,
    pub secondary_color_id: Option<i64>,
    pub secondary_color_name: Option<String>,
    pub material_id: Option<i64>,
    pub material_name: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: Option<Money>,
    pub supplier_id: Option<i64>,
    pub supplier_name: Option<String>,
    pub estimated_value: Option<Money>,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub current_status_id: i64,
    pub current_status_name: Option<String>,
    pub current_storage_location_id: Option<i64>,
    pub current_storage_location_name: Option<String>,
    pub last_worn_at: Option<NaiveDateTime>,
    pub times_worn: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[sqlx(skip)]
    pub images: Vec<ArticleImage>,
    #[sqlx(skip)]
    pub associated_article_ids: Vec<i64>,
    #[sqlx(skip)]
    pub suitable_event_type_ids: Vec<i64>,
}

/// Lighter projection for listings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ArticleListItem {
    pub id: i64,
    pub article_ref: String,
    pub name: String,
    pub season: Option<String>,
    pub condition: Option<Condition>,
    pub category_type_id: i64,
    pub brand_id: Option<i64>,
    pub current_status_id: i64,
    pub current_storage_location_id: Option<i64>,
    pub times_worn: i64,
    pub last_worn_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub primary_image_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ArticleImage {
    pub id: i64,
    pub article_id: i64,
    pub path: String,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub sort_order: i64,
}

/// Descriptive and classification fields accepted on creation and edit.
/// No current-state fields: only event recording writes those.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleData {
    pub name: String,
    pub description: Option<String>,
    pub season: Option<String>,
    pub condition: Option<Condition>,
    pub size: Option<String>,
    pub weight_grams: Option<i64>,
    pub category_type_id: i64,
    pub brand_id: Option<i64>,
    pub primary_color_id: Option<i64>,
    pub secondary_color_id: Option<i64>,
    pub material_id: Option<i64>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: Option<Money>,
    pub supplier_id: Option<i64>,
    pub estimated_value: Option<Money>,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub associated_article_ids: Vec<i64>,
    #[serde(default)]
    pub suitable_event_type_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleFilters {
    pub search: Option<String>,
    pub category_type_id: Option<i64>,
    pub brand_id: Option<i64>,
    pub status_id: Option<i64>,
    pub season: Option<String>,
    pub condition: Option<Condition>,
    pub base_color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Anything but "desc" sorts ascending.
    pub fn parse(raw: Option<&str>) -> SortOrder {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub current_page: u32,
    pub items_per_page: u32,
}

/// Changes applied to the denormalized current-state columns of an article.
///
/// `current_storage_location_id` distinguishes "leave untouched" (`None`) from
/// "set to this value, possibly null" (`Some(..)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleStateUpdate {
    pub current_status_id: Option<i64>,
    pub current_storage_location_id: Option<Option<i64>>,
    pub last_worn_at: Option<NaiveDateTime>,
    pub increment_times_worn: bool,
}

impl ArticleStateUpdate {
    pub fn is_empty(&self) -> bool {
        self.current_status_id.is_none()
            && self.current_storage_location_id.is_none()
            && self.last_worn_at.is_none()
            && !self.increment_times_worn
    }
}
