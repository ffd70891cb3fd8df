//! Read side of the plain lookup tables (brands, colors, statuses...).

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use crate::{
    database::Database,
    error::AppResult,
    models::{
        Brand, CategoryType, Color, DayMoment, EventType, ItemUser, Material, SortOrder, Status,
        StorageLocation, Supplier,
    },
};

pub trait ReferenceEntity: for<'r> FromRow<'r, SqliteRow> + Serialize + Send + Unpin {
    const TABLE: &'static str;
    const COLUMNS: &'static str;
    /// Columns a listing may be sorted on; the first one is the fallback.
    const SORT_COLUMNS: &'static [&'static str];
}

macro_rules! reference_entity {
    ($ty:ty, $table:literal, $columns:literal, [$($sort:literal),+]) => {
        impl ReferenceEntity for $ty {
            const TABLE: &'static str = $table;
            const COLUMNS: &'static str = $columns;
            const SORT_COLUMNS: &'static [&'static str] = &[$($sort),+];
        }
    };
}

reference_entity!(Brand, "brands", "id, name, description", ["name", "id"]);
reference_entity!(Material, "materials", "id, name, description", ["name", "id"]);
reference_entity!(Color, "colors", "id, name, hex_code, base_category", ["name", "base_category", "id"]);
reference_entity!(Supplier, "suppliers", "id, name, website, notes", ["name", "id"]);
reference_entity!(StorageLocation, "storage_locations", "id, name, description", ["name", "id"]);
reference_entity!(CategoryType, "category_types", "id, name, code, description", ["name", "code", "id"]);
reference_entity!(
    Status,
    "statuses",
    "id, name, availability_type, description, behavior_category",
    ["name", "availability_type", "id"]
);
reference_entity!(ItemUser, "item_users", "id, name", ["name", "id"]);
reference_entity!(EventType, "event_types", "id, name, description", ["name", "id"]);
reference_entity!(DayMoment, "day_moments", "id, name, sort_order", ["sort_order", "name", "id"]);

/// Unknown sort keys fall back to the entity's default column instead of failing.
pub fn sort_column<T: ReferenceEntity>(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|key| T::SORT_COLUMNS.iter().find(|c| **c == key).copied())
        .unwrap_or(T::SORT_COLUMNS[0])
}

pub async fn find_by_id<T: ReferenceEntity>(db: &Database, id: i64) -> AppResult<Option<T>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", T::COLUMNS, T::TABLE);
    let row = sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

pub async fn list<T: ReferenceEntity>(
    db: &Database,
    sort_by: Option<&str>,
    order: SortOrder,
) -> AppResult<Vec<T>> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {} {}, id ASC",
        T::COLUMNS,
        T::TABLE,
        sort_column::<T>(sort_by),
        order.as_sql()
    );
    let rows = sqlx::query_as::<_, T>(&sql).fetch_all(db).await?;
    Ok(rows)
}

/// Case-insensitive uniqueness check on `name`, optionally ignoring the row being edited.
pub async fn name_taken<T: ReferenceEntity>(
    db: &Database,
    name: &str,
    excluding_id: Option<i64>,
) -> AppResult<bool> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE LOWER(name) = LOWER(?) AND id != ?",
        T::TABLE
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(name.trim())
        .bind(excluding_id.unwrap_or(0))
        .fetch_one(db)
        .await?;
    Ok(count > 0)
}
