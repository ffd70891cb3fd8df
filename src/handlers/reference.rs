use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::{
    database::Database,
    error::{AppError, AppResult},
    models::{
        Brand, CategoryType, Color, DayMoment, EventType, ItemUser, Material, SortOrder, Status,
        StorageLocation, Supplier,
    },
    repositories::reference::{self, ReferenceEntity},
};

#[derive(Deserialize)]
pub struct ReferenceListQuery {
    sort_by: Option<String>,
    order: Option<String>,
}

/// Lets a form warn about a duplicate name before submitting.
#[derive(Deserialize)]
pub struct NameCheckQuery {
    name: Option<String>,
    excluding_id: Option<i64>,
}

/// Calls `$action::<Entity>` for the entity served under `$table`.
macro_rules! dispatch {
    ($table:expr, $action:ident ( $($arg:expr),* )) => {
        match $table {
            "brands" => $action::<Brand>($($arg),*).await,
            "materials" => $action::<Material>($($arg),*).await,
            "colors" => $action::<Color>($($arg),*).await,
            "suppliers" => $action::<Supplier>($($arg),*).await,
            "storage-locations" => $action::<StorageLocation>($($arg),*).await,
            "category-types" => $action::<CategoryType>($($arg),*).await,
            "statuses" => $action::<Status>($($arg),*).await,
            "item-users" => $action::<ItemUser>($($arg),*).await,
            "event-types" => $action::<EventType>($($arg),*).await,
            "day-moments" => $action::<DayMoment>($($arg),*).await,
            other => Err(AppError::not_found(format!("Reference table '{}'", other))),
        }
    };
}

async fn list_as_json<T: ReferenceEntity>(
    db: &Database,
    sort_by: Option<&str>,
    order: SortOrder,
) -> AppResult<Value> {
    let rows = reference::list::<T>(db, sort_by, order).await?;
    serde_json::to_value(rows).map_err(|e| AppError::Internal(e.to_string()))
}

async fn find_as_json<T: ReferenceEntity>(db: &Database, id: i64) -> AppResult<Value> {
    let row = reference::find_by_id::<T>(db, id)
        .await?
        .ok_or_else(|| AppError::not_found(T::TABLE))?;
    serde_json::to_value(row).map_err(|e| AppError::Internal(e.to_string()))
}

async fn name_taken_as_json<T: ReferenceEntity>(
    db: &Database,
    name: &str,
    excluding_id: Option<i64>,
) -> AppResult<Value> {
    let taken = reference::name_taken::<T>(db, name, excluding_id).await?;
    Ok(json!({ "name": name, "taken": taken }))
}

pub async fn list(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<ReferenceListQuery>,
) -> AppResult<Json<Value>> {
    let order = SortOrder::parse(query.order.as_deref());
    let sort_by = query.sort_by.as_deref();
    let rows = dispatch!(table.as_str(), list_as_json(&state.db, sort_by, order))?;
    Ok(Json(rows))
}

pub async fn detail(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, i64)>,
) -> AppResult<Json<Value>> {
    let row = dispatch!(table.as_str(), find_as_json(&state.db, id))?;
    Ok(Json(row))
}

pub async fn name_check(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<NameCheckQuery>,
) -> AppResult<Json<Value>> {
    let name = query.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(AppError::invalid("name", "A name is required"));
    }
    let result = dispatch!(table.as_str(), name_taken_as_json(&state.db, name, query.excluding_id))?;
    Ok(Json(result))
}
