use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Multipart;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AppState, FieldCollector, MultipartForm};
use crate::{
    error::{AppError, AppResult, FieldErrors},
    models::{Article, ArticleData, ArticleFilters, ArticleImage, ArticleListItem, Condition, Page, SortOrder},
    repositories::article,
    services::articles,
    storage::ImageStorage,
    utils::forms::{checkbox, non_empty, parse_date, parse_id, parse_money},
};

/// Listing query string. Everything arrives as text; blank values mean "no filter".
#[derive(Debug, Default, Deserialize)]
pub struct ArticleListQuery {
    search: Option<String>,
    category_type_id: Option<String>,
    brand_id: Option<String>,
    status_id: Option<String>,
    season: Option<String>,
    condition: Option<String>,
    base_color: Option<String>,
    sort_by: Option<String>,
    order: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

impl ArticleListQuery {
    /// Unparseable filters are dropped rather than failing the listing.
    fn filters(&self) -> ArticleFilters {
        ArticleFilters {
            search: non_empty(self.search.as_deref()),
            category_type_id: parse_id(self.category_type_id.as_deref()).ok().flatten(),
            brand_id: parse_id(self.brand_id.as_deref()).ok().flatten(),
            status_id: parse_id(self.status_id.as_deref()).ok().flatten(),
            season: non_empty(self.season.as_deref()),
            condition: non_empty(self.condition.as_deref()).and_then(|c| c.parse().ok()),
            base_color: non_empty(self.base_color.as_deref()),
        }
    }
}

pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticleListQuery>,
) -> AppResult<Json<Page<ArticleListItem>>> {
    let mut page = article::get_all_paginated(
        &state.db,
        query.sort_by.as_deref(),
        SortOrder::parse(query.order.as_deref()),
        &query.filters(),
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(state.config.items_per_page),
    )
    .await?;

    publish_list(state.images.as_ref(), &mut page.data);
    Ok(Json(page))
}

/// Every article matching the filters, unpaginated, for backups and spreadsheets.
pub async fn export_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticleListQuery>,
) -> AppResult<Json<Vec<ArticleListItem>>> {
    let mut items = article::get_all(
        &state.db,
        query.sort_by.as_deref(),
        SortOrder::parse(query.order.as_deref()),
        &query.filters(),
    )
    .await?;
    publish_list(state.images.as_ref(), &mut items);
    Ok(Json(items))
}

pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Article>> {
    let mut found = article::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Article"))?;
    for image in &mut found.images {
        publish(state.images.as_ref(), image);
    }
    Ok(Json(found))
}

/// Multipart: article fields, `associated_article_ids[]`, `suitable_event_type_ids[]`,
/// `article_images[]` with `article_image_captions[]`.
pub async fn create_article(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    let form = MultipartForm::read(multipart).await?;
    let data = article_data_from_form(&form).map_err(AppError::Validation)?;
    let images = form.images("article_images", "article_image_captions");

    let id = articles::create_article(&state.db, state.images.as_ref(), &data, &images).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(data): Json<ArticleData>,
) -> AppResult<StatusCode> {
    articles::update_article(&state.db, id, &data).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart: `image`, optional `caption`, optional `is_primary` checkbox.
pub async fn add_image(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ArticleImage>)> {
    let form = MultipartForm::read(multipart).await?;
    let upload = form
        .images("image", "caption")
        .into_iter()
        .find(|i| i.was_received())
        .ok_or_else(|| AppError::invalid("image", "Choose a file to upload"))?;

    let mut image = articles::add_article_image(
        &state.db,
        state.images.as_ref(),
        article_id,
        &upload,
        checkbox(form.text("is_primary")),
    )
    .await?;
    publish(state.images.as_ref(), &mut image);
    Ok((StatusCode::CREATED, Json(image)))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
) -> AppResult<StatusCode> {
    articles::delete_article_image(&state.db, state.images.as_ref(), image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_primary_image(
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
) -> AppResult<StatusCode> {
    articles::make_primary(&state.db, image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn publish(storage: &dyn ImageStorage, image: &mut ArticleImage) {
    image.path = storage.public_path(&image.path);
}

fn publish_list(storage: &dyn ImageStorage, items: &mut [ArticleListItem]) {
    for item in items {
        item.primary_image_path = item
            .primary_image_path
            .take()
            .map(|path| storage.public_path(&path));
    }
}

fn id_list(fields: &mut FieldCollector, form: &MultipartForm, name: &str) -> Vec<i64> {
    form.texts(name)
        .iter()
        .filter_map(|raw| fields.take(name, parse_id(Some(raw))))
        .collect()
}

pub fn article_data_from_form(form: &MultipartForm) -> Result<ArticleData, FieldErrors> {
    let mut fields = FieldCollector::default();

    let category_type_id =
        fields.take("category_type_id", parse_id(form.text("category_type_id")));
    let category_type_id =
        fields.require("category_type_id", category_type_id, "Choose a category");
    let condition = fields.take(
        "condition",
        non_empty(form.text("condition"))
            .map(|c| c.parse::<Condition>())
            .transpose(),
    );
    let weight_grams = fields.take(
        "weight_grams",
        non_empty(form.text("weight_grams"))
            .map(|w| w.parse::<i64>().map_err(|_| format!("'{}' is not a weight in grams", w)))
            .transpose(),
    );
    let rating = fields.take(
        "rating",
        non_empty(form.text("rating"))
            .map(|r| r.parse::<i64>().map_err(|_| format!("'{}' is not a rating", r)))
            .transpose(),
    );

    let data = ArticleData {
        name: non_empty(form.text("name")).unwrap_or_default(),
        description: non_empty(form.text("description")),
        season: non_empty(form.text("season")),
        condition,
        size: non_empty(form.text("size")),
        weight_grams,
        category_type_id: category_type_id.unwrap_or_default(),
        brand_id: fields.take("brand_id", parse_id(form.text("brand_id"))),
        primary_color_id: fields.take("primary_color_id", parse_id(form.text("primary_color_id"))),
        secondary_color_id: fields
            .take("secondary_color_id", parse_id(form.text("secondary_color_id"))),
        material_id: fields.take("material_id", parse_id(form.text("material_id"))),
        purchase_date: fields.take("purchase_date", parse_date(form.text("purchase_date"))),
        purchase_price: fields.take("purchase_price", parse_money(form.text("purchase_price"))),
        supplier_id: fields.take("supplier_id", parse_id(form.text("supplier_id"))),
        estimated_value: fields
            .take("estimated_value", parse_money(form.text("estimated_value"))),
        rating,
        notes: non_empty(form.text("notes")),
        associated_article_ids: id_list(&mut fields, form, "associated_article_ids"),
        suitable_event_type_ids: id_list(&mut fields, form, "suitable_event_type_ids"),
    };

    fields.finish()?;
    articles::validate_article(&data)?;
    Ok(data)
}
