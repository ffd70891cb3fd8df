//! Article creation, edit and image management.

use log::{info, warn};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    database::{Database, ImmediateTransaction},
    error::{AppError, AppResult, FieldErrors},
    models::{ArticleData, ArticleImage, ImageUpload},
    repositories::article,
    storage::ImageStorage,
};

/// Reference codes are computed from existing rows under a write lock. A lock
/// wait that times out, or a UNIQUE hit from a writer outside that lock, retries.
const MAX_REF_ATTEMPTS: usize = 5;

pub fn validate_article(data: &ArticleData) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if data.name.trim().is_empty() {
        errors.insert("name".into(), "A name is required".into());
    }
    if data.category_type_id <= 0 {
        errors.insert("category_type_id".into(), "Choose a category".into());
    }
    if let Some(rating) = data.rating {
        if !(0..=5).contains(&rating) {
            errors.insert("rating".into(), "Rating goes from 0 to 5".into());
        }
    }
    if data.weight_grams.map_or(false, |w| w < 0) {
        errors.insert("weight_grams".into(), "Weight cannot be negative".into());
    }
    if data.purchase_price.map_or(false, |p| p.is_negative()) {
        errors.insert("purchase_price".into(), "Price cannot be negative".into());
    }
    if data.estimated_value.map_or(false, |v| v.is_negative()) {
        errors.insert("estimated_value".into(), "Value cannot be negative".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Creates an article with a fresh reference code, then attaches its images.
///
/// The article row and its association sets commit together. Images are stored
/// afterwards; a rejected image is logged and skipped.
pub async fn create_article(
    db: &Database,
    storage: &dyn ImageStorage,
    data: &ArticleData,
    images: &[ImageUpload],
) -> AppResult<i64> {
    validate_article(data).map_err(AppError::Validation)?;

    let mut attempt = 0;
    let (article_id, article_ref) = loop {
        attempt += 1;
        match insert_with_next_ref(db, data).await {
            Ok(created) => break created,
            Err(e) if is_retryable(&e) && attempt < MAX_REF_ATTEMPTS => {
                warn!("Reference allocation attempt {} failed ({}), retrying", attempt, e);
            }
            Err(e) if is_retryable(&e) => {
                return Err(AppError::Conflict(format!(
                    "could not allocate an article reference after {} attempts",
                    MAX_REF_ATTEMPTS
                )));
            }
            Err(e) => return Err(e),
        }
    };
    info!("Created article {} ({})", article_ref, article_id);

    let mut wants_primary = true;
    for image in images.iter().filter(|i| i.was_received()) {
        match add_article_image(db, storage, article_id, image, wants_primary).await {
            Ok(_) => wants_primary = false,
            Err(e) => warn!("Skipping image '{}' of article {}: {}", image.file_name, article_id, e),
        }
    }

    Ok(article_id)
}

fn is_retryable(err: &AppError) -> bool {
    err.is_unique_violation() || err.is_busy()
}

/// Reads the next reference and inserts the article under one write lock.
async fn insert_with_next_ref(db: &Database, data: &ArticleData) -> AppResult<(i64, String)> {
    let mut tx = ImmediateTransaction::begin(db).await?;
    match insert_article(&mut *tx, data).await {
        Ok(created) => {
            tx.commit().await?;
            Ok(created)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback of article insert failed: {}", rollback);
            }
            Err(e)
        }
    }
}

async fn insert_article(conn: &mut SqliteConnection, data: &ArticleData) -> AppResult<(i64, String)> {
    let code = article::category_code(&mut *conn, data.category_type_id)
        .await?
        .ok_or_else(|| AppError::invalid("category_type_id", "Unknown category"))?;
    let article_ref = article::get_next_article_ref(&mut *conn, &code).await?;
    let id = article::create(&mut *conn, &article_ref, data).await?;
    article::sync_associated_articles(&mut *conn, id, &data.associated_article_ids).await?;
    article::sync_suitable_event_types(&mut *conn, id, &data.suitable_event_type_ids).await?;
    Ok((id, article_ref))
}

/// Rewrites descriptive fields and association sets. Current state is untouched.
pub async fn update_article(db: &Database, article_id: i64, data: &ArticleData) -> AppResult<()> {
    validate_article(data).map_err(AppError::Validation)?;

    let mut tx = db.begin().await?;
    article::update(&mut *tx, article_id, data).await?;
    article::sync_associated_articles(&mut *tx, article_id, &data.associated_article_ids).await?;
    article::sync_suitable_event_types(&mut *tx, article_id, &data.suitable_event_type_ids)
        .await?;
    tx.commit().await?;

    info!("Updated article {}", article_id);
    Ok(())
}

/// Stores one image for an article. The first image of an article is always primary.
pub async fn add_article_image(
    db: &Database,
    storage: &dyn ImageStorage,
    article_id: i64,
    image: &ImageUpload,
    make_primary: bool,
) -> AppResult<ArticleImage> {
    let mut conn = db.acquire().await?;
    if article::current_state(&mut conn, article_id).await?.is_none() {
        return Err(AppError::not_found("Article"));
    }

    let desired = format!("article_{}_{}", article_id, Uuid::new_v4().simple());
    let stored = storage.upload(image.data.clone(), &image.file_name, &desired).await?;

    let sort_order = article::next_image_sort_order(&mut conn, article_id).await?;
    let is_primary = make_primary || sort_order == 0;
    let inserted = article::add_image(
        &mut conn,
        article_id,
        &stored,
        image.caption.as_deref(),
        is_primary,
        sort_order,
    )
    .await;

    let image_id = match inserted {
        Ok(id) => id,
        Err(e) => {
            if let Err(cleanup) = storage.delete(&stored).await {
                warn!("Could not discard uploaded file '{}': {}", stored, cleanup);
            }
            return Err(e);
        }
    };

    article::find_image(&mut conn, image_id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("image {} vanished after insert", image_id)))
}

/// Removes the image row, then moves the file to the storage trash.
/// Deleting the primary image promotes the next one.
pub async fn delete_article_image(
    db: &Database,
    storage: &dyn ImageStorage,
    image_id: i64,
) -> AppResult<ArticleImage> {
    let mut tx = db.begin().await?;
    let removed = article::delete_image(&mut *tx, image_id)
        .await?
        .ok_or_else(|| AppError::not_found("Image"))?;

    if removed.is_primary {
        let next: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM article_images WHERE article_id = ? ORDER BY sort_order, id LIMIT 1",
        )
        .bind(removed.article_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(next) = next {
            article::set_primary_image(&mut *tx, removed.article_id, next).await?;
        }
    }
    tx.commit().await?;

    if let Err(e) = storage.delete(&removed.path).await {
        warn!("Image {} removed but its file was not: {}", image_id, e);
    }
    Ok(removed)
}

pub async fn make_primary(db: &Database, image_id: i64) -> AppResult<()> {
    let mut conn = db.acquire().await?;
    let image = article::find_image(&mut conn, image_id)
        .await?
        .ok_or_else(|| AppError::not_found("Image"))?;
    article::set_primary_image(&mut conn, image.article_id, image.id).await
}
