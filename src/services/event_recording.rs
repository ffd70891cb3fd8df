//! Recording a status-changing event for an article.
//!
//! The event row, the suitable-event-type expansion and the article's current-state
//! update commit together or not at all. Event images and grouped-event links are
//! secondary writes: their failures are logged and skipped, never rolled back.

use chrono::{NaiveDate, NaiveTime, Utc};
use log::{debug, error, info, warn};
use sqlx::SqliteConnection;

use crate::{
    database::Database,
    error::{AppError, AppResult, FieldErrors},
    models::{
        ArticleStateUpdate, GroupSelection, ImageUpload, Money, NewEventLog, Status,
        StatusCategory,
    },
    repositories::{article, event_log, reference},
    storage::ImageStorage,
};

pub const DEFAULT_CURRENCY: &str = "EUR";

/// A validated "log new event" form.
#[derive(Debug, Clone, Default)]
pub struct RecordEventCommand {
    pub article_id: i64,
    pub new_status_id: i64,
    pub log_date: NaiveDate,
    pub log_time: Option<NaiveTime>,
    pub event_type_id: Option<i64>,
    pub event_name: Option<String>,
    pub item_user_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub cost: Option<Money>,
    pub currency: Option<String>,
    pub storage_location_id: Option<i64>,
    pub created_by_user_id: Option<i64>,
    pub grouped_event: Option<GroupSelection>,
}

/// What gets written for a command once the target status is known.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPlan {
    pub event: NewEventLog,
    pub update: ArticleStateUpdate,
}

/// Applies the status-driven field rules.
///
/// - usage: event type and item user are required; the article is marked worn at the
///   event's date and time (midnight when no time was given) and its wear count moves.
/// - service: supplier and cost are kept, everything else drops them.
/// - storage: a storage location is required and becomes the article's location;
///   any other category clears the location.
pub fn plan_event(
    command: &RecordEventCommand,
    category: StatusCategory,
) -> Result<EventPlan, FieldErrors> {
    let mut errors = FieldErrors::new();

    if category == StatusCategory::Usage {
        if command.event_type_id.is_none() {
            errors.insert("event_type_id".into(), "Choose the kind of event".into());
        }
        if command.item_user_id.is_none() {
            errors.insert("item_user_id".into(), "Choose who wore the article".into());
        }
    }
    if category == StatusCategory::Storage && command.storage_location_id.is_none() {
        errors.insert("storage_location_id".into(), "Choose where the article is stored".into());
    }
    if category == StatusCategory::Service && command.cost.map_or(false, |c| c.is_negative()) {
        errors.insert("cost".into(), "The cost cannot be negative".into());
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let (supplier_id, cost, currency) = if category == StatusCategory::Service {
        let currency = command.cost.map(|_| {
            command
                .currency
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
        });
        (command.supplier_id, command.cost, currency)
    } else {
        (None, None, None)
    };

    let event = NewEventLog {
        article_id: command.article_id,
        log_date: Some(command.log_date),
        log_time: command.log_time,
        status_id: Some(command.new_status_id),
        event_type_id: command.event_type_id,
        event_name: command.event_name.clone(),
        item_user_id: command.item_user_id,
        supplier_id,
        cost,
        currency,
        created_by_user_id: command.created_by_user_id,
    };

    let mut update = ArticleStateUpdate {
        current_status_id: Some(command.new_status_id),
        current_storage_location_id: Some(None),
        ..Default::default()
    };
    match category {
        StatusCategory::Storage => {
            update.current_storage_location_id = Some(command.storage_location_id);
        }
        StatusCategory::Usage => {
            let time = command.log_time.unwrap_or(NaiveTime::MIN);
            update.last_worn_at = Some(command.log_date.and_time(time));
            update.increment_times_worn = true;
        }
        StatusCategory::Service | StatusCategory::Other => {}
    }

    Ok(EventPlan { event, update })
}

/// Checks references, applies the status rules, then records the event.
pub async fn log_event(
    db: &Database,
    storage: Option<&dyn ImageStorage>,
    command: RecordEventCommand,
    images: &[ImageUpload],
) -> AppResult<i64> {
    let status = reference::find_by_id::<Status>(db, command.new_status_id)
        .await?
        .ok_or_else(|| AppError::invalid("new_status_id", "Unknown status"))?;

    {
        let mut conn = db.acquire().await?;
        if article::current_state(&mut conn, command.article_id).await?.is_none() {
            return Err(AppError::not_found("Article"));
        }
    }

    let category = status.category();
    let plan = plan_event(&command, category).map_err(AppError::Validation)?;
    debug!(
        "Article {} -> status '{}' ({:?})",
        command.article_id, status.name, category
    );

    record_article_event(
        db,
        storage,
        command.article_id,
        plan.event,
        &plan.update,
        images,
        command.grouped_event.as_ref(),
    )
    .await
}

/// Writes one event in a single transaction and returns the new event log id.
///
/// Fatal: the event insert, the suitable-event-type check and the article update.
/// Any of them failing rolls everything back, and files already uploaded by this
/// call are moved to the storage trash.
pub async fn record_article_event(
    db: &Database,
    storage: Option<&dyn ImageStorage>,
    article_id: i64,
    event: NewEventLog,
    update: &ArticleStateUpdate,
    images: &[ImageUpload],
    group: Option<&GroupSelection>,
) -> AppResult<i64> {
    let mut tx = db.begin().await?;
    let mut uploaded = Vec::new();

    let outcome = write_event(
        &mut *tx,
        storage,
        article_id,
        event,
        update,
        images,
        group,
        &mut uploaded,
    )
    .await;

    let outcome = match outcome {
        Ok(event_log_id) => tx.commit().await.map(|_| event_log_id).map_err(AppError::from),
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!("Rollback failed for article {}: {}", article_id, rollback_err);
            }
            Err(e)
        }
    };

    match outcome {
        Ok(event_log_id) => {
            info!("Recorded event {} for article {}", event_log_id, article_id);
            Ok(event_log_id)
        }
        Err(e) => {
            error!("Recording event for article {} failed: {}", article_id, e);
            if let Some(storage) = storage {
                discard_uploads(storage, &uploaded).await;
            }
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn write_event(
    conn: &mut SqliteConnection,
    storage: Option<&dyn ImageStorage>,
    article_id: i64,
    mut event: NewEventLog,
    update: &ArticleStateUpdate,
    images: &[ImageUpload],
    group: Option<&GroupSelection>,
    uploaded: &mut Vec<String>,
) -> AppResult<i64> {
    event.article_id = article_id;
    let event_log_id = event_log::create(conn, &event).await?;

    if let Some(event_type_id) = event.event_type_id {
        if article::ensure_suitable_event_type_exists(conn, article_id, event_type_id).await? {
            debug!("Event type {} is now suitable for article {}", event_type_id, article_id);
        }
    }

    let received = images.iter().filter(|i| i.was_received()).count();
    match storage {
        Some(storage) if received > 0 => {
            store_event_images(conn, storage, event_log_id, images, uploaded).await;
        }
        None if received > 0 => {
            warn!("No image storage configured, {} event image(s) ignored", received);
        }
        _ => {}
    }

    if let Some(group) = group {
        link_to_group(conn, event_log_id, group).await;
    }

    article::apply_state_update(conn, article_id, update).await?;
    Ok(event_log_id)
}

async fn store_event_images(
    conn: &mut SqliteConnection,
    storage: &dyn ImageStorage,
    event_log_id: i64,
    images: &[ImageUpload],
    uploaded: &mut Vec<String>,
) {
    let timestamp = Utc::now().timestamp();

    for (index, image) in images.iter().enumerate() {
        if !image.was_received() {
            continue;
        }
        let desired = format!("event_{}_{}_{}", event_log_id, timestamp, index);

        let stored = match storage.upload(image.data.clone(), &image.file_name, &desired).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Skipping event image '{}': {}", image.file_name, e);
                continue;
            }
        };

        match event_log::add_image(conn, event_log_id, &stored, image.caption.as_deref()).await {
            Ok(_) => uploaded.push(stored),
            Err(e) => {
                warn!("Could not record event image '{}': {}", stored, e);
                discard_uploads(storage, std::slice::from_ref(&stored)).await;
            }
        }
    }
}

async fn link_to_group(conn: &mut SqliteConnection, event_log_id: i64, group: &GroupSelection) {
    let grouped_event_id = match group {
        GroupSelection::Existing(id) => *id,
        GroupSelection::New(new_group) => match event_log::create_grouped_event(conn, new_group).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not create grouped event for event {}: {}", event_log_id, e);
                return;
            }
        },
    };

    if let Err(e) = event_log::link_event_to_group(conn, event_log_id, grouped_event_id).await {
        warn!(
            "Could not link event {} to grouped event {}: {}",
            event_log_id, grouped_event_id, e
        );
    }
}

async fn discard_uploads(storage: &dyn ImageStorage, stored: &[String]) {
    for name in stored {
        if let Err(e) = storage.delete(name).await {
            warn!("Could not discard uploaded file '{}': {}", name, e);
        }
    }
}
