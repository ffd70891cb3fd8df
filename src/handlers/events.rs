use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Multipart;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{AppState, FieldCollector, MultipartForm};
use crate::{
    error::{AppError, AppResult, FieldErrors},
    models::{EventLog, EventLogImage, GroupSelection, GroupedEvent, NewGroupedEvent},
    repositories::{article, event_log},
    services::{self, RecordEventCommand},
    utils::forms::{checkbox, non_empty, parse_date, parse_id, parse_money, parse_time},
};

const DEFAULT_GROUP_LIMIT: i64 = 50;

#[derive(Serialize)]
pub struct EventWithImages {
    #[serde(flatten)]
    pub event: EventLog,
    pub images: Vec<EventLogImage>,
}

/// Builds the command from the "log new event" form of an article.
///
/// Grouping: `grouped_event_id` picks an existing occasion; with
/// `create_grouped_event` checked a new one is created from the
/// `new_grouped_event_*` fields, its date defaulting to the event's date.
pub fn command_from_form(
    article_id: i64,
    form: &MultipartForm,
) -> Result<RecordEventCommand, FieldErrors> {
    let mut fields = FieldCollector::default();

    let new_status_id = fields.take("new_status_id", parse_id(form.text("new_status_id")));
    let new_status_id = fields.require("new_status_id", new_status_id, "Choose the new status");
    let log_date = fields.take("log_date", parse_date(form.text("log_date")));
    let log_date = fields.require("log_date", log_date, "A date is required");
    let log_time = fields.take("log_time", parse_time(form.text("log_time")));

    let event_type_id = fields.take("event_type_id", parse_id(form.text("event_type_id")));
    let item_user_id = fields.take("item_user_id", parse_id(form.text("item_user_id")));
    let supplier_id = fields.take("supplier_id", parse_id(form.text("supplier_id")));
    let cost = fields.take("cost", parse_money(form.text("cost")));
    let storage_location_id =
        fields.take("storage_location_id", parse_id(form.text("storage_location_id")));

    let grouped_event = if checkbox(form.text("create_grouped_event")) {
        let date = fields.take(
            "new_grouped_event_date",
            parse_date(form.text("new_grouped_event_date")),
        );
        let time = fields.take(
            "new_grouped_event_time",
            parse_time(form.text("new_grouped_event_time")),
        );
        date.or(log_date).map(|event_date| {
            GroupSelection::New(NewGroupedEvent {
                name: non_empty(form.text("new_grouped_event_name")),
                event_date,
                event_time: time.or(log_time),
                notes: non_empty(form.text("new_grouped_event_notes")),
            })
        })
    } else {
        fields
            .take("grouped_event_id", parse_id(form.text("grouped_event_id")))
            .map(GroupSelection::Existing)
    };

    fields.finish()?;
    let (new_status_id, log_date) = match (new_status_id, log_date) {
        (Some(status), Some(date)) => (status, date),
        _ => return Err(FieldErrors::new()),
    };

    Ok(RecordEventCommand {
        article_id,
        new_status_id,
        log_date,
        log_time,
        event_type_id,
        event_name: non_empty(form.text("event_name")),
        item_user_id,
        supplier_id,
        cost,
        currency: non_empty(form.text("currency")).map(|c| c.to_uppercase()),
        storage_location_id,
        created_by_user_id: None,
        grouped_event,
    })
}

pub async fn log_event(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<EventLog>)> {
    let form = MultipartForm::read(multipart).await?;
    let command = command_from_form(article_id, &form).map_err(AppError::Validation)?;
    let images = form.images("event_images", "event_image_captions");

    let event_log_id =
        services::log_event(&state.db, Some(state.images.as_ref()), command, &images).await?;
    let event = event_log::find_by_id(&state.db, event_log_id)
        .await?
        .ok_or_else(|| AppError::not_found("Event"))?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn article_history(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
) -> AppResult<Json<Vec<EventWithImages>>> {
    if article::find_by_id(&state.db, article_id).await?.is_none() {
        return Err(AppError::not_found("Article"));
    }

    let events = event_log::get_for_article(&state.db, article_id).await?;
    let mut history = Vec::with_capacity(events.len());
    for event in events {
        let mut images = event_log::images_for_event(&state.db, event.id).await?;
        for image in &mut images {
            image.path = state.images.public_path(&image.path);
        }
        history.push(EventWithImages { event, images });
    }
    Ok(Json(history))
}

#[derive(Deserialize)]
pub struct GroupListQuery {
    limit: Option<i64>,
}

pub async fn grouped_events(
    State(state): State<AppState>,
    Query(query): Query<GroupListQuery>,
) -> AppResult<Json<Vec<GroupedEvent>>> {
    let limit = query.limit.unwrap_or(DEFAULT_GROUP_LIMIT).clamp(1, 500);
    Ok(Json(event_log::list_grouped_events(&state.db, limit).await?))
}

pub async fn grouped_event_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let group = event_log::find_grouped_event(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Grouped event"))?;
    let events = event_log::events_for_group(&state.db, id).await?;
    Ok(Json(json!({ "group": group, "events": events })))
}
