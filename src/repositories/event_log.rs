//! Append-only article history, event images and grouped occasions.
//!
//! Nothing here updates or deletes an `event_logs` row.

use sqlx::SqliteConnection;

use crate::{
    database::{Database, SYSTEM_USER_ID},
    error::{AppError, AppResult, FieldErrors},
    models::{EventLog, EventLogImage, GroupedEvent, NewEventLog, NewGroupedEvent},
};

const EVENT_LOG_SELECT: &str = r#"
    SELECT
        el.id, el.article_id, el.log_date, el.log_time,
        el.status_id, s.name AS status_name,
        el.event_type_id, et.name AS event_type_name,
        el.event_name,
        el.item_user_id, iu.name AS item_user_name,
        el.supplier_id, sp.name AS supplier_name,
        el.cost, el.currency,
        el.created_by_user_id, u.username AS created_by_name,
        el.created_at
    FROM event_logs el
    LEFT JOIN statuses s ON s.id = el.status_id
    LEFT JOIN event_types et ON et.id = el.event_type_id
    LEFT JOIN item_users iu ON iu.id = el.item_user_id
    LEFT JOIN suppliers sp ON sp.id = el.supplier_id
    LEFT JOIN users u ON u.id = el.created_by_user_id
"#;

/// Inserts one history row and returns its id.
pub async fn create(conn: &mut SqliteConnection, event: &NewEventLog) -> AppResult<i64> {
    let mut missing = FieldErrors::new();
    if event.article_id <= 0 {
        missing.insert("article_id".into(), "An article is required".into());
    }
    if event.log_date.is_none() {
        missing.insert("log_date".into(), "A date is required".into());
    }
    if event.status_id.is_none() {
        missing.insert("new_status_id".into(), "A status is required".into());
    }
    if !missing.is_empty() {
        return Err(AppError::Validation(missing));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO event_logs (
            article_id, log_date, log_time, status_id, event_type_id, event_name,
            item_user_id, supplier_id, cost, currency, created_by_user_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.article_id)
    .bind(event.log_date)
    .bind(event.log_time)
    .bind(event.status_id)
    .bind(event.event_type_id)
    .bind(&event.event_name)
    .bind(event.item_user_id)
    .bind(event.supplier_id)
    .bind(event.cost)
    .bind(&event.currency)
    .bind(event.created_by_user_id.unwrap_or(SYSTEM_USER_ID))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Whole history of an article, most recent first.
pub async fn get_for_article(db: &Database, article_id: i64) -> AppResult<Vec<EventLog>> {
    // Date and time alone do not order events logged the same minute; id breaks the tie.
    let sql = format!(
        "{} WHERE el.article_id = ? ORDER BY el.log_date DESC, el.log_time DESC, el.id DESC",
        EVENT_LOG_SELECT
    );
    let events = sqlx::query_as::<_, EventLog>(&sql)
        .bind(article_id)
        .fetch_all(db)
        .await?;
    Ok(events)
}

pub async fn find_by_id(db: &Database, event_log_id: i64) -> AppResult<Option<EventLog>> {
    let sql = format!("{} WHERE el.id = ?", EVENT_LOG_SELECT);
    let event = sqlx::query_as::<_, EventLog>(&sql)
        .bind(event_log_id)
        .fetch_optional(db)
        .await?;
    Ok(event)
}

pub async fn add_image(
    conn: &mut SqliteConnection,
    event_log_id: i64,
    path: &str,
    caption: Option<&str>,
) -> AppResult<i64> {
    let result = sqlx::query(
        "INSERT INTO event_log_images (event_log_id, path, caption) VALUES (?, ?, ?)",
    )
    .bind(event_log_id)
    .bind(path)
    .bind(caption)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn images_for_event(db: &Database, event_log_id: i64) -> AppResult<Vec<EventLogImage>> {
    let images = sqlx::query_as::<_, EventLogImage>(
        "SELECT id, event_log_id, path, caption FROM event_log_images WHERE event_log_id = ? ORDER BY id",
    )
    .bind(event_log_id)
    .fetch_all(db)
    .await?;
    Ok(images)
}

pub async fn create_grouped_event(
    conn: &mut SqliteConnection,
    group: &NewGroupedEvent,
) -> AppResult<i64> {
    let result = sqlx::query(
        "INSERT INTO grouped_events (name, event_date, event_time, notes) VALUES (?, ?, ?, ?)",
    )
    .bind(&group.name)
    .bind(group.event_date)
    .bind(group.event_time)
    .bind(&group.notes)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Adds the event to a group. Linking the same pair twice is a storage-level key collision.
pub async fn link_event_to_group(
    conn: &mut SqliteConnection,
    event_log_id: i64,
    grouped_event_id: i64,
) -> AppResult<()> {
    sqlx::query("INSERT INTO event_log_group_links (event_log_id, grouped_event_id) VALUES (?, ?)")
        .bind(event_log_id)
        .bind(grouped_event_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn find_grouped_event(db: &Database, id: i64) -> AppResult<Option<GroupedEvent>> {
    let group = sqlx::query_as::<_, GroupedEvent>(
        "SELECT id, name, event_date, event_time, notes, created_at FROM grouped_events WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(group)
}

/// Most recent occasions first, for the group picker of the event form.
pub async fn list_grouped_events(db: &Database, limit: i64) -> AppResult<Vec<GroupedEvent>> {
    let groups = sqlx::query_as::<_, GroupedEvent>(
        r#"
        SELECT id, name, event_date, event_time, notes, created_at
        FROM grouped_events
        ORDER BY event_date DESC, event_time DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(groups)
}

pub async fn events_for_group(db: &Database, grouped_event_id: i64) -> AppResult<Vec<EventLog>> {
    let sql = format!(
        "{} JOIN event_log_group_links l ON l.event_log_id = el.id \
         WHERE l.grouped_event_id = ? ORDER BY el.log_date, el.log_time, el.id",
        EVENT_LOG_SELECT
    );
    let events = sqlx::query_as::<_, EventLog>(&sql)
        .bind(grouped_event_id)
        .fetch_all(db)
        .await?;
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;
    use crate::test_support::{seed_article, seed_reference_data};
    use chrono::{NaiveDate, NaiveTime};

    fn event(article_id: i64, date: (i32, u32, u32), time: Option<(u32, u32)>) -> NewEventLog {
        NewEventLog {
            article_id,
            log_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            log_time: time.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
            status_id: Some(2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_requires_article_date_and_status() {
        let db = test_pool().await;
        let mut conn = db.acquire().await.unwrap();

        let err = create(&mut conn, &NewEventLog::default()).await.unwrap_err();
        match err {
            AppError::Validation(fields) => {
                assert!(fields.contains_key("article_id"));
                assert!(fields.contains_key("log_date"));
                assert!(fields.contains_key("new_status_id"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn history_is_most_recent_first_with_id_tie_break() {
        let db = test_pool().await;
        seed_reference_data(&db).await;
        let article_id = seed_article(&db, "VRO00001").await;
        let mut conn = db.acquire().await.unwrap();

        let older = create(&mut conn, &event(article_id, (2024, 4, 1), Some((9, 0)))).await.unwrap();
        let first_same = create(&mut conn, &event(article_id, (2024, 5, 1), Some((20, 0)))).await.unwrap();
        let second_same = create(&mut conn, &event(article_id, (2024, 5, 1), Some((20, 0)))).await.unwrap();
        drop(conn);

        let history = get_for_article(&db, article_id).await.unwrap();
        let ids: Vec<i64> = history.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second_same, first_same, older]);
        assert_eq!(history[0].status_name.as_deref(), Some("Disponible et rangé"));
        assert_eq!(history[0].created_by_name.as_deref(), Some("system"));
    }

    #[tokio::test]
    async fn grouped_events_collect_linked_events() {
        let db = test_pool().await;
        seed_reference_data(&db).await;
        let dress = seed_article(&db, "VRO00001").await;
        let shoes = seed_article(&db, "CHA00001").await;
        let mut conn = db.acquire().await.unwrap();

        let group_id = create_grouped_event(
            &mut conn,
            &NewGroupedEvent {
                name: Some("Dîner de gala".into()),
                event_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                event_time: None,
                notes: None,
            },
        )
        .await
        .unwrap();
        let a = create(&mut conn, &event(dress, (2024, 5, 1), None)).await.unwrap();
        let b = create(&mut conn, &event(shoes, (2024, 5, 1), None)).await.unwrap();
        link_event_to_group(&mut conn, a, group_id).await.unwrap();
        link_event_to_group(&mut conn, b, group_id).await.unwrap();
        assert!(link_event_to_group(&mut conn, a, group_id).await.is_err());
        drop(conn);

        let linked = events_for_group(&db, group_id).await.unwrap();
        assert_eq!(linked.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a, b]);

        let groups = list_grouped_events(&db, 10).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name.as_deref(), Some("Dîner de gala"));
    }

    #[tokio::test]
    async fn event_images_have_no_primary_flag() {
        let db = test_pool().await;
        seed_reference_data(&db).await;
        let article_id = seed_article(&db, "VRO00001").await;
        let mut conn = db.acquire().await.unwrap();
        let event_id = create(&mut conn, &event(article_id, (2024, 5, 1), None)).await.unwrap();

        add_image(&mut conn, event_id, "event_1_0_0.png", Some("tache")).await.unwrap();
        add_image(&mut conn, event_id, "event_1_0_1.png", None).await.unwrap();
        drop(conn);

        let images = images_for_event(&db, event_id).await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].caption.as_deref(), Some("tache"));
    }
}
