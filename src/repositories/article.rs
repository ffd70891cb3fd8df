use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    database::{Database, NEW_ACQUISITION_STATUS_ID},
    error::{is_unique_violation, AppError, AppResult},
    models::{
        Article, ArticleData, ArticleFilters, ArticleImage, ArticleListItem, ArticleStateUpdate,
        Page, SortOrder,
    },
};

/// Width of the numeric part of a reference code.
const REF_DIGITS: usize = 5;

const ARTICLE_SELECT: &str = r#"
    SELECT
        a.id, a.article_ref, a.name, a.description, a.season, a.condition, a.size, a.weight_grams,
        a.category_type_id, ct.name AS category_type_name,
        a.brand_id, b.name AS brand_name,
        a.primary_color_id, pc.name AS primary_color_name,
        a.secondary_color_id, sc.name AS secondary_color_name,
        a.material_id, m.name AS material_name,
        a.purchase_date, a.purchase_price,
        a.supplier_id, sp.name AS supplier_name,
        a.estimated_value, a.rating, a.notes,
        a.current_status_id, s.name AS current_status_name,
        a.current_storage_location_id, sl.name AS current_storage_location_name,
        a.last_worn_at, a.times_worn, a.created_at, a.updated_at
    FROM articles a
    LEFT JOIN category_types ct ON ct.id = a.category_type_id
    LEFT JOIN brands b ON b.id = a.brand_id
    LEFT JOIN colors pc ON pc.id = a.primary_color_id
    LEFT JOIN colors sc ON sc.id = a.secondary_color_id
    LEFT JOIN materials m ON m.id = a.material_id
    LEFT JOIN suppliers sp ON sp.id = a.supplier_id
    LEFT JOIN statuses s ON s.id = a.current_status_id
    LEFT JOIN storage_locations sl ON sl.id = a.current_storage_location_id
"#;

const LIST_SELECT: &str = r#"
    SELECT
        a.id, a.article_ref, a.name, a.season, a.condition, a.category_type_id, a.brand_id,
        a.current_status_id, a.current_storage_location_id, a.times_worn, a.last_worn_at,
        a.created_at,
        (SELECT ai.path FROM article_images ai
            WHERE ai.article_id = a.id
            ORDER BY ai.is_primary DESC, ai.sort_order ASC, ai.id ASC
            LIMIT 1) AS primary_image_path
    FROM articles a
"#;

/// Request key -> column. Keeps user input out of ORDER BY and avoids ambiguous columns.
const SORT_COLUMNS: &[(&str, &str)] = &[
    ("name", "a.name"),
    ("article_ref", "a.article_ref"),
    ("season", "a.season"),
    ("condition", "a.condition"),
    ("rating", "a.rating"),
    ("purchase_date", "a.purchase_date"),
    ("times_worn", "a.times_worn"),
    ("last_worn_at", "a.last_worn_at"),
    ("created_at", "a.created_at"),
];
const DEFAULT_SORT_COLUMN: &str = "a.name";

/// Current-state columns, read before an event is recorded.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ArticleState {
    pub id: i64,
    pub current_status_id: i64,
    pub current_storage_location_id: Option<i64>,
    pub last_worn_at: Option<NaiveDateTime>,
    pub times_worn: i64,
}

pub fn sort_column(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|key| SORT_COLUMNS.iter().find(|(k, _)| *k == key))
        .map(|(_, column)| *column)
        .unwrap_or(DEFAULT_SORT_COLUMN)
}

pub async fn find_by_id(db: &Database, id: i64) -> AppResult<Option<Article>> {
    let sql = format!("{} WHERE a.id = ?", ARTICLE_SELECT);
    let article = sqlx::query_as::<_, Article>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?;

    let mut article = match article {
        Some(article) => article,
        None => return Ok(None),
    };

    article.images = images_for_article(db, id).await?;
    article.associated_article_ids = sqlx::query_scalar(
        r#"
        SELECT CASE WHEN article_id_1 = ? THEN article_id_2 ELSE article_id_1 END
        FROM associated_articles
        WHERE article_id_1 = ? OR article_id_2 = ?
        ORDER BY 1
        "#,
    )
    .bind(id)
    .bind(id)
    .bind(id)
    .fetch_all(db)
    .await?;
    article.suitable_event_type_ids = sqlx::query_scalar(
        "SELECT event_type_id FROM article_suitable_event_types WHERE article_id = ? ORDER BY event_type_id",
    )
    .bind(id)
    .fetch_all(db)
    .await?;

    Ok(Some(article))
}

pub async fn current_state(
    conn: &mut SqliteConnection,
    id: i64,
) -> AppResult<Option<ArticleState>> {
    let state = sqlx::query_as::<_, ArticleState>(
        "SELECT id, current_status_id, current_storage_location_id, last_worn_at, times_worn FROM articles WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(state)
}

/// Makes `%`, `_` and `\` match literally in a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &ArticleFilters) {
    qb.push(" WHERE 1 = 1");

    if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (a.name LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR a.article_ref LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR a.description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(id) = filters.category_type_id {
        qb.push(" AND a.category_type_id = ").push_bind(id);
    }
    if let Some(id) = filters.brand_id {
        qb.push(" AND a.brand_id = ").push_bind(id);
    }
    if let Some(id) = filters.status_id {
        qb.push(" AND a.current_status_id = ").push_bind(id);
    }
    if let Some(season) = filters.season.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND a.season = ").push_bind(season.to_string());
    }
    if let Some(condition) = filters.condition {
        qb.push(" AND a.condition = ").push_bind(condition);
    }
    if let Some(base) = filters.base_color.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND a.primary_color_id IN (SELECT id FROM colors WHERE base_category = ")
            .push_bind(base.to_string())
            .push(")");
    }
}

pub async fn get_all(
    db: &Database,
    sort_by: Option<&str>,
    order: SortOrder,
    filters: &ArticleFilters,
) -> AppResult<Vec<ArticleListItem>> {
    let mut qb = QueryBuilder::<Sqlite>::new(LIST_SELECT);
    push_filters(&mut qb, filters);
    qb.push(format!(" ORDER BY {} {}, a.id ASC", sort_column(sort_by), order.as_sql()));

    let articles = qb.build_query_as::<ArticleListItem>().fetch_all(db).await?;
    Ok(articles)
}

/// One page of the listing. The total comes from a COUNT over the same filters, not the page.
pub async fn get_all_paginated(
    db: &Database,
    sort_by: Option<&str>,
    order: SortOrder,
    filters: &ArticleFilters,
    page: u32,
    page_size: u32,
) -> AppResult<Page<ArticleListItem>> {
    let page = page.max(1);
    let page_size = page_size.clamp(1, 100);

    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM articles a");
    push_filters(&mut count_qb, filters);
    let total: i64 = count_qb.build_query_scalar::<i64>().fetch_one(db).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(LIST_SELECT);
    push_filters(&mut qb, filters);
    qb.push(format!(" ORDER BY {} {}, a.id ASC", sort_column(sort_by), order.as_sql()));
    qb.push(" LIMIT ")
        .push_bind(i64::from(page_size))
        .push(" OFFSET ")
        .push_bind(i64::from(page - 1) * i64::from(page_size));
    let data = qb.build_query_as::<ArticleListItem>().fetch_all(db).await?;

    Ok(Page {
        data,
        total,
        current_page: page,
        items_per_page: page_size,
    })
}

/// `code` followed by the highest existing numeric suffix plus one, zero-padded.
pub fn next_reference<'a, I>(code: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let max = existing
        .into_iter()
        .filter_map(|r| r.strip_prefix(code))
        .filter(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{}{:0width$}", code, max + 1, width = REF_DIGITS)
}

/// Only race-free inside a write transaction that also performs the insert
/// (see `ImmediateTransaction`).
pub async fn get_next_article_ref(conn: &mut SqliteConnection, code: &str) -> AppResult<String> {
    let refs: Vec<String> =
        sqlx::query_scalar("SELECT article_ref FROM articles WHERE article_ref LIKE ? ESCAPE '\\'")
            .bind(format!("{}%", escape_like(code)))
            .fetch_all(&mut *conn)
            .await?;
    Ok(next_reference(code, refs.iter().map(String::as_str)))
}

pub async fn category_code(
    conn: &mut SqliteConnection,
    category_type_id: i64,
) -> AppResult<Option<String>> {
    let code = sqlx::query_scalar("SELECT code FROM category_types WHERE id = ?")
        .bind(category_type_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(code)
}

/// Inserts the article in the initial "newly acquired" status, stored nowhere, never worn.
pub async fn create(
    conn: &mut SqliteConnection,
    article_ref: &str,
    data: &ArticleData,
) -> AppResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO articles (
            article_ref, name, description, season, condition, size, weight_grams,
            category_type_id, brand_id, primary_color_id, secondary_color_id, material_id,
            purchase_date, purchase_price, supplier_id, estimated_value, rating, notes,
            current_status_id, current_storage_location_id, times_worn
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 0)
        "#,
    )
    .bind(article_ref)
    .bind(&data.name)
    .bind(&data.description)
    .bind(&data.season)
    .bind(data.condition)
    .bind(&data.size)
    .bind(data.weight_grams)
    .bind(data.category_type_id)
    .bind(data.brand_id)
    .bind(data.primary_color_id)
    .bind(data.secondary_color_id)
    .bind(data.material_id)
    .bind(data.purchase_date)
    .bind(data.purchase_price)
    .bind(data.supplier_id)
    .bind(data.estimated_value)
    .bind(data.rating)
    .bind(&data.notes)
    .bind(NEW_ACQUISITION_STATUS_ID)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Rewrites descriptive fields. Reference code and current state are left alone.
pub async fn update(conn: &mut SqliteConnection, id: i64, data: &ArticleData) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE articles SET
            name = ?, description = ?, season = ?, condition = ?, size = ?, weight_grams = ?,
            category_type_id = ?, brand_id = ?, primary_color_id = ?, secondary_color_id = ?,
            material_id = ?, purchase_date = ?, purchase_price = ?, supplier_id = ?,
            estimated_value = ?, rating = ?, notes = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&data.name)
    .bind(&data.description)
    .bind(&data.season)
    .bind(data.condition)
    .bind(&data.size)
    .bind(data.weight_grams)
    .bind(data.category_type_id)
    .bind(data.brand_id)
    .bind(data.primary_color_id)
    .bind(data.secondary_color_id)
    .bind(data.material_id)
    .bind(data.purchase_date)
    .bind(data.purchase_price)
    .bind(data.supplier_id)
    .bind(data.estimated_value)
    .bind(data.rating)
    .bind(&data.notes)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Article"));
    }
    Ok(())
}

/// Adds an image. A new primary image demotes every other image of the article first.
pub async fn add_image(
    conn: &mut SqliteConnection,
    article_id: i64,
    path: &str,
    caption: Option<&str>,
    is_primary: bool,
    sort_order: i64,
) -> AppResult<i64> {
    if is_primary {
        sqlx::query("UPDATE article_images SET is_primary = 0 WHERE article_id = ?")
            .bind(article_id)
            .execute(&mut *conn)
            .await?;
    }

    let result = sqlx::query(
        "INSERT INTO article_images (article_id, path, caption, is_primary, sort_order) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(article_id)
    .bind(path)
    .bind(caption)
    .bind(is_primary)
    .bind(sort_order)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Primary first, then manual order.
pub async fn images_for_article(db: &Database, article_id: i64) -> AppResult<Vec<ArticleImage>> {
    let images = sqlx::query_as::<_, ArticleImage>(
        r#"
        SELECT id, article_id, path, caption, is_primary, sort_order
        FROM article_images
        WHERE article_id = ?
        ORDER BY is_primary DESC, sort_order ASC, id ASC
        "#,
    )
    .bind(article_id)
    .fetch_all(db)
    .await?;
    Ok(images)
}

pub async fn next_image_sort_order(conn: &mut SqliteConnection, article_id: i64) -> AppResult<i64> {
    let next: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM article_images WHERE article_id = ?",
    )
    .bind(article_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(next)
}

pub async fn set_primary_image(
    conn: &mut SqliteConnection,
    article_id: i64,
    image_id: i64,
) -> AppResult<()> {
    let exists: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM article_images WHERE id = ? AND article_id = ?")
            .bind(image_id)
            .bind(article_id)
            .fetch_one(&mut *conn)
            .await?;
    if exists == 0 {
        return Err(AppError::not_found("Image"));
    }

    sqlx::query("UPDATE article_images SET is_primary = (id = ?) WHERE article_id = ?")
        .bind(image_id)
        .bind(article_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn find_image(
    conn: &mut SqliteConnection,
    image_id: i64,
) -> AppResult<Option<ArticleImage>> {
    let image = sqlx::query_as::<_, ArticleImage>(
        "SELECT id, article_id, path, caption, is_primary, sort_order FROM article_images WHERE id = ?",
    )
    .bind(image_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(image)
}

/// Removes the image row and returns it so the caller can dispose of the file.
pub async fn delete_image(
    conn: &mut SqliteConnection,
    image_id: i64,
) -> AppResult<Option<ArticleImage>> {
    let image = find_image(conn, image_id).await?;

    if image.is_some() {
        sqlx::query("DELETE FROM article_images WHERE id = ?")
            .bind(image_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(image)
}

/// Pairs are stored once, smallest id first.
pub fn ordered_pair(a: i64, b: i64) -> (i64, i64) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Replaces every association of `article_id`. Self references are skipped,
/// duplicate pairs are ignored.
pub async fn sync_associated_articles(
    conn: &mut SqliteConnection,
    article_id: i64,
    associated_ids: &[i64],
) -> AppResult<()> {
    sqlx::query("DELETE FROM associated_articles WHERE article_id_1 = ? OR article_id_2 = ?")
        .bind(article_id)
        .bind(article_id)
        .execute(&mut *conn)
        .await?;

    for &other in associated_ids {
        if other == article_id || other <= 0 {
            continue;
        }
        let (first, second) = ordered_pair(article_id, other);
        let inserted = sqlx::query(
            "INSERT INTO associated_articles (article_id_1, article_id_2) VALUES (?, ?)",
        )
        .bind(first)
        .bind(second)
        .execute(&mut *conn)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

pub async fn sync_suitable_event_types(
    conn: &mut SqliteConnection,
    article_id: i64,
    event_type_ids: &[i64],
) -> AppResult<()> {
    sqlx::query("DELETE FROM article_suitable_event_types WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *conn)
        .await?;

    for &event_type_id in event_type_ids {
        if event_type_id <= 0 {
            continue;
        }
        let inserted = sqlx::query(
            "INSERT INTO article_suitable_event_types (article_id, event_type_id) VALUES (?, ?)",
        )
        .bind(article_id)
        .bind(event_type_id)
        .execute(&mut *conn)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Adds one suitable event type if missing. Returns whether a row was inserted.
pub async fn ensure_suitable_event_type_exists(
    conn: &mut SqliteConnection,
    article_id: i64,
    event_type_id: i64,
) -> AppResult<bool> {
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM article_suitable_event_types WHERE article_id = ? AND event_type_id = ?",
    )
    .bind(article_id)
    .bind(event_type_id)
    .fetch_one(&mut *conn)
    .await?;
    if existing > 0 {
        return Ok(false);
    }

    let inserted = sqlx::query(
        "INSERT INTO article_suitable_event_types (article_id, event_type_id) VALUES (?, ?)",
    )
    .bind(article_id)
    .bind(event_type_id)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Writes the current-state columns present in `update`. An empty update is a no-op.
pub async fn apply_state_update(
    conn: &mut SqliteConnection,
    article_id: i64,
    update: &ArticleStateUpdate,
) -> AppResult<()> {
    if update.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE articles SET ");
    let mut set = qb.separated(", ");
    if let Some(status_id) = update.current_status_id {
        set.push("current_status_id = ").push_bind_unseparated(status_id);
    }
    if let Some(location_id) = update.current_storage_location_id {
        set.push("current_storage_location_id = ")
            .push_bind_unseparated(location_id);
    }
    if let Some(worn_at) = update.last_worn_at {
        set.push("last_worn_at = ").push_bind_unseparated(worn_at);
    }
    if update.increment_times_worn {
        set.push("times_worn = COALESCE(times_worn, 0) + 1");
    }
    set.push("updated_at = CURRENT_TIMESTAMP");

    qb.push(" WHERE id = ").push_bind(article_id);
    let result = qb.build().execute(&mut *conn).await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Article"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;
    use crate::models::Condition;
    use crate::test_support::{article_data, seed_article, seed_reference_data};
    use chrono::NaiveDate;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
        assert_eq!(escape_like("Robe"), "Robe");
    }

    #[test]
    fn next_reference_formats() {
        assert_eq!(next_reference("VRO", Vec::<&str>::new()), "VRO00001");
        assert_eq!(next_reference("VRO", vec!["VRO00001"]), "VRO00002");
        assert_eq!(
            next_reference("VRO", vec!["VRO00007", "VRO00003", "VROX00099", "CHA00050"]),
            "VRO00008"
        );
    }

    #[test]
    fn sort_keys_outside_allow_list_fall_back() {
        assert_eq!(sort_column(Some("times_worn")), "a.times_worn");
        assert_eq!(sort_column(Some("id; DROP TABLE articles")), DEFAULT_SORT_COLUMN);
        assert_eq!(sort_column(None), DEFAULT_SORT_COLUMN);
    }

    #[tokio::test]
    async fn next_article_ref_reads_existing_codes() {
        let db = test_pool().await;
        seed_reference_data(&db).await;

        let mut conn = db.acquire().await.unwrap();
        assert_eq!(get_next_article_ref(&mut conn, "VRO").await.unwrap(), "VRO00001");
        drop(conn);

        seed_article(&db, "VRO00001").await;
        let mut conn = db.acquire().await.unwrap();
        assert_eq!(get_next_article_ref(&mut conn, "VRO").await.unwrap(), "VRO00002");
    }

    #[tokio::test]
    async fn created_article_starts_new_and_unstored() {
        let db = test_pool().await;
        seed_reference_data(&db).await;

        let mut conn = db.acquire().await.unwrap();
        let mut data = article_data("Robe noire");
        data.condition = Some(Condition::Excellent);
        data.purchase_price = Some("129.90".parse().unwrap());
        data.purchase_date = NaiveDate::from_ymd_opt(2023, 11, 2);
        let id = create(&mut conn, "VRO00001", &data).await.unwrap();
        drop(conn);

        let article = find_by_id(&db, id).await.unwrap().unwrap();
        assert_eq!(article.current_status_id, NEW_ACQUISITION_STATUS_ID);
        assert_eq!(article.current_status_name.as_deref(), Some("Acheté (Nouveau)"));
        assert_eq!(article.current_storage_location_id, None);
        assert_eq!(article.times_worn, 0);
        assert_eq!(article.category_type_name.as_deref(), Some("Robe"));
        assert_eq!(article.condition, Some(Condition::Excellent));
        assert_eq!(article.purchase_price.unwrap().to_string(), "129.90");

        assert!(find_by_id(&db, id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn at_most_one_primary_image() {
        let db = test_pool().await;
        seed_reference_data(&db).await;
        let article_id = seed_article(&db, "VRO00001").await;

        let mut conn = db.acquire().await.unwrap();
        add_image(&mut conn, article_id, "a.png", None, true, 0).await.unwrap();
        add_image(&mut conn, article_id, "b.png", None, false, 1).await.unwrap();
        let c = add_image(&mut conn, article_id, "c.png", Some("dos"), true, 2).await.unwrap();
        add_image(&mut conn, article_id, "d.png", None, false, 3).await.unwrap();
        drop(conn);

        let images = images_for_article(&db, article_id).await.unwrap();
        assert_eq!(images.iter().filter(|i| i.is_primary).count(), 1);
        assert_eq!(images[0].id, c);

        let mut conn = db.acquire().await.unwrap();
        set_primary_image(&mut conn, article_id, images[1].id).await.unwrap();
        drop(conn);
        let images_after = images_for_article(&db, article_id).await.unwrap();
        assert_eq!(images_after.iter().filter(|i| i.is_primary).count(), 1);
        assert_eq!(images_after[0].id, images[1].id);
    }

    #[tokio::test]
    async fn associations_are_normalized_pairs() {
        let db = test_pool().await;
        seed_reference_data(&db).await;
        for n in 1..=5 {
            seed_article(&db, &format!("VRO0000{}", n)).await;
        }

        let mut conn = db.acquire().await.unwrap();
        sync_associated_articles(&mut conn, 5, &[3]).await.unwrap();
        sync_associated_articles(&mut conn, 3, &[5, 5, 3]).await.unwrap();
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT article_id_1, article_id_2 FROM associated_articles")
                .fetch_all(&mut *conn)
                .await
                .unwrap();
        assert_eq!(rows, vec![(3, 5)]);

        sync_associated_articles(&mut conn, 4, &[1, 2]).await.unwrap();
        drop(conn);
        let article = find_by_id(&db, 4).await.unwrap().unwrap();
        assert_eq!(article.associated_article_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn ensure_suitable_event_type_is_idempotent() {
        let db = test_pool().await;
        seed_reference_data(&db).await;
        let article_id = seed_article(&db, "VRO00001").await;

        let mut conn = db.acquire().await.unwrap();
        assert!(ensure_suitable_event_type_exists(&mut conn, article_id, 1).await.unwrap());
        assert!(!ensure_suitable_event_type_exists(&mut conn, article_id, 1).await.unwrap());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article_suitable_event_types")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 1);

        sync_suitable_event_types(&mut conn, article_id, &[2, 1, 2]).await.unwrap();
        drop(conn);
        let article = find_by_id(&db, article_id).await.unwrap().unwrap();
        assert_eq!(article.suitable_event_type_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn state_update_sets_only_present_fields() {
        let db = test_pool().await;
        seed_reference_data(&db).await;
        let article_id = seed_article(&db, "VRO00001").await;
        let mut conn = db.acquire().await.unwrap();

        apply_state_update(
            &mut conn,
            article_id,
            &ArticleStateUpdate {
                current_status_id: Some(2),
                current_storage_location_id: Some(Some(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let state = current_state(&mut conn, article_id).await.unwrap().unwrap();
        assert_eq!(state.current_status_id, 2);
        assert_eq!(state.current_storage_location_id, Some(1));

        // Key absent: location untouched.
        let worn_at = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(20, 30, 0);
        apply_state_update(
            &mut conn,
            article_id,
            &ArticleStateUpdate {
                increment_times_worn: true,
                last_worn_at: worn_at,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let state = current_state(&mut conn, article_id).await.unwrap().unwrap();
        assert_eq!(state.current_storage_location_id, Some(1));
        assert_eq!(state.times_worn, 1);
        assert_eq!(state.last_worn_at, worn_at);

        // Key present with null: location cleared.
        apply_state_update(
            &mut conn,
            article_id,
            &ArticleStateUpdate {
                current_storage_location_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let state = current_state(&mut conn, article_id).await.unwrap().unwrap();
        assert_eq!(state.current_storage_location_id, None);

        apply_state_update(&mut conn, article_id, &ArticleStateUpdate::default())
            .await
            .unwrap();
        let missing = apply_state_update(
            &mut conn,
            999,
            &ArticleStateUpdate {
                current_status_id: Some(2),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn listing_filters_sorts_and_paginates() {
        let db = test_pool().await;
        seed_reference_data(&db).await;
        let mut conn = db.acquire().await.unwrap();
        for (i, name) in ["Robe rouge", "Robe bleue", "Chemise blanche"].iter().enumerate() {
            let mut data = article_data(name);
            data.season = Some(if i == 2 { "été" } else { "hiver" }.to_string());
            match i {
                0 => {
                    data.condition = Some(Condition::Excellent);
                    data.description = Some("Laine 100% mérinos".into());
                }
                1 => data.brand_id = Some(1),
                _ => data.category_type_id = 2,
            }
            create(&mut conn, &format!("VRO0000{}", i + 1), &data).await.unwrap();
        }
        add_image(&mut conn, 1, "robe-rouge.png", None, true, 0).await.unwrap();
        sqlx::query("UPDATE articles SET current_status_id = 3 WHERE id = 3")
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let ids_matching = |filters: ArticleFilters| {
            let db = db.clone();
            async move {
                get_all(&db, Some("article_ref"), SortOrder::Asc, &filters)
                    .await
                    .unwrap()
                    .iter()
                    .map(|a| a.id)
                    .collect::<Vec<i64>>()
            }
        };
        let by_category = ArticleFilters { category_type_id: Some(2), ..Default::default() };
        assert_eq!(ids_matching(by_category).await, vec![3]);
        let by_brand = ArticleFilters { brand_id: Some(1), ..Default::default() };
        assert_eq!(ids_matching(by_brand).await, vec![2]);
        let by_status = ArticleFilters { status_id: Some(3), ..Default::default() };
        assert_eq!(ids_matching(by_status).await, vec![3]);
        let still_new = ArticleFilters { status_id: Some(1), ..Default::default() };
        assert_eq!(ids_matching(still_new).await, vec![1, 2]);
        let by_condition = ArticleFilters {
            condition: Some(Condition::Excellent),
            ..Default::default()
        };
        assert_eq!(ids_matching(by_condition).await, vec![1]);
        let combined = ArticleFilters {
            category_type_id: Some(1),
            season: Some("hiver".into()),
            brand_id: Some(1),
            ..Default::default()
        };
        assert_eq!(ids_matching(combined).await, vec![2]);

        // Wildcards typed in the search box match literally.
        let percent = ArticleFilters { search: Some("100%".into()), ..Default::default() };
        assert_eq!(ids_matching(percent).await, vec![1]);
        let underscore = ArticleFilters { search: Some("_".into()), ..Default::default() };
        assert!(ids_matching(underscore).await.is_empty());
        let lone_percent = ArticleFilters { search: Some("%".into()), ..Default::default() };
        assert_eq!(ids_matching(lone_percent).await, vec![1]);

        let filters = ArticleFilters {
            search: Some("Robe".into()),
            ..Default::default()
        };
        let robes = get_all(&db, Some("name"), SortOrder::Asc, &filters).await.unwrap();
        let names: Vec<&str> = robes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Robe bleue", "Robe rouge"]);
        assert_eq!(robes[1].primary_image_path.as_deref(), Some("robe-rouge.png"));

        let page = get_all_paginated(&db, Some("article_ref"), SortOrder::Desc, &ArticleFilters::default(), 2, 2)
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].article_ref, "VRO00001");

        let winter = ArticleFilters {
            season: Some("hiver".into()),
            ..Default::default()
        };
        let page = get_all_paginated(&db, None, SortOrder::Asc, &winter, 1, 20).await.unwrap();
        assert_eq!(page.total, 2);

        let colors = ArticleFilters {
            base_color: Some("noir".into()),
            ..Default::default()
        };
        assert!(get_all(&db, None, SortOrder::Asc, &colors).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_an_image_returns_the_removed_row() {
        let db = test_pool().await;
        seed_reference_data(&db).await;
        let article_id = seed_article(&db, "VRO00001").await;
        let mut conn = db.acquire().await.unwrap();

        let id = add_image(&mut conn, article_id, "a.png", None, true, 0).await.unwrap();
        assert_eq!(next_image_sort_order(&mut conn, article_id).await.unwrap(), 1);
        let removed = delete_image(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(removed.path, "a.png");
        assert!(delete_image(&mut conn, id).await.unwrap().is_none());
    }
}
