//! Fixtures shared by the database-backed tests.

use crate::{database::Database, models::ArticleData, repositories::article};

pub const ROBE_CATEGORY_ID: i64 = 1;
pub const WARDROBE_LOCATION_ID: i64 = 1;
pub const SOIREE_EVENT_TYPE_ID: i64 = 1;
pub const ALICE_ITEM_USER_ID: i64 = 1;
pub const CLEANER_SUPPLIER_ID: i64 = 1;

pub const STATUS_NEW: i64 = 1;
pub const STATUS_STORED: i64 = 2;
pub const STATUS_WORN: i64 = 3;
pub const STATUS_CLEANING: i64 = 4;

pub async fn seed_reference_data(db: &Database) {
    let statements = [
        "INSERT INTO category_types (id, name, code) VALUES (1, 'Robe', 'VRO'), (2, 'Chaussures', 'CHA')",
        "INSERT INTO brands (id, name) VALUES (1, 'Sézane')",
        "INSERT INTO colors (id, name, base_category) VALUES (1, 'Bordeaux', 'rouge'), (2, 'Anthracite', 'gris')",
        "INSERT INTO storage_locations (id, name) VALUES (1, 'Armoire chambre'), (2, 'Valise grenier')",
        "INSERT INTO event_types (id, name) VALUES (1, 'Soirée'), (2, 'Travail')",
        "INSERT INTO item_users (id, name) VALUES (1, 'Alice')",
        "INSERT INTO suppliers (id, name) VALUES (1, 'Pressing du coin')",
    ];
    for statement in statements {
        sqlx::query(statement).execute(db).await.expect("seed reference data");
    }
}

pub fn article_data(name: &str) -> ArticleData {
    ArticleData {
        name: name.to_string(),
        category_type_id: ROBE_CATEGORY_ID,
        ..Default::default()
    }
}

pub async fn seed_article(db: &Database, article_ref: &str) -> i64 {
    let mut conn = db.acquire().await.expect("connection");
    article::create(&mut conn, article_ref, &article_data(article_ref))
        .await
        .expect("seed article")
}

pub async fn count_rows(db: &Database, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(db)
        .await
        .expect("count rows")
}
