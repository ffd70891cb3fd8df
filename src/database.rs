use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};

pub type Database = Pool<Sqlite>;

/// Status every new article starts in.
pub const NEW_ACQUISITION_STATUS_ID: i64 = 1;
/// Recorded as the creator of events when no user identity is supplied.
pub const SYSTEM_USER_ID: i64 = 1;

pub async fn create_database_pool(database_url: &str) -> Result<Database, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    init_schema(&pool).await?;
    log::info!("Connected to database at {}", database_url);
    Ok(pool)
}

/// Write transaction opened with `BEGIN IMMEDIATE`.
///
/// The write lock is held from the first statement, so values read inside it
/// cannot be invalidated by another writer before commit. A competing writer
/// waits on the busy timeout at `begin`. Dropped without `commit` or
/// `rollback`, the connection is closed rather than returned to the pool
/// with the transaction still open.
pub struct ImmediateTransaction {
    conn: Option<PoolConnection<Sqlite>>,
}

impl ImmediateTransaction {
    pub async fn begin(db: &Database) -> Result<Self, sqlx::Error> {
        let mut conn = db.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn: Some(conn) })
    }

    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        self.finish("COMMIT").await
    }

    pub async fn rollback(mut self) -> Result<(), sqlx::Error> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        if let Err(e) = sqlx::query(statement).execute(&mut *conn).await {
            // Unknown transaction state: never hand this connection out again.
            drop(conn.detach());
            return Err(e);
        }
        Ok(())
    }
}

impl Deref for ImmediateTransaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match &self.conn {
            Some(conn) => &**conn,
            None => unreachable!("transaction used after commit or rollback"),
        }
    }
}

impl DerefMut for ImmediateTransaction {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match &mut self.conn {
            Some(conn) => &mut **conn,
            None => unreachable!("transaction used after commit or rollback"),
        }
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            log::warn!("Write transaction dropped while open, closing its connection");
            drop(conn.detach());
        }
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS brands (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS materials (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS colors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        hex_code TEXT,
        base_category TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS suppliers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        website TEXT,
        notes TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS storage_locations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS category_types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        code TEXT NOT NULL UNIQUE,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS statuses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        availability_type TEXT NOT NULL DEFAULT 'in_stock'
            CHECK (availability_type IN ('in_stock', 'out_of_stock', 'limbo')),
        description TEXT,
        behavior_category TEXT
            CHECK (behavior_category IS NULL OR behavior_category IN ('usage', 'service', 'storage', 'other'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS item_users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS day_moments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        sort_order INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_ref TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        description TEXT,
        season TEXT,
        condition TEXT
            CHECK (condition IS NULL OR condition IN ('new', 'excellent', 'good', 'mediocre', 'needs_repair')),
        size TEXT,
        weight_grams INTEGER,
        category_type_id INTEGER NOT NULL REFERENCES category_types(id),
        brand_id INTEGER REFERENCES brands(id),
        primary_color_id INTEGER REFERENCES colors(id),
        secondary_color_id INTEGER REFERENCES colors(id),
        material_id INTEGER REFERENCES materials(id),
        purchase_date TEXT,
        purchase_price TEXT,
        supplier_id INTEGER REFERENCES suppliers(id),
        estimated_value TEXT,
        rating INTEGER CHECK (rating IS NULL OR rating BETWEEN 0 AND 5),
        notes TEXT,
        current_status_id INTEGER NOT NULL REFERENCES statuses(id),
        current_storage_location_id INTEGER REFERENCES storage_locations(id),
        last_worn_at TEXT,
        times_worn INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS article_images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        path TEXT NOT NULL,
        caption TEXT,
        is_primary INTEGER NOT NULL DEFAULT 0,
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS associated_articles (
        article_id_1 INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        article_id_2 INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        PRIMARY KEY (article_id_1, article_id_2),
        CHECK (article_id_1 < article_id_2)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS article_suitable_event_types (
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        event_type_id INTEGER NOT NULL REFERENCES event_types(id) ON DELETE CASCADE,
        PRIMARY KEY (article_id, event_type_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_id INTEGER NOT NULL REFERENCES articles(id),
        log_date TEXT NOT NULL,
        log_time TEXT,
        status_id INTEGER NOT NULL REFERENCES statuses(id),
        event_type_id INTEGER REFERENCES event_types(id),
        event_name TEXT,
        item_user_id INTEGER REFERENCES item_users(id),
        supplier_id INTEGER REFERENCES suppliers(id),
        cost TEXT,
        currency TEXT,
        created_by_user_id INTEGER NOT NULL REFERENCES users(id),
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_log_images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_log_id INTEGER NOT NULL REFERENCES event_logs(id),
        path TEXT NOT NULL,
        caption TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS grouped_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT,
        event_date TEXT NOT NULL,
        event_time TEXT,
        notes TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_log_group_links (
        event_log_id INTEGER NOT NULL REFERENCES event_logs(id),
        grouped_event_id INTEGER NOT NULL REFERENCES grouped_events(id),
        PRIMARY KEY (event_log_id, grouped_event_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_event_logs_article ON event_logs(article_id, log_date, log_time)",
    "CREATE INDEX IF NOT EXISTS idx_article_images_article ON article_images(article_id)",
];

// Ids 1.. are relied upon by NEW_ACQUISITION_STATUS_ID and SYSTEM_USER_ID.
const SEED: &[&str] = &[
    "INSERT OR IGNORE INTO users (id, username) VALUES (1, 'system')",
    "INSERT OR IGNORE INTO statuses (id, name, availability_type, description) VALUES
        (1, 'Acheté (Nouveau)', 'in_stock', 'Newly acquired, not yet put away'),
        (2, 'Disponible et rangé', 'in_stock', 'Stored and ready to wear'),
        (3, 'En cours d''utilisation (porté)', 'out_of_stock', 'Currently worn'),
        (4, 'En nettoyage', 'out_of_stock', 'At the cleaner or in the wash'),
        (5, 'En réparation', 'out_of_stock', 'Being repaired'),
        (6, 'Vendu', 'out_of_stock', 'Sold'),
        (7, 'Prêté', 'limbo', 'Lent to someone')",
];

/// Creates every table if missing and inserts the well-known rows.
pub async fn init_schema(db: &Database) -> Result<(), sqlx::Error> {
    for statement in SCHEMA.iter().chain(SEED.iter()) {
        sqlx::query(statement).execute(db).await?;
    }
    Ok(())
}

/// Single in-memory connection: every pooled connection would otherwise see its own empty database.
#[cfg(test)]
pub async fn test_pool() -> Database {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("in-memory url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("in-memory database");
    init_schema(&pool).await.expect("schema");
    pool
}

/// File-backed pool for tests that need several connections to contend for locks.
#[cfg(test)]
pub async fn file_pool(dir: &std::path::Path) -> Database {
    let url = format!("sqlite://{}", dir.join("wardrobe.db").display());
    create_database_pool(&url).await.expect("file database")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_is_idempotent_and_seeds_defaults() {
        let db = test_pool().await;
        init_schema(&db).await.unwrap();

        let status: String = sqlx::query_scalar("SELECT name FROM statuses WHERE id = ?")
            .bind(NEW_ACQUISITION_STATUS_ID)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(status, "Acheté (Nouveau)");

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(users, 1);
    }

    #[tokio::test]
    async fn immediate_transaction_serializes_writers() {
        let dir = tempfile::tempdir().unwrap();
        let db = file_pool(dir.path()).await;

        let mut first = ImmediateTransaction::begin(&db).await.unwrap();
        sqlx::query("INSERT INTO brands (name) VALUES ('Sézane')")
            .execute(&mut *first)
            .await
            .unwrap();

        let second_db = db.clone();
        let second = tokio::spawn(async move {
            let mut tx = ImmediateTransaction::begin(&second_db).await.unwrap();
            let seen: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM brands")
                .fetch_one(&mut *tx)
                .await
                .unwrap();
            tx.commit().await.unwrap();
            seen
        });

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        first.commit().await.unwrap();

        // The second writer only got its lock once the first had committed.
        assert_eq!(second.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn competing_writer_times_out_as_busy() {
        let dir = tempfile::tempdir().unwrap();
        let db = file_pool(dir.path()).await;
        let _holder = ImmediateTransaction::begin(&db).await.unwrap();

        let impatient = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            dir.path().join("wardrobe.db").display()
        ))
        .unwrap()
        .busy_timeout(std::time::Duration::from_millis(50));
        let other = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(impatient)
            .await
            .unwrap();

        let err = ImmediateTransaction::begin(&other).await.err().unwrap();
        assert!(crate::error::is_busy(&err));
        assert!(crate::error::AppError::from(err).is_busy());
    }

    #[tokio::test]
    async fn dropped_transaction_releases_the_write_lock() {
        let dir = tempfile::tempdir().unwrap();
        let db = file_pool(dir.path()).await;

        let mut abandoned = ImmediateTransaction::begin(&db).await.unwrap();
        sqlx::query("INSERT INTO brands (name) VALUES ('Sézane')")
            .execute(&mut *abandoned)
            .await
            .unwrap();
        drop(abandoned);

        let mut tx = ImmediateTransaction::begin(&db).await.unwrap();
        let brands: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM brands")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(brands, 0);
    }
}
