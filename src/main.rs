mod config;
mod database;
mod error;
mod handlers;
mod models;
mod repositories;
mod services;
mod storage;
mod utils;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use dotenvy::dotenv;
use log::info;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use config::Config;
use database::create_database_pool;
use error::AppError;
use handlers::AppState;
use storage::LocalImageStorage;

/// Public URL prefix of stored images.
const UPLOADS_ROUTE: &str = "/uploads";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;
    let db = create_database_pool(&config.database_url).await?;
    info!("Database ready at {}", config.database_url);

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .map_err(|e| AppError::Config(format!("cannot create {}: {}", config.upload_dir.display(), e)))?;
    let images = LocalImageStorage::new(
        config.upload_dir.clone(),
        UPLOADS_ROUTE,
        config.max_upload_bytes,
    );

    let addr = config.bind_address();
    let state = AppState {
        db,
        images: Arc::new(images),
        config: Arc::new(config),
    };
    let app = create_router(state);

    info!("Wardrobe server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Config(format!("cannot bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    // Several images per request, each up to the configured size.
    let body_limit = state.config.max_upload_bytes.saturating_mul(10);
    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        // Articles
        .route(
            "/articles",
            get(handlers::articles::list_articles).post(handlers::articles::create_article),
        )
        .route("/articles/export", get(handlers::articles::export_articles))
        .route(
            "/articles/:id",
            get(handlers::articles::get_article).put(handlers::articles::update_article),
        )
        .route("/articles/:id/images", post(handlers::articles::add_image))
        .route("/images/:id", delete(handlers::articles::delete_image))
        .route("/images/:id/primary", post(handlers::articles::set_primary_image))

        // History
        .route(
            "/articles/:id/events",
            get(handlers::events::article_history).post(handlers::events::log_event),
        )
        .route("/grouped-events", get(handlers::events::grouped_events))
        .route("/grouped-events/:id", get(handlers::events::grouped_event_detail))

        // Lookup tables
        .route("/reference/:table", get(handlers::reference::list))
        .route("/reference/:table/name-taken", get(handlers::reference::name_check))
        .route("/reference/:table/:id", get(handlers::reference::detail))

        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
