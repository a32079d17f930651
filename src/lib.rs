pub mod config;
pub mod dataurl;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod normalize;
pub mod photos;
pub mod queue;
pub mod services;
pub mod store;
pub mod utils;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::Config;
use photos::PhotoStore;
use store::Store;

/// Shared handler state. Every collaborator sits behind a trait object so the
/// same router runs against Postgres in production and in-memory in tests.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub photos: Arc<dyn PhotoStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, photos: Arc<dyn PhotoStore>, config: Config) -> Self {
        Self {
            store,
            photos,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        // Count capture
        .route("/api/counts", post(handlers::counts::submit_count))
        // Recount tasks
        .route(
            "/api/recounts",
            post(handlers::recounts::assign_recounts).get(handlers::recounts::list_recounts),
        )
        .route("/api/recounts/:id/done", post(handlers::recounts::complete_recount))
        // Aggregated export
        .route("/api/export", get(handlers::exports::export_counts))
        // Stored photo evidence
        .route("/photos/*key", get(handlers::photos::serve_photo))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
