use dotenvy::dotenv;
use std::sync::Arc;

use stockcount::{
    build_router,
    config::Config,
    database::{create_database_pool, run_migrations},
    error::AppError,
    photos::FileStore,
    store::PgStore,
    AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    if let Err(e) = run().await {
        log::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let db = create_database_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    let photos = FileStore::open(&config.photo_dir)?;
    let addr = config.bind_addr();
    let state = AppState::new(Arc::new(PgStore::new(db)), Arc::new(photos), config);

    // Build the application router
    let app = build_router(state);

    log::info!("Stockcount server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("cannot bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Internal(format!("server error: {}", e)))?;

    Ok(())
}
