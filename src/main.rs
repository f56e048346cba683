use std::sync::Arc;

use tower_http::cors::CorsLayer;

use fightclub_backend::api;
use fightclub_backend::config::Config;
use fightclub_backend::db::Database;
use fightclub_backend::metrics;
use fightclub_backend::rate_limit::RateLimiter;
use fightclub_backend::tyler::TylerClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let tyler = Arc::new(TylerClient::new(&config));
    let rate_limiter = RateLimiter::new();

    let app = api::router(db, tyler, rate_limiter).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to port {}: {e}", config.port));

    tracing::info!("Fight Club backend listening on port {}", config.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
