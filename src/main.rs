mod config;
mod middleware;

mod db;
mod engine;
mod error;
mod models;
mod notify;
mod routes;
mod store;

use std::sync::Arc;

use crate::{config::Config, engine::LifecycleEngine, models::AppState};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let engine = LifecycleEngine::new(
        Arc::new(store::PgAppointmentStore::new(pool.clone())),
        Arc::new(store::PgDirectory::new(pool.clone())),
        Arc::new(notify::DbNotifier::new(pool.clone())),
    );

    let state = AppState { db: pool, engine };

    // DEV ONLY: allow browser/WebView clients (static frontend) to call the
    // API. This fixes OPTIONS preflight (CORS) that otherwise returns 405.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-user-id"),
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
