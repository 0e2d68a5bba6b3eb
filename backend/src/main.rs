//! Student Admissions Backend
//!
//! Accounts with roles, a SQLite-backed student roster, and an Excel mirror of
//! the roster that is kept in step with every roster change.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod spreadsheet;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use spreadsheet::StudentMirror;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub mirror: Arc<StudentMirror>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Student Admissions Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if !config.secure_cookies {
        tracing::warn!("Session cookies are not marked Secure (ADMISSIONS_SECURE_COOKIES)");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Open the roster mirror
    let mirror = Arc::new(StudentMirror::open(&config.mirror_path).await?);
    tracing::info!("Mirror path: {:?}", mirror.path());

    let state = AppState {
        repo,
        mirror,
        config: Arc::new(config.clone()),
    };

    // Bring the mirror in line with the store before serving
    let revision_id = state.repo.get_revision_id().await?;
    {
        let mut mirror = state.mirror.lock().await;
        if api::sync_mirror(&state, &mut mirror, revision_id).await {
            tracing::info!("Roster mirror synchronized at revision {}", revision_id);
        }
    }

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/", get(api::home))
        .route("/health", get(health_check))
        // Accounts
        .route("/register", get(api::register_page).post(api::register))
        .route("/login", get(api::login_page).post(api::login))
        .route("/logout", get(api::logout))
        // Roster
        .route(
            "/dashboard",
            get(api::show_dashboard).post(api::add_student),
        )
        .route("/upload", post(api::upload_students))
        .route("/delete/{id}", post(api::delete_student))
        .route("/mirror", get(api::download_mirror))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
