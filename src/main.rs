//! Kanban Integration Backend
//!
//! Serves board-aware views of establishment records: which cards exist for
//! an establishment, who may see them, and the follow lists built from them.

mod access;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod join;
mod kanban;
mod models;
mod pipeline;
mod projector;
mod snapshot;
mod store;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::{Repository, SummaryStore};
use kanban::KanbanService;
use pipeline::BoardDomain;
use projector::CardProjector;
use snapshot::{Refresher, SharedSnapshot};
use store::SqliteBoardStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub kanban: Arc<KanbanService>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Kanban Integration Backend");
    tracing::info!("Board store path: {:?}", config.board_db_path);
    tracing::info!("Application database path: {:?}", config.app_db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (KANBAN_API_PSK). Authentication is disabled!");
    }

    // Initialize both stores
    let boards = Arc::new(SqliteBoardStore::open(&config.board_db_path).await?);
    let pool = db::init_database(&config.app_db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let referentiel = repo.load_referentiel().await?;
    tracing::info!(
        departements = referentiel.departements.len(),
        regions = referentiel.regions.len(),
        "Reference data loaded"
    );

    // First snapshot before serving, then keep it fresh in the background
    let shared = Arc::new(SharedSnapshot::new());
    let refresher = Refresher::new(boards.clone(), shared.clone(), config.refresh_timeout);
    if let Err(e) = refresher.refresh().await {
        tracing::warn!("Initial board snapshot failed, serving an empty one: {}", e);
    }
    refresher.spawn(config.refresh_interval);

    let kanban = KanbanService::new(
        shared,
        boards,
        repo,
        Arc::new(referentiel),
        BoardDomain::new(&config.slug_domain_regexp)?,
        CardProjector::new(config.board_url.clone()),
        config.web_base_url.clone(),
    );

    // Create application state
    let state = AppState {
        kanban: Arc::new(kanban),
        config: Arc::new(config.clone()),
    };

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
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();
    let request_timeout = state.config.request_timeout;

    let kanban_routes = Router::new()
        // Configuration
        .route("/config", get(api::get_config))
        .route("/user", get(api::get_user))
        .route("/boards/clear", post(api::clear_board_ids))
        // Cards
        .route("/cards", post(api::create_card))
        .route("/cards/search", post(api::cards_from_sirets_and_boards))
        .route("/cards/siret/{siret}", get(api::cards_from_siret))
        .route("/cards/{id}", get(api::get_card).put(api::update_card))
        .route("/cards/{id}/join", put(api::join_card))
        .route("/cards/{id}/part", put(api::part_card))
        .route("/cards/{id}/move", put(api::move_card))
        .route("/cards/{id}/archive", put(api::archive_card))
        .route("/cards/{id}/unarchive", put(api::unarchive_card))
        // Follows and exports
        .route("/follows", post(api::follows_for_user))
        .route("/follows/export", post(api::export_follows_for_user))
        .route("/exports/siret/{siret}", get(api::exports_from_siret));

    // PSK first, then the caller's identity
    let api_routes = Router::new()
        .nest("/kanban", kanban_routes)
        .layer(middleware::from_fn(auth::session_layer))
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(request_timeout_layer(request_timeout))
                .layer(cors),
        )
        .with_state(state)
}

/// Requests running past `timeout` are answered with 408.
pub fn request_timeout_layer(timeout: std::time::Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod testing;
