//! Main Entrypoint for the Parla API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Choosing the conversation store (PostgreSQL or in-memory).
//! 3. Loading the base system prompt.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Serving until Ctrl+C, then tearing down every live session.

use anyhow::Context;
use parla_api::{config::Config, db::PgConversationStore, router::create_router, state::AppState};
use parla_core::{ConversationStore, InMemoryStore};
use sqlx::PgPool;
use std::{fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Reads `system_prompt.md` from the prompts directory, if there is one.
fn load_system_prompt(prompts_path: &Path) -> anyhow::Result<String> {
    let path = prompts_path.join("system_prompt.md");
    if !path.is_file() {
        warn!(path = %path.display(), "No system prompt found; sessions start without one");
        return Ok(String::new());
    }
    fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ConversationStore>> {
    let Some(database_url) = &config.database_url else {
        info!("DATABASE_URL not set. Conversations are kept in memory.");
        return Ok(Arc::new(InMemoryStore::new()));
    };
    let pool = PgPool::connect(database_url)
        .await
        .context("Failed to connect to database")?;
    let store = PgConversationStore::new(pool);
    store.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let store = open_store(&config).await?;
    let system_prompt = load_system_prompt(&config.prompts_path)?;
    let app_state = Arc::new(AppState::new(config.clone(), store, system_prompt));
    let registry = app_state.registry.clone();

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        model = %config.live_model,
        modalities = ?config.response_modalities,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let closed = registry.shutdown().await;
    info!(closed, "Server has shut down.");
    Ok(())
}
