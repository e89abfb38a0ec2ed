//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration
//! - Middleware stack (key gate, request ids, logging, CORS, timeouts)
//! - Store bootstrap and key-file loading
//! - Plain or TLS listeners with graceful shutdown

use crate::config::ServerConfig;
use crate::middleware::{api_key_gate, log_requests, request_id};
use crate::routes::{api_info, health, measurements, not_found};
use crate::state::ServerState;
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use measure_saver::{AllowedKeys, MeasurementStore, SqliteStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes and middleware
///
/// Routes are divided into:
/// - Public routes: /, /health, /ready
/// - Ingestion routes: /v0/measurements, behind the API key gate when key
///   files are configured
///
/// Middleware stack, outermost first:
/// 1. Trace layer
/// 2. Request ID tracking
/// 3. Request logging
/// 4. CORS
/// 5. Timeout handling
/// 6. API key gate (ingestion routes only)
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let public_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check));

    let mut ingest_routes = Router::new()
        .route("/v0/measurements", post(measurements::post_measurement))
        .layer(DefaultBodyLimit::max(state.config.max_body_size()));

    if state.key_gate_enabled() {
        ingest_routes = ingest_routes.layer(from_fn_with_state(state.clone(), api_key_gate));
    }

    Router::new()
        .merge(public_routes)
        .merge(ingest_routes)
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(cors)
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the API key allow-list, or `None` when no key file is configured.
pub fn load_allowed_keys(config: &ServerConfig) -> anyhow::Result<Option<AllowedKeys>> {
    if config.keys_files.is_empty() {
        tracing::warn!("No keys file specified. The endpoints will be unprotected.");
        return Ok(None);
    }

    let keys = AllowedKeys::from_files(&config.keys_files).context("Cannot read keys file")?;
    if keys.is_empty() {
        tracing::warn!("Keys files contain no keys; every upload will be rejected");
    }
    Ok(Some(keys))
}

/// Verify the store and create the schema if needed.
pub async fn prepare_store(store: &dyn MeasurementStore) -> anyhow::Result<()> {
    store
        .health_check()
        .await
        .context("Connection to the database failed")?;
    store
        .create_table_if_not_exists()
        .await
        .context("Cannot create database schema")?;
    Ok(())
}

/// Start the measure-saver HTTP server
///
/// Blocks until the server is shut down via SIGTERM or Ctrl+C. Any failure
/// before the listener is up (bad address, unreadable database or key file,
/// schema creation, TLS material) is returned and the server never serves.
///
/// # Initialization
///
/// 1. Sets up structured JSON logging with the configured log level
/// 2. Opens the SQLite store, checks it and creates the schema
/// 3. Loads the allowed API keys, if any key file is configured
/// 4. Builds the router and binds plain HTTP or TLS
///
/// # Example
///
/// ```rust,no_run
/// use server::config::{Cli, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig::load(&Cli::default())?;
///     server::start_server(config).await
/// }
/// ```
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();
    health::mark_start();

    let addr: SocketAddr = config
        .socket_addr()
        .with_context(|| format!("Invalid listen address {}", config.listen_addr))?;
    let tls = config.tls_paths()?;

    let sqlite = SqliteStore::open(&config.database_path)?;
    prepare_store(&sqlite).await?;
    let store: Arc<dyn MeasurementStore> = Arc::new(sqlite);

    let allowed_keys = load_allowed_keys(&config)?;
    let state = Arc::new(ServerState::new(
        config.clone(),
        store.clone(),
        allowed_keys,
    ));
    let app = build_router(state);

    tracing::info!(
        "Starting measure-saver on {} (tls: {}, key gate: {})",
        addr,
        tls.is_some(),
        !config.keys_files.is_empty()
    );
    tracing::info!(
        "Database: {}, Timeout: {}s, Max body: {}MB",
        config.database_path.display(),
        config.timeout_secs,
        config.max_body_size_mb
    );

    match tls {
        Some((cert, key)) => {
            let tls_config = RustlsConfig::from_pem_file(cert, key)
                .await
                .context("Cannot initialize TLS server")?;

            let handle = axum_server::Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(Duration::from_secs(10)));
            });

            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .context("Cannot initialize server")?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    store.close().await?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
