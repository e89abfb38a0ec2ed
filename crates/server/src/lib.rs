//! measure-saver server - HTTP REST endpoint for measurement uploads
//!
//! Receives network-measurement results as JSON, validates them and stores
//! them through the [`measure_saver::MeasurementStore`] insert gateway.
//!
//! # Features
//!
//! - **Authentication**: optional static API key gate (`key` query parameter),
//!   keys loaded from one or more text files at startup
//! - **Middleware**: CORS, request ID tracking, structured logging, timeouts
//! - **Configuration**: config file, `MEASURE_SAVER__*` environment variables
//!   and command-line flags
//! - **TLS**: served with rustls when a certificate and key are configured
//! - **Graceful Shutdown**: SIGTERM and Ctrl+C
//!
//! # API Endpoints
//!
//! ## Public Endpoints
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe (checks the store)
//!
//! ## Ingestion (API key required when key files are configured)
//!
//! - `POST /v0/measurements?appid=<id>` - Store one measurement

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{Cli, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
