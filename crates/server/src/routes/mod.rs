//! API route handlers
//!
//! - `health`: liveness and readiness probes
//! - `measurements`: measurement uploads

pub mod health;
pub mod measurements;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info
///
/// This is the root endpoint (GET /) and requires no API key.
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "measure-saver",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v0",
        "endpoints": [
            "/v0/measurements",
            "/health",
            "/ready"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
