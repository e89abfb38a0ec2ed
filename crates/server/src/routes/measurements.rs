use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use measure_saver::{validate, MeasurementPayload};
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters of an upload
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    /// Identifier of the uploading application. Only its presence is checked.
    #[serde(default)]
    pub appid: Option<String>,
}

impl UploadParams {
    fn app_id(&self) -> Option<&str> {
        self.appid.as_deref().filter(|id| !id.is_empty())
    }
}

/// Store one uploaded measurement.
///
/// `POST /v0/measurements?appid=<id>`
///
/// The body is read as raw bytes so that every decode failure, whatever the
/// content type, ends up as a `400` from this handler.
///
/// # Responses
/// - `200`: the stored record, including its assigned `id`
/// - `400`: missing `appid`, malformed body, or missing/wrongly typed required
///   fields (listed in `error.details.violations`)
/// - `500`: the store refused the insert
pub async fn post_measurement(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ServerResult<impl IntoResponse> {
    let app_id = params.app_id().ok_or(ServerError::MissingAppId)?;
    let received_at = Utc::now();

    let payload = MeasurementPayload::decode(&body)?;

    let mut measurement = validate(payload)?;
    measurement.timestamp = Some(received_at);

    let stored = state.store.insert(measurement).await?;

    tracing::info!(
        id = stored.id,
        app_id = %app_id,
        browser_id = %stored.browser_id,
        "Measurement stored"
    );

    Ok(Json(stored))
}
