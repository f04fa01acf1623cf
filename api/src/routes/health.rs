use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use super::stations::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// API version
    pub version: String,
    /// Number of stations in the metadata index
    pub stations: usize,
    /// Stations whose daily records are currently cached
    pub cached_stations: usize,
    /// Number of record files parsed since startup
    pub record_loads: u64,
}

/// Health check endpoint.
///
/// The metadata index is loaded before the server binds, so a running
/// service always reports "ok".
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub(crate) async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stations: state.index.len(),
        cached_stations: state.records.cached_stations(),
        record_loads: state.records.loads(),
    })
}
