pub mod health;
pub mod stations;

use axum::{routing::get, Router};

use stations::AppState;

/// API routes without the outer layers (CORS, tracing, Swagger UI).
pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/stations", get(stations::search_stations))
        .route("/station/:id/data", get(stations::get_station_data))
        .with_state(state)
}
