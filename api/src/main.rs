// GHCN Climate API v0.1
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use routes::stations::AppState;
use services::metadata::MetadataIndex;
use services::records::{RecordSource, RecordStore};
use services::validation::YearBounds;

/// OpenAPI document for the GHCN Climate API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GHCN Climate API",
        version = "0.1.0",
        description = "Station search and temperature aggregation over GHCN-Daily. \
            Finds weather stations near a point with data in a year window, and \
            computes annual and seasonal mean daily minimum and maximum temperatures \
            from the station's daily records.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Stations", description = "Station search and temperature series"),
    ),
    paths(
        routes::health::health_check,
        routes::stations::search_stations,
        routes::stations::get_station_data,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::stations::SearchResult,
            routes::stations::StationDataResponse,
            services::aggregation::AnnualMean,
            services::aggregation::SeasonalMean,
            services::aggregation::Season,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AppConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    tracing::info!("Data directory: {}", config.data_dir.display());

    // Metadata is required; without it no request can be served.
    let started = Instant::now();
    let index = match MetadataIndex::load(&config.stations_file, &config.inventory_file) {
        Ok(index) => index,
        Err(e) => {
            tracing::error!("Failed to load station metadata: {}", e);
            std::process::exit(1);
        }
    };
    if index.is_empty() {
        tracing::warn!(
            "No stations with temperature coverage in {}",
            config.inventory_file.display()
        );
    }
    tracing::info!(
        "Loaded {} stations in {} ms",
        index.len(),
        started.elapsed().as_millis()
    );

    let source = match &config.records_base_url {
        Some(base_url) => {
            tracing::info!("Missing station records are fetched from {}", base_url);
            RecordSource::with_remote(
                &config.records_dir,
                base_url,
                config.records_fetch_timeout,
            )
        }
        None => RecordSource::local(&config.records_dir),
    };
    let records = RecordStore::new(source, config.record_cache_ttl);

    let app_state = AppState::new(
        Arc::new(index),
        Arc::new(records),
        YearBounds {
            min_year: config.min_year,
            max_year: config.max_year,
        },
    );

    // Read-only API: GET only
    let cors = CorsLayer::new()
        .allow_origin(allow_origin(&config))
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let app = routes::router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server terminated unexpectedly: {}", e);
        std::process::exit(1);
    }
}

/// `LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ghcn_climate_api=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn allow_origin(config: &AppConfig) -> AllowOrigin {
    let Some(origins) = config.cors_origins() else {
        return AllowOrigin::any();
    };
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    AllowOrigin::list(values)
}
