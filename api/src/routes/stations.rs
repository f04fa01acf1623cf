//! Station HTTP endpoints.
//!
//! - GET /stations?lat&lon&radius&start&end&limit
//! - GET /station/:id/data?start&end&seasons

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::{AppError, ErrorResponse};
use crate::helpers::{opt_round_1dp, round_1dp};
use crate::services::aggregation::{AnnualMean, Season, SeasonalMean};
use crate::services::geo::{search, GeoPoint, SearchHit, SearchQuery};
use crate::services::metadata::MetadataIndex;
use crate::services::records::RecordStore;
use crate::services::station_data::{StationData, StationDataService};
use crate::services::validation::{
    validate_latitude, validate_limit, validate_longitude, validate_radius, validate_years,
    YearBounds,
};

/// Shared application state for station endpoints.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) index: Arc<MetadataIndex>,
    pub(crate) records: Arc<RecordStore>,
    pub(crate) station_data: StationDataService,
    pub(crate) bounds: YearBounds,
}

impl AppState {
    pub(crate) fn new(index: Arc<MetadataIndex>, records: Arc<RecordStore>, bounds: YearBounds) -> Self {
        Self {
            station_data: StationDataService::new(index.clone(), records.clone(), bounds),
            index,
            records,
            bounds,
        }
    }
}

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

// Raw strings so that malformed numbers produce the same validation messages
// as missing ones instead of a framework rejection.

#[derive(Debug, Deserialize, IntoParams)]
pub struct StationSearchQuery {
    /// Latitude of the search centre in decimal degrees (-90..90)
    pub lat: Option<String>,
    /// Longitude of the search centre in decimal degrees (-180..180)
    pub lon: Option<String>,
    /// Search radius in kilometres (> 0)
    pub radius: Option<String>,
    /// First year of interest; stations must cover part of the window
    pub start: Option<String>,
    /// Last year of interest
    pub end: Option<String>,
    /// Maximum number of stations; omit to return every match
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StationDataQuery {
    /// First year of the window
    pub start: Option<String>,
    /// Last year of the window
    pub end: Option<String>,
    /// Comma-separated seasons to include (spring,summer,autumn,winter); omit for all
    pub seasons: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A station within the search radius.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResult {
    /// GHCN station id
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Great-circle distance from the search centre, rounded to 0.1 km
    pub distance_km: f64,
}

impl From<SearchHit<'_>> for SearchResult {
    fn from(hit: SearchHit<'_>) -> Self {
        Self {
            id: hit.station.id.clone(),
            name: hit.station.name.clone(),
            latitude: hit.station.latitude,
            longitude: hit.station.longitude,
            distance_km: round_1dp(hit.distance_km),
        }
    }
}

/// Annual and seasonal temperature means for a station.
#[derive(Debug, Serialize, ToSchema)]
pub struct StationDataResponse {
    /// GHCN station id
    pub station: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// One entry per requested year, ascending
    pub annual: Vec<AnnualMean>,
    /// Seasonal series keyed by season name
    pub seasons: BTreeMap<Season, Vec<SeasonalMean>>,
}

impl From<StationData> for StationDataResponse {
    fn from(data: StationData) -> Self {
        Self {
            station: data.station.id,
            name: data.station.name,
            latitude: data.station.latitude,
            longitude: data.station.longitude,
            annual: data
                .annual
                .into_iter()
                .map(|a| AnnualMean {
                    year: a.year,
                    tmin: opt_round_1dp(a.tmin),
                    tmax: opt_round_1dp(a.tmax),
                })
                .collect(),
            seasons: data
                .seasons
                .into_iter()
                .map(|(season, series)| {
                    let rounded = series
                        .into_iter()
                        .map(|s| SeasonalMean {
                            year: s.year,
                            tmin: opt_round_1dp(s.tmin),
                            tmax: opt_round_1dp(s.tmax),
                        })
                        .collect();
                    (season, rounded)
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Find stations around a point.
///
/// Returns stations within `radius` km of (`lat`, `lon`) whose coverage
/// intersects `start`..`end`, nearest first (ties ordered by id).
#[utoipa::path(
    get,
    path = "/stations",
    tag = "Stations",
    params(StationSearchQuery),
    responses(
        (status = 200, description = "Stations ordered by distance", body = Vec<SearchResult>),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
    )
)]
pub(crate) async fn search_stations(
    State(state): State<AppState>,
    Query(params): Query<StationSearchQuery>,
) -> Result<Json<Vec<SearchResult>>, AppError> {
    let lat = validate_latitude(parse_number(params.lat.as_deref()))?;
    let lon = validate_longitude(parse_number(params.lon.as_deref()))?;
    let radius_km = validate_radius(parse_number(params.radius.as_deref()))?;
    let years = validate_years(
        parse_int(params.start.as_deref()),
        parse_int(params.end.as_deref()),
        state.bounds,
    )?;
    let limit = validate_limit(params.limit.as_deref())?;

    let query = SearchQuery {
        center: GeoPoint::new(lat, lon),
        radius_km,
        coverage: Some(years),
        limit,
    };
    let results: Vec<SearchResult> = search(&state.index, &query)
        .into_iter()
        .map(SearchResult::from)
        .collect();

    tracing::debug!(
        "Station search ({}, {}) r={}km → {} results",
        lat,
        lon,
        radius_km,
        results.len()
    );
    Ok(Json(results))
}

/// Get annual and seasonal temperature means for a station.
#[utoipa::path(
    get,
    path = "/station/{id}/data",
    tag = "Stations",
    params(
        ("id" = String, Path, description = "GHCN station id"),
        StationDataQuery,
    ),
    responses(
        (status = 200, description = "Temperature means for the window", body = StationDataResponse),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
        (status = 404, description = "Unknown station or no coverage in the window", body = ErrorResponse),
        (status = 500, description = "Station records could not be loaded", body = ErrorResponse),
    )
)]
pub(crate) async fn get_station_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StationDataQuery>,
) -> Result<Json<StationDataResponse>, AppError> {
    let years = validate_years(
        parse_int(params.start.as_deref()),
        parse_int(params.end.as_deref()),
        state.bounds,
    )?;
    let seasons = parse_seasons(params.seasons.as_deref())?;

    let data = state
        .station_data
        .get(&id, years, seasons.as_deref())
        .await?;
    Ok(Json(StationDataResponse::from(data)))
}

fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_int(raw: Option<&str>) -> Option<i32> {
    raw.and_then(|s| s.trim().parse::<i32>().ok())
}

fn parse_seasons(raw: Option<&str>) -> Result<Option<Vec<Season>>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            name.parse::<Season>()
                .map_err(|bad| AppError::BadRequest(format!("Unknown season '{}'.", bad)))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dly::tests::dly_line;
    use crate::services::metadata::tests::station;
    use crate::services::records::RecordSource;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const NBG: &str = "GME00121150";

    fn state(dir: &std::path::Path) -> AppState {
        let index = MetadataIndex::from_stations(vec![
            station(NBG, 49.4702, 10.90191, 1960, 2020),
            station("GME00000002", 49.60, 11.00, 1950, 2020),
            station("GME00000003", 49.50, 10.95, 1880, 1940),
            station("USW00094728", 40.7789, -73.9692, 1869, 2024),
        ])
        .unwrap();
        let text = [
            dly_line(NBG, 2000, 1, "TMIN", &[(1, -33, ' '), (2, -31, ' '), (3, -30, ' ')]),
            dly_line(NBG, 2000, 1, "TMAX", &[(1, 21, ' ')]),
        ]
        .join("\n");
        std::fs::write(dir.join(format!("{}.dly", NBG)), text).unwrap();
        let records = RecordStore::new(RecordSource::local(dir), None);
        AppState::new(
            Arc::new(index),
            Arc::new(records),
            YearBounds {
                min_year: 1800,
                max_year: 2025,
            },
        )
    }

    async fn get(dir: &std::path::Path, uri: &str) -> (StatusCode, String) {
        let response = crate::routes::router(state(dir))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn json(body: &str) -> serde_json::Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_search_returns_nearest_first() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(
            dir.path(),
            "/stations?lat=49.4702&lon=10.90191&radius=50&start=1960&end=2025&limit=5",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let results = json(&body);
        let results = results.as_array().unwrap();
        // GME00000003 ends in 1940, outside the window; USW00094728 is too far.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["id"], NBG);
        assert_eq!(results[0]["distance_km"], 0.0);
        assert_eq!(results[1]["id"], "GME00000002");
    }

    #[tokio::test]
    async fn test_search_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (_, body) = get(
            dir.path(),
            "/stations?lat=49.4702&lon=10.90191&radius=50&start=1900&end=2025&limit=1",
        )
        .await;
        assert_eq!(json(&body).as_array().unwrap().len(), 1);

        let (_, body) = get(
            dir.path(),
            "/stations?lat=49.4702&lon=10.90191&radius=50&start=1900&end=2025",
        )
        .await;
        assert_eq!(json(&body).as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_search_distance_rounded() {
        let dir = tempfile::tempdir().unwrap();
        let (_, body) = get(
            dir.path(),
            "/stations?lat=49.4702&lon=10.90191&radius=50&start=1960&end=2025",
        )
        .await;
        let d = json(&body)[1]["distance_km"].as_f64().unwrap();
        assert_eq!(d, (d * 10.0).round() / 10.0);
    }

    #[tokio::test]
    async fn test_search_validation_messages() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("/stations?lat=91&lon=10&radius=50&start=1960&end=2020", "Latitude must be between -90 and 90."),
            ("/stations?lat=abc&lon=10&radius=50&start=1960&end=2020", "Latitude must be between -90 and 90."),
            ("/stations?lat=49&lon=181&radius=50&start=1960&end=2020", "Longitude must be between -180 and 180."),
            ("/stations?lat=49&lon=10&radius=0&start=1960&end=2020", "Radius must be greater than 0."),
            ("/stations?lat=49&lon=10&radius=50&end=2020", "Start and end year are required."),
            ("/stations?lat=49&lon=10&radius=50&start=2021&end=2020", "Start year must be earlier than end year."),
            ("/stations?lat=49&lon=10&radius=50&start=2030&end=2040", "Year range must be between 1800 and 2025."),
            ("/stations?lat=49&lon=10&radius=50&start=1960&end=2020&limit=0", "Limit must be a positive integer."),
        ];
        for (uri, message) in cases {
            let (status, body) = get(dir.path(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(json(&body)["error"], message, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_station_data_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(dir.path(), &format!("/station/{}/data?start=2000&end=2002", NBG)).await;
        assert_eq!(status, StatusCode::OK);

        let data = json(&body);
        assert_eq!(data["station"], NBG);
        assert_eq!(data["name"], format!("Station {}", NBG));
        assert_eq!(data["latitude"], 49.4702);
        let annual = data["annual"].as_array().unwrap();
        assert_eq!(annual.len(), 3);
        assert_eq!(annual[0]["year"], 2000);
        // (-3.3 - 3.1 - 3.0) / 3 = -3.1333.. → -3.1
        assert_eq!(annual[0]["tmin"], -3.1);
        assert_eq!(annual[0]["tmax"], 2.1);
        assert!(annual[1]["tmin"].is_null());
        assert!(annual[1]["tmax"].is_null());

        let seasons = data["seasons"].as_object().unwrap();
        let keys: Vec<&String> = seasons.keys().collect();
        assert_eq!(keys.len(), 4);
        for season in ["spring", "summer", "autumn", "winter"] {
            assert_eq!(seasons[season].as_array().unwrap().len(), 3, "{}", season);
        }
        assert_eq!(seasons["winter"][0]["tmax"], 2.1);
    }

    #[tokio::test]
    async fn test_station_data_season_subset() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(
            dir.path(),
            &format!("/station/{}/data?start=2000&end=2000&seasons=winter,summer", NBG),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let seasons = json(&body)["seasons"].as_object().unwrap().clone();
        let mut keys: Vec<String> = seasons.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["summer", "winter"]);

        let (status, body) = get(
            dir.path(),
            &format!("/station/{}/data?start=2000&end=2000&seasons=monsoon", NBG),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"], "Unknown season 'monsoon'.");
    }

    #[tokio::test]
    async fn test_station_data_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(dir.path(), "/station/XXX00000000/data?start=2000&end=2001").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["error"], "Station not found.");

        let (status, body) = get(dir.path(), &format!("/station/{}/data?start=2021&end=2025", NBG)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["error"], "No data in the requested range.");
    }

    #[tokio::test]
    async fn test_station_data_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(dir.path(), &format!("/station/{}/data?start=2030&end=2040", NBG)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"], "Year range must be between 1800 and 2025.");
    }

    #[tokio::test]
    async fn test_station_data_missing_records_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get(dir.path(), "/station/USW00094728/data?start=2000&end=2001").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(&body)["error"], "Station data request failed.");
    }

    #[tokio::test]
    async fn test_station_data_is_byte_identical_on_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("/station/{}/data?start=1999&end=2001", NBG);
        let (_, first) = get(dir.path(), &uri).await;
        let (_, second) = get(dir.path(), &uri).await;
        assert_eq!(first, second);
    }

    #[test]
    fn test_response_rounds_temperatures_once_to_one_decimal() {
        let data = StationData {
            station: station(NBG, 49.4702, 10.90191, 1960, 2020),
            annual: vec![AnnualMean {
                year: 2000,
                tmin: Some(1.0495),
                tmax: None,
            }],
            seasons: BTreeMap::from([(
                Season::Summer,
                vec![SeasonalMean {
                    year: 2000,
                    tmin: Some(-0.04),
                    tmax: Some(18.25),
                }],
            )]),
        };

        let response = StationDataResponse::from(data);
        assert_eq!(response.annual[0].tmin, Some(1.0));
        assert_eq!(response.annual[0].tmax, None);
        let summer = &response.seasons[&Season::Summer][0];
        assert_eq!(summer.tmin, Some(0.0));
        assert_eq!(summer.tmax, Some(18.3));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_number(Some(" 49.47 ")), Some(49.47));
        assert_eq!(parse_number(Some("NaN")), None);
        assert_eq!(parse_number(None), None);
        assert_eq!(parse_int(Some("2020")), Some(2020));
        assert_eq!(parse_int(Some("20x")), None);
        assert_eq!(parse_seasons(Some("")).unwrap(), None);
        assert_eq!(
            parse_seasons(Some("Spring, autumn")).unwrap(),
            Some(vec![Season::Spring, Season::Autumn])
        );
    }
}
