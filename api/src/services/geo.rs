//! Point-radius station search.
//!
//! Great-circle distance by the haversine formula on a mean Earth radius.
//! Every station is scored (the catalog is ~100k entries, a linear scan is
//! well under a millisecond per thousand stations), filtered by radius and
//! optional year coverage, then ordered by `(distance_km, id)`.

use std::cmp::Ordering;

use super::metadata::{MetadataIndex, Station, YearRange};

/// Mean Earth radius (IUGG) in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<&Station> for GeoPoint {
    fn from(s: &Station) -> Self {
        Self::new(s.latitude, s.longitude)
    }
}

/// Great-circle distance between two points in kilometres.
///
/// Symmetric in its arguments and exactly 0 for identical points. The
/// haversine term is clamped to [0, 1] so rounding near antipodal points
/// cannot push `asin` out of its domain.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    // abs() keeps the deltas bit-identical when the arguments are swapped.
    let d_phi = (b.latitude - a.latitude).abs().to_radians();
    let d_lambda = (b.longitude - a.longitude).abs().to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Parameters of a station search. Inputs are assumed validated.
#[derive(Debug, Clone, Copy)]
pub struct SearchQuery {
    pub center: GeoPoint,
    pub radius_km: f64,
    /// Only return stations whose coverage intersects this window.
    pub coverage: Option<YearRange>,
    /// `None` returns every match.
    pub limit: Option<usize>,
}

/// A station within the search radius, with its full-precision distance.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub station: &'a Station,
    pub distance_km: f64,
}

/// Rank stations around `query.center`.
pub fn search<'a>(index: &'a MetadataIndex, query: &SearchQuery) -> Vec<SearchHit<'a>> {
    let mut hits: Vec<SearchHit<'a>> = index
        .all()
        .iter()
        .filter(|station| {
            query
                .coverage
                .map_or(true, |window| window.intersects(&station.coverage()))
        })
        .filter_map(|station| {
            let distance_km = haversine_km(query.center, GeoPoint::from(station));
            (distance_km <= query.radius_km).then_some(SearchHit {
                station,
                distance_km,
            })
        })
        .collect();

    hits.sort_by(compare_hits);

    if let Some(limit) = query.limit {
        hits.truncate(limit);
    }
    hits
}

fn compare_hits(a: &SearchHit<'_>, b: &SearchHit<'_>) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| a.station.id.cmp(&b.station.id))
}
