//! Station catalog loaded once at startup.
//!
//! Reads the GHCN-Daily station list (`ghcnd-stations.txt`) and element
//! inventory (`ghcnd-inventory.txt`), both fixed-width ASCII:
//!
//! ```text
//! stations:  ID 1-11 | LATITUDE 13-20 | LONGITUDE 22-30 | ELEVATION 32-37 | STATE 39-40 | NAME 42-71
//! inventory: ID 1-11 | LATITUDE 13-20 | LONGITUDE 22-30 | ELEMENT 32-35 | FIRSTYEAR 37-40 | LASTYEAR 42-45
//! ```
//!
//! A station's year coverage is the union of its `TMIN` and `TMAX` inventory
//! spans. Stations without either element are not indexed.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors that can occur while loading the station catalog.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to read '{0}'")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Malformed line {line} in {file}: {message}")]
    Malformed {
        file: &'static str,
        line: usize,
        message: String,
    },
    #[error("Duplicate station id '{0}'")]
    DuplicateId(String),
    #[error("Invalid station '{id}': {message}")]
    InvalidStation { id: String, message: String },
}

/// Inclusive range of calendar years. Always `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct YearRange {
    start: i32,
    end: i32,
}

impl YearRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: i32, end: i32) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    /// The same range with `years` more years before the start.
    pub fn extend_back(&self, years: u16) -> Self {
        Self {
            start: self.start - i32::from(years),
            end: self.end,
        }
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &YearRange) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.start <= year && year <= self.end
    }

    pub fn intersects(&self, other: &YearRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

/// A climate station from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Station {
    /// GHCN station id (e.g. "GME00121150")
    pub id: String,
    pub name: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// First year with TMIN or TMAX observations
    pub start_year: i32,
    /// Last year with TMIN or TMAX observations
    pub end_year: i32,
}

impl Station {
    pub fn coverage(&self) -> YearRange {
        YearRange {
            start: self.start_year.min(self.end_year),
            end: self.start_year.max(self.end_year),
        }
    }
}

/// Immutable, read-only station index. Shared behind an `Arc`.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    stations: Vec<Station>,
    by_id: HashMap<String, usize>,
}

impl MetadataIndex {
    /// Load the catalog and inventory from disk.
    pub fn load(stations_path: &Path, inventory_path: &Path) -> Result<Self, MetadataError> {
        let stations_txt = std::fs::read_to_string(stations_path)
            .map_err(|e| MetadataError::Io(stations_path.to_path_buf(), e))?;
        let inventory_txt = std::fs::read_to_string(inventory_path)
            .map_err(|e| MetadataError::Io(inventory_path.to_path_buf(), e))?;
        Self::parse(&stations_txt, &inventory_txt)
    }

    /// Build the index from catalog and inventory file contents.
    pub fn parse(stations_txt: &str, inventory_txt: &str) -> Result<Self, MetadataError> {
        let coverage = parse_inventory(inventory_txt)?;
        let rows = parse_station_rows(stations_txt)?;

        let total = rows.len();
        let stations: Vec<Station> = rows
            .into_iter()
            .filter_map(|row| {
                let range = coverage.get(&row.id)?;
                Some(Station {
                    id: row.id,
                    name: row.name,
                    latitude: row.latitude,
                    longitude: row.longitude,
                    start_year: range.start,
                    end_year: range.end,
                })
            })
            .collect();

        if stations.len() < total {
            tracing::debug!(
                "Skipped {} catalog stations without TMIN/TMAX inventory",
                total - stations.len()
            );
        }

        Self::from_stations(stations)
    }

    /// Build the index from in-memory stations, preserving their order.
    pub fn from_stations(stations: Vec<Station>) -> Result<Self, MetadataError> {
        let mut by_id = HashMap::with_capacity(stations.len());
        for (pos, station) in stations.iter().enumerate() {
            validate_station(station)?;
            if by_id.insert(station.id.clone(), pos).is_some() {
                return Err(MetadataError::DuplicateId(station.id.clone()));
            }
        }
        Ok(Self { stations, by_id })
    }

    pub fn lookup(&self, id: &str) -> Option<&Station> {
        self.by_id.get(id).map(|&pos| &self.stations[pos])
    }

    /// All stations in catalog order.
    pub fn all(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

fn validate_station(station: &Station) -> Result<(), MetadataError> {
    let invalid = |message: String| MetadataError::InvalidStation {
        id: station.id.clone(),
        message,
    };
    if station.id.is_empty() {
        return Err(invalid("empty id".to_string()));
    }
    if !(-90.0..=90.0).contains(&station.latitude) {
        return Err(invalid(format!("latitude {} out of range", station.latitude)));
    }
    if !(-180.0..=180.0).contains(&station.longitude) {
        return Err(invalid(format!(
            "longitude {} out of range",
            station.longitude
        )));
    }
    if station.start_year > station.end_year {
        return Err(invalid(format!(
            "start_year {} after end_year {}",
            station.start_year, station.end_year
        )));
    }
    Ok(())
}

struct StationRow {
    id: String,
    name: String,
    latitude: f64,
    longitude: f64,
}

/// Extract a fixed-width column (0-based, end-exclusive), trimmed.
/// Lines may be shorter than the full record when trailing fields are blank.
/// Callers reject non-ASCII lines first, so byte offsets are char boundaries.
pub(crate) fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    line.get(start..end).map(str::trim).unwrap_or("")
}

fn parse_station_rows(text: &str) -> Result<Vec<StationRow>, MetadataError> {
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = |message: String| MetadataError::Malformed {
            file: "stations",
            line: idx + 1,
            message,
        };
        if !line.is_ascii() {
            return Err(malformed("non-ASCII characters".to_string()));
        }

        let id = column(line, 0, 11);
        if id.is_empty() {
            return Err(malformed("missing station id".to_string()));
        }
        let latitude = parse_coord(column(line, 12, 20)).map_err(&malformed)?;
        let longitude = parse_coord(column(line, 21, 30)).map_err(&malformed)?;
        let name = match column(line, 41, 71) {
            "" => id,
            name => name,
        };

        rows.push(StationRow {
            id: id.to_string(),
            name: name.to_string(),
            latitude,
            longitude,
        });
    }
    Ok(rows)
}

/// Parse the inventory into per-station TMIN/TMAX year coverage.
fn parse_inventory(text: &str) -> Result<HashMap<String, YearRange>, MetadataError> {
    let mut coverage: HashMap<String, YearRange> = HashMap::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = |message: String| MetadataError::Malformed {
            file: "inventory",
            line: idx + 1,
            message,
        };
        if !line.is_ascii() {
            return Err(malformed("non-ASCII characters".to_string()));
        }
        let element = column(line, 31, 35);
        if element != "TMIN" && element != "TMAX" {
            continue;
        }

        let id = column(line, 0, 11);
        if id.is_empty() {
            return Err(malformed("missing station id".to_string()));
        }
        let first = parse_year(column(line, 36, 40)).map_err(&malformed)?;
        let last = parse_year(column(line, 41, 45)).map_err(&malformed)?;
        let span = YearRange::new(first, last)
            .ok_or_else(|| malformed(format!("first year {} after last year {}", first, last)))?;

        coverage
            .entry(id.to_string())
            .and_modify(|range| *range = range.union(&span))
            .or_insert(span);
    }
    Ok(coverage)
}

fn parse_coord(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid coordinate '{}'", raw))
}

fn parse_year(raw: &str) -> Result<i32, String> {
    raw.parse::<i32>()
        .map_err(|_| format!("invalid year '{}'", raw))
}
