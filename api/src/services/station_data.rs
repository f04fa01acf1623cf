//! Station data orchestration: validity lookup, record loading, aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::AppError;

use super::aggregation::{
    all_seasonal_means, annual_means, seasonal_means, AnnualMean, Season, SeasonalMean,
};
use super::metadata::{MetadataIndex, Station, YearRange};
use super::records::RecordStore;
use super::validation::{check_bounds, YearBounds};

/// Aggregated temperature series for one station and year window.
#[derive(Debug, Clone, PartialEq)]
pub struct StationData {
    pub station: Station,
    /// Authoritative year axis: one entry per requested year.
    pub annual: Vec<AnnualMean>,
    pub seasons: BTreeMap<Season, Vec<SeasonalMean>>,
}

/// Combines the metadata index, record store and aggregation engine.
#[derive(Clone)]
pub struct StationDataService {
    index: Arc<MetadataIndex>,
    records: Arc<RecordStore>,
    bounds: YearBounds,
}

impl StationDataService {
    pub fn new(index: Arc<MetadataIndex>, records: Arc<RecordStore>, bounds: YearBounds) -> Self {
        Self {
            index,
            records,
            bounds,
        }
    }

    /// Annual and seasonal means for `station_id` over `years`.
    ///
    /// `seasons` selects which seasonal series to return; `None` returns all four.
    ///
    /// Errors:
    /// - `BadRequest` when `years` falls outside the dataset bounds
    /// - `NotFound` for an unknown id or a window disjoint from the station's coverage
    /// - `Records` when the station's records cannot be loaded
    pub async fn get(
        &self,
        station_id: &str,
        years: YearRange,
        seasons: Option<&[Season]>,
    ) -> Result<StationData, AppError> {
        check_bounds(years, self.bounds)?;

        let station = self
            .index
            .lookup(station_id)
            .ok_or_else(|| AppError::NotFound("Station not found.".to_string()))?;

        if !years.intersects(&station.coverage()) {
            return Err(AppError::NotFound(
                "No data in the requested range.".to_string(),
            ));
        }

        // December of the preceding year feeds winter of the first year.
        let fetch = years.extend_back(1);
        let window = self.records.records(&station.id, fetch).await?;

        let annual = annual_means(window.iter(), years);
        let seasons_out = match seasons {
            None => all_seasonal_means(window.iter(), years),
            Some(selected) => selected
                .iter()
                .map(|&season| (season, seasonal_means(window.iter(), season, years)))
                .collect(),
        };

        tracing::debug!(
            "Aggregated {} for {}-{} ({} seasons)",
            station.id,
            years.start(),
            years.end(),
            seasons_out.len()
        );

        Ok(StationData {
            station: station.clone(),
            annual,
            seasons: seasons_out,
        })
    }
}
