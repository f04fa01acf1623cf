//! Annual and seasonal temperature means.
//!
//! Pure functions of their input observations. Every series is dense over the
//! requested `YearRange`: a year without a single valid reading still gets an
//! entry with `tmin`/`tmax` set to `None`.
//!
//! Meteorological seasons:
//!
//! | Season | Months        | Label year `Y`              |
//! |--------|---------------|-----------------------------|
//! | spring | Mar, Apr, May | Y                           |
//! | summer | Jun, Jul, Aug | Y                           |
//! | autumn | Sep, Oct, Nov | Y                           |
//! | winter | Dec, Jan, Feb | Dec(Y-1) + Jan(Y) + Feb(Y)  |
//!
//! Values are not rounded here.

use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use super::dly::Observation;
use super::metadata::YearRange;

/// A meteorological season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [
        Season::Spring,
        Season::Summer,
        Season::Autumn,
        Season::Winter,
    ];

    /// Season and label year for a calendar month.
    pub fn of(year: i32, month: u32) -> (Season, i32) {
        match month {
            3..=5 => (Season::Spring, year),
            6..=8 => (Season::Summer, year),
            9..=11 => (Season::Autumn, year),
            12 => (Season::Winter, year + 1),
            _ => (Season::Winter, year),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        }
    }
}

impl std::str::FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Season::ALL
            .into_iter()
            .find(|season| season.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// Mean daily minimum/maximum temperature over one calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct AnnualMean {
    pub year: i32,
    /// Mean of valid daily TMIN values in °C, null when there are none
    pub tmin: Option<f64>,
    /// Mean of valid daily TMAX values in °C, null when there are none
    pub tmax: Option<f64>,
}

/// Mean daily minimum/maximum temperature over one season of a year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct SeasonalMean {
    /// Label year (winter `Y` covers December of `Y-1`)
    pub year: i32,
    pub tmin: Option<f64>,
    pub tmax: Option<f64>,
}

/// Running sums for one bucket.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    tmin_sum: f64,
    tmin_count: u32,
    tmax_sum: f64,
    tmax_count: u32,
}

impl Accumulator {
    fn add(&mut self, obs: &Observation) {
        if let Some(v) = obs.tmin.filter(|v| v.is_finite()) {
            self.tmin_sum += v;
            self.tmin_count += 1;
        }
        if let Some(v) = obs.tmax.filter(|v| v.is_finite()) {
            self.tmax_sum += v;
            self.tmax_count += 1;
        }
    }

    fn means(&self) -> (Option<f64>, Option<f64>) {
        let mean = |sum: f64, count: u32| (count > 0).then(|| sum / count as f64);
        (
            mean(self.tmin_sum, self.tmin_count),
            mean(self.tmax_sum, self.tmax_count),
        )
    }
}

/// Dense per-year buckets over a year range.
struct YearBuckets {
    years: YearRange,
    buckets: Vec<Accumulator>,
}

impl YearBuckets {
    fn new(years: YearRange) -> Self {
        Self {
            years,
            buckets: vec![Accumulator::default(); years.len()],
        }
    }

    fn add(&mut self, year: i32, obs: &Observation) {
        if self.years.contains(year) {
            self.buckets[(year - self.years.start()) as usize].add(obs);
        }
    }

    fn into_means(self) -> impl Iterator<Item = (i32, Option<f64>, Option<f64>)> {
        self.years.years().zip(self.buckets).map(|(year, acc)| {
            let (tmin, tmax) = acc.means();
            (year, tmin, tmax)
        })
    }
}

/// Annual means for every year in `years`, ascending.
pub fn annual_means<'a, I>(observations: I, years: YearRange) -> Vec<AnnualMean>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut buckets = YearBuckets::new(years);
    for obs in observations {
        buckets.add(obs.year(), obs);
    }
    buckets
        .into_means()
        .map(|(year, tmin, tmax)| AnnualMean { year, tmin, tmax })
        .collect()
}

/// Means of one season for every label year in `years`, ascending.
pub fn seasonal_means<'a, I>(observations: I, season: Season, years: YearRange) -> Vec<SeasonalMean>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut buckets = YearBuckets::new(years);
    for obs in observations {
        let (s, label_year) = Season::of(obs.year(), obs.month());
        if s == season {
            buckets.add(label_year, obs);
        }
    }
    into_seasonal(buckets)
}

/// All four seasons in a single pass.
pub fn all_seasonal_means<'a, I>(observations: I, years: YearRange) -> BTreeMap<Season, Vec<SeasonalMean>>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut per_season: BTreeMap<Season, YearBuckets> = Season::ALL
        .into_iter()
        .map(|season| (season, YearBuckets::new(years)))
        .collect();

    for obs in observations {
        let (season, label_year) = Season::of(obs.year(), obs.month());
        if let Some(buckets) = per_season.get_mut(&season) {
            buckets.add(label_year, obs);
        }
    }

    per_season
        .into_iter()
        .map(|(season, buckets)| (season, into_seasonal(buckets)))
        .collect()
}

fn into_seasonal(buckets: YearBuckets) -> Vec<SeasonalMean> {
    buckets
        .into_means()
        .map(|(year, tmin, tmax)| SeasonalMean { year, tmin, tmax })
        .collect()
}
