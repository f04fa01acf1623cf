//! Request validation shared by the HTTP handlers and the station data service.
//!
//! Messages are returned to the client verbatim in the `error` field.

use crate::errors::AppError;

use super::metadata::YearRange;

/// Dataset-wide bounds for requested year windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearBounds {
    pub min_year: i32,
    pub max_year: i32,
}

pub fn validate_latitude(lat: Option<f64>) -> Result<f64, AppError> {
    lat.filter(|v| v.is_finite() && (-90.0..=90.0).contains(v))
        .ok_or_else(|| AppError::BadRequest("Latitude must be between -90 and 90.".to_string()))
}

pub fn validate_longitude(lon: Option<f64>) -> Result<f64, AppError> {
    lon.filter(|v| v.is_finite() && (-180.0..=180.0).contains(v))
        .ok_or_else(|| {
            AppError::BadRequest("Longitude must be between -180 and 180.".to_string())
        })
}

pub fn validate_radius(radius: Option<f64>) -> Result<f64, AppError> {
    // is_finite() first: NaN fails every comparison, including `<= 0.0`.
    radius
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| AppError::BadRequest("Radius must be greater than 0.".to_string()))
}

/// Validate a requested year window against the dataset bounds.
pub fn validate_years(
    start: Option<i32>,
    end: Option<i32>,
    bounds: YearBounds,
) -> Result<YearRange, AppError> {
    let (Some(start), Some(end)) = (start, end) else {
        return Err(AppError::BadRequest(
            "Start and end year are required.".to_string(),
        ));
    };
    let range = YearRange::new(start, end).ok_or_else(|| {
        AppError::BadRequest("Start year must be earlier than end year.".to_string())
    })?;
    check_bounds(range, bounds)?;
    Ok(range)
}

/// Re-check an already constructed window against the dataset bounds.
pub fn check_bounds(range: YearRange, bounds: YearBounds) -> Result<(), AppError> {
    if range.start() < bounds.min_year || range.end() > bounds.max_year {
        return Err(AppError::BadRequest(format!(
            "Year range must be between {} and {}.",
            bounds.min_year, bounds.max_year
        )));
    }
    Ok(())
}

/// An absent limit means "all stations"; a present one must be a positive integer.
pub fn validate_limit(raw: Option<&str>) -> Result<Option<usize>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .map(Some)
        .ok_or_else(|| AppError::BadRequest("Limit must be a positive integer.".to_string()))
}
