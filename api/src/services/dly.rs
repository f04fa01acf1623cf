//! GHCN-Daily `.dly` record parser.
//!
//! Each line holds one station, month and element:
//!
//! ```text
//! ID 1-11 | YEAR 12-15 | MONTH 16-17 | ELEMENT 18-21 | 31 x (VALUE 5, MFLAG 1, QFLAG 1, SFLAG 1)
//! ```
//!
//! Only `TMIN` and `TMAX` are read. Values are tenths of °C, `-9999` marks a
//! missing day, and a non-blank quality flag means the value failed a QC
//! check; both become `None`.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use thiserror::Error;

use super::metadata::column;

const MISSING: i32 = -9999;
const DAYS_PER_LINE: usize = 31;
const HEADER_LEN: usize = 21;
const SLOT_LEN: usize = 8;

/// Errors that can occur while parsing a `.dly` file.
#[derive(Debug, Error)]
pub enum DlyError {
    #[error("Line {line}: expected station '{expected}', found '{found}'")]
    StationMismatch {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("Line {line}: non-ASCII characters")]
    NonAscii { line: usize },
    #[error("Line {line}: invalid {field} '{value}'")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// One day of temperature readings for a station, in °C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub tmin: Option<f64>,
    pub tmax: Option<f64>,
}

impl Observation {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

#[derive(Clone, Copy)]
enum Element {
    Tmin,
    Tmax,
}

/// Parse a `.dly` file into date-ordered observations.
///
/// Dates with neither a valid TMIN nor a valid TMAX are dropped.
pub fn parse_dly(text: &str, station_id: &str) -> Result<Vec<Observation>, DlyError> {
    let mut days: BTreeMap<NaiveDate, (Option<f64>, Option<f64>)> = BTreeMap::new();

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        if !line.is_ascii() {
            return Err(DlyError::NonAscii { line: line_no });
        }

        let element = match column(line, 17, 21) {
            "TMIN" => Element::Tmin,
            "TMAX" => Element::Tmax,
            _ => continue,
        };

        let id = column(line, 0, 11);
        if id != station_id {
            return Err(DlyError::StationMismatch {
                line: line_no,
                expected: station_id.to_string(),
                found: id.to_string(),
            });
        }

        let year = parse_field::<i32>(line, line_no, 11, 15, "year")?;
        let month = parse_field::<u32>(line, line_no, 15, 17, "month")?;
        if !(1..=12).contains(&month) {
            return Err(DlyError::InvalidField {
                line: line_no,
                field: "month",
                value: month.to_string(),
            });
        }

        for day in 1..=DAYS_PER_LINE {
            let start = HEADER_LEN + (day - 1) * SLOT_LEN;
            if start >= line.len() {
                break;
            }
            let raw = column(line, start, start + 5);
            if raw.is_empty() {
                continue;
            }
            let value: i32 = raw.parse().map_err(|_| DlyError::InvalidField {
                line: line_no,
                field: "value",
                value: raw.to_string(),
            })?;
            let qflag = column(line, start + 6, start + 7);
            if value == MISSING || !qflag.is_empty() {
                continue;
            }
            // Slots past the end of short months are always -9999, but guard anyway.
            let Some(date) = NaiveDate::from_ymd_opt(year, month, day as u32) else {
                continue;
            };

            let celsius = value as f64 / 10.0;
            let entry = days.entry(date).or_insert((None, None));
            match element {
                Element::Tmin => entry.0 = Some(celsius),
                Element::Tmax => entry.1 = Some(celsius),
            }
        }
    }

    Ok(days
        .into_iter()
        .map(|(date, (tmin, tmax))| Observation { date, tmin, tmax })
        .collect())
}

fn parse_field<T: std::str::FromStr>(
    line: &str,
    line_no: usize,
    start: usize,
    end: usize,
    field: &'static str,
) -> Result<T, DlyError> {
    let raw = column(line, start, end);
    raw.parse().map_err(|_| DlyError::InvalidField {
        line: line_no,
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a `.dly` line. `values` are `(day, tenths_of_celsius, qflag)`;
    /// every other day is -9999.
    pub(crate) fn dly_line(
        id: &str,
        year: i32,
        month: u32,
        element: &str,
        values: &[(usize, i32, char)],
    ) -> String {
        let mut line = format!("{:<11}{:04}{:02}{:<4}", id, year, month, element);
        for day in 1..=31 {
            let (value, qflag) = values
                .iter()
                .find(|(d, _, _)| *d == day)
                .map(|(_, v, q)| (*v, *q))
                .unwrap_or((MISSING, ' '));
            line.push_str(&format!("{:>5} {} ", value, qflag));
        }
        line
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_merges_tmin_and_tmax() {
        let text = [
            dly_line("GME00121150", 2000, 1, "TMAX", &[(1, 52, ' '), (2, 31, ' ')]),
            dly_line("GME00121150", 2000, 1, "TMIN", &[(1, -23, ' '), (3, -50, ' ')]),
        ]
        .join("\n");

        let obs = parse_dly(&text, "GME00121150").unwrap();
        assert_eq!(
            obs,
            vec![
                Observation {
                    date: date(2000, 1, 1),
                    tmin: Some(-2.3),
                    tmax: Some(5.2)
                },
                Observation {
                    date: date(2000, 1, 2),
                    tmin: None,
                    tmax: Some(3.1)
                },
                Observation {
                    date: date(2000, 1, 3),
                    tmin: Some(-5.0),
                    tmax: None
                },
            ]
        );
    }

    #[test]
    fn test_skips_other_elements() {
        let text = [
            dly_line("GME00121150", 2000, 1, "PRCP", &[(1, 100, ' ')]),
            dly_line("GME00121150", 2000, 1, "SNWD", &[(1, 20, ' ')]),
        ]
        .join("\n");
        assert!(parse_dly(&text, "GME00121150").unwrap().is_empty());
    }

    #[test]
    fn test_quality_flag_treated_as_missing() {
        let text = dly_line("GME00121150", 2000, 7, "TMAX", &[(1, 250, ' '), (2, 999, 'X')]);
        let obs = parse_dly(&text, "GME00121150").unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].date, date(2000, 7, 1));
    }

    #[test]
    fn test_invalid_calendar_days_skipped() {
        let text = dly_line("GME00121150", 2001, 2, "TMAX", &[(28, 10, ' '), (30, 20, ' ')]);
        let obs = parse_dly(&text, "GME00121150").unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].date, date(2001, 2, 28));
    }

    #[test]
    fn test_output_sorted_by_date() {
        let text = [
            dly_line("GME00121150", 2001, 3, "TMAX", &[(1, 10, ' ')]),
            dly_line("GME00121150", 2000, 12, "TMAX", &[(31, 20, ' ')]),
        ]
        .join("\n");
        let obs = parse_dly(&text, "GME00121150").unwrap();
        assert!(obs.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_station_mismatch_errors() {
        let text = dly_line("USW00094728", 2000, 1, "TMAX", &[(1, 10, ' ')]);
        let err = parse_dly(&text, "GME00121150").unwrap_err();
        assert!(matches!(err, DlyError::StationMismatch { line: 1, .. }));
    }

    #[test]
    fn test_invalid_month_errors() {
        let text = dly_line("GME00121150", 2000, 13, "TMAX", &[(1, 10, ' ')]);
        let err = parse_dly(&text, "GME00121150").unwrap_err();
        assert!(matches!(err, DlyError::InvalidField { field: "month", .. }));
    }

    #[test]
    fn test_garbage_value_errors() {
        let line = dly_line("GME00121150", 2000, 1, "TMAX", &[(1, 10, ' ')]);
        let corrupted = format!("{}abcde{}", &line[..21], &line[26..]);
        let err = parse_dly(&corrupted, "GME00121150").unwrap_err();
        assert!(matches!(err, DlyError::InvalidField { field: "value", .. }));
    }

    #[test]
    fn test_non_ascii_line_errors() {
        let line = dly_line("GME00121150", 2000, 1, "TMAX", &[(1, 10, ' '), (2, 20, ' ')]);
        // Same byte length as the slot, but the slot now ends mid-character.
        let start = HEADER_LEN + SLOT_LEN;
        let corrupted = format!("{}  2°{}", &line[..start], &line[start + 5..]);
        let text = [dly_line("GME00121150", 1999, 12, "TMAX", &[(1, 10, ' ')]), corrupted].join("\n");

        let err = parse_dly(&text, "GME00121150").unwrap_err();
        assert!(matches!(err, DlyError::NonAscii { line: 2 }));
    }

    #[test]
    fn test_truncated_line_reads_available_days() {
        let line = dly_line("GME00121150", 2000, 1, "TMAX", &[(1, 10, ' '), (2, 20, ' ')]);
        let truncated = &line[..HEADER_LEN + SLOT_LEN + 5];
        let obs = parse_dly(truncated, "GME00121150").unwrap();
        assert_eq!(obs.len(), 2);
    }
}
