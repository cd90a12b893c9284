//! Point lookups against the raw ZORI city file: one city for one month, or
//! an aggregate over a state's cities.

use crate::error::{AffordError, Result};
use crate::sources::{csv_reader, open_source, parse_amount};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const YEAR_MONTH_FORMATS: &[&str] = &["%Y-%m", "%Y/%m", "%m/%Y", "%b-%Y", "%b %Y", "%B-%Y", "%B %Y"];
const HEADER_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const SUGGESTION_LIMIT: usize = 15;
const RECENT_MONTHS_HINT: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    #[default]
    Mean,
    Median,
    Min,
    Max,
}

impl FromStr for Aggregate {
    type Err = AffordError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Aggregate::Mean),
            "median" => Ok(Aggregate::Median),
            "min" => Ok(Aggregate::Min),
            "max" => Ok(Aggregate::Max),
            other => Err(AffordError::Query(format!(
                "unsupported aggregate '{other}', use mean, median, min or max"
            ))),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregate::Mean => "mean",
            Aggregate::Median => "median",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        };
        f.write_str(name)
    }
}

impl Aggregate {
    /// `None` for an empty slice.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let result = match self {
            Aggregate::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregate::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        };
        Some(result)
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).and_then(|d| d.pred_opt())
}

/// Parses `2024-07`, `07/2024`, `Jul 2024`, `July-2024` and similar to the
/// last day of that month, which is how ZORI labels its month columns.
pub fn parse_year_month(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    YEAR_MONTH_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&format!("1 {s}"), &format!("%d {fmt}")).ok())
        .and_then(|first| last_day_of_month(first.year(), first.month()))
        .ok_or_else(|| AffordError::Query(format!("could not parse year-month '{raw}'")))
}

/// Parses a month column header (`2015-01-31`, `2015/01/31`, `1/31/2015`, `1/31/15`).
pub fn parse_header_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    let parts: Vec<&str> = t.split('/').collect();
    let short_year = parts.len() == 3 && parts[0].len() <= 2 && parts[2].len() == 2;
    if short_year {
        return NaiveDate::parse_from_str(t, "%m/%d/%y").ok();
    }
    HEADER_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
}

/// The ZORI city table held in memory with its month columns indexed by date.
#[derive(Debug, Clone)]
pub struct ZoriTable {
    region_col: usize,
    state_col: usize,
    dates: BTreeMap<NaiveDate, usize>,
    rows: Vec<csv::StringRecord>,
}

impl ZoriTable {
    pub fn load(path: &Path) -> Result<Self> {
        let table = Self::from_reader(open_source(path)?)?;
        debug!(
            "Loaded {} ZORI rows with {} month columns from {}",
            table.rows.len(),
            table.dates.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv_reader(reader);
        let headers = csv.headers()?.clone();
        let require = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| AffordError::Schema {
                    table: "zori",
                    message: format!("missing required column {name}"),
                })
        };
        let region_col = require("RegionName")?;
        let state_col = require("State")?;

        let dates = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| parse_header_date(h).map(|date| (date, i)))
            .collect();
        let rows = csv.records().collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            region_col,
            state_col,
            dates,
            rows,
        })
    }

    /// Month columns, oldest first.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.dates.keys().copied().collect()
    }

    fn column_for(&self, ym: &str) -> Result<(NaiveDate, usize)> {
        let target = parse_year_month(ym)?;
        match self.dates.get(&target) {
            Some(col) => Ok((target, *col)),
            None => {
                let recent: Vec<String> = self
                    .dates
                    .keys()
                    .rev()
                    .take(RECENT_MONTHS_HINT)
                    .rev()
                    .map(|d| d.to_string())
                    .collect();
                let hint = if recent.is_empty() {
                    "(no month columns detected)".to_string()
                } else {
                    recent.join(", ")
                };
                Err(AffordError::Query(format!(
                    "month column not found for {target}. Available recent months: {hint}"
                )))
            }
        }
    }

    fn in_state<'a>(&'a self, state: &str) -> impl Iterator<Item = &'a csv::StringRecord> + 'a {
        let state = state.trim().to_uppercase();
        self.rows.iter().filter(move |row| {
            row.get(self.state_col)
                .is_some_and(|s| s.trim().to_uppercase() == state)
        })
    }

    /// Value of one city's cell for the month. The first matching row wins.
    pub fn city_value(&self, city: &str, state: &str, ym: &str) -> Result<f64> {
        let (_, col) = self.column_for(ym)?;
        let wanted = city.trim().to_lowercase();
        let row = self
            .in_state(state)
            .find(|row| {
                row.get(self.region_col)
                    .is_some_and(|name| name.trim().to_lowercase() == wanted)
            })
            .ok_or_else(|| {
                let mut names: Vec<&str> = self
                    .in_state(state)
                    .filter_map(|row| row.get(self.region_col))
                    .collect();
                names.sort_unstable();
                names.dedup();
                let more = if names.len() > SUGGESTION_LIMIT { " ..." } else { "" };
                names.truncate(SUGGESTION_LIMIT);
                AffordError::Query(format!(
                    "no city '{city}' in state '{state}'. Try one of: {names:?}{more}"
                ))
            })?;

        let cell = row.get(col).unwrap_or_default();
        parse_amount(cell)
            .ok_or_else(|| AffordError::Query(format!("cell is not numeric: '{cell}'")))
    }

    /// Aggregate over every numeric cell of the state's cities for the month.
    pub fn state_value(&self, state: &str, ym: &str, aggregate: Aggregate) -> Result<f64> {
        let (target, col) = self.column_for(ym)?;
        let mut seen = false;
        let values: Vec<f64> = self
            .in_state(state)
            .inspect(|_| seen = true)
            .filter_map(|row| row.get(col).and_then(parse_amount))
            .collect();
        if !seen {
            return Err(AffordError::Query(format!("no rows for state '{state}'")));
        }
        aggregate.apply(&values).ok_or_else(|| {
            AffordError::Query(format!(
                "no numeric values for state '{state}' and month {target}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "RegionID,RegionName,State,1/31/15,2024-06-30,2024-07-31\n\
                          1,Pittsburgh,PA,900,1490,1500\n\
                          2,Erie,PA,700,,1000\n\
                          3,Scranton,PA,650,1100,2000\n\
                          4,Austin,TX,1200,1800,1900\n";

    fn table() -> ZoriTable {
        ZoriTable::from_reader(SAMPLE.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_year_month_formats() {
        let july = NaiveDate::from_ymd_opt(2024, 7, 31).unwrap();
        for raw in ["2024-07", "2024/07", "07/2024", "Jul-2024", "Jul 2024", "July 2024"] {
            assert_eq!(parse_year_month(raw).unwrap(), july, "{raw}");
        }
        assert_eq!(
            parse_year_month("2024-02").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_year_month("summer").is_err());
    }

    #[test]
    fn test_header_dates() {
        assert_eq!(
            parse_header_date("1/31/15"),
            NaiveDate::from_ymd_opt(2015, 1, 31)
        );
        assert_eq!(
            parse_header_date("2015/01/31"),
            NaiveDate::from_ymd_opt(2015, 1, 31)
        );
        assert_eq!(parse_header_date("RegionName"), None);
        assert_eq!(table().dates().len(), 3);
    }

    #[test]
    fn test_city_lookup_is_case_insensitive() {
        assert_eq!(table().city_value("pittsburgh", "pa", "2024-07").unwrap(), 1500.0);
    }

    #[test]
    fn test_unknown_city_suggests_names() {
        let err = table().city_value("Harrisburg", "PA", "2024-07").unwrap_err();
        assert!(err.to_string().contains("Erie"));
    }

    #[test]
    fn test_state_aggregates() {
        let t = table();
        assert_eq!(t.state_value("PA", "2024-07", Aggregate::Mean).unwrap(), 1500.0);
        assert_eq!(t.state_value("PA", "2024-07", Aggregate::Max).unwrap(), 2000.0);
        // Erie is blank for June
        assert_eq!(t.state_value("PA", "2024-06", Aggregate::Median).unwrap(), 1295.0);
        assert_eq!(t.state_value("PA", "2024-06", Aggregate::Min).unwrap(), 1100.0);
        assert!(t.state_value("OH", "2024-07", Aggregate::Mean).is_err());
    }

    #[test]
    fn test_missing_month() {
        let err = table().city_value("Erie", "PA", "2023-01").unwrap_err();
        assert!(err.to_string().contains("2024-07-31"));
    }

    #[test]
    fn test_aggregate_from_str() {
        assert_eq!("MEDIAN".parse::<Aggregate>().unwrap(), Aggregate::Median);
        assert!("mode".parse::<Aggregate>().is_err());
    }
}
