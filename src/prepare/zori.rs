//! Zillow ZORI city file (wide, one column per month) → rent table.

use super::PrepareSummary;
use crate::cache::write_atomic;
use crate::error::{AffordError, Result};
use crate::sources::{csv_reader, open_source, parse_amount};
use chrono::{Datelike, NaiveDate};
use std::io::Read;
use std::path::Path;
use tracing::{info, instrument, warn};

const CITY_COLUMNS: &[&str] = &["City", "RegionName"];
const STATE_COLUMNS: &[&str] = &["StateName", "State"];

/// Month columns of a ZORI header, oldest first, as (date, column index).
pub fn month_columns(headers: &csv::StringRecord) -> Vec<(NaiveDate, usize)> {
    let mut months: Vec<(NaiveDate, usize)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            NaiveDate::parse_from_str(h.trim(), "%Y-%m-%d")
                .ok()
                .map(|date| (date, i))
        })
        .collect();
    months.sort();
    months
}

fn find_exact(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
}

#[derive(Debug, Clone, PartialEq)]
struct RentLine {
    city: String,
    state: String,
    avg_rent: Option<f64>,
}

/// Averages the trailing `months` month columns per city. Cities with no
/// value in the window are kept with an empty average.
///
/// Returns the rendered table, the number of cities written and how many of
/// those have no average.
pub fn zori_to_rent<R: Read>(reader: R, months: usize) -> Result<(Vec<u8>, usize, usize)> {
    let mut csv = csv_reader(reader);
    let headers = csv.headers()?.clone();

    let city_col = find_exact(&headers, CITY_COLUMNS).ok_or_else(|| AffordError::Schema {
        table: "zori",
        message: "could not find city column (City/RegionName)".to_string(),
    })?;
    let state_col = find_exact(&headers, STATE_COLUMNS).ok_or_else(|| AffordError::Schema {
        table: "zori",
        message: "could not find state column (StateName/State)".to_string(),
    })?;

    let all_months = month_columns(&headers);
    if all_months.is_empty() {
        return Err(AffordError::Schema {
            table: "zori",
            message: "no month columns detected to compute an average".to_string(),
        });
    }
    let window: Vec<usize> = all_months
        .iter()
        .rev()
        .take(months.max(1))
        .map(|(_, i)| *i)
        .collect();

    let mut lines = Vec::new();
    for record in csv.records() {
        let record = record?;
        let values: Vec<f64> = window
            .iter()
            .filter_map(|&i| record.get(i).and_then(parse_amount))
            .collect();
        let avg_rent = if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        };
        lines.push(RentLine {
            city: record.get(city_col).unwrap_or_default().to_string(),
            state: record.get(state_col).unwrap_or_default().to_string(),
            avg_rent,
        });
    }

    lines.sort_by(|a, b| a.state.cmp(&b.state).then_with(|| a.city.cmp(&b.city)));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["RegionName", "State", "avg_rent"])?;
    for line in &lines {
        let avg = line.avg_rent.map(|v| format!("{v:.2}")).unwrap_or_default();
        writer.write_record([line.city.as_str(), line.state.as_str(), avg.as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AffordError::Io(e.into_error()))?;
    let empty = lines.iter().filter(|l| l.avg_rent.is_none()).count();
    Ok((bytes, lines.len(), empty))
}

#[instrument(skip_all, fields(raw = %raw.display()))]
pub fn prepare_rent(raw: &Path, out: &Path, months: usize) -> Result<PrepareSummary> {
    let file = open_source(raw)?;
    let (bytes, rows_written, empty) = zori_to_rent(file, months)?;
    write_atomic(out, &bytes)?;

    if empty > 0 {
        warn!("{} cities have no rent values in the last {} months", empty, months);
    }
    info!("Wrote {} rent rows to {}", rows_written, out.display());
    Ok(PrepareSummary {
        rows_written,
        rows_skipped: empty,
        output_files: vec![out.to_path_buf()],
    })
}

/// Per-city averages of each calendar year's month columns, written as
/// `RegionName,State,avg_<year>...` in input row order.
///
/// Returns the rendered table, the row count and the years that had no month
/// columns (their averages are left empty).
pub fn zori_yearly_averages<R: Read>(reader: R, years: &[i32]) -> Result<(Vec<u8>, usize, Vec<i32>)> {
    let mut csv = csv_reader(reader);
    let headers = csv.headers()?.clone();

    let city_col = find_exact(&headers, CITY_COLUMNS).ok_or_else(|| AffordError::Schema {
        table: "zori",
        message: "could not find city column (City/RegionName)".to_string(),
    })?;
    let state_col = find_exact(&headers, STATE_COLUMNS).ok_or_else(|| AffordError::Schema {
        table: "zori",
        message: "could not find state column (StateName/State)".to_string(),
    })?;

    let months = month_columns(&headers);
    if months.is_empty() {
        return Err(AffordError::Schema {
            table: "zori",
            message: "no date-like columns detected".to_string(),
        });
    }
    let columns_by_year: Vec<Vec<usize>> = years
        .iter()
        .map(|year| {
            months
                .iter()
                .filter(|(date, _)| date.year() == *year)
                .map(|(_, i)| *i)
                .collect()
        })
        .collect();
    let empty_years: Vec<i32> = years
        .iter()
        .zip(&columns_by_year)
        .filter(|(_, cols)| cols.is_empty())
        .map(|(year, _)| *year)
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["RegionName".to_string(), "State".to_string()];
    header.extend(years.iter().map(|year| format!("avg_{year}")));
    writer.write_record(&header)?;

    let mut rows = 0;
    for record in csv.records() {
        let record = record?;
        let mut line = vec![
            record.get(city_col).unwrap_or_default().to_string(),
            record.get(state_col).unwrap_or_default().to_string(),
        ];
        for cols in &columns_by_year {
            let values: Vec<f64> = cols
                .iter()
                .filter_map(|&i| record.get(i).and_then(parse_amount))
                .collect();
            line.push(if values.is_empty() {
                String::new()
            } else {
                format!("{:.2}", values.iter().sum::<f64>() / values.len() as f64)
            });
        }
        writer.write_record(&line)?;
        rows += 1;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AffordError::Io(e.into_error()))?;
    Ok((bytes, rows, empty_years))
}

#[instrument(skip_all, fields(raw = %raw.display(), ?years))]
pub fn prepare_yearly_rent(raw: &Path, out: &Path, years: &[i32]) -> Result<PrepareSummary> {
    let file = open_source(raw)?;
    let (bytes, rows_written, empty_years) = zori_yearly_averages(file, years)?;
    for year in &empty_years {
        warn!("No {} columns found; avg_{} will be empty for all rows", year, year);
    }
    write_atomic(out, &bytes)?;
    info!("Wrote {} yearly rent rows to {}", rows_written, out.display());
    Ok(PrepareSummary {
        rows_written,
        rows_skipped: 0,
        output_files: vec![out.to_path_buf()],
    })
}
