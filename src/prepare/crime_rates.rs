//! Per-state FBI rate series (saved API responses) → composite crime table.
//!
//! Expects `<rates_dir>/<ST>_V.json` (violent) and `<ST>_P.json` (property)
//! for each state. The composite is a weighted mean of the 2020–2024 average
//! rates per 100k over whichever components are available.

use super::PrepareSummary;
use crate::cache::write_atomic;
use crate::constants::{
    CRIME_PERIOD_END, CRIME_PERIOD_START, PROPERTY_WEIGHT, VIOLENT_WEIGHT,
};
use crate::error::{AffordError, Result};
use crate::normalize::StateCode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

static DATE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{2}-\d{4}$|^\d{4}-\d{2}$|^\d{4}$").expect("date key pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePoint {
    pub year: Option<i32>,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateCrime {
    pub state: StateCode,
    pub violent: Option<f64>,
    pub property: Option<f64>,
    pub composite: Option<f64>,
}

/// Year of a `mm-YYYY`, `YYYY-mm` or `YYYY` date, or of a bare integer.
pub fn year_from_date(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => {
            let s = s.trim();
            if let Some((a, b)) = s.split_once('-') {
                if b.len() == 4 && b.chars().all(|c| c.is_ascii_digit()) {
                    return b.parse().ok();
                }
                if a.len() == 4 && a.chars().all(|c| c.is_ascii_digit()) {
                    return a.parse().ok();
                }
                return None;
            }
            if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
                return s.parse().ok();
            }
            None
        }
        _ => None,
    }
}

fn rate_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn points_from_series(series: &serde_json::Map<String, Value>) -> Vec<RatePoint> {
    series
        .iter()
        .filter(|(k, _)| DATE_KEY.is_match(k))
        .map(|(k, v)| RatePoint {
            year: year_from_date(&Value::String(k.clone())),
            rate: rate_value(v),
        })
        .collect()
}

/// Pulls (year, rate) points out of the response shapes the summarized-state
/// endpoint has returned over time:
/// a flat `{date: rate}` map, a nested `offenses.rates.<State Name>` map, or a
/// `results`/`data` list of records.
pub fn extract_rate_points(js: &Value, state: StateCode) -> Vec<RatePoint> {
    if let Value::Object(map) = js {
        let is_wrapped = ["results", "data", "offenses"]
            .iter()
            .any(|k| map.contains_key(*k));
        if !is_wrapped {
            let points = points_from_series(map);
            if !points.is_empty() {
                return points;
            }
        }

        if let Some(Value::Object(series)) = map
            .get("offenses")
            .and_then(|o| o.get("rates"))
            .and_then(|r| r.get(state.full_name()))
        {
            let points = points_from_series(series);
            if !points.is_empty() {
                return points;
            }
        }
    }

    let container = match js {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("results")
            .or_else(|| map.get("data"))
            .and_then(Value::as_array),
        _ => None,
    };

    container
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let date = ["date", "data_year", "year"]
                        .iter()
                        .find_map(|k| item.get(*k).filter(|v| !v.is_null()));
                    let rate = ["rate", "crime_rate", "value"]
                        .iter()
                        .find_map(|k| item.get(*k));
                    RatePoint {
                        year: date.and_then(year_from_date),
                        rate: rate.and_then(rate_value),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Mean of per-year mean rates within `[start, end]`.
pub fn average_rate(points: &[RatePoint], start: i32, end: i32) -> Option<f64> {
    let mut by_year: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for point in points {
        if let (Some(year), Some(rate)) = (point.year, point.rate) {
            if (start..=end).contains(&year) {
                let slot = by_year.entry(year).or_insert((0.0, 0));
                slot.0 += rate;
                slot.1 += 1;
            }
        }
    }
    if by_year.is_empty() {
        return None;
    }
    let annual_sum: f64 = by_year.values().map(|(sum, n)| sum / *n as f64).sum();
    Some(annual_sum / by_year.len() as f64)
}

/// Weighted mean of the available components; `None` when neither exists.
pub fn composite_score(violent: Option<f64>, property: Option<f64>) -> Option<f64> {
    let wv = if violent.is_some() { VIOLENT_WEIGHT } else { 0.0 };
    let wp = if property.is_some() { PROPERTY_WEIGHT } else { 0.0 };
    let den = wv + wp;
    if den <= 0.0 {
        return None;
    }
    Some((wv * violent.unwrap_or(0.0) + wp * property.unwrap_or(0.0)) / den)
}

fn cmp_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn load_points(path: &Path, state: StateCode) -> Result<Vec<RatePoint>> {
    if !path.is_file() {
        return Err(AffordError::MissingSourceFile(path.to_path_buf()));
    }
    let js: Value = serde_json::from_slice(&fs::read(path)?)?;
    let points = extract_rate_points(&js, state);
    if points.is_empty() {
        warn!("Could not parse any rates from {}", path.display());
    }
    Ok(points)
}

fn state_crime(rates_dir: &Path, state: StateCode) -> Result<StateCrime> {
    let violent_points = load_points(&rates_dir.join(format!("{state}_V.json")), state)?;
    let property_points = load_points(&rates_dir.join(format!("{state}_P.json")), state)?;
    let violent = average_rate(&violent_points, CRIME_PERIOD_START, CRIME_PERIOD_END);
    let property = average_rate(&property_points, CRIME_PERIOD_START, CRIME_PERIOD_END);
    Ok(StateCrime {
        state,
        violent,
        property,
        composite: composite_score(violent, property),
    })
}

/// Orders states safest first (composite, then violent, then property rate;
/// missing values last).
pub fn rank_states(mut states: Vec<StateCrime>) -> Vec<StateCrime> {
    states.sort_by(|a, b| {
        cmp_missing_last(a.composite, b.composite)
            .then_with(|| cmp_missing_last(a.violent, b.violent))
            .then_with(|| cmp_missing_last(a.property, b.property))
    });
    states
}

fn fmt_rate(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

/// Renders the detailed ranking table and the two-column crime table.
pub fn render_crime_tables(ranked: &[StateCrime]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut ranking = csv::Writer::from_writer(Vec::new());
    ranking.write_record([
        "rank",
        "state",
        "violent_rate_per_100k",
        "property_rate_per_100k",
        "composite_score",
        "period_start",
        "period_end",
    ])?;
    let mut table = csv::Writer::from_writer(Vec::new());
    table.write_record(["State", "composite_score"])?;

    for (i, row) in ranked.iter().enumerate() {
        ranking.write_record([
            (i + 1).to_string(),
            row.state.to_string(),
            fmt_rate(row.violent),
            fmt_rate(row.property),
            fmt_rate(row.composite),
            CRIME_PERIOD_START.to_string(),
            CRIME_PERIOD_END.to_string(),
        ])?;
        table.write_record([row.state.full_name().to_string(), fmt_rate(row.composite)])?;
    }

    let ranking = ranking
        .into_inner()
        .map_err(|e| AffordError::Io(e.into_error()))?;
    let table = table
        .into_inner()
        .map_err(|e| AffordError::Io(e.into_error()))?;
    Ok((ranking, table))
}

#[instrument(skip_all, fields(rates_dir = %rates_dir.display()))]
pub fn prepare_crime(rates_dir: &Path, ranking_out: &Path, crime_out: &Path) -> Result<PrepareSummary> {
    if !rates_dir.is_dir() {
        return Err(AffordError::MissingSourceFile(rates_dir.to_path_buf()));
    }

    let mut states = Vec::new();
    let mut skipped = 0;
    for state in StateCode::all() {
        match state_crime(rates_dir, state) {
            Ok(crime) => {
                debug!("{}: composite {:?}", state, crime.composite);
                states.push(crime);
            }
            Err(e) => {
                warn!("Skipping {}: {}", state, e);
                skipped += 1;
            }
        }
    }

    let ranked = rank_states(states);
    let (ranking, table) = render_crime_tables(&ranked)?;
    write_atomic(ranking_out, &ranking)?;
    write_atomic(crime_out, &table)?;
    info!(
        "Wrote crime scores for {} states ({} skipped) to {}",
        ranked.len(),
        skipped,
        crime_out.display()
    );

    Ok(PrepareSummary {
        rows_written: ranked.len(),
        rows_skipped: skipped,
        output_files: vec![ranking_out.to_path_buf(), crime_out.to_path_buf()],
    })
}
