use super::{csv_reader, open_source, parse_amount, HeaderIndex, LoadStats, MeanByKey};
use crate::error::Result;
use crate::normalize::{split_salary_city, CityKey, SalaryLocation, StateCode};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const CITY_COLUMNS: &[&str] = &["city"];
const SALARY_COLUMNS: &[&str] = &["salary", "avg_salary", "average_salary"];
const STATE_COLUMNS: &[&str] = &["state", "statecode", "state_abbrev"];

// Scraped rows with a masked location ("Hidden", "Location hidden").
static HIDDEN_CITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bhidden\b").expect("hidden city pattern is valid"));

/// One averaged salary figure for a city.
#[derive(Debug, Clone, PartialEq)]
pub struct SalaryRecord {
    pub key: CityKey,
    pub job: String,
    pub salary: f64,
    /// Number of source rows averaged into `salary`.
    pub samples: usize,
    /// True when the state was inferred from the rent table rather than read.
    pub inferred_state: bool,
}

/// Average annual salary per city for a single job title.
///
/// Rows carrying a resolvable state are keyed immediately; rows with only a
/// city name are held aside so the joiner can attribute them to the
/// requested state.
#[derive(Debug, Clone)]
pub struct SalaryTable {
    job: String,
    keyed: MeanByKey<CityKey>,
    city_only: MeanByKey<String>,
    city_only_display: Vec<String>,
    pub stats: LoadStats,
}

impl SalaryTable {
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Salary records for `state`. City-only rows are attributed to `state`
    /// when `accept_inferred` says the city exists there; keyed and inferred
    /// samples for the same city are averaged together.
    pub fn records_for_state<F>(&self, state: StateCode, accept_inferred: F) -> Vec<SalaryRecord>
    where
        F: Fn(&CityKey) -> bool,
    {
        let mut merged: MeanByKey<CityKey> = MeanByKey::new();
        let mut inferred: Vec<CityKey> = Vec::new();

        for entry in self.keyed.iter().filter(|e| e.key.state() == state) {
            merged.push_samples(entry.key.clone(), entry.sum, entry.count);
        }

        for (entry, display) in self.city_only.iter().zip(&self.city_only_display) {
            let Some(key) = CityKey::new(display, state) else {
                continue;
            };
            if !accept_inferred(&key) {
                continue;
            }
            if merged.get(&key).is_none() {
                inferred.push(key.clone());
            }
            merged.push_samples(key, entry.sum, entry.count);
        }

        merged
            .iter()
            .map(|entry| SalaryRecord {
                key: entry.key.clone(),
                job: self.job.clone(),
                salary: entry.mean(),
                samples: entry.count,
                inferred_state: inferred.contains(&entry.key),
            })
            .collect()
    }

    /// Number of distinct cities, keyed or not.
    pub fn len(&self) -> usize {
        self.keyed.len() + self.city_only.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn load_salary_table(path: &Path, job: &str) -> Result<SalaryTable> {
    let file = open_source(path)?;
    let table = parse_salary_table(file, job)?;
    info!(
        "Loaded {} salary table from {} ({} cities, {} rows dropped)",
        job,
        path.display(),
        table.len(),
        table.stats.unresolved + table.stats.missing_metric
    );
    Ok(table)
}

pub fn parse_salary_table<R: Read>(reader: R, job: &str) -> Result<SalaryTable> {
    let mut csv = csv_reader(reader);
    let headers = HeaderIndex::new("salary", csv.headers()?);
    let city_col = headers.require(headers.find(CITY_COLUMNS), "city")?;
    let salary_col = headers
        .find(SALARY_COLUMNS)
        .or_else(|| headers.find_containing("salary", Some(city_col)));
    let salary_col = headers.require(salary_col, "salary")?;
    let state_col = headers.find(STATE_COLUMNS);

    let mut keyed = MeanByKey::new();
    let mut city_only = MeanByKey::new();
    let mut city_only_display = Vec::new();
    let mut stats = LoadStats::default();

    for record in csv.records() {
        let record = record?;
        stats.rows_read += 1;

        let raw_city = record.get(city_col).unwrap_or_default();
        if HIDDEN_CITY_RE.is_match(raw_city) {
            stats.unresolved += 1;
            continue;
        }

        let salary = match record.get(salary_col).and_then(parse_amount) {
            Some(salary) if salary > 0.0 => salary,
            _ => {
                stats.missing_metric += 1;
                continue;
            }
        };

        let explicit_state = state_col.and_then(|col| record.get(col));
        let duplicate = match split_salary_city(raw_city, explicit_state) {
            SalaryLocation::Keyed(key) => keyed.push(key, salary),
            SalaryLocation::CityOnly(city) => {
                let folded = city.to_lowercase();
                let duplicate = city_only.push(folded, salary);
                if !duplicate {
                    city_only_display.push(city);
                }
                duplicate
            }
            SalaryLocation::Unmatched => {
                debug!("Unresolved salary row: city='{}'", raw_city);
                stats.unresolved += 1;
                continue;
            }
        };
        if duplicate {
            stats.duplicates_merged += 1;
        }
    }

    Ok(SalaryTable {
        job: job.to_string(),
        keyed,
        city_only,
        city_only_display,
        stats,
    })
}
