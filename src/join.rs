//! Aligns salary, rent and crime on the canonical city key for one (job, state).

use crate::normalize::{CityKey, StateCode};
use crate::sources::{CrimeTable, RentTable, SalaryTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Row-level exclusions for one run. Aggregated and reported once at the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropSummary {
    /// Source rows whose city/state could not be resolved to a key.
    pub unresolved: usize,
    /// Source rows with an empty, non-numeric or non-positive metric.
    pub missing_metric: usize,
    /// Salary cities for the requested state absent from the rent table.
    pub missing_rent: usize,
    /// Salary cities dropped because the state has no crime score.
    pub missing_crime: usize,
    /// Joined rows whose index could not be computed.
    pub invalid_index: usize,
}

impl DropSummary {
    pub fn total(&self) -> usize {
        self.unresolved + self.missing_metric + self.missing_rent + self.missing_crime + self.invalid_index
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for DropSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} unresolved city/state, {} missing metric, {} missing rent, {} missing crime score, {} invalid index",
            self.unresolved, self.missing_metric, self.missing_rent, self.missing_crime, self.invalid_index
        )
    }
}

/// One city with all three metrics present.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub key: CityKey,
    pub rent: f64,
    pub crime_score: f64,
    pub salary: f64,
}

#[derive(Debug, Clone)]
pub struct JoinOutput {
    pub rows: Vec<JoinedRow>,
    pub crime_score: Option<f64>,
    pub drops: DropSummary,
}

/// Joins the salary table for one job with rent (by city key) and crime (by state).
///
/// Load-time drops from all three tables are folded into the summary; the
/// candidate set is the salary table's cities in `state`.
pub fn join_tables(
    rent: &RentTable,
    crime: &CrimeTable,
    salary: &SalaryTable,
    state: StateCode,
) -> JoinOutput {
    let mut drops = DropSummary {
        unresolved: rent.stats.unresolved + crime.stats.unresolved + salary.stats.unresolved,
        missing_metric: rent.stats.missing_metric
            + crime.stats.missing_metric
            + salary.stats.missing_metric,
        ..DropSummary::default()
    };

    let crime_score = crime.get(state);
    let candidates = salary.records_for_state(state, |key| rent.contains(key));
    debug!(
        "{} salary cities for {} in {}",
        candidates.len(),
        salary.job(),
        state
    );

    let Some(score) = crime_score else {
        warn!("No crime score for {}; {} cities excluded", state, candidates.len());
        drops.missing_crime = candidates.len();
        return JoinOutput {
            rows: Vec::new(),
            crime_score: None,
            drops,
        };
    };

    let mut rows = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match rent.get(&candidate.key) {
            Some(rent_value) => rows.push(JoinedRow {
                key: candidate.key,
                rent: rent_value,
                crime_score: score,
                salary: candidate.salary,
            }),
            None => {
                debug!("No rent data for {}", candidate.key);
                drops.missing_rent += 1;
            }
        }
    }

    if drops.missing_rent > 0 {
        warn!(
            "{} {} salary cities in {} have no rent data and were excluded",
            drops.missing_rent,
            salary.job(),
            state
        );
    }

    JoinOutput {
        rows,
        crime_score: Some(score),
        drops,
    }
}
