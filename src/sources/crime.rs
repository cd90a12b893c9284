use super::{csv_reader, open_source, parse_amount, HeaderIndex, LoadStats, MeanByKey};
use crate::error::Result;
use crate::normalize::{resolve_state, StateCode};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const SCORE_COLUMNS: &[&str] = &["composite_score", "composite", "score"];
const STATE_COLUMNS: &[&str] = &["state", "state_abbrev", "statecode", "state_name", "statefull"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrimeRecord {
    pub state: StateCode,
    pub score: f64,
}

/// Composite crime score per state. Every city in a state shares its score.
#[derive(Debug, Clone)]
pub struct CrimeTable {
    scores: MeanByKey<StateCode>,
    pub stats: LoadStats,
}

impl CrimeTable {
    pub fn get(&self, state: StateCode) -> Option<f64> {
        self.scores.get(&state).map(|entry| entry.mean())
    }

    pub fn records(&self) -> impl Iterator<Item = CrimeRecord> + '_ {
        self.scores.iter().map(|entry| CrimeRecord {
            state: entry.key,
            score: entry.mean(),
        })
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

pub fn load_crime_table(path: &Path) -> Result<CrimeTable> {
    let file = open_source(path)?;
    let table = parse_crime_table(file)?;
    info!(
        "Loaded crime table from {} ({} states, {} rows dropped)",
        path.display(),
        table.len(),
        table.stats.unresolved + table.stats.missing_metric
    );
    Ok(table)
}

pub fn parse_crime_table<R: Read>(reader: R) -> Result<CrimeTable> {
    let mut csv = csv_reader(reader);
    let headers = HeaderIndex::new("crime", csv.headers()?);
    let score_col = headers.require(headers.find(SCORE_COLUMNS), "composite score")?;
    let state_col = headers
        .find(STATE_COLUMNS)
        .filter(|col| *col != score_col)
        .or_else(|| headers.find_containing("state", Some(score_col)));
    let state_col = headers.require(state_col, "state")?;

    let mut scores = MeanByKey::new();
    let mut stats = LoadStats::default();

    for record in csv.records() {
        let record = record?;
        stats.rows_read += 1;

        let raw_state = record.get(state_col).unwrap_or_default();
        let Some(state) = resolve_state(raw_state) else {
            debug!("Unresolved crime row: state='{}'", raw_state);
            stats.unresolved += 1;
            continue;
        };

        // Zero or negative scores are kept here; the index calculator rejects them per row.
        match record.get(score_col).and_then(parse_amount) {
            Some(score) => {
                if scores.push(state, score) {
                    stats.duplicates_merged += 1;
                }
            }
            None => stats.missing_metric += 1,
        }
    }

    Ok(CrimeTable { scores, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AffordError;

    #[test]
    fn test_full_state_names() {
        let data = "State,composite_score\nPennsylvania,40\nTexas,55.5\n";
        let table = parse_crime_table(data.as_bytes()).unwrap();
        assert_eq!(table.get(resolve_state("PA").unwrap()), Some(40.0));
        assert_eq!(table.get(resolve_state("TX").unwrap()), Some(55.5));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_state_like_column_fallback() {
        let data = "rank,us_state_code,score\n1,vt,12\n2,DC,99\n3,ME,\n";
        let table = parse_crime_table(data.as_bytes()).unwrap();
        assert_eq!(table.get(resolve_state("VT").unwrap()), Some(12.0));
        assert_eq!(table.stats.unresolved, 1);
        assert_eq!(table.stats.missing_metric, 1);
    }

    #[test]
    fn test_duplicate_states_are_averaged() {
        let data = "state,composite_score\nPA,40\nPennsylvania,50\n";
        let table = parse_crime_table(data.as_bytes()).unwrap();
        assert_eq!(table.get(resolve_state("PA").unwrap()), Some(45.0));
        assert_eq!(table.stats.duplicates_merged, 1);
    }

    #[test]
    fn test_missing_score_column() {
        let data = "state,violent_rate\nPA,300\n";
        let err = parse_crime_table(data.as_bytes()).unwrap_err();
        assert!(matches!(err, AffordError::Schema { table: "crime", .. }));
    }
}
