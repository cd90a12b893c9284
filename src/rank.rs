//! Index computation over joined rows, ordering and top-N truncation.

use crate::index::IndexWeights;
use crate::join::{DropSummary, JoinedRow};
use crate::normalize::CityKey;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// A city with all metrics and its computed index. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct AffordabilityRow {
    pub key: CityKey,
    pub rent: f64,
    pub crime_score: f64,
    pub salary: f64,
    pub index: f64,
}

/// One line of the ranked output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub rank: usize,
    pub city: String,
    pub state: String,
    pub rent: f64,
    pub crime_score: f64,
    pub salary: f64,
    pub affordability_index: f64,
}

/// Computes the index for every joined row. Rows whose index cannot be
/// computed are excluded and counted in `drops.invalid_index`.
pub fn score_rows(
    rows: Vec<JoinedRow>,
    weights: &IndexWeights,
    drops: &mut DropSummary,
) -> Vec<AffordabilityRow> {
    let mut scored = Vec::with_capacity(rows.len());
    for row in rows {
        match weights.compute(row.salary, row.rent, row.crime_score) {
            Ok(index) => scored.push(AffordabilityRow {
                key: row.key,
                rent: row.rent,
                crime_score: row.crime_score,
                salary: row.salary,
                index,
            }),
            Err(e) => {
                debug!("Excluding {}: {}", row.key, e);
                drops.invalid_index += 1;
            }
        }
    }
    scored
}

/// Index descending; equal indexes by city name ascending (case-insensitive,
/// then exact spelling, then state) so the order is total.
fn compare_rows(a: &AffordabilityRow, b: &AffordabilityRow) -> Ordering {
    b.index
        .total_cmp(&a.index)
        .then_with(|| a.key.folded_city().cmp(b.key.folded_city()))
        .then_with(|| a.key.city().cmp(b.key.city()))
        .then_with(|| a.key.state().cmp(&b.key.state()))
}

/// Sorts and truncates to `top_n`, numbering ranks from 1.
pub fn rank_rows(mut rows: Vec<AffordabilityRow>, top_n: usize) -> Vec<RankedRow> {
    rows.sort_by(compare_rows);
    rows.into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, row)| RankedRow {
            rank: i + 1,
            city: row.key.city().to_string(),
            state: row.key.state().to_string(),
            rent: row.rent,
            crime_score: row.crime_score,
            salary: row.salary,
            affordability_index: row.index,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(city: &str, index: f64) -> AffordabilityRow {
        AffordabilityRow {
            key: CityKey::from_raw(city, "PA").unwrap(),
            rent: 1000.0,
            crime_score: 40.0,
            salary: 80_000.0,
            index,
        }
    }

    #[test]
    fn test_sorted_descending_with_name_tie_break() {
        let ranked = rank_rows(
            vec![row("York", 10.0), row("allentown", 12.0), row("Erie", 12.0), row("Reading", 5.0)],
            10,
        );
        let cities: Vec<_> = ranked.iter().map(|r| r.city.as_str()).collect();
        assert_eq!(cities, vec!["allentown", "Erie", "York", "Reading"]);
        let ranks: Vec<_> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_truncates_to_top_n() {
        let rows = (0..8).map(|i| row(&format!("City {i}"), i as f64)).collect();
        let ranked = rank_rows(rows, 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].city, "City 7");
        assert!(ranked.windows(2).all(|w| w[0].affordability_index >= w[1].affordability_index));
    }

    #[test]
    fn test_score_rows_excludes_invalid() {
        let mut drops = DropSummary::default();
        let joined = vec![
            JoinedRow {
                key: CityKey::from_raw("Pittsburgh", "PA").unwrap(),
                rent: 1500.0,
                crime_score: 40.0,
                salary: 95_000.0,
            },
            JoinedRow {
                key: CityKey::from_raw("Erie", "PA").unwrap(),
                rent: 900.0,
                crime_score: 0.0,
                salary: 60_000.0,
            },
        ];
        let scored = score_rows(joined, &IndexWeights::default(), &mut drops);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].index, 1583.33);
        assert_eq!(drops.invalid_index, 1);
    }
}
