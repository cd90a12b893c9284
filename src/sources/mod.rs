//! Typed loaders for the three source tables.
//!
//! Each loader resolves its columns from the header row once (case-insensitive,
//! with aliases for the spellings the upstream scripts produce) and fails fast
//! on a schema mismatch. Rows are then parsed into typed records; rows that
//! cannot be keyed or carry no usable metric are counted, not raised.

pub mod crime;
pub mod rent;
pub mod salary;

pub use crime::{load_crime_table, CrimeRecord, CrimeTable};
pub use rent::{load_rent_table, RentRecord, RentTable};
pub use salary::{load_salary_table, SalaryRecord, SalaryTable};

use crate::error::{AffordError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::hash::Hash;
use std::io::Read;
use std::path::Path;

/// Per-table load counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub rows_read: usize,
    pub unresolved: usize,
    pub missing_metric: usize,
    pub duplicates_merged: usize,
}

impl LoadStats {
    pub fn accepted(&self) -> usize {
        self.rows_read - self.unresolved - self.missing_metric
    }
}

pub(crate) fn open_source(path: &Path) -> Result<File> {
    if !path.is_file() {
        return Err(AffordError::MissingSourceFile(path.to_path_buf()));
    }
    Ok(File::open(path)?)
}

pub(crate) fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Header row folded for alias lookup.
pub(crate) struct HeaderIndex {
    table: &'static str,
    original: Vec<String>,
    folded: Vec<String>,
}

impl HeaderIndex {
    pub(crate) fn new(table: &'static str, headers: &csv::StringRecord) -> Self {
        let original: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let folded = original.iter().map(|h| h.to_ascii_lowercase()).collect();
        Self {
            table,
            original,
            folded,
        }
    }

    /// First alias (in alias order) that names a column.
    pub(crate) fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.folded.iter().position(|h| h == alias))
    }

    /// First column whose name contains `token`, skipping `exclude`.
    pub(crate) fn find_containing(&self, token: &str, exclude: Option<usize>) -> Option<usize> {
        self.folded
            .iter()
            .enumerate()
            .find(|(i, h)| Some(*i) != exclude && h.contains(token))
            .map(|(i, _)| i)
    }

    pub(crate) fn require(&self, found: Option<usize>, what: &str) -> Result<usize> {
        found.ok_or_else(|| AffordError::Schema {
            table: self.table,
            message: format!("no {} column in {:?}", what, self.original),
        })
    }
}

/// Parses a numeric cell, tolerating `$` and thousands separators.
/// Empty, non-numeric and non-finite cells yield `None`.
pub(crate) fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Running arithmetic mean per key, preserving first-seen order.
///
/// Duplicate rows for one key within a single source table share the same
/// aggregation window, so they are merged by averaging every valid sample.
#[derive(Debug, Clone)]
pub(crate) struct MeanByKey<K> {
    index: HashMap<K, usize>,
    entries: Vec<MeanEntry<K>>,
}

#[derive(Debug, Clone)]
pub(crate) struct MeanEntry<K> {
    pub key: K,
    pub sum: f64,
    pub count: usize,
}

impl<K> MeanEntry<K> {
    pub fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

impl<K: Clone + Eq + Hash> MeanByKey<K> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Adds a sample; returns `true` when the key was already present.
    pub fn push(&mut self, key: K, value: f64) -> bool {
        self.push_samples(key, value, 1)
    }

    /// Adds `count` samples totalling `sum`; returns `true` when the key was
    /// already present.
    pub fn push_samples(&mut self, key: K, sum: f64, count: usize) -> bool {
        match self.index.get(&key) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.sum += sum;
                entry.count += count;
                true
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(MeanEntry { key, sum, count });
                false
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&MeanEntry<K>> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeanEntry<K>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
