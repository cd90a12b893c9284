use super::{csv_reader, open_source, parse_amount, HeaderIndex, LoadStats, MeanByKey};
use crate::error::Result;
use crate::normalize::{CityKey, StateCode};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const CITY_COLUMNS: &[&str] = &["regionname", "city"];
const STATE_COLUMNS: &[&str] = &["state", "statecode", "state_abbrev", "statename"];
const RENT_COLUMNS: &[&str] = &["avg_2024", "avg_rent", "rent", "average_rent"];

#[derive(Debug, Clone, PartialEq)]
pub struct RentRecord {
    pub key: CityKey,
    pub rent: f64,
}

/// Average monthly rent per city.
#[derive(Debug, Clone)]
pub struct RentTable {
    rents: MeanByKey<CityKey>,
    pub stats: LoadStats,
}

impl RentTable {
    pub fn get(&self, key: &CityKey) -> Option<f64> {
        self.rents.get(key).map(|entry| entry.mean())
    }

    pub fn contains(&self, key: &CityKey) -> bool {
        self.rents.get(key).is_some()
    }

    pub fn records(&self) -> impl Iterator<Item = RentRecord> + '_ {
        self.rents.iter().map(|entry| RentRecord {
            key: entry.key.clone(),
            rent: entry.mean(),
        })
    }

    pub fn in_state(&self, state: StateCode) -> impl Iterator<Item = RentRecord> + '_ {
        self.records().filter(move |record| record.key.state() == state)
    }

    pub fn len(&self) -> usize {
        self.rents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rents.is_empty()
    }
}

pub fn load_rent_table(path: &Path) -> Result<RentTable> {
    let file = open_source(path)?;
    let table = parse_rent_table(file)?;
    info!(
        "Loaded rent table from {} ({} cities, {} rows dropped)",
        path.display(),
        table.len(),
        table.stats.unresolved + table.stats.missing_metric
    );
    Ok(table)
}

pub fn parse_rent_table<R: Read>(reader: R) -> Result<RentTable> {
    let mut csv = csv_reader(reader);
    let headers = HeaderIndex::new("rent", csv.headers()?);
    let city_col = headers.require(headers.find(CITY_COLUMNS), "city")?;
    let state_col = headers.require(headers.find(STATE_COLUMNS), "state")?;
    let rent_col = headers.require(headers.find(RENT_COLUMNS), "rent")?;

    let mut rents = MeanByKey::new();
    let mut stats = LoadStats::default();

    for record in csv.records() {
        let record = record?;
        stats.rows_read += 1;

        let city = record.get(city_col).unwrap_or_default();
        let state = record.get(state_col).unwrap_or_default();
        let Some(key) = CityKey::from_raw(city, state) else {
            debug!("Unresolved rent row: city='{}' state='{}'", city, state);
            stats.unresolved += 1;
            continue;
        };

        match record.get(rent_col).and_then(parse_amount) {
            Some(rent) if rent > 0.0 => {
                if rents.push(key, rent) {
                    stats.duplicates_merged += 1;
                }
            }
            _ => stats.missing_metric += 1,
        }
    }

    Ok(RentTable { rents, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AffordError;
    use crate::normalize::resolve_state;

    #[test]
    fn test_parse_rent_table_with_aliases() {
        let data = "RegionName,State,avg_rent\nPittsburgh,PA,1500\nphiladelphia,Pennsylvania,1900.5\n";
        let table = parse_rent_table(data.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&CityKey::from_raw("PITTSBURGH", "pa").unwrap()), Some(1500.0));
        assert_eq!(table.get(&CityKey::from_raw("Philadelphia", "PA").unwrap()), Some(1900.5));
        assert_eq!(table.stats.accepted(), 2);
    }

    #[test]
    fn test_drops_unresolved_and_missing_rows() {
        let data = "City,StateCode,rent\nToronto,ON,2000\nErie,PA,\nErie,PA,abc\nErie,PA,-3\nYork,PA,1100\n";
        let table = parse_rent_table(data.as_bytes()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.stats.rows_read, 5);
        assert_eq!(table.stats.unresolved, 1);
        assert_eq!(table.stats.missing_metric, 3);
    }

    #[test]
    fn test_duplicate_rows_are_averaged() {
        let data = "RegionName,State,avg_2024\nAustin,TX,1600\nAustin ,tx,1800\n";
        let table = parse_rent_table(data.as_bytes()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&CityKey::from_raw("Austin", "TX").unwrap()), Some(1700.0));
        assert_eq!(table.stats.duplicates_merged, 1);
    }

    #[test]
    fn test_in_state_filter() {
        let data = "RegionName,State,avg_rent\nAustin,TX,1600\nErie,PA,900\nDallas,TX,1500\n";
        let table = parse_rent_table(data.as_bytes()).unwrap();
        let tx = resolve_state("TX").unwrap();
        let cities: Vec<_> = table.in_state(tx).map(|r| r.key.city().to_string()).collect();
        assert_eq!(cities, vec!["Austin", "Dallas"]);
    }

    #[test]
    fn test_schema_mismatch_fails_fast() {
        let data = "Town,State,avg_rent\nAustin,TX,1600\n";
        let err = parse_rent_table(data.as_bytes()).unwrap_err();
        assert!(matches!(err, AffordError::Schema { table: "rent", .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_rent_table(Path::new("/nonexistent/rent_data.csv")).unwrap_err();
        assert!(matches!(err, AffordError::MissingSourceFile(_)));
    }
}
