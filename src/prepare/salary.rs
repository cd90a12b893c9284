//! Fans one aggregated salary export out to the per-job files the ranking
//! pipeline reads.

use super::PrepareSummary;
use crate::cache::write_atomic;
use crate::error::{AffordError, Result};
use crate::sources::{csv_reader, open_source, parse_amount, HeaderIndex};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Projects the aggregate table onto `City,Salary[,State]`. Salary cells
/// that are not numeric are written empty.
///
/// Returns the rendered table, the row count and the count of rows whose
/// salary was blanked.
pub fn normalize_salary_table<R: Read>(reader: R) -> Result<(Vec<u8>, usize, usize)> {
    let mut csv = csv_reader(reader);
    let headers = HeaderIndex::new("salary", csv.headers()?);
    let city_col = headers.require(headers.find(&["city"]), "city")?;
    let salary_col = headers.require(headers.find_containing("salary", Some(city_col)), "salary")?;
    let state_col = headers.find(&["state"]);

    let mut writer = csv::Writer::from_writer(Vec::new());
    if state_col.is_some() {
        writer.write_record(["City", "Salary", "State"])?;
    } else {
        writer.write_record(["City", "Salary"])?;
    }

    let mut rows = 0;
    let mut blanked = 0;
    for record in csv.records() {
        let record = record?;
        rows += 1;
        let salary = match record.get(salary_col).and_then(parse_amount) {
            Some(value) => value.to_string(),
            None => {
                blanked += 1;
                String::new()
            }
        };
        let city = record.get(city_col).unwrap_or_default();
        match state_col {
            Some(col) => {
                writer.write_record([city, salary.as_str(), record.get(col).unwrap_or_default()])?
            }
            None => writer.write_record([city, salary.as_str()])?,
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AffordError::Io(e.into_error()))?;
    Ok((bytes, rows, blanked))
}

/// Writes the normalized aggregate table to every target path.
#[instrument(skip_all, fields(source = %source.display(), targets = targets.len()))]
pub fn split_salary(source: &Path, targets: &[PathBuf]) -> Result<PrepareSummary> {
    let file = open_source(source)?;
    let (bytes, rows, blanked) = normalize_salary_table(file)?;
    if blanked > 0 {
        warn!("{} salary rows are not numeric and were left empty", blanked);
    }

    for target in targets {
        write_atomic(target, &bytes)?;
        info!("Wrote {}", target.display());
    }

    Ok(PrepareSummary {
        rows_written: rows,
        rows_skipped: blanked,
        output_files: targets.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::salary::parse_salary_table;

    #[test]
    fn test_projects_city_salary_state() {
        let data = "Title,City,State,Avg Salary,Company\n\
                    Junior Dev,Pittsburgh,PA,\"$95,000\",Acme\n\
                    Junior Dev,Erie,PA,n/a,Acme\n";
        let (bytes, rows, blanked) = normalize_salary_table(data.as_bytes()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "City,Salary,State\nPittsburgh,95000,PA\nErie,,PA\n");
        assert_eq!((rows, blanked), (2, 1));
    }

    #[test]
    fn test_output_loads_as_salary_table() {
        let data = "city,salary\n\"Austin, TX\",120000\n";
        let (bytes, _, _) = normalize_salary_table(data.as_bytes()).unwrap();
        let table = parse_salary_table(bytes.as_slice(), "Data Analyst").unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_requires_salary_column() {
        let data = "City,Pay\nErie,1\n";
        assert!(matches!(
            normalize_salary_table(data.as_bytes()),
            Err(AffordError::Schema { table: "salary", .. })
        ));
    }

    #[test]
    fn test_split_writes_every_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("aggregate.csv");
        std::fs::write(&source, "City,Salary\nErie,70000\n").unwrap();
        let targets = vec![dir.path().join("a.csv"), dir.path().join("b.csv")];

        let summary = split_salary(&source, &targets).unwrap();
        assert_eq!(summary.rows_written, 1);
        for target in &targets {
            assert_eq!(std::fs::read_to_string(target).unwrap(), "City,Salary\nErie,70000\n");
        }
    }
}
