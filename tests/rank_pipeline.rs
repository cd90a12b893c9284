use anyhow::Result;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};
use urbanlens::pipeline::{CacheUse, RankOutcome};
use urbanlens::prepare::zori::prepare_rent;
use urbanlens::{AffordError, Config, Pipeline, RankRequest};

const RENT: &str = "RegionName,State,avg_2024\n\
                    Pittsburgh,PA,1500\n\
                    Erie,PA,1000\n\
                    Austin,TX,1700\n";

const CRIME: &str = "State,composite_score\n\
                     Pennsylvania,40\n\
                     Texas,30\n";

const SALARY: &str = "City,Salary\n\
                      \"Pittsburgh, PA\",95000\n\
                      \"Erie, PA\",60000\n\
                      \"Scranton, PA\",80000\n\
                      \"Austin, TX\",120000\n";

fn setup() -> Result<(TempDir, Config)> {
    let dir = tempdir()?;
    let data = dir.path().join("data");
    fs::create_dir_all(&data)?;
    fs::write(data.join("rent_data.csv"), RENT)?;
    fs::write(data.join("crime_data.csv"), CRIME)?;
    fs::write(data.join("data_engineer_salary.csv"), SALARY)?;

    let mut config = Config::default();
    config.paths.data_dir = data;
    config.paths.cache_dir = dir.path().join("cache");
    Ok((dir, config))
}

fn request(state: &str) -> RankRequest {
    RankRequest {
        job: "Data Engineer".to_string(),
        state: state.to_string(),
        top_n: None,
        force: false,
    }
}

fn ranked(outcome: RankOutcome) -> urbanlens::RankReport {
    match outcome {
        RankOutcome::Ranked(report) => report,
        RankOutcome::NoData(report) => panic!("expected ranked rows, got no data: {:?}", report),
    }
}

#[test]
fn test_ranks_state_and_counts_missing_rent() -> Result<()> {
    let (_dir, config) = setup()?;
    let report = ranked(Pipeline::new(&config).rank(&request("PA"))?);

    let cities: Vec<&str> = report.rows.iter().map(|r| r.city.as_str()).collect();
    assert_eq!(cities, vec!["Pittsburgh", "Erie"]);
    assert_eq!(report.rows[0].affordability_index, 1583.33);
    assert_eq!(report.rows[1].affordability_index, 1500.0);
    assert!(report.rows.iter().all(|r| r.rent > 0.0 && r.salary > 0.0));
    assert_eq!(report.drops.missing_rent, 1);
    assert_eq!(report.crime_score, Some(40.0));
    assert!(matches!(report.cache, CacheUse::Computed { .. }));

    let written = fs::read_to_string(report.output_file.as_deref().unwrap())?;
    assert_eq!(
        written,
        "rank,city,state,rent,crime_score,salary,affordability_index\n\
         1,Pittsburgh,PA,1500.00,40.00,95000.00,1583.33\n\
         2,Erie,PA,1000.00,40.00,60000.00,1500.00\n"
    );
    Ok(())
}

#[test]
fn test_full_state_name_matches_code() -> Result<()> {
    let (_dir, config) = setup()?;
    let pipeline = Pipeline::new(&config);
    let by_code = ranked(pipeline.rank(&request("PA"))?);
    let by_name = ranked(pipeline.rank(&request("pennsylvania"))?);
    assert_eq!(by_code.rows, by_name.rows);
    assert_eq!(by_code.state, by_name.state);
    Ok(())
}

#[test]
fn test_rerun_reuses_snapshot_and_force_is_byte_identical() -> Result<()> {
    let (_dir, config) = setup()?;
    let pipeline = Pipeline::new(&config);

    let first = ranked(pipeline.rank(&request("PA"))?);
    let path = first.output_file.clone().unwrap();
    let first_bytes = fs::read(&path)?;

    let second = ranked(pipeline.rank(&request("PA"))?);
    assert_eq!(second.cache, CacheUse::Reused);
    assert_eq!(second.rows, first.rows);
    assert_eq!(second.drops, first.drops);
    assert_eq!(second.drops.missing_rent, 1);

    let mut forced = request("PA");
    forced.force = true;
    let third = ranked(pipeline.rank(&forced)?);
    assert!(matches!(third.cache, CacheUse::Computed { .. }));
    assert_eq!(fs::read(&path)?, first_bytes);
    Ok(())
}

#[test]
fn test_top_n_truncates() -> Result<()> {
    let (_dir, config) = setup()?;
    let mut req = request("PA");
    req.top_n = Some(1);
    let report = ranked(Pipeline::new(&config).rank(&req)?);
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].rank, 1);
    Ok(())
}

#[test]
fn test_state_without_data_is_no_data() -> Result<()> {
    let (dir, config) = setup()?;
    match Pipeline::new(&config).rank(&request("OH"))? {
        RankOutcome::NoData(report) => {
            assert!(report.rows.is_empty());
            assert!(report.output_file.is_none());
        }
        RankOutcome::Ranked(report) => panic!("unexpected rows: {:?}", report.rows),
    }
    assert!(!dir.path().join("cache").join("OH_data_engineer.csv").exists());
    Ok(())
}

#[test]
fn test_unresolved_state_is_an_error() -> Result<()> {
    let (_dir, config) = setup()?;
    let err = Pipeline::new(&config).rank(&request("Atlantis")).unwrap_err();
    assert!(matches!(err, AffordError::UnresolvedState(s) if s == "Atlantis"));
    Ok(())
}

#[test]
fn test_missing_salary_file_is_an_error() -> Result<()> {
    let (_dir, config) = setup()?;
    let mut req = request("PA");
    req.job = "Web Developer".to_string();
    let err = Pipeline::new(&config).rank(&req).unwrap_err();
    match err {
        AffordError::MissingSourceFile(path) => {
            assert!(path.ends_with("web_developer_salary.csv"))
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn test_out_of_range_ttl_is_a_config_error() -> Result<()> {
    let (_dir, mut config) = setup()?;
    config.ttl.rent_days = i64::MAX / 1000;
    assert!(matches!(
        Pipeline::new(&config).rank(&request("PA")),
        Err(AffordError::Config(_))
    ));
    Ok(())
}

#[test]
fn test_unknown_job_is_an_error() -> Result<()> {
    let (_dir, config) = setup()?;
    let mut req = request("PA");
    req.job = "Astronaut".to_string();
    assert!(matches!(
        Pipeline::new(&config).rank(&req),
        Err(AffordError::UnknownJob(_))
    ));
    Ok(())
}

fn write_zori(path: &Path) -> Result<()> {
    fs::write(
        path,
        "RegionID,SizeRank,RegionName,RegionType,StateName,State,2024-05-31,2024-06-30\n\
         1,60,Pittsburgh,city,PA,PA,1480,1520\n\
         2,300,Erie,city,PA,PA,990,1010\n",
    )?;
    Ok(())
}

#[test]
fn test_prepared_rent_table_feeds_ranking() -> Result<()> {
    let (_dir, config) = setup()?;
    let raw = config.paths.data_dir.join("zori.csv");
    write_zori(&raw)?;
    let summary = prepare_rent(&raw, &config.rent_path(), 12)?;
    assert_eq!(summary.rows_written, 2);

    let report = ranked(Pipeline::new(&config).rank(&request("PA"))?);
    assert_eq!(report.rows[0].city, "Pittsburgh");
    assert_eq!(report.rows[0].rent, 1500.0);
    assert_eq!(report.rows[1].rent, 1000.0);
    Ok(())
}
