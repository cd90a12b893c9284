use crate::cache::{
    fingerprint_sources, CacheManifest, CacheStatus, RankCache, SourceFile, SourceKind,
};
use crate::config::{Config, JobConfig};
use crate::error::{AffordError, Result};
use crate::join::{join_tables, DropSummary};
use crate::normalize::{resolve_state, StateCode};
use crate::rank::{rank_rows, score_rows, RankedRow};
use crate::sources::{load_crime_table, load_rent_table, load_salary_table};
use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// A ranking request as given by the user.
#[derive(Debug, Clone)]
pub struct RankRequest {
    pub job: String,
    pub state: String,
    pub top_n: Option<usize>,
    /// Recompute even when a fresh snapshot exists.
    pub force: bool,
}

/// How the snapshot was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CacheUse {
    Reused,
    Computed { reason: String },
}

/// Result of a complete ranking run
#[derive(Debug, Clone, Serialize)]
pub struct RankReport {
    pub job: String,
    pub state: StateCode,
    pub top_n: usize,
    pub rows: Vec<RankedRow>,
    pub crime_score: Option<f64>,
    pub drops: DropSummary,
    pub cache: CacheUse,
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum RankOutcome {
    Ranked(RankReport),
    /// Every candidate city was filtered out.
    NoData(RankReport),
}

impl RankOutcome {
    pub fn report(&self) -> &RankReport {
        match self {
            RankOutcome::Ranked(report) | RankOutcome::NoData(report) => report,
        }
    }
}

pub struct Pipeline<'a> {
    config: &'a Config,
    cache: RankCache,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            cache: RankCache::new(config.paths.cache_dir.clone()),
        }
    }

    fn sources_for(&self, job: &JobConfig) -> Vec<SourceFile> {
        let ttl = &self.config.ttl;
        vec![
            SourceFile {
                kind: SourceKind::Rent,
                path: self.config.rent_path(),
                ttl: ttl.rent(),
            },
            SourceFile {
                kind: SourceKind::Crime,
                path: self.config.crime_path(),
                ttl: ttl.crime(),
            },
            SourceFile {
                kind: SourceKind::Salary,
                path: self.config.salary_path(job),
                ttl: ttl.salary(),
            },
        ]
    }

    /// Runs the join-and-rank pipeline for one (job, state), reusing a fresh
    /// snapshot when allowed.
    #[instrument(skip(self, request), fields(job = %request.job, state = %request.state))]
    pub fn rank(&self, request: &RankRequest) -> Result<RankOutcome> {
        self.config.validate()?;
        let job = self.config.find_job(&request.job)?;
        let state = resolve_state(&request.state)
            .ok_or_else(|| AffordError::UnresolvedState(request.state.clone()))?;
        let top_n = request.top_n.unwrap_or(self.config.ranking.top_n);
        if top_n == 0 {
            return Err(AffordError::Config("top-N must be at least 1".to_string()));
        }

        let sources = self.sources_for(job);
        for source in &sources {
            if !source.path.is_file() {
                return Err(AffordError::MissingSourceFile(source.path.clone()));
            }
        }

        let manifest = CacheManifest {
            state: state.to_string(),
            job: job.title.clone(),
            top_n,
            index: self.config.index.clone(),
            sources: fingerprint_sources(&sources)?,
        };

        let reason = if request.force {
            "recompute requested".to_string()
        } else {
            match self.cache.check(state, &job.title, &sources, &manifest, Utc::now())? {
                CacheStatus::Fresh => {
                    info!("Reusing snapshot for {} / {}", state, job.title);
                    counter!("urbanlens_cache_hits_total").increment(1);
                    let rows = self.cache.read(state, &job.title)?;
                    let drops = self.cache.read_drops(state, &job.title)?;
                    let report = RankReport {
                        job: job.title.clone(),
                        state,
                        top_n,
                        crime_score: rows.first().map(|row| row.crime_score),
                        rows,
                        drops,
                        cache: CacheUse::Reused,
                        output_file: Some(self.cache.csv_path(state, &job.title)),
                    };
                    return Ok(RankOutcome::Ranked(report));
                }
                CacheStatus::Missing => "no snapshot".to_string(),
                CacheStatus::Stale(reason) => {
                    info!("Snapshot is stale: {}", reason);
                    reason.to_string()
                }
            }
        };
        counter!("urbanlens_cache_misses_total").increment(1);

        let rent = load_rent_table(&sources[0].path)?;
        let crime = load_crime_table(&sources[1].path)?;
        let salary = load_salary_table(&sources[2].path, &job.title)?;
        for (table, stats) in [("rent", rent.stats), ("crime", crime.stats), ("salary", salary.stats)] {
            counter!("urbanlens_rows_loaded_total", "table" => table).increment(stats.rows_read as u64);
        }

        let joined = join_tables(&rent, &crime, &salary, state);
        let mut drops = joined.drops;
        let scored = score_rows(joined.rows, &self.config.index, &mut drops);
        let rows = rank_rows(scored, top_n);

        record_drops(&drops);
        if !drops.is_empty() {
            warn!("Dropped {} rows: {}", drops.total(), drops);
        }

        let mut report = RankReport {
            job: job.title.clone(),
            state,
            top_n,
            rows,
            crime_score: joined.crime_score,
            drops,
            cache: CacheUse::Computed { reason },
            output_file: None,
        };

        if report.rows.is_empty() {
            warn!("No data for {} in {}", job.title, state);
            return Ok(RankOutcome::NoData(report));
        }

        let path = self.cache
            .write(state, &job.title, &report.rows, &manifest, &report.drops)?;
        info!("Saved {} ranked cities to {}", report.rows.len(), path.display());
        report.output_file = Some(path);
        Ok(RankOutcome::Ranked(report))
    }
}

fn record_drops(drops: &DropSummary) {
    let reasons = [
        ("unresolved", drops.unresolved),
        ("missing_metric", drops.missing_metric),
        ("missing_rent", drops.missing_rent),
        ("missing_crime", drops.missing_crime),
        ("invalid_index", drops.invalid_index),
    ];
    for (reason, count) in reasons {
        if count > 0 {
            counter!("urbanlens_rows_dropped_total", "reason" => reason).increment(count as u64);
        }
    }
}
