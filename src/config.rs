use crate::constants::*;
use crate::error::{AffordError, Result};
use crate::index::IndexWeights;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const DATA_DIR_ENV: &str = "URBANLENS_DATA_DIR";
// A century; keeps `Duration::days` in range.
const MAX_TTL_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub ranking: RankingConfig,
    pub index: IndexWeights,
    pub ttl: TtlConfig,
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub rent_file: String,
    pub crime_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub top_n: usize,
}

/// Freshness windows, in days, per source table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub rent_days: i64,
    pub crime_days: i64,
    pub salary_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub title: String,
    pub file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            ranking: RankingConfig::default(),
            index: IndexWeights::default(),
            ttl: TtlConfig::default(),
            jobs: DEFAULT_JOBS
                .iter()
                .map(|(title, file)| JobConfig {
                    title: title.to_string(),
                    file: file.to_string(),
                })
                .collect(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            rent_file: DEFAULT_RENT_FILE.to_string(),
            crime_file: DEFAULT_CRIME_FILE.to_string(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            rent_days: DEFAULT_RENT_TTL_DAYS,
            crime_days: DEFAULT_CRIME_TTL_DAYS,
            salary_days: DEFAULT_SALARY_TTL_DAYS,
        }
    }
}

impl TtlConfig {
    pub fn rent(&self) -> Duration {
        Duration::days(self.rent_days)
    }

    pub fn crime(&self) -> Duration {
        Duration::days(self.crime_days)
    }

    pub fn salary(&self) -> Duration {
        Duration::days(self.salary_days)
    }
}

impl Config {
    /// Loads configuration from an explicit path, or `./config.toml` when present.
    /// A missing default file yields the built-in defaults; a missing explicit
    /// file is an error. `URBANLENS_DATA_DIR` overrides `paths.data_dir`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                debug!("Data directory overridden by {}: {}", DATA_DIR_ENV, dir);
                config.paths.data_dir = PathBuf::from(dir.trim());
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AffordError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ranking.top_n == 0 {
            return Err(AffordError::Config("ranking.top_n must be at least 1".to_string()));
        }
        self.index.validate().map_err(AffordError::Config)?;
        for (name, days) in [
            ("rent_days", self.ttl.rent_days),
            ("crime_days", self.ttl.crime_days),
            ("salary_days", self.ttl.salary_days),
        ] {
            if !(0..=MAX_TTL_DAYS).contains(&days) {
                return Err(AffordError::Config(format!(
                    "ttl.{name} must be between 0 and {MAX_TTL_DAYS}, got {days}"
                )));
            }
        }
        if self.jobs.is_empty() {
            return Err(AffordError::Config("at least one [[jobs]] entry is required".to_string()));
        }
        for job in &self.jobs {
            if job.title.trim().is_empty() || job.file.trim().is_empty() {
                return Err(AffordError::Config(
                    "every job needs a non-empty title and file".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn rent_path(&self) -> PathBuf {
        self.paths.data_dir.join(&self.paths.rent_file)
    }

    pub fn crime_path(&self) -> PathBuf {
        self.paths.data_dir.join(&self.paths.crime_file)
    }

    pub fn salary_path(&self, job: &JobConfig) -> PathBuf {
        self.paths.data_dir.join(&job.file)
    }

    /// Finds a job by menu number (1-based) or by title, ignoring case and
    /// surrounding whitespace.
    pub fn find_job(&self, raw: &str) -> Result<&JobConfig> {
        let wanted = raw.trim();
        if let Ok(number) = wanted.parse::<usize>() {
            if number >= 1 {
                if let Some(job) = self.jobs.get(number - 1) {
                    return Ok(job);
                }
            }
        }
        self.jobs
            .iter()
            .find(|job| job.title.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AffordError::UnknownJob(wanted.to_string()))
    }
}
