//! On-disk ranking snapshots keyed by (state, job).
//!
//! A snapshot is `<cache_dir>/<STATE>_<job_slug>.csv` plus a sidecar
//! `<...>.meta.json` manifest. Both are written to a temp file in the cache
//! directory and renamed into place, so concurrent runs for the same key never
//! leave a partial file behind.

use crate::constants::OUTPUT_HEADER;
use crate::error::{AffordError, Result};
use crate::index::IndexWeights;
use crate::join::DropSummary;
use crate::normalize::StateCode;
use crate::rank::RankedRow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rent,
    Crime,
    Salary,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Rent => "rent",
            SourceKind::Crime => "crime",
            SourceKind::Salary => "salary",
        };
        f.write_str(name)
    }
}

/// A source table the snapshot depends on, with its freshness window.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub kind: SourceKind,
    pub path: PathBuf,
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub kind: SourceKind,
    pub file: String,
    pub sha256: String,
}

/// Everything a snapshot was computed from. A snapshot is only reused when
/// the manifest for the current request matches the stored one exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub state: String,
    pub job: String,
    pub top_n: usize,
    pub index: IndexWeights,
    pub sources: Vec<SourceFingerprint>,
}

/// Sidecar contents: the manifest plus the exclusions of the run that wrote
/// the snapshot. Only the manifest takes part in freshness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotMeta {
    #[serde(flatten)]
    manifest: CacheManifest,
    #[serde(default)]
    drops: DropSummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    SourceExpired(SourceKind),
    SourceNewer(SourceKind),
    ManifestMissing,
    ManifestMismatch,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::SourceExpired(kind) => write!(f, "{kind} source is older than its TTL"),
            StaleReason::SourceNewer(kind) => write!(f, "{kind} source changed after the snapshot"),
            StaleReason::ManifestMissing => f.write_str("snapshot manifest is missing or unreadable"),
            StaleReason::ManifestMismatch => f.write_str("snapshot was computed from different inputs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    Missing,
    Stale(StaleReason),
}

/// Lowercase, `_`-separated job title for file names.
pub fn job_slug(job: &str) -> String {
    let mut slug = String::with_capacity(job.len());
    for c in job.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

pub fn fingerprint_sources(sources: &[SourceFile]) -> Result<Vec<SourceFingerprint>> {
    sources
        .iter()
        .map(|source| {
            let bytes = fs::read(&source.path)
                .map_err(|_| AffordError::MissingSourceFile(source.path.clone()))?;
            let digest = Sha256::digest(&bytes);
            Ok(SourceFingerprint {
                kind: source.kind,
                file: source
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                sha256: hex::encode(digest),
            })
        })
        .collect()
}

/// Serializes ranked rows in output column order. Money and scores carry two
/// decimals; the index carries `precision` decimals.
pub fn render_csv(rows: &[RankedRow], precision: u32) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(OUTPUT_HEADER)?;
    let precision = precision as usize;
    for row in rows {
        writer.write_record([
            row.rank.to_string(),
            row.city.clone(),
            row.state.clone(),
            format!("{:.2}", row.rent),
            format!("{:.2}", row.crime_score),
            format!("{:.2}", row.salary),
            format!("{:.*}", precision, row.affordability_index),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| AffordError::Io(e.into_error()))
}

/// Writes `bytes` to `path` through a temp file in the same directory and an
/// atomic rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

pub struct RankCache {
    dir: PathBuf,
}

impl RankCache {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn csv_path(&self, state: StateCode, job: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", state, job_slug(job)))
    }

    pub fn manifest_path(&self, state: StateCode, job: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.meta.json", state, job_slug(job)))
    }

    /// Decides whether the snapshot for (state, job) can be reused.
    pub fn check(
        &self,
        state: StateCode,
        job: &str,
        sources: &[SourceFile],
        expected: &CacheManifest,
        now: DateTime<Utc>,
    ) -> Result<CacheStatus> {
        let csv_path = self.csv_path(state, job);
        let snapshot_modified = match fs::metadata(&csv_path) {
            Ok(meta) => DateTime::<Utc>::from(meta.modified()?),
            Err(_) => return Ok(CacheStatus::Missing),
        };

        for source in sources {
            let modified = DateTime::<Utc>::from(fs::metadata(&source.path)?.modified()?);
            if now - modified > source.ttl {
                warn!(
                    "{} source {} was last updated {} and is past its {}-day TTL; consider refreshing it",
                    source.kind,
                    source.path.display(),
                    modified.format("%Y-%m-%d"),
                    source.ttl.num_days()
                );
                return Ok(CacheStatus::Stale(StaleReason::SourceExpired(source.kind)));
            }
            if modified > snapshot_modified {
                return Ok(CacheStatus::Stale(StaleReason::SourceNewer(source.kind)));
            }
        }

        match self.read_meta(state, job) {
            None => Ok(CacheStatus::Stale(StaleReason::ManifestMissing)),
            Some(stored) if stored.manifest != *expected => {
                debug!("Manifest mismatch for {} / {}", state, job);
                Ok(CacheStatus::Stale(StaleReason::ManifestMismatch))
            }
            Some(_) => Ok(CacheStatus::Fresh),
        }
    }

    fn read_meta(&self, state: StateCode, job: &str) -> Option<SnapshotMeta> {
        fs::read(self.manifest_path(state, job))
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    /// Exclusions recorded when the snapshot was computed.
    pub fn read_drops(&self, state: StateCode, job: &str) -> Result<DropSummary> {
        let bytes = fs::read(self.manifest_path(state, job))?;
        let meta: SnapshotMeta = serde_json::from_slice(&bytes)?;
        Ok(meta.drops)
    }

    pub fn read(&self, state: StateCode, job: &str) -> Result<Vec<RankedRow>> {
        let mut reader = csv::Reader::from_path(self.csv_path(state, job))?;
        let rows = reader
            .deserialize::<RankedRow>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Writes the snapshot, then its manifest and drop summary. Returns the snapshot path.
    pub fn write(
        &self,
        state: StateCode,
        job: &str,
        rows: &[RankedRow],
        manifest: &CacheManifest,
        drops: &DropSummary,
    ) -> Result<PathBuf> {
        let csv_path = self.csv_path(state, job);
        write_atomic(&csv_path, &render_csv(rows, manifest.index.precision)?)?;
        let meta = SnapshotMeta {
            manifest: manifest.clone(),
            drops: *drops,
        };
        write_atomic(&self.manifest_path(state, job), &serde_json::to_vec_pretty(&meta)?)?;
        debug!("Wrote snapshot {}", csv_path.display());
        Ok(csv_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::resolve_state;
    use tempfile::tempdir;

    fn sample_rows() -> Vec<RankedRow> {
        vec![RankedRow {
            rank: 1,
            city: "Pittsburgh".to_string(),
            state: "PA".to_string(),
            rent: 1500.0,
            crime_score: 40.0,
            salary: 95_000.0,
            affordability_index: 1583.33,
        }]
    }

    fn source(dir: &Path, kind: SourceKind, name: &str, days: i64) -> SourceFile {
        let path = dir.join(name);
        fs::write(&path, format!("{name}\n")).unwrap();
        SourceFile {
            kind,
            path,
            ttl: Duration::days(days),
        }
    }

    fn manifest(sources: &[SourceFile], top_n: usize) -> CacheManifest {
        CacheManifest {
            state: "PA".to_string(),
            job: "Data Scientist".to_string(),
            top_n,
            index: IndexWeights::default(),
            sources: fingerprint_sources(sources).unwrap(),
        }
    }

    #[test]
    fn test_job_slug() {
        assert_eq!(job_slug("Full-Stack Software Engineer"), "full_stack_software_engineer");
        assert_eq!(job_slug("  Data  Scientist "), "data_scientist");
    }

    #[test]
    fn test_render_csv_format() {
        let bytes = render_csv(&sample_rows(), 2).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "rank,city,state,rent,crime_score,salary,affordability_index\n\
             1,Pittsburgh,PA,1500.00,40.00,95000.00,1583.33\n"
        );
    }

    #[test]
    fn test_write_then_fresh_then_read_back() {
        let dir = tempdir().unwrap();
        let sources = vec![
            source(dir.path(), SourceKind::Rent, "rent.csv", 30),
            source(dir.path(), SourceKind::Crime, "crime.csv", 365),
        ];
        let cache = RankCache::new(dir.path().join("cache"));
        let pa = resolve_state("PA").unwrap();
        let expected = manifest(&sources, 5);

        assert_eq!(
            cache.check(pa, "Data Scientist", &sources, &expected, Utc::now()).unwrap(),
            CacheStatus::Missing
        );

        let path = cache.write(pa, "Data Scientist", &sample_rows(), &expected, &DropSummary::default()).unwrap();
        assert!(path.ends_with("PA_data_scientist.csv"));
        assert_eq!(
            cache.check(pa, "Data Scientist", &sources, &expected, Utc::now()).unwrap(),
            CacheStatus::Fresh
        );
        assert_eq!(cache.read(pa, "Data Scientist").unwrap(), sample_rows());
    }

    #[test]
    fn test_manifest_mismatch_is_stale() {
        let dir = tempdir().unwrap();
        let sources = vec![source(dir.path(), SourceKind::Salary, "salary.csv", 7)];
        let cache = RankCache::new(dir.path());
        let pa = resolve_state("PA").unwrap();
        cache
            .write(pa, "Data Scientist", &sample_rows(), &manifest(&sources, 5), &DropSummary::default())
            .unwrap();

        let status = cache
            .check(pa, "Data Scientist", &sources, &manifest(&sources, 3), Utc::now())
            .unwrap();
        assert_eq!(status, CacheStatus::Stale(StaleReason::ManifestMismatch));
    }

    #[test]
    fn test_expired_source_is_stale() {
        let dir = tempdir().unwrap();
        let sources = vec![source(dir.path(), SourceKind::Salary, "salary.csv", 7)];
        let cache = RankCache::new(dir.path());
        let pa = resolve_state("PA").unwrap();
        let expected = manifest(&sources, 5);
        cache.write(pa, "Data Scientist", &sample_rows(), &expected, &DropSummary::default()).unwrap();

        let later = Utc::now() + Duration::days(8);
        let status = cache.check(pa, "Data Scientist", &sources, &expected, later).unwrap();
        assert_eq!(status, CacheStatus::Stale(StaleReason::SourceExpired(SourceKind::Salary)));
    }

    #[test]
    fn test_missing_manifest_is_stale() {
        let dir = tempdir().unwrap();
        let sources = vec![source(dir.path(), SourceKind::Rent, "rent.csv", 30)];
        let cache = RankCache::new(dir.path());
        let pa = resolve_state("PA").unwrap();
        let expected = manifest(&sources, 5);
        cache.write(pa, "Data Scientist", &sample_rows(), &expected, &DropSummary::default()).unwrap();
        fs::remove_file(cache.manifest_path(pa, "Data Scientist")).unwrap();

        let status = cache.check(pa, "Data Scientist", &sources, &expected, Utc::now()).unwrap();
        assert_eq!(status, CacheStatus::Stale(StaleReason::ManifestMissing));
    }

    #[test]
    fn test_drops_survive_reuse() {
        let dir = tempdir().unwrap();
        let sources = vec![source(dir.path(), SourceKind::Salary, "salary.csv", 7)];
        let cache = RankCache::new(dir.path());
        let pa = resolve_state("PA").unwrap();
        let expected = manifest(&sources, 5);
        let drops = DropSummary {
            missing_rent: 3,
            unresolved: 1,
            ..DropSummary::default()
        };
        cache.write(pa, "Data Scientist", &sample_rows(), &expected, &drops).unwrap();

        assert_eq!(
            cache.check(pa, "Data Scientist", &sources, &expected, Utc::now()).unwrap(),
            CacheStatus::Fresh
        );
        assert_eq!(cache.read_drops(pa, "Data Scientist").unwrap(), drops);
    }

    #[test]
    fn test_source_touched_after_snapshot_is_stale() {
        let dir = tempdir().unwrap();
        let sources = vec![
            source(dir.path(), SourceKind::Rent, "rent.csv", 30),
            source(dir.path(), SourceKind::Crime, "crime.csv", 365),
        ];
        let cache = RankCache::new(dir.path().join("cache"));
        let pa = resolve_state("PA").unwrap();
        let expected = manifest(&sources, 5);
        cache.write(pa, "Data Scientist", &sample_rows(), &expected, &DropSummary::default()).unwrap();

        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(120);
        fs::OpenOptions::new()
            .write(true)
            .open(&sources[1].path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let status = cache.check(pa, "Data Scientist", &sources, &expected, Utc::now()).unwrap();
        assert_eq!(status, CacheStatus::Stale(StaleReason::SourceNewer(SourceKind::Crime)));
    }
}
