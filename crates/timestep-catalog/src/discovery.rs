//! Gathers the raw inputs [`reconcile`](crate::reconcile::reconcile) needs:
//! the published manifest plus a window of object-store run listings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use net_fetch::{fetch_manifest, list_prefix};
use reqwest::Client;
use tile_common::EngineError;

/// One discovered model run: its reference datetime and the prefix holding
/// its files.
#[derive(Debug, Clone, PartialEq)]
pub struct RunEntry {
    pub run_datetime: DateTime<Utc>,
    pub prefix: String,
}

/// Abstraction over "list the run prefixes under a model's bucket", so
/// [`Catalog::bootstrap`](crate::catalog::Catalog::bootstrap) can be tested
/// against a fake without a network round trip.
#[async_trait]
pub trait ObjectStoreLister: Send + Sync {
    async fn list_runs(&self, base_url: &str) -> Result<Vec<RunEntry>, EngineError>;
    async fn list_run_files(&self, run_prefix: &str) -> Result<Vec<String>, EngineError>;
}

/// The real lister, backed by S3-style `?list-type=2` bucket listings.
pub struct HttpObjectStoreLister {
    client: Client,
}

impl HttpObjectStoreLister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStoreLister for HttpObjectStoreLister {
    async fn list_runs(&self, base_url: &str) -> Result<Vec<RunEntry>, EngineError> {
        let result = list_prefix(&self.client, base_url, "").await?;
        let mut runs = Vec::new();
        for prefix in result.common_prefixes {
            if let Some(dt) = parse_run_prefix(&prefix) {
                runs.push(RunEntry { run_datetime: dt, prefix });
            }
        }
        runs.sort_by_key(|r| r.run_datetime);
        Ok(runs)
    }

    async fn list_run_files(&self, run_prefix: &str) -> Result<Vec<String>, EngineError> {
        let result = list_prefix(&self.client, run_prefix, "").await?;
        Ok(result.contents)
    }
}

/// Parse a `YYYYMMDDHH/` style run directory name into its UTC datetime.
fn parse_run_prefix(prefix: &str) -> Option<DateTime<Utc>> {
    let trimmed = prefix.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if name.len() != 10 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = chrono::NaiveDateTime::parse_from_str(&format!("{name}00"), "%Y%m%d%H%M").ok()?;
    Some(chrono::TimeZone::from_utc_datetime(&Utc, &naive))
}

/// The raw facts [`reconcile`](crate::reconcile::reconcile) needs, collected
/// from the manifest and the run-window listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDiscovery {
    pub reference_time: DateTime<Utc>,
    pub valid_times: Vec<DateTime<Utc>>,
    /// Runs observed in the bucket, oldest first, bracketing
    /// `reference_time`.
    pub run_window: Vec<RunEntry>,
    /// Valid times listed directly from the newest run's files, used only
    /// when that run is newer than `reference_time` (the manifest has not
    /// caught up yet).
    pub incomplete_run_valid_times: Vec<DateTime<Utc>>,
}

impl RawDiscovery {
    /// The newest observed run, if it is ahead of the manifest's
    /// `reference_time` and therefore "incomplete" from the manifest's
    /// point of view.
    pub fn incomplete_run(&self) -> Option<&RunEntry> {
        let newest = self.run_window.last()?;
        if newest.run_datetime > self.reference_time && !self.incomplete_run_valid_times.is_empty() {
            Some(newest)
        } else {
            None
        }
    }
}

/// Fetch the manifest and the run-window listing needed to build a
/// [`RawDiscovery`] for one model.
pub async fn discover(
    client: &Client,
    lister: &dyn ObjectStoreLister,
    manifest_url: &str,
    bucket_url: &str,
) -> Result<RawDiscovery, EngineError> {
    let manifest = fetch_manifest(client, manifest_url).await?;
    let run_window = lister.list_runs(bucket_url).await?;

    let mut incomplete_run_valid_times = Vec::new();
    if let Some(newest) = run_window.last() {
        if newest.run_datetime > manifest.reference_time {
            let files = lister.list_run_files(&newest.prefix).await?;
            incomplete_run_valid_times =
                files.iter().filter_map(|f| parse_valid_time_from_filename(f)).collect();
        }
    }

    Ok(RawDiscovery {
        reference_time: manifest.reference_time,
        valid_times: manifest.valid_times,
        run_window,
        incomplete_run_valid_times,
    })
}

fn parse_valid_time_from_filename(name: &str) -> Option<DateTime<Utc>> {
    let base = name.rsplit('/').next().unwrap_or(name);
    let stem = base.strip_suffix(".om")?;
    let naive = chrono::NaiveDateTime::parse_from_str(stem, "%Y-%m-%dT%H%M").ok()?;
    Some(chrono::TimeZone::from_utc_datetime(&Utc, &naive))
}
