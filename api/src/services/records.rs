//! Per-station record store with a single-flight parse cache.
//!
//! Architecture:
//! - Each station's `.dly` file is read from `records_dir`; when absent and a
//!   remote base URL is configured, it is downloaded once and written back to
//!   disk.
//! - Parsing runs on the blocking pool and the result is cached per station
//!   as an `Arc<StationRecords>`.
//! - The cache maps station id → `Arc<OnceCell<..>>`. The map lock is held
//!   only to fetch or insert the cell; the first caller initialises it while
//!   concurrent callers for the same id await the same cell.
//! - A failed load leaves the cell empty, so the next request retries.
//! - With a TTL, an entry expires relative to when its load finished. A cell
//!   still being loaded never expires.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::OnceCell;

use super::dly::{parse_dly, DlyError, Observation};
use super::metadata::YearRange;

/// Errors that can occur while loading a station's records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Invalid station id '{0}'")]
    InvalidId(String),
    #[error("No record file for station '{0}'")]
    Missing(String),
    #[error("Failed to read '{0}'")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Request for {0} failed")]
    Fetch(String, #[source] reqwest::Error),
    #[error("Request for {url} returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Failed to parse records for '{station}'")]
    Parse {
        station: String,
        #[source]
        source: DlyError,
    },
    #[error("Background parse task failed")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Parsed observations for one station, sorted by date.
#[derive(Debug)]
pub struct StationRecords {
    observations: Vec<Observation>,
}

impl StationRecords {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    /// Observations whose year falls inside `years`.
    pub fn window(&self, years: YearRange) -> &[Observation] {
        let lo = self.observations.partition_point(|o| o.year() < years.start());
        let hi = self.observations.partition_point(|o| o.year() <= years.end());
        &self.observations[lo..hi]
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }
}

/// A year-bounded view over cached station records.
///
/// Cheap to clone; each call to `iter()` starts a fresh pass.
#[derive(Debug, Clone)]
pub struct RecordWindow {
    records: Arc<StationRecords>,
    years: YearRange,
}

impl RecordWindow {
    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.records.window(self.years).iter()
    }
}

/// Where record files come from.
#[derive(Debug, Clone)]
pub struct RecordSource {
    records_dir: PathBuf,
    remote: Option<RemoteRecords>,
}

#[derive(Debug, Clone)]
struct RemoteRecords {
    client: reqwest::Client,
    base_url: String,
}

impl RecordSource {
    /// Local `.dly` files only.
    pub fn local(records_dir: impl Into<PathBuf>) -> Self {
        Self {
            records_dir: records_dir.into(),
            remote: None,
        }
    }

    /// Local files, falling back to `{base_url}/{ID}.dly` over HTTP.
    pub fn with_remote(records_dir: impl Into<PathBuf>, base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            records_dir: records_dir.into(),
            remote: Some(RemoteRecords {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            }),
        }
    }

    fn path_for(&self, station_id: &str) -> PathBuf {
        self.records_dir.join(format!("{}.dly", station_id))
    }

    /// Read the raw `.dly` text for a station.
    async fn read(&self, station_id: &str) -> Result<String, RecordError> {
        let path = self.path_for(station_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => return Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RecordError::Io(path, e)),
        }

        let Some(remote) = &self.remote else {
            return Err(RecordError::Missing(station_id.to_string()));
        };

        let url = format!("{}/{}.dly", remote.base_url, station_id);
        tracing::info!("Fetching records for {} from {}", station_id, url);
        let response = remote
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RecordError::Fetch(url.clone(), e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RecordError::Missing(station_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(RecordError::HttpStatus {
                url,
                status: response.status(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| RecordError::Fetch(url.clone(), e))?;

        store_copy(&path, &text).await;
        Ok(text)
    }
}

/// Best-effort write of a downloaded file so later restarts read it locally.
async fn store_copy(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!("Failed to create {}: {}", parent.display(), e);
            return;
        }
    }
    if let Err(e) = tokio::fs::write(path, text).await {
        tracing::warn!("Failed to store {}: {}", path.display(), e);
    }
}

/// Parsed records plus the time the load finished.
type Loaded = (Instant, Arc<StationRecords>);

type Slot = Arc<OnceCell<Loaded>>;

/// Station record store. Shared behind an `Arc`.
pub struct RecordStore {
    source: RecordSource,
    ttl: Option<Duration>,
    cache: Mutex<HashMap<String, Slot>>,
    loads: AtomicU64,
}

impl RecordStore {
    pub fn new(source: RecordSource, ttl: Option<Duration>) -> Self {
        Self {
            source,
            ttl,
            cache: Mutex::new(HashMap::new()),
            loads: AtomicU64::new(0),
        }
    }

    /// Observations for a station within `years`.
    ///
    /// The first call for a station loads and parses its file; later calls
    /// (and concurrent callers) share that result.
    pub async fn records(
        &self,
        station_id: &str,
        years: YearRange,
    ) -> Result<RecordWindow, RecordError> {
        let records = self.station_records(station_id).await?;
        Ok(RecordWindow { records, years })
    }

    async fn station_records(&self, station_id: &str) -> Result<Arc<StationRecords>, RecordError> {
        if !is_valid_station_id(station_id) {
            return Err(RecordError::InvalidId(station_id.to_string()));
        }

        let cell = self.cell_for(station_id);
        let (_, records) = cell
            .get_or_try_init(|| async {
                tracing::debug!("Record cache miss for {}", station_id);
                let records = self.load(station_id).await?;
                Ok::<_, RecordError>((Instant::now(), Arc::new(records)))
            })
            .await?;
        Ok(Arc::clone(records))
    }

    /// Fetch or insert the cache cell for a station, replacing an expired one.
    fn cell_for(&self, station_id: &str) -> Slot {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if let Some(cell) = cache.get(station_id) {
            if !self.is_expired(cell, now) {
                return Arc::clone(cell);
            }
            tracing::debug!("Record cache entry for {} expired", station_id);
        }

        let cell: Slot = Arc::new(OnceCell::new());
        cache.insert(station_id.to_string(), Arc::clone(&cell));
        cell
    }

    /// Only a loaded entry can expire; one still loading is shared.
    fn is_expired(&self, cell: &OnceCell<Loaded>, now: Instant) -> bool {
        match (self.ttl, cell.get()) {
            (Some(ttl), Some((loaded_at, _))) => now.duration_since(*loaded_at) >= ttl,
            _ => false,
        }
    }

    async fn load(&self, station_id: &str) -> Result<StationRecords, RecordError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let text = self.source.read(station_id).await?;
        let id = station_id.to_string();
        let observations = tokio::task::spawn_blocking(move || {
            parse_dly(&text, &id).map_err(|source| RecordError::Parse {
                station: id.clone(),
                source,
            })
        })
        .await??;

        let records = StationRecords::new(observations);
        tracing::info!(
            "Parsed {} observations for {} in {:?}",
            records.len(),
            station_id,
            started.elapsed()
        );
        Ok(records)
    }

    /// Number of stations with parsed records currently cached.
    ///
    /// Expired entries are evicted on the way.
    pub fn cached_stations(&self) -> usize {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        cache.retain(|_, cell| !self.is_expired(cell, now));
        cache.values().filter(|cell| cell.initialized()).count()
    }

    /// Total record loads started since startup.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

/// GHCN ids are alphanumeric; anything else must never reach the filesystem.
fn is_valid_station_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 32 && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
