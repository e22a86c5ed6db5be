//! Service configuration.
//!
//! Both roles read the same YAML file. The core never touches the file directly: it asks a
//! [`ConfigSource`] for an immutable [`ConfigSnapshot`], and the source decides when the
//! file is read again.

use crate::core::{CountError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Immutable view of the configuration at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    /// Base URLs of the workers the pool should contain.
    pub workers: Vec<String>,

    /// Directory holding one durable file per tenant.
    pub storage_dir: PathBuf,

    /// Directory holding one log file per worker port.
    pub log_dir: PathBuf,

    /// Period of the worker backup pass, also the count cache staleness bound.
    pub backup_interval: Duration,

    /// Period of the pool reconciliation pass, also the config refresh interval.
    pub reconcile_interval: Duration,
}

impl ConfigSnapshot {
    /// Create a snapshot with no workers and 5 second intervals.
    pub fn new(storage_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            workers: Vec::new(),
            storage_dir: storage_dir.into(),
            log_dir: log_dir.into(),
            backup_interval: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(5),
        }
    }

    /// Set the desired worker addresses.
    pub fn workers<I, S>(mut self, workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workers = workers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the backup interval.
    pub fn backup_interval(mut self, interval: Duration) -> Self {
        self.backup_interval = interval;
        self
    }

    /// Set the reconciliation interval.
    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// Parse and validate the YAML representation.
    ///
    /// ```
    /// use countd::ConfigSnapshot;
    ///
    /// let snapshot = ConfigSnapshot::from_yaml_str(
    ///     "workers: [\"http://localhost:5001\"]\n\
    ///      database: data\n\
    ///      worker_logs: logs\n\
    ///      worker_persist: 2\n\
    ///      config_check: 0.5\n",
    /// )
    /// .unwrap();
    /// assert_eq!(snapshot.workers.len(), 1);
    /// ```
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(raw)
            .map_err(|e| CountError::Config(format!("Failed to parse config: {}", e)))?;
        file.into_snapshot()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            CountError::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }
}

/// On-disk layout, keys as written by operators.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    workers: Vec<String>,
    database: String,
    worker_logs: String,
    worker_persist: f64,
    config_check: f64,
}

impl ConfigFile {
    fn into_snapshot(self) -> Result<ConfigSnapshot> {
        if self.database.trim().is_empty() {
            return Err(CountError::Config("database must not be empty".to_string()));
        }
        if self.worker_logs.trim().is_empty() {
            return Err(CountError::Config("worker_logs must not be empty".to_string()));
        }
        Ok(ConfigSnapshot {
            workers: self.workers,
            storage_dir: PathBuf::from(self.database),
            log_dir: PathBuf::from(self.worker_logs),
            backup_interval: seconds("worker_persist", self.worker_persist)?,
            reconcile_interval: seconds("config_check", self.config_check)?,
        })
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CountError::Config(format!(
            "{} must be a positive number of seconds, got {}",
            key, value
        )));
    }
    Duration::try_from_secs_f64(value).map_err(|e| {
        CountError::Config(format!("{} is out of range, got {}: {}", key, value, e))
    })
}

/// Supplies the current configuration snapshot.
pub trait ConfigSource: Send + Sync {
    fn snapshot(&self) -> Result<Arc<ConfigSnapshot>>;
}

struct CachedSnapshot {
    snapshot: Arc<ConfigSnapshot>,
    fetched_at: Instant,
}

/// Reads a YAML file, re-reading it once the snapshot is older than its
/// `config_check` interval.
pub struct FileConfigSource {
    path: PathBuf,
    cached: Mutex<CachedSnapshot>,
}

impl FileConfigSource {
    /// Load the file once; failure here is a startup error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = ConfigSnapshot::from_file(&path)?;
        Ok(Self {
            path,
            cached: Mutex::new(CachedSnapshot {
                snapshot: Arc::new(snapshot),
                fetched_at: Instant::now(),
            }),
        })
    }
}

impl ConfigSource for FileConfigSource {
    fn snapshot(&self) -> Result<Arc<ConfigSnapshot>> {
        let mut cached = self.cached.lock()?;
        if cached.fetched_at.elapsed() >= cached.snapshot.reconcile_interval {
            match ConfigSnapshot::from_file(&self.path) {
                Ok(snapshot) => {
                    debug!(path = %self.path.display(), "config refreshed");
                    cached.snapshot = Arc::new(snapshot);
                }
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "keeping previous config");
                }
            }
            cached.fetched_at = Instant::now();
        }
        Ok(Arc::clone(&cached.snapshot))
    }
}

/// Holds a snapshot in memory; callers may swap it at runtime.
pub struct StaticConfigSource {
    snapshot: RwLock<Arc<ConfigSnapshot>>,
}

impl StaticConfigSource {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn replace(&self, snapshot: ConfigSnapshot) -> Result<()> {
        *self.snapshot.write()? = Arc::new(snapshot);
        Ok(())
    }
}

impl ConfigSource for StaticConfigSource {
    fn snapshot(&self) -> Result<Arc<ConfigSnapshot>> {
        let guard = self.snapshot.read()?;
        Ok(Arc::clone(&*guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "workers:\n  - http://localhost:5001\n  - http://localhost:5002\n\
                          database: db\nworker_logs: logs\nworker_persist: 1.5\nconfig_check: 3\n";

    #[test]
    fn test_parse_original_keys() {
        let snapshot = ConfigSnapshot::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(
            snapshot.workers,
            vec!["http://localhost:5001", "http://localhost:5002"]
        );
        assert_eq!(snapshot.storage_dir, PathBuf::from("db"));
        assert_eq!(snapshot.log_dir, PathBuf::from("logs"));
        assert_eq!(snapshot.backup_interval, Duration::from_millis(1500));
        assert_eq!(snapshot.reconcile_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_non_positive_intervals() {
        let raw = SAMPLE.replace("worker_persist: 1.5", "worker_persist: 0");
        assert!(matches!(
            ConfigSnapshot::from_yaml_str(&raw),
            Err(CountError::Config(_))
        ));
        let raw = SAMPLE.replace("config_check: 3", "config_check: -1");
        assert!(ConfigSnapshot::from_yaml_str(&raw).is_err());
    }

    #[test]
    fn test_rejects_intervals_too_large_for_a_duration() {
        let raw = SAMPLE.replace("worker_persist: 1.5", "worker_persist: 1e20");
        assert!(matches!(
            ConfigSnapshot::from_yaml_str(&raw),
            Err(CountError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_a_startup_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileConfigSource::open(temp_dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(CountError::Config(_))));
    }

    #[test]
    fn test_file_source_refreshes_after_interval() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        let raw = SAMPLE.replace("config_check: 3", "config_check: 0.05");
        fs::write(&path, &raw).unwrap();

        let source = FileConfigSource::open(&path).unwrap();
        assert_eq!(source.snapshot().unwrap().workers.len(), 2);

        fs::write(&path, raw.replace("  - http://localhost:5002\n", "")).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(source.snapshot().unwrap().workers.len(), 1);
    }

    #[test]
    fn test_file_source_keeps_previous_snapshot_on_bad_reread() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, SAMPLE.replace("config_check: 3", "config_check: 0.05")).unwrap();

        let source = FileConfigSource::open(&path).unwrap();
        fs::write(&path, "workers: [").unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(source.snapshot().unwrap().workers.len(), 2);
    }

    #[test]
    fn test_file_source_survives_out_of_range_reread() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        let raw = SAMPLE.replace("config_check: 3", "config_check: 0.05");
        fs::write(&path, &raw).unwrap();

        let source = FileConfigSource::open(&path).unwrap();
        fs::write(&path, raw.replace("worker_persist: 1.5", "worker_persist: 1e20")).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        let snapshot = source.snapshot().unwrap();
        assert_eq!(snapshot.backup_interval, Duration::from_millis(1500));

        fs::write(&path, raw.replace("  - http://localhost:5002\n", "")).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(source.snapshot().unwrap().workers.len(), 1);
    }

    #[test]
    fn test_static_source_replace() {
        let source = StaticConfigSource::new(ConfigSnapshot::new("db", "logs"));
        assert!(source.snapshot().unwrap().workers.is_empty());
        source
            .replace(ConfigSnapshot::new("db", "logs").workers(["http://localhost:5001"]))
            .unwrap();
        assert_eq!(source.snapshot().unwrap().workers.len(), 1);
    }
}
