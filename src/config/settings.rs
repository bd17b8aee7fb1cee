//! Configuration settings and validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kind::DocumentKind;
use crate::{Error, Result};

/// Upper bound for any per-stage parallelism setting.
const MAX_PARALLELISM: usize = 64;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for comparer snapshots and run statistics.
    pub data_dir: PathBuf,

    /// Host address the health/metrics server binds to.
    pub host: String,

    /// Port the health/metrics server listens on.
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Search index connection.
    pub index: IndexConfig,

    /// Per-kind job settings. Kinds without an entry are never scheduled.
    pub jobs: BTreeMap<DocumentKind, JobSettings>,
}

/// Search index connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URL of the Elasticsearch-compatible service.
    pub url: String,

    /// Prefix shared by every index name.
    pub prefix: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".to_string(),
            prefix: "docindex".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Bounded parallelism for the three concurrent pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parallelism {
    /// Concurrent document decodes (P1).
    pub decode: usize,
    /// Concurrent change-filter lookups (P2).
    pub filter: usize,
    /// Concurrent bulk writes / deletes (P3).
    pub write: usize,
}

impl Default for Parallelism {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get().min(8))
            .unwrap_or(4);
        Self {
            decode: cpus,
            filter: cpus,
            write: 2,
        }
    }
}

/// Settings for one document kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Root directory scanned for documents.
    pub scan_path: PathBuf,

    /// File extension (without the dot), matched case-insensitively.
    pub file_extension: String,

    /// Paths containing any of these substrings are skipped.
    pub exclude_filter: Vec<String>,

    /// Per-stage parallelism.
    pub parallelism: Parallelism,

    /// Inactive jobs return immediately without touching any state.
    pub active: bool,

    /// Suffix appended to the index prefix to name this kind's index.
    pub index_suffix: String,

    /// Directory holding the comparer snapshot. Defaults to `{data_dir}/comparer`.
    pub comparer_directory: PathBuf,

    /// Directory holding the run statistics. Defaults to `{data_dir}/statistics`.
    pub statistics_directory: PathBuf,

    /// Maximum documents per bulk write.
    pub batch_size: usize,

    /// Maximum seconds a partial batch waits before being written.
    pub batch_window_secs: u64,

    /// Seconds between processing runs.
    pub process_interval_secs: u64,

    /// Seconds between cleanup runs.
    pub cleanup_interval_secs: u64,

    /// Runs still going after this many seconds are cancelled.
    pub run_timeout_secs: Option<u64>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            scan_path: PathBuf::new(),
            file_extension: String::new(),
            exclude_filter: Vec::new(),
            parallelism: Parallelism::default(),
            active: true,
            index_suffix: String::new(),
            comparer_directory: PathBuf::new(),
            statistics_directory: PathBuf::new(),
            batch_size: 50,
            batch_window_secs: 10,
            process_interval_secs: 3600,
            cleanup_interval_secs: 6 * 3600,
            run_timeout_secs: None,
        }
    }
}

impl JobSettings {
    /// Settings for `kind` scanning `scan_path`, with the kind's defaults.
    #[must_use]
    pub fn for_kind(kind: DocumentKind, scan_path: impl Into<PathBuf>) -> Self {
        Self {
            scan_path: scan_path.into(),
            file_extension: kind.default_extension().to_string(),
            index_suffix: kind.as_str().to_string(),
            ..Default::default()
        }
    }

    /// Batching window as a duration.
    #[must_use]
    pub const fn batch_window(&self) -> Duration {
        Duration::from_secs(self.batch_window_secs)
    }

    /// Processing trigger period.
    #[must_use]
    pub const fn process_interval(&self) -> Duration {
        Duration::from_secs(self.process_interval_secs)
    }

    /// Cleanup trigger period.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Per-run timeout, if any.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self, kind: DocumentKind) -> Result<()> {
        let ctx = |msg: &str| Error::config(format!("jobs.{kind}: {msg}"));

        if self.active && self.scan_path.as_os_str().is_empty() {
            return Err(ctx("scan_path cannot be empty for an active job"));
        }
        if self.file_extension.trim_start_matches('.').is_empty() {
            return Err(ctx("file_extension cannot be empty"));
        }
        if self.index_suffix.is_empty() {
            return Err(ctx("index_suffix cannot be empty"));
        }
        for (name, value) in [
            ("decode", self.parallelism.decode),
            ("filter", self.parallelism.filter),
            ("write", self.parallelism.write),
        ] {
            if value == 0 || value > MAX_PARALLELISM {
                return Err(ctx(&format!(
                    "parallelism.{name} must be between 1 and {MAX_PARALLELISM}"
                )));
            }
        }
        if self.batch_size == 0 {
            return Err(ctx("batch_size cannot be 0"));
        }
        if self.batch_window_secs == 0 {
            return Err(ctx("batch_window_secs cannot be 0"));
        }
        if self.process_interval_secs == 0 || self.cleanup_interval_secs == 0 {
            return Err(ctx("trigger intervals cannot be 0"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            index: IndexConfig::default(),
            jobs: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file, fill in derived defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if validation fails.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file without normalizing or validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read '{}': {e}", path.display()))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("failed to parse '{}': {e}", path.display())))
    }

    /// Fill job directories left empty with locations under `data_dir`.
    pub fn normalize(&mut self) {
        let comparer = self.comparer_root();
        let statistics = self.statistics_root();
        for settings in self.jobs.values_mut() {
            if settings.comparer_directory.as_os_str().is_empty() {
                settings.comparer_directory.clone_from(&comparer);
            }
            if settings.statistics_directory.as_os_str().is_empty() {
                settings.statistics_directory.clone_from(&statistics);
            }
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("port cannot be 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.host.is_empty() {
            return Err(Error::config("host cannot be empty"));
        }

        if self.index.url.is_empty() {
            return Err(Error::config("index.url cannot be empty"));
        }

        if self.index.prefix.is_empty() {
            return Err(Error::config("index.prefix cannot be empty"));
        }

        for (kind, settings) in &self.jobs {
            settings.validate(*kind)?;
        }

        Ok(())
    }

    /// Settings for one kind, if configured.
    #[must_use]
    pub fn job(&self, kind: DocumentKind) -> Option<&JobSettings> {
        self.jobs.get(&kind)
    }

    /// Name of the index holding documents of the given settings.
    #[must_use]
    pub fn index_name(&self, settings: &JobSettings) -> String {
        format!("{}-{}", self.index.prefix, settings.index_suffix).to_lowercase()
    }

    /// Default directory for comparer snapshots.
    #[must_use]
    pub fn comparer_root(&self) -> PathBuf {
        self.data_dir.join("comparer")
    }

    /// Default directory for run statistics.
    #[must_use]
    pub fn statistics_root(&self) -> PathBuf {
        self.data_dir.join("statistics")
    }

    /// Get the server address as a string.
    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_with_job(settings: JobSettings) -> Config {
        let mut config = Config::default();
        config.jobs.insert(DocumentKind::Word, settings);
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.jobs.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_port() {
        let config = Config {
            port: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_log_level_case_insensitive() {
        for level in ["TRACE", "Debug", "INFO", "Warn", "ERROR"] {
            let config = Config {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Level '{level}' should be valid (case insensitive)"
            );
        }
    }

    #[test]
    fn test_validate_empty_index_prefix() {
        let mut config = Config::default();
        config.index.prefix = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("index.prefix"));
    }

    #[test]
    fn test_validate_active_job_requires_scan_path() {
        let config = config_with_job(JobSettings::for_kind(DocumentKind::Word, ""));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jobs.word"));
        assert!(err.to_string().contains("scan_path"));
    }

    #[test]
    fn test_inactive_job_may_omit_scan_path() {
        let settings = JobSettings {
            active: false,
            ..JobSettings::for_kind(DocumentKind::Word, "")
        };
        assert!(config_with_job(settings).validate().is_ok());
    }

    #[test]
    fn test_validate_parallelism_bounds() {
        let mut settings = JobSettings::for_kind(DocumentKind::Word, "/srv/docs");
        settings.parallelism.write = 0;
        let err = config_with_job(settings.clone()).validate().unwrap_err();
        assert!(err.to_string().contains("parallelism.write"));

        settings.parallelism.write = MAX_PARALLELISM + 1;
        assert!(config_with_job(settings).validate().is_err());
    }

    #[test]
    fn test_validate_batch_size_zero() {
        let settings = JobSettings {
            batch_size: 0,
            ..JobSettings::for_kind(DocumentKind::Word, "/srv/docs")
        };
        let err = config_with_job(settings).validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_for_kind_defaults() {
        let settings = JobSettings::for_kind(DocumentKind::PowerPoint, "/srv/slides");
        assert_eq!(settings.file_extension, "pptx");
        assert_eq!(settings.index_suffix, "powerpoint");
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.batch_window(), Duration::from_secs(10));
        assert!(settings.run_timeout().is_none());
    }

    #[test]
    fn test_index_name_is_lowercase() {
        let mut config = Config::default();
        config.index.prefix = "Office".to_string();
        let settings = JobSettings {
            index_suffix: "Word".to_string(),
            ..Default::default()
        };
        assert_eq!(config.index_name(&settings), "office-word");
    }

    #[test]
    fn test_normalize_fills_directories() {
        let mut config = config_with_job(JobSettings::for_kind(DocumentKind::Word, "/srv"));
        config.data_dir = PathBuf::from("/var/lib/docindex");
        config.normalize();

        let settings = config.job(DocumentKind::Word).unwrap();
        assert_eq!(
            settings.comparer_directory,
            PathBuf::from("/var/lib/docindex/comparer")
        );
        assert_eq!(
            settings.statistics_directory,
            PathBuf::from("/var/lib/docindex/statistics")
        );
    }

    #[test]
    fn test_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("docindex.json");
        fs::write(
            &path,
            r#"{
                "data_dir": "/var/lib/docindex",
                "index": { "url": "http://search:9200", "prefix": "office" },
                "jobs": {
                    "pdf": {
                        "scan_path": "/mnt/share",
                        "file_extension": "pdf",
                        "index_suffix": "pdf",
                        "exclude_filter": ["~$", "/archive/"],
                        "parallelism": { "decode": 4, "filter": 2, "write": 1 }
                    }
                }
            }"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.index.url, "http://search:9200");
        let pdf = config.job(DocumentKind::Pdf).unwrap();
        assert_eq!(pdf.exclude_filter.len(), 2);
        assert_eq!(pdf.parallelism.decode, 4);
        assert_eq!(pdf.batch_size, 50);
        assert!(pdf.active);
        assert_eq!(
            pdf.comparer_directory,
            PathBuf::from("/var/lib/docindex/comparer")
        );
        assert_eq!(config.index_name(pdf), "office-pdf");
    }

    #[test]
    fn test_from_file_invalid_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_server_addr() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 9090,
            ..Default::default()
        };
        assert_eq!(config.server_addr(), "0.0.0.0:9090");
    }
}
