use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::formats::{FileFormat, FormatProfile};

/// Default time to wait for a locked target before giving up
pub const DEFAULT_RETRY_TIMEOUT_SECS: f64 = 30.0;

/// Per-call options for a save
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Recover column widths/alignment from the file being replaced
    pub preserve_format: bool,
    /// Copy the previous file aside before overwriting it
    pub backup: bool,
    /// Run the save on a background task and return a handle
    #[serde(rename = "async")]
    pub run_async: bool,
    pub retry_timeout_seconds: f64,
    /// Explicit formatting; takes precedence over a recovered profile
    pub format_profile: Option<FormatProfile>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            preserve_format: false,
            backup: false,
            run_async: false,
            retry_timeout_seconds: DEFAULT_RETRY_TIMEOUT_SECS,
            format_profile: None,
        }
    }
}

impl SaveOptions {
    pub fn preserve_format(mut self, on: bool) -> Self {
        self.preserve_format = on;
        self
    }

    pub fn backup(mut self, on: bool) -> Self {
        self.backup = on;
        self
    }

    pub fn run_async(mut self, on: bool) -> Self {
        self.run_async = on;
        self
    }

    pub fn retry_timeout_seconds(mut self, secs: f64) -> Self {
        self.retry_timeout_seconds = secs;
        self
    }

    pub fn format_profile(mut self, profile: FormatProfile) -> Self {
        self.format_profile = Some(profile);
        self
    }

    /// Negative and NaN timeouts mean "try once"; infinite or oversized ones
    /// mean "wait as long as it takes"
    pub fn retry_timeout(&self) -> Duration {
        let secs = self.retry_timeout_seconds;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// How the backup path is derived from the target path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupNaming {
    /// `<file>.bak`, overwritten on every save
    #[default]
    Suffix,
    /// `<file>.<YYYYmmdd_HHMMSS>.bak`, never pruned
    Timestamped,
}

/// Settings shared by every save issued through one `Saver`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaverConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backup_naming: BackupNaming,
    pub csv_delimiter: char,
}

impl Default for SaverConfig {
    fn default() -> Self {
        SaverConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
            backup_naming: BackupNaming::Suffix,
            csv_delimiter: ',',
        }
    }
}

impl SaverConfig {
    /// Load settings from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<SaverConfig, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SaverConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.csv_delimiter.is_ascii() {
            return Err(ConfigError::InvalidDelimiter(self.csv_delimiter));
        }
        if self.initial_backoff_ms == 0 || self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::InvalidBackoff {
                initial_ms: self.initial_backoff_ms,
                max_ms: self.max_backoff_ms,
            });
        }
        Ok(())
    }

    pub(crate) fn delimiter(&self) -> u8 {
        if self.csv_delimiter.is_ascii() {
            self.csv_delimiter as u8
        } else {
            b','
        }
    }
}

/// A resolved save: created per call, discarded after completion
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub path: PathBuf,
    pub format: FileFormat,
    pub run_async: bool,
    pub backup: bool,
    pub preserve_format: bool,
    pub retry_timeout: Duration,
    pub format_profile: Option<FormatProfile>,
    /// Fallback file to recover formatting from when `path` does not exist yet
    pub format_reference: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum BackupStatus {
    Skipped,
    Created(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FormatStatus {
    NotRequested,
    /// The target format has no column formatting (CSV)
    NotApplicable,
    /// Nothing to recover formatting from
    NoReference,
    Applied { columns: usize },
    Unavailable(String),
}

/// What a completed save did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveReport {
    pub path: PathBuf,
    pub format: FileFormat,
    pub bytes_written: u64,
    pub checksum: String,
    pub backup: BackupStatus,
    pub formatting: FormatStatus,
    /// Attempts that found the target in use before the write went through
    pub retries: u32,
}
