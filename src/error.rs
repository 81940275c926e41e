use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of a format's encode/decode strategy
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write workbook: {0}")]
    XlsxWrite(String),

    #[error("failed to read workbook: {0}")]
    XlsxRead(String),

    #[error("workbook has no sheets")]
    EmptyWorkbook,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by a save, directly or through a background handle
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("unsupported file extension for {path}: expected one of .csv, .xlsx")]
    UnsupportedFormat { path: PathBuf },

    #[error("no save path provided and the table has no destination or source file")]
    NoTargetPath,

    #[error("{path} is still in use after waiting {waited:?}")]
    FileUnavailable { path: PathBuf, waited: Duration },

    #[error("failed to encode table for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("background save task ended without a result: {0}")]
    TaskAborted(String),
}

/// Non-fatal: the previous file could not be copied aside
#[derive(Debug, Error)]
#[error("failed to back up {path} to {backup_path}: {source}")]
pub struct BackupError {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Non-fatal: column formatting could not be recovered from the reference file
#[derive(Debug, Error)]
#[error("failed to read formatting from {path}: {reason}")]
pub struct FormatReadError {
    pub path: PathBuf,
    pub reason: String,
}

/// Errors returned by the loader
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("unsupported file extension for {0}: expected one of .csv, .xlsx")]
    UnsupportedFormat(PathBuf),

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
}

/// Errors loading a `SaverConfig`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("csv delimiter must be a single ASCII character, got {0:?}")]
    InvalidDelimiter(char),

    #[error("backoff must be positive and not exceed the maximum (initial {initial_ms} ms, max {max_ms} ms)")]
    InvalidBackoff { initial_ms: u64, max_ms: u64 },
}
