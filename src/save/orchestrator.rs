use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::availability::{open_with_retry, Filesystem, OsFilesystem, RetryPolicy};
use super::backup::create_backup;
use super::handle::SaveHandle;
use super::types::{
    BackupStatus, FormatStatus, SaveOptions, SaveReport, SaveRequest, SaverConfig,
};
use crate::checksum::checksum_bytes;
use crate::error::{FormatReadError, LoadError, SaveError};
use crate::formats::{FileFormat, FormatProfile};
use crate::load;
use crate::table::Table;

/// Result of [`Saver::save`]: finished in the foreground, or running in the background
#[derive(Debug)]
pub enum SaveOutcome {
    Completed(SaveReport),
    Pending(SaveHandle),
}

impl SaveOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, SaveOutcome::Pending(_))
    }

    /// Resolve to the final report, awaiting the background task if there is one
    pub async fn finish(self) -> Result<SaveReport, SaveError> {
        match self {
            SaveOutcome::Completed(report) => Ok(report),
            SaveOutcome::Pending(handle) => handle.await,
        }
    }

    /// Blocking variant of [`SaveOutcome::finish`] for use outside a runtime
    pub fn wait(self) -> Result<SaveReport, SaveError> {
        match self {
            SaveOutcome::Completed(report) => Ok(report),
            SaveOutcome::Pending(handle) => handle.wait(),
        }
    }
}

type PathLocks = Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>;

struct SaverInner {
    config: SaverConfig,
    fs: Arc<dyn Filesystem>,
    path_locks: PathLocks,
}

/// The save orchestrator.
///
/// Saves issued through the same `Saver` (or its clones) to the same path run
/// one at a time; separate `Saver` values do not coordinate with each other.
#[derive(Clone)]
pub struct Saver {
    inner: Arc<SaverInner>,
}

impl Default for Saver {
    fn default() -> Self {
        Saver::new(SaverConfig::default())
    }
}

impl std::fmt::Debug for Saver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saver")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Saver {
    pub fn new(config: SaverConfig) -> Self {
        Saver::with_filesystem(config, Arc::new(OsFilesystem))
    }

    /// Out-of-range backoff settings are clamped by the retry policy
    pub fn with_filesystem(config: SaverConfig, fs: Arc<dyn Filesystem>) -> Self {
        if let Err(err) = config.validate() {
            warn!(error = %err, "saver config out of range, clamping");
        }

        Saver {
            inner: Arc::new(SaverInner {
                config,
                fs,
                path_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SaverConfig {
        &self.inner.config
    }

    /// Save `table` to `path`, or to the table's destination/source file when
    /// `path` is `None`.
    ///
    /// Format and target errors are returned immediately even for background
    /// saves; everything after that runs on the background task when
    /// `options.run_async` is set.
    pub fn save(
        &self,
        table: &Table,
        path: Option<&Path>,
        options: &SaveOptions,
    ) -> Result<SaveOutcome, SaveError> {
        let request = self.resolve(table, path, options)?;

        if request.run_async {
            self.spawn(table.clone(), request).map(SaveOutcome::Pending)
        } else {
            self.execute(table, &request).map(SaveOutcome::Completed)
        }
    }

    /// Read a table back using this saver's CSV settings
    pub fn load(&self, path: &Path) -> Result<Table, LoadError> {
        load::load_table_with(path, self.inner.config.delimiter())
    }

    fn resolve(
        &self,
        table: &Table,
        path: Option<&Path>,
        options: &SaveOptions,
    ) -> Result<SaveRequest, SaveError> {
        let path = path
            .or_else(|| table.destination_file())
            .or_else(|| table.source_file())
            .ok_or(SaveError::NoTargetPath)?
            .to_path_buf();

        let format = FileFormat::from_path(&path)
            .ok_or_else(|| SaveError::UnsupportedFormat { path: path.clone() })?;

        // A table loaded from a workbook can lend its formatting to a new target
        let format_reference = table
            .source_file()
            .filter(|source| FileFormat::from_path(source) == Some(FileFormat::Xlsx))
            .map(Path::to_path_buf);

        Ok(SaveRequest {
            path,
            format,
            run_async: options.run_async,
            backup: options.backup,
            preserve_format: options.preserve_format,
            retry_timeout: options.retry_timeout(),
            format_profile: options.format_profile.clone(),
            format_reference,
        })
    }

    fn spawn(&self, table: Table, request: SaveRequest) -> Result<SaveHandle, SaveError> {
        let (tx, rx) = oneshot::channel();
        let path = request.path.clone();
        let saver = self.clone();

        // Background saves log to the subscriber that was current at dispatch
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());

        let job = move || {
            tracing::dispatcher::with_default(&dispatch, || {
                let result = saver.execute(&table, &request);
                if let Err(Err(err)) = tx.send(result) {
                    warn!(path = %request.path.display(), error = %err, "background save failed; its handle was dropped");
                }
            })
        };

        debug!(path = %path.display(), "dispatching background save");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(job);
            }
            Err(_) => {
                thread::Builder::new()
                    .name("advance-table-save".to_string())
                    .spawn(job)
                    .map_err(|source| SaveError::Io {
                        path: path.clone(),
                        source,
                    })?;
            }
        }

        Ok(SaveHandle::new(path, rx))
    }

    fn execute(&self, table: &Table, request: &SaveRequest) -> Result<SaveReport, SaveError> {
        let path_lock = self.path_lock(&request.path);
        let guard = path_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let result = self.run_pipeline(table, request);

        drop(guard);
        self.release_path_lock(&request.path, path_lock);
        result
    }

    fn run_pipeline(&self, table: &Table, request: &SaveRequest) -> Result<SaveReport, SaveError> {
        let fs = self.inner.fs.as_ref();
        let config = &self.inner.config;
        let path = request.path.as_path();
        let target_exists = fs.exists(path);

        let profile = self.resolve_profile(request, target_exists);

        let encoded = request
            .format
            .encode(table, profile.as_ref().ok(), config.delimiter())
            .map_err(|source| SaveError::Encode {
                path: path.to_path_buf(),
                source,
            })?;
        let bytes = encoded.bytes;
        let formatting = match profile {
            Ok(_) => FormatStatus::Applied {
                columns: encoded.formatted_columns,
            },
            Err(status) => status,
        };

        let backup = if request.backup && target_exists {
            match create_backup(fs, path, config.backup_naming) {
                Ok(backup_path) => {
                    debug!(path = %path.display(), backup = %backup_path.display(), "backup created");
                    BackupStatus::Created(backup_path)
                }
                Err(err) => {
                    warn!(error = %err, "backup failed, continuing with save");
                    BackupStatus::Failed(err.to_string())
                }
            }
        } else {
            BackupStatus::Skipped
        };

        let policy = RetryPolicy::new(
            request.retry_timeout,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        );
        let (mut file, retries) = open_with_retry(fs, path, &policy)?;

        let io_err = |source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        };
        file.write_all(&bytes).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        let report = SaveReport {
            path: path.to_path_buf(),
            format: request.format,
            bytes_written: bytes.len() as u64,
            checksum: checksum_bytes(&bytes),
            backup,
            formatting,
            retries,
        };

        info!(
            path = %path.display(),
            format = %report.format,
            bytes = report.bytes_written,
            retries,
            "table saved"
        );

        Ok(report)
    }

    /// Pick the formatting for this save: caller-supplied first, then the file
    /// being replaced, then the workbook the table was loaded from. `Err`
    /// carries the reason no formatting applies.
    fn resolve_profile(
        &self,
        request: &SaveRequest,
        target_exists: bool,
    ) -> Result<FormatProfile, FormatStatus> {
        if request.format_profile.is_none() && !request.preserve_format {
            return Err(FormatStatus::NotRequested);
        }
        if !request.format.supports_formatting() {
            return Err(FormatStatus::NotApplicable);
        }
        if let Some(profile) = &request.format_profile {
            return Ok(profile.clone());
        }

        let reference = if target_exists {
            Some(request.path.as_path())
        } else {
            request
                .format_reference
                .as_deref()
                .filter(|source| self.inner.fs.exists(source))
        };

        let Some(reference) = reference else {
            return Err(FormatStatus::NoReference);
        };

        let profile = self
            .inner
            .fs
            .read(reference)
            .map_err(|e| FormatReadError {
                path: reference.to_path_buf(),
                reason: e.to_string(),
            })
            .and_then(|bytes| {
                FormatProfile::from_xlsx_bytes(&bytes).map_err(|e| FormatReadError {
                    path: reference.to_path_buf(),
                    reason: e.to_string(),
                })
            });

        match profile {
            Ok(profile) => {
                debug!(reference = %reference.display(), columns = profile.columns.len(), "recovered column formatting");
                Ok(profile)
            }
            Err(err) => {
                warn!(error = %err, "saving without preserved formatting");
                Err(FormatStatus::Unavailable(err.to_string()))
            }
        }
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .inner
            .path_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        locks.entry(lock_key(path)).or_default().clone()
    }

    fn release_path_lock(&self, path: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self
            .inner
            .path_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Only the map and this caller hold it: nobody else is queued
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&lock_key(path));
        }
    }
}

fn lock_key(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
