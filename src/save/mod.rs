//! The save orchestrator.
//!
//! This module provides:
//! - Foreground and background saves with an explicit result handle
//! - Column format retention across re-saves of a workbook
//! - Backups of the file being replaced
//! - Waiting out another process's hold on the target file

pub mod availability;
pub mod backup;
pub mod handle;
pub mod orchestrator;
pub mod types;

pub use availability::{is_in_use, Filesystem, OsFilesystem, RetryPolicy};
pub use backup::backup_path;
pub use handle::SaveHandle;
pub use orchestrator::{SaveOutcome, Saver};
pub use types::*;
