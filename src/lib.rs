//! Save tables to CSV or XLSX without the usual papercuts: background saves
//! with an awaitable handle, column widths and alignment kept across
//! re-saves, a backup of the file being replaced, and patience when another
//! program has the file open.
//!
//! ```no_run
//! use advance_table::{open_table, save, SaveOptions};
//! use std::path::Path;
//!
//! let table = open_table("input.xlsx", Some(Path::new("output.xlsx")), true)?;
//! let options = SaveOptions::default().preserve_format(true).backup(true);
//! let report = save(&table, None, &options)?.wait()?;
//! println!("wrote {} bytes to {}", report.bytes_written, report.path.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod checksum;
pub mod error;
pub mod formats;
pub mod load;
pub mod logging;
pub mod save;
pub mod table;

use std::path::Path;

pub use checksum::compute_checksum;
pub use error::{BackupError, CodecError, ConfigError, FormatReadError, LoadError, SaveError};
pub use formats::{
    CellAlignment, ColumnFormat, Encoded, FileFormat, FormatProfile, HorizontalAlign, VerticalAlign,
};
pub use load::{load_table, open_table};
pub use save::{
    BackupNaming, BackupStatus, Filesystem, FormatStatus, OsFilesystem, SaveHandle, SaveOptions,
    SaveOutcome, SaveReport, Saver, SaverConfig,
};
pub use table::{CellValue, Table};

/// Save with default [`SaverConfig`] settings.
///
/// Each call uses a fresh [`Saver`], so concurrent calls for the same path
/// are not serialized; share one `Saver` when that matters.
pub fn save(
    table: &Table,
    path: Option<&Path>,
    options: &SaveOptions,
) -> Result<SaveOutcome, SaveError> {
    Saver::default().save(table, path, options)
}
