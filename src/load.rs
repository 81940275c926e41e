use std::path::Path;
use tracing::debug;

use crate::error::LoadError;
use crate::formats::FileFormat;
use crate::table::Table;

/// Read a CSV or XLSX file; the first row names the columns
pub fn load_table(path: impl AsRef<Path>) -> Result<Table, LoadError> {
    load_table_with(path.as_ref(), b',')
}

pub(crate) fn load_table_with(path: &Path, delimiter: u8) -> Result<Table, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }

    let format =
        FileFormat::from_path(path).ok_or_else(|| LoadError::UnsupportedFormat(path.to_path_buf()))?;

    let table = format
        .decode(path, delimiter)
        .map_err(|source| LoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), rows = table.row_count(), cols = table.col_count(), "table loaded");
    Ok(table.with_source_file(path))
}

/// Open a table for editing with a remembered save destination.
///
/// With `continue_from_saved`, an existing `destination` is read instead of
/// `source`, so work resumes from the last save; `source` may then be absent.
/// The returned table remembers both paths so a plain save goes to
/// `destination`.
pub fn open_table(
    source: impl AsRef<Path>,
    destination: Option<&Path>,
    continue_from_saved: bool,
) -> Result<Table, LoadError> {
    let source = source.as_ref();

    if !source.exists() && !continue_from_saved {
        return Err(LoadError::FileNotFound(source.to_path_buf()));
    }

    let read_from = match destination {
        Some(dest) if continue_from_saved && dest.exists() => dest,
        _ => source,
    };

    let mut table = load_table(read_from)?;
    table.set_destination_file(destination.map(Path::to_path_buf));
    Ok(table)
}
