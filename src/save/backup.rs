use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use super::availability::Filesystem;
use super::types::BackupNaming;
use crate::error::BackupError;

/// Sibling path the previous contents of `path` are copied to
pub fn backup_path(path: &Path, naming: BackupNaming, now: DateTime<Local>) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let backup_name = match naming {
        BackupNaming::Suffix => format!("{}.bak", file_name),
        BackupNaming::Timestamped => {
            format!("{}.{}.bak", file_name, now.format("%Y%m%d_%H%M%S"))
        }
    };

    path.with_file_name(backup_name)
}

/// Copy the current contents of `path` aside before it is overwritten
pub fn create_backup(
    fs: &dyn Filesystem,
    path: &Path,
    naming: BackupNaming,
) -> Result<PathBuf, BackupError> {
    let backup = backup_path(path, naming, Local::now());

    fs.copy(path, &backup).map_err(|source| BackupError {
        path: path.to_path_buf(),
        backup_path: backup.clone(),
        source,
    })?;

    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::availability::OsFilesystem;
    use chrono::TimeZone;

    #[test]
    fn test_backup_path_naming() {
        let now = Local.with_ymd_and_hms(2024, 5, 17, 9, 30, 5).unwrap();
        let target = Path::new("/data/report.xlsx");

        assert_eq!(
            backup_path(target, BackupNaming::Suffix, now),
            PathBuf::from("/data/report.xlsx.bak")
        );
        assert_eq!(
            backup_path(target, BackupNaming::Timestamped, now),
            PathBuf::from("/data/report.xlsx.20240517_093005.bak")
        );
    }

    #[test]
    fn test_suffix_backup_replaces_previous_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.csv");

        std::fs::write(&target, "v1").unwrap();
        let first = create_backup(&OsFilesystem, &target, BackupNaming::Suffix).unwrap();
        std::fs::write(&target, "v2").unwrap();
        let second = create_backup(&OsFilesystem, &target, BackupNaming::Suffix).unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "v2");
    }

    #[test]
    fn test_missing_source_is_a_backup_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never-written.csv");

        let err = create_backup(&OsFilesystem, &target, BackupNaming::Suffix).unwrap_err();
        assert_eq!(err.backup_path, dir.path().join("never-written.csv.bak"));
    }
}
