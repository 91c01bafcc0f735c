//! Daily backup directory layout.
//!
//! One backup per calendar day: `<dir>/records_backup_<YYYY-MM-DD>/`, holding
//! the same files as [`Vault::snapshot`](crate::vault::Vault::snapshot). A
//! backup is built under a `.partial` name and renamed into place, so a
//! directory with the final name is always complete. Old backups are kept.

use std::{
    io,
    path::{Path, PathBuf},
};

use {chrono::NaiveDate, tokio::fs};

const PREFIX: &str = "records_backup_";
const PARTIAL_SUFFIX: &str = ".partial";

/// Result of a daily backup attempt made by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    Written(PathBuf),
    /// The backup failed. The commit itself still succeeded.
    Failed(String),
}

/// Where daily backups go.
#[derive(Debug, Clone)]
pub struct DailyBackup {
    dir: PathBuf,
}

impl DailyBackup {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final directory for the backup of `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{PREFIX}{}", date.format("%Y-%m-%d")))
    }

    pub(crate) fn partial_path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{PREFIX}{}{PARTIAL_SUFFIX}", date.format("%Y-%m-%d")))
    }

    /// Whether no backup exists yet for `date`.
    pub async fn is_due(&self, date: NaiveDate) -> io::Result<bool> {
        Ok(!fs::try_exists(self.path_for(date)).await?)
    }

    /// Dates of the complete backups present, oldest first.
    pub async fn existing(&self) -> io::Result<Vec<NaiveDate>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut dates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(date) = name
                .to_str()
                .and_then(|n| n.strip_prefix(PREFIX))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            dates.push(date);
        }
        dates.sort();
        Ok(dates)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn paths_follow_date() {
        let backup = DailyBackup::new("/var/backups");
        assert_eq!(
            backup.path_for(day(7)),
            PathBuf::from("/var/backups/records_backup_2025-03-07")
        );
        assert_eq!(
            backup.partial_path_for(day(7)),
            PathBuf::from("/var/backups/records_backup_2025-03-07.partial")
        );
    }

    #[tokio::test]
    async fn due_until_written() {
        let tmp = tempfile::tempdir().unwrap();
        let backup = DailyBackup::new(tmp.path());
        assert!(backup.is_due(day(1)).await.unwrap());
        assert!(backup.existing().await.unwrap().is_empty());

        std::fs::create_dir(backup.path_for(day(2))).unwrap();
        std::fs::create_dir(backup.path_for(day(1))).unwrap();
        std::fs::create_dir(backup.partial_path_for(day(3))).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        assert!(!backup.is_due(day(1)).await.unwrap());
        assert!(backup.is_due(day(3)).await.unwrap());
        assert_eq!(backup.existing().await.unwrap(), vec![day(1), day(2)]);
    }

    #[tokio::test]
    async fn missing_dir_has_no_backups() {
        let tmp = tempfile::tempdir().unwrap();
        let backup = DailyBackup::new(tmp.path().join("absent"));
        assert!(backup.is_due(day(1)).await.unwrap());
        assert!(backup.existing().await.unwrap().is_empty());
    }
}
