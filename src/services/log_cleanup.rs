//! Log Cleanup Job (C10, §4.10): batched deletion of old log rows plus
//! on-disk log files past retention.

use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::{CoreError, Result};

const DELETE_BATCH_SIZE: i64 = 1000;
const MIN_RETENTION_DAYS: i64 = 1;
const MAX_RETENTION_DAYS: i64 = 365;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CleanupSummary {
    pub deleted_rows: u64,
    pub deleted_files: u64,
    pub deleted_bytes: u64,
}

pub struct LogCleanupJob {
    pool: PgPool,
    log_dir: Option<String>,
}

impl LogCleanupJob {
    pub fn new(pool: PgPool, log_dir: Option<String>) -> Self {
        Self { pool, log_dir }
    }

    pub async fn run(&self, retention_days: i64) -> Result<CleanupSummary> {
        let retention_days = retention_days.clamp(MIN_RETENTION_DAYS, MAX_RETENTION_DAYS);
        let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days);

        let deleted_rows = self.delete_rows_in_batches(cutoff).await?;
        let (deleted_files, deleted_bytes) = self.delete_files_older_than(cutoff);

        let summary = CleanupSummary {
            deleted_rows,
            deleted_files,
            deleted_bytes,
        };
        info!(retention_days, ?summary, "log cleanup: completed");
        Ok(summary)
    }

    async fn delete_rows_in_batches(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        let mut total: u64 = 0;
        loop {
            let result = sqlx::query(
                "DELETE FROM system_logs WHERE ctid IN (SELECT ctid FROM system_logs WHERE timestamp < $1 LIMIT $2)",
            )
            .bind(cutoff)
            .bind(DELETE_BATCH_SIZE)
            .execute(&self.pool)
            .await
            .map_err(CoreError::from)?;

            let affected = result.rows_affected();
            total += affected;
            if affected < DELETE_BATCH_SIZE as u64 {
                break;
            }
        }
        Ok(total)
    }

    fn delete_files_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> (u64, u64) {
        let Some(dir) = &self.log_dir else {
            return (0, 0);
        };
        let path = Path::new(dir);
        if !path.is_dir() {
            return (0, 0);
        }

        let mut deleted_files = 0u64;
        let mut deleted_bytes = 0u64;
        let entries = match std::fs::read_dir(path) {
            Ok(e) => e,
            Err(e) => {
                warn!(dir, error = %e, "log cleanup: could not read log directory");
                return (0, 0);
            }
        };

        for entry in entries.flatten() {
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }
            let modified: chrono::DateTime<chrono::Utc> = match metadata.modified() {
                Ok(t) => t.into(),
                Err(_) => continue,
            };
            if modified >= cutoff {
                continue;
            }
            let size = metadata.len();
            if std::fs::remove_file(entry.path()).is_ok() {
                deleted_files += 1;
                deleted_bytes += size;
            }
        }

        (deleted_files, deleted_bytes)
    }
}

/// §4.10: the HTTP trigger requires a bearer token equal to a server secret.
pub fn verify_cron_secret(provided: Option<&str>, expected: &str) -> bool {
    match provided {
        Some(token) => constant_time_eq(token.as_bytes(), expected.as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_days_clamped_to_valid_range() {
        assert_eq!(0i64.clamp(MIN_RETENTION_DAYS, MAX_RETENTION_DAYS), 1);
        assert_eq!(9999i64.clamp(MIN_RETENTION_DAYS, MAX_RETENTION_DAYS), 365);
        assert_eq!(30i64.clamp(MIN_RETENTION_DAYS, MAX_RETENTION_DAYS), 30);
    }

    #[test]
    fn cron_secret_rejects_missing_or_wrong_token() {
        assert!(!verify_cron_secret(None, "secret"));
        assert!(!verify_cron_secret(Some("wrong"), "secret"));
        assert!(verify_cron_secret(Some("secret"), "secret"));
    }

    #[test]
    fn deletes_only_files_older_than_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = dir.path().join("old.log");
        let new_path = dir.path().join("new.log");
        std::fs::write(&old_path, b"stale log line\n").unwrap();
        std::fs::write(&new_path, b"fresh log line\n").unwrap();

        let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(60 * 60 * 24 * 40);
        filetime_set(&old_path, old_time);

        let job = LogCleanupJob::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap(),
            Some(dir.path().to_string_lossy().to_string()),
        );

        let cutoff = chrono::Utc::now() - chrono::Duration::days(30);
        let (deleted_files, deleted_bytes) = job.delete_files_older_than(cutoff);

        assert_eq!(deleted_files, 1);
        assert_eq!(deleted_bytes, "stale log line\n".len() as u64);
        assert!(!old_path.exists());
        assert!(new_path.exists());
    }

    /// Backdates a file's mtime without pulling in a whole crate for one syscall.
    fn filetime_set(path: &std::path::Path, time: std::time::SystemTime) {
        let file = std::fs::File::open(path).unwrap();
        file.set_modified(time).unwrap();
    }
}
