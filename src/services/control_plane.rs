//! Control Plane (C5, §4.5): DB-backed run/stop flag, heartbeat, and the
//! cooperative-cancellation flag each worker polls between items (the
//! resolved Open Question on Instagram's `should_continue`, §9).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::control::{ControlRow, ControlStatus};

pub struct ControlPlane {
    pool: PgPool,
    scraper_name: String,
    heartbeat_interval: Duration,
    running: Arc<AtomicBool>,
}

impl ControlPlane {
    pub fn new(pool: PgPool, scraper_name: impl Into<String>, heartbeat_interval: Duration) -> Self {
        Self {
            pool,
            scraper_name: scraper_name.into(),
            heartbeat_interval,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Cooperative-cancellation handle: a worker checks this between items
    /// (§5, §9). Cloning the handle lets a SIGTERM/Ctrl-C handler flip it
    /// from outside the supervisor loop.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn should_continue(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn read_row(&self) -> Result<ControlRow> {
        let row: ControlRow = sqlx::query_as("SELECT * FROM system_control WHERE scraper_name = $1")
            .bind(&self.scraper_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn write_status(&self, status: ControlStatus, last_error: Option<&str>, pid: Option<i32>) -> Result<()> {
        sqlx::query(
            "UPDATE system_control SET status = $2, last_error = $3, pid = $4, last_heartbeat = now() WHERE scraper_name = $1",
        )
        .bind(&self.scraper_name)
        .bind(status)
        .bind(last_error)
        .bind(pid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// starting: resolve config, load proxies, probe; on failure the caller
    /// is expected to call `fail_startup` instead of `mark_running` (§4.5).
    pub async fn mark_starting(&self) -> Result<()> {
        info!(scraper = %self.scraper_name, "control plane: starting");
        self.write_status(ControlStatus::Starting, None, Some(std::process::id() as i32)).await
    }

    pub async fn fail_startup(&self, reason: &str) -> Result<()> {
        error!(scraper = %self.scraper_name, reason, "control plane: startup failed");
        self.write_status(ControlStatus::Error, Some(reason), None).await
    }

    pub async fn mark_running(&self) -> Result<()> {
        info!(scraper = %self.scraper_name, "control plane: running");
        self.running.store(true, Ordering::SeqCst);
        self.write_status(ControlStatus::Running, None, Some(std::process::id() as i32)).await
    }

    /// Heartbeat tick (§4.5): re-reads `enabled`; returns `false` once the
    /// control row asks the process to stop.
    pub async fn heartbeat(&self) -> Result<bool> {
        let row = self.read_row().await?;
        self.write_status(ControlStatus::Running, None, Some(std::process::id() as i32)).await?;
        if !row.enabled {
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(row.enabled)
    }

    pub async fn mark_stopping(&self) -> Result<()> {
        info!(scraper = %self.scraper_name, "control plane: stopping");
        self.running.store(false, Ordering::SeqCst);
        self.write_status(ControlStatus::Stopping, None, Some(std::process::id() as i32)).await
    }

    pub async fn mark_stopped(&self) -> Result<()> {
        info!(scraper = %self.scraper_name, "control plane: stopped");
        self.write_status(ControlStatus::Stopped, None, None).await
    }

    pub async fn record_error(&self, reason: &str) -> Result<()> {
        warn!(scraper = %self.scraper_name, reason, "control plane: recording error");
        self.write_status(ControlStatus::Error, Some(reason), Some(std::process::id() as i32)).await
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// External supervisors may declare a scraper dead past 3x the interval
    /// (§4.5). Exposed so `/health` can report it.
    pub fn is_stale(&self, row: &ControlRow) -> bool {
        row.is_stale(self.heartbeat_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row_with_heartbeat(age_secs: i64, enabled: bool) -> ControlRow {
        ControlRow {
            scraper_name: "reddit_scraper".to_string(),
            enabled,
            status: ControlStatus::Running,
            last_heartbeat: Some(Utc::now() - chrono::Duration::seconds(age_secs)),
            last_error: None,
            pid: Some(123),
            config: serde_json::json!({}),
            updated_by: None,
        }
    }

    #[test]
    fn is_stale_past_three_intervals() {
        let plane = ControlPlane::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap(),
            "reddit_scraper",
            Duration::from_secs(30),
        );
        assert!(!plane.is_stale(&row_with_heartbeat(60, true)));
        assert!(plane.is_stale(&row_with_heartbeat(91, true)));
    }

    #[test]
    fn should_continue_defaults_true_until_stop_requested() {
        let plane = ControlPlane::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap(),
            "reddit_scraper",
            Duration::from_secs(30),
        );
        assert!(plane.should_continue());
        plane.request_stop();
        assert!(!plane.should_continue());
    }
}
