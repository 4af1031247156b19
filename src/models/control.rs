//! ControlRow entity (§3, §4.5): the DB-backed state machine each scraper
//! process obeys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ControlStatus {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControlStatus::Idle => "idle",
            ControlStatus::Starting => "starting",
            ControlStatus::Running => "running",
            ControlStatus::Stopping => "stopping",
            ControlStatus::Stopped => "stopped",
            ControlStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ControlRow {
    pub scraper_name: String,
    pub enabled: bool,
    pub status: ControlStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pid: Option<i32>,
    pub config: serde_json::Value,
    pub updated_by: Option<String>,
}

impl ControlRow {
    pub fn is_stale(&self, heartbeat_interval: std::time::Duration) -> bool {
        match self.last_heartbeat {
            None => true,
            Some(t) => {
                let age = Utc::now().signed_duration_since(t);
                age.num_seconds() as f64 > 3.0 * heartbeat_interval.as_secs_f64()
            }
        }
    }
}
