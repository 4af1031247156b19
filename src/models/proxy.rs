//! Proxy entity (§3) backing the Proxy Pool (C2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Proxy {
    pub id: String,
    /// host:port with embedded auth, e.g. `user:pass@1.2.3.4:8080`.
    pub endpoint: String,
    pub display_name: Option<String>,
    pub enabled: bool,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_ok_at: Option<DateTime<Utc>>,
}

impl Proxy {
    pub fn reqwest_proxy_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}
