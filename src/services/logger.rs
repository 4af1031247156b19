//! Structured Logger (C4, §4.4): console sink plus a batched Postgres sink.
//! DB sink batch size defaults to 1 (write-through) so a crash never loses an
//! entry; a timer additionally flushes every 5 s in case callers raise the
//! batch size. DB failures never propagate — they're swallowed after a single
//! warning, mirroring the dual-sink pattern this codebase already uses for
//! security events.

use std::sync::Arc;
use std::time::Duration;

use sqlx::{PgPool, QueryBuilder};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::log_entry::{LogEntry, LogLevel};

const DEFAULT_BATCH_SIZE: usize = 1;
const TIMER_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

pub struct StructuredLogger {
    pool: PgPool,
    source: String,
    script_name: String,
    batch_size: usize,
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl StructuredLogger {
    pub fn new(pool: PgPool, source: impl Into<String>, script_name: impl Into<String>) -> Self {
        Self {
            pool,
            source: source.into(),
            script_name: script_name.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_entry(LogEntry::new(self.source.clone(), self.script_name.clone(), level, message)).await;
    }

    pub async fn log_entry(&self, entry: LogEntry) {
        emit_to_console(&entry);

        let mut buffer = self.buffer.lock().await;
        buffer.push(entry);
        if buffer.len() >= self.batch_size {
            let batch = std::mem::take(&mut *buffer);
            drop(buffer);
            self.flush_batch(batch).await;
        }
    }

    /// Timer-driven flush (§4.4: "flushed on every emission or timer (5s)").
    /// Drains whatever has accumulated even if below `batch_size`.
    pub async fn flush(&self) {
        let mut buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut *buffer);
        drop(buffer);
        self.flush_batch(batch).await;
    }

    pub fn spawn_timer_flush(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TIMER_FLUSH_INTERVAL);
            loop {
                ticker.tick().await;
                self.flush().await;
            }
        })
    }

    async fn flush_batch(&self, batch: Vec<LogEntry>) {
        if batch.is_empty() {
            return;
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO system_logs (timestamp, source, script_name, level, message, context, action, duration_ms) ",
        );
        builder.push_values(&batch, |mut row, entry| {
            row.push_bind(entry.timestamp)
                .push_bind(&entry.source)
                .push_bind(&entry.script_name)
                .push_bind(entry.level)
                .push_bind(&entry.message)
                .push_bind(&entry.context)
                .push_bind(&entry.action)
                .push_bind(entry.duration_ms);
        });

        if let Err(e) = builder.build().execute(&self.pool).await {
            warn!(error = %e, dropped = batch.len(), "structured logger: DB sink write failed, entries dropped");
        }
    }
}

fn emit_to_console(entry: &LogEntry) {
    match entry.level {
        LogLevel::Debug => debug!(source = %entry.source, script = %entry.script_name, "{}", entry.message),
        LogLevel::Info | LogLevel::Success => {
            info!(source = %entry.source, script = %entry.script_name, "{}", entry.message)
        }
        LogLevel::Warning => warn!(source = %entry.source, script = %entry.script_name, "{}", entry.message),
        LogLevel::Error => error!(source = %entry.source, script = %entry.script_name, "{}", entry.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_batch_size_rejects_zero() {
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/test").unwrap();
        let logger = StructuredLogger::new(pool, "reddit_scraper", "main").with_batch_size(0);
        assert_eq!(logger.batch_size, 1);
    }
}
