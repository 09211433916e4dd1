pub mod csv_sink;
pub mod sqlite;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;

use crate::models::config::AppConfig;
use crate::models::stats::IntervalSnapshot;

/// A destination for interval snapshots. One `write` per interval per
/// configured sink; sinks are idempotent consumers and the caller never
/// retries on their behalf.
pub trait PersistenceSink: Send {
    fn name(&self) -> &'static str;

    fn write(
        &mut self,
        snapshot: &IntervalSnapshot,
        start: DateTime<Utc>,
        interval_secs: u64,
    ) -> Result<()>;
}

/// Build the list of active sinks from configuration. Backends that are
/// not configured simply do not appear in the list.
pub fn build_sinks(config: &AppConfig) -> Result<Vec<Box<dyn PersistenceSink>>> {
    let mut sinks: Vec<Box<dyn PersistenceSink>> = Vec::new();
    if let Some(path) = &config.sqlite_path {
        info!("Persisting snapshots to SQLite database {:?}", path);
        sinks.push(Box::new(sqlite::SqliteSink::open(path)?));
    }
    if let Some(dir) = &config.csv_dir {
        info!("Persisting snapshots to CSV files under {:?}", dir);
        sinks.push(Box::new(csv_sink::CsvSink::new(dir.clone())?));
    }
    Ok(sinks)
}
