use chrono::Utc;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::MissedTickBehavior;

use crate::accounting::interval::{IntervalAccumulator, RecordOutcome};
use crate::accounting::protocol;
use crate::accounting::report;
use crate::accounting::rollup::RollupStore;
use crate::models::config::AppConfig;
use crate::models::record::PacketRecord;
use crate::models::stats::Scope;
use crate::sink::PersistenceSink;

/// Intake counters since process start, shared with the status endpoint
#[derive(Debug, Default)]
pub struct IntakeCounters {
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
    pub ignored: AtomicU64,
    pub malformed: AtomicU64,
    pub intervals: AtomicU64,
}

/// The accounting driver: consumes decoded packet records, folds each
/// elapsed interval into the rollup store, and hands snapshots to the
/// persistence sinks.
///
/// The sensor is the sole owner of the interval accumulator, so packet
/// accounting never contends with the reporting API; only the brief
/// per-interval collate takes the rollup write lock.
pub struct SensorLoop {
    accumulator: IntervalAccumulator,
    rollup: Arc<RwLock<RollupStore>>,
    sinks: Vec<Box<dyn PersistenceSink>>,
    counters: Arc<IntakeCounters>,
    interval: Duration,
    skip_intervals: u64,
    cdf_path: Option<PathBuf>,
    intervals_since_report: u64,
    interval_start: chrono::DateTime<Utc>,
}

impl SensorLoop {
    pub fn new(
        config: &AppConfig,
        accumulator: IntervalAccumulator,
        rollup: Arc<RwLock<RollupStore>>,
        sinks: Vec<Box<dyn PersistenceSink>>,
        counters: Arc<IntakeCounters>,
    ) -> Self {
        Self {
            accumulator,
            rollup,
            sinks,
            counters,
            interval: Duration::from_secs(config.interval_secs),
            skip_intervals: config.skip_intervals,
            cdf_path: config.cdf_path.clone(),
            intervals_since_report: 0,
            interval_start: Utc::now(),
        }
    }

    /// Drive accounting until shutdown is signalled or the capture side
    /// closes the record channel. The interval in progress is flushed on
    /// the way out so its counters are not lost.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<PacketRecord>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            "Sensor loop started, interval {}s, {} sink(s)",
            self.interval.as_secs(),
            self.sinks.len()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                maybe_record = rx.recv() => match maybe_record {
                    Some(record) => self.ingest(record),
                    None => {
                        info!("Record channel closed, flushing final interval");
                        self.flush_interval().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush_interval().await;
                }
                _ = shutdown.changed() => {
                    info!("Shutdown signalled, flushing final interval");
                    self.flush_interval().await;
                    break;
                }
            }
        }

        info!("Sensor loop stopped");
    }

    /// Account one decoded record into the current interval
    fn ingest(&mut self, record: PacketRecord) {
        let category = protocol::classify(record.transport, record.src_port, record.dst_port);
        let outcome = self
            .accumulator
            .record(record.length, record.src_addr, record.dst_addr, category);

        self.counters.packets.fetch_add(1, Ordering::Relaxed);
        match outcome {
            RecordOutcome::Recorded => {
                self.counters
                    .bytes
                    .fetch_add(u64::from(record.length), Ordering::Relaxed);
            }
            RecordOutcome::Ignored => {
                self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            }
            RecordOutcome::Malformed => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Close out the current interval: fold it into history and hand it
    /// to every sink. Sink failures are logged and never retried; the
    /// in-memory history is the source of truth for reporting.
    async fn flush_interval(&mut self) {
        let now = Utc::now();
        let start = std::mem::replace(&mut self.interval_start, now);
        let snapshot = self.accumulator.snapshot_and_reset();
        self.counters.intervals.fetch_add(1, Ordering::Relaxed);

        debug!(
            "Interval ended: {} v4 hosts, {} v6 hosts, {} v4 pairs, {} v6 pairs",
            snapshot.hosts_v4.len(),
            snapshot.hosts_v6.len(),
            snapshot.pairs_v4.len(),
            snapshot.pairs_v6.len()
        );

        // Every interval lands in history, idle ones included: a
        // zero-stats point keeps the series gap-free and keeps the
        // distribution's sample set honest about quiet periods.
        self.rollup.write().await.collate(&snapshot, now);

        let interval_secs = self.interval.as_secs();
        for sink in &mut self.sinks {
            if let Err(e) = sink.write(&snapshot, start, interval_secs) {
                error!("{} sink failed to persist interval: {}", sink.name(), e);
            }
        }

        // Report generation is decimated: one report every
        // skip_intervals + 1 interval closes.
        self.intervals_since_report += 1;
        if self.intervals_since_report > self.skip_intervals {
            self.intervals_since_report = 0;
            self.write_cdf_report().await;
        }
    }

    /// Write the plain-text distribution report for every scope, when a
    /// report path is configured
    async fn write_cdf_report(&mut self) {
        let Some(path) = &self.cdf_path else {
            return;
        };

        let rollup = self.rollup.read().await;
        let mut text = String::new();
        for scope in Scope::ALL {
            text.push_str(&report::format_cdf(&rollup.cumulative_distribution(scope)));
            text.push('\n');
        }
        drop(rollup);

        if let Err(e) = std::fs::write(path, text) {
            warn!("Failed to write distribution report to {:?}: {}", path, e);
        } else {
            debug!("Wrote distribution report to {:?}", path);
        }
    }
}
