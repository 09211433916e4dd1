use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::models::stats::IntervalSnapshot;
use crate::sink::PersistenceSink;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS host_traffic (
    timestamp       INTEGER NOT NULL,
    duration        INTEGER NOT NULL,
    family          TEXT    NOT NULL,
    host            TEXT    NOT NULL,
    packet_count    INTEGER NOT NULL,
    total_bytes     INTEGER NOT NULL,
    sent_bytes      INTEGER NOT NULL,
    received_bytes  INTEGER NOT NULL,
    icmp_bytes      INTEGER NOT NULL,
    udp_bytes       INTEGER NOT NULL,
    tcp_bytes       INTEGER NOT NULL,
    ftp_bytes       INTEGER NOT NULL,
    http_bytes      INTEGER NOT NULL,
    mail_bytes      INTEGER NOT NULL,
    p2p_bytes       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_host_traffic_ts ON host_traffic (timestamp);
CREATE TABLE IF NOT EXISTS pair_traffic (
    timestamp       INTEGER NOT NULL,
    duration        INTEGER NOT NULL,
    family          TEXT    NOT NULL,
    src             TEXT    NOT NULL,
    dst             TEXT    NOT NULL,
    packet_count    INTEGER NOT NULL,
    total_bytes     INTEGER NOT NULL,
    sent_bytes      INTEGER NOT NULL,
    received_bytes  INTEGER NOT NULL,
    icmp_bytes      INTEGER NOT NULL,
    udp_bytes       INTEGER NOT NULL,
    tcp_bytes       INTEGER NOT NULL,
    ftp_bytes       INTEGER NOT NULL,
    http_bytes      INTEGER NOT NULL,
    mail_bytes      INTEGER NOT NULL,
    p2p_bytes       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pair_traffic_ts ON pair_traffic (timestamp);
";

/// SQLite persistence backend. One host_traffic row per host per
/// interval and one pair_traffic row per tracked pair per interval.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl PersistenceSink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write(
        &mut self,
        snapshot: &IntervalSnapshot,
        start: DateTime<Utc>,
        interval_secs: u64,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let ts = start.timestamp();
        {
            let mut host_stmt = tx.prepare_cached(
                "INSERT INTO host_traffic VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            )?;
            for (family, hosts) in [("v4", &snapshot.hosts_v4), ("v6", &snapshot.hosts_v6)] {
                for (host, stats) in hosts {
                    host_stmt.execute(params![
                        ts,
                        interval_secs,
                        family,
                        host.to_string(),
                        stats.packet_count,
                        stats.total_bytes,
                        stats.sent_bytes,
                        stats.received_bytes,
                        stats.icmp_bytes,
                        stats.udp_bytes,
                        stats.tcp_bytes,
                        stats.ftp_bytes,
                        stats.http_bytes,
                        stats.mail_bytes,
                        stats.p2p_bytes,
                    ])?;
                }
            }

            let mut pair_stmt = tx.prepare_cached(
                "INSERT INTO pair_traffic VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            )?;
            for (family, pairs) in [("v4", &snapshot.pairs_v4), ("v6", &snapshot.pairs_v6)] {
                for ((src, dst), stats) in pairs {
                    pair_stmt.execute(params![
                        ts,
                        interval_secs,
                        family,
                        src.to_string(),
                        dst.to_string(),
                        stats.packet_count,
                        stats.total_bytes,
                        stats.sent_bytes,
                        stats.received_bytes,
                        stats.icmp_bytes,
                        stats.udp_bytes,
                        stats.tcp_bytes,
                        stats.ftp_bytes,
                        stats.http_bytes,
                        stats.mail_bytes,
                        stats.p2p_bytes,
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}
