use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::PathBuf;

use crate::models::stats::{IntervalSnapshot, Statistics};
use crate::sink::PersistenceSink;

/// CSV persistence backend: one `hosts-YYYY-MM-DD.csv` and one
/// `pairs-YYYY-MM-DD.csv` per day, appended to every interval.
pub struct CsvSink {
    dir: PathBuf,
}

// The csv crate cannot serialize nested structs, so the counter fields
// are spelled out per row.
#[derive(Serialize)]
struct HostRow<'a> {
    timestamp: i64,
    duration: u64,
    family: &'a str,
    host: String,
    packet_count: u64,
    total_bytes: u64,
    sent_bytes: u64,
    received_bytes: u64,
    icmp_bytes: u64,
    udp_bytes: u64,
    tcp_bytes: u64,
    ftp_bytes: u64,
    http_bytes: u64,
    mail_bytes: u64,
    p2p_bytes: u64,
}

#[derive(Serialize)]
struct PairRow<'a> {
    timestamp: i64,
    duration: u64,
    family: &'a str,
    src: String,
    dst: String,
    packet_count: u64,
    total_bytes: u64,
    sent_bytes: u64,
    received_bytes: u64,
    icmp_bytes: u64,
    udp_bytes: u64,
    tcp_bytes: u64,
    ftp_bytes: u64,
    http_bytes: u64,
    mail_bytes: u64,
    p2p_bytes: u64,
}

impl CsvSink {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn writer(&self, prefix: &str, day: &str) -> Result<csv::Writer<std::fs::File>> {
        let path = self.dir.join(format!("{}-{}.csv", prefix, day));
        let new_file = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(csv::WriterBuilder::new()
            // Header only once per file
            .has_headers(new_file)
            .from_writer(file))
    }
}

impl PersistenceSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn write(
        &mut self,
        snapshot: &IntervalSnapshot,
        start: DateTime<Utc>,
        interval_secs: u64,
    ) -> Result<()> {
        let day = start.format("%Y-%m-%d").to_string();
        let ts = start.timestamp();

        if !snapshot.hosts_v4.is_empty() || !snapshot.hosts_v6.is_empty() {
            let mut w = self.writer("hosts", &day)?;
            for (family, hosts) in [("v4", &snapshot.hosts_v4), ("v6", &snapshot.hosts_v6)] {
                for (host, stats) in hosts {
                    w.serialize(HostRow {
                        timestamp: ts,
                        duration: interval_secs,
                        family,
                        host: host.to_string(),
                        packet_count: stats.packet_count,
                        total_bytes: stats.total_bytes,
                        sent_bytes: stats.sent_bytes,
                        received_bytes: stats.received_bytes,
                        icmp_bytes: stats.icmp_bytes,
                        udp_bytes: stats.udp_bytes,
                        tcp_bytes: stats.tcp_bytes,
                        ftp_bytes: stats.ftp_bytes,
                        http_bytes: stats.http_bytes,
                        mail_bytes: stats.mail_bytes,
                        p2p_bytes: stats.p2p_bytes,
                    })?;
                }
            }
            w.flush()?;
        }

        if !snapshot.pairs_v4.is_empty() || !snapshot.pairs_v6.is_empty() {
            let mut w = self.writer("pairs", &day)?;
            for (family, pairs) in [("v4", &snapshot.pairs_v4), ("v6", &snapshot.pairs_v6)] {
                for ((src, dst), stats) in pairs {
                    w.serialize(PairRow {
                        timestamp: ts,
                        duration: interval_secs,
                        family,
                        src: src.to_string(),
                        dst: dst.to_string(),
                        packet_count: stats.packet_count,
                        total_bytes: stats.total_bytes,
                        sent_bytes: stats.sent_bytes,
                        received_bytes: stats.received_bytes,
                        icmp_bytes: stats.icmp_bytes,
                        udp_bytes: stats.udp_bytes,
                        tcp_bytes: stats.tcp_bytes,
                        ftp_bytes: stats.ftp_bytes,
                        http_bytes: stats.http_bytes,
                        mail_bytes: stats.mail_bytes,
                        p2p_bytes: stats.p2p_bytes,
                    })?;
                }
            }
            w.flush()?;
        }

        Ok(())
    }
}
