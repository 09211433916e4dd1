use std::fmt::Write;

use crate::accounting::rollup::CdfReport;

/// Render a cumulative-distribution report as stable, diffable text:
/// a header line followed by one line per bucket. No business logic
/// here beyond formatting and bucket labels.
pub fn format_cdf(report: &CdfReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# cdf scope={} tier={} samples={}",
        report.scope.name(),
        report.tier,
        report.sample_count
    );
    for bucket in &report.buckets {
        let label = if bucket.upper_bound_bytes == u64::MAX {
            "inf".to_string()
        } else {
            bucket.upper_bound_bytes.to_string()
        };
        let _ = writeln!(
            out,
            "<= {:>14} B {:>8} {:>7.2}%",
            label, bucket.count, bucket.cumulative_percent
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::rollup::RollupStore;
    use crate::models::config::TierConfig;
    use crate::models::stats::{Category, Direction, IntervalSnapshot, Scope};
    use chrono::TimeZone;

    fn store_with_history() -> RollupStore {
        let tiers = vec![TierConfig {
            name: "fine".to_string(),
            spacing_secs: 10,
            capacity: 100,
        }];
        let mut store = RollupStore::new(&tiers, 10);
        for i in 0..4 {
            let mut snap = IntervalSnapshot::default();
            snap.hosts_v4
                .entry("10.0.0.1".parse().unwrap())
                .or_default()
                .record_packet(512 * (i + 1), Category::Tcp, Direction::Sent);
            let at = chrono::Utc.timestamp_opt(1_000_000 + i as i64 * 10, 0).unwrap();
            store.collate(&snap, at);
        }
        store
    }

    #[test]
    fn output_is_stable_across_calls() {
        let store = store_with_history();
        let a = format_cdf(&store.cumulative_distribution(Scope::HostsV4));
        let b = format_cdf(&store.cumulative_distribution(Scope::HostsV4));
        assert_eq!(a, b);
    }

    #[test]
    fn one_line_per_bucket_plus_header() {
        let store = store_with_history();
        let report = store.cumulative_distribution(Scope::HostsV4);
        let text = format_cdf(&report);
        assert_eq!(text.lines().count(), 1 + report.buckets.len());
        assert!(text.starts_with("# cdf scope=hosts_v4 tier=fine samples=4"));
    }

    #[test]
    fn exact_rendering_of_known_history() {
        // Samples: 512, 1024, 1536, 2048 total bytes
        let store = store_with_history();
        let text = format_cdf(&store.cumulative_distribution(Scope::HostsV4));
        // 512 and 1024 fit under the 1 KiB bound
        assert!(text.contains("<=           1024 B        2   50.00%"));
        // All four fit under 2 KiB
        assert!(text.contains("<=           2048 B        4  100.00%"));
        assert!(text.lines().last().unwrap().contains("inf"));
    }
}
