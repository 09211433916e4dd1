use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use crate::models::config::TierConfig;
use crate::models::stats::{IntervalSnapshot, Scope, Statistics, SummaryPoint};

/// One fixed-capacity ring of historical samples at a given granularity.
///
/// The ring is allocated once and never resized; inserting into a full
/// ring evicts the oldest entry. Running out of room is by design, not
/// an error condition.
#[derive(Debug)]
struct ResolutionTier {
    name: String,
    sample_spacing: u64,
    capacity: usize,
    ring: VecDeque<SummaryPoint>,
}

impl ResolutionTier {
    fn new(config: &TierConfig) -> Self {
        Self {
            name: config.name.clone(),
            sample_spacing: config.spacing_secs,
            capacity: config.capacity,
            ring: VecDeque::with_capacity(config.capacity),
        }
    }

    /// Wall-clock-aligned span index of a timestamp. Two samples share a
    /// ring entry iff they land in the same span. Alignment to the epoch
    /// (rather than to the first sample) keeps rotation reproducible
    /// across restarts.
    fn span_index(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.sample_spacing as i64)
    }

    /// Push a point without merging, evicting the oldest at capacity
    fn push_direct(&mut self, point: SummaryPoint) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(point);
    }

    /// Merge the point into the most recent entry while that entry's
    /// span is still current; rotate in a new entry once it elapses.
    fn insert(&mut self, point: SummaryPoint) {
        let same_span = self
            .ring
            .back()
            .map(|last| self.span_index(last.timestamp) == self.span_index(point.timestamp))
            .unwrap_or(false);
        if same_span {
            if let Some(last) = self.ring.back_mut() {
                last.absorb(&point);
                return;
            }
        }
        self.push_direct(point);
    }

    /// Stored points fully cover a range iff the oldest point is no
    /// newer than the range start
    fn covers(&self, start: DateTime<Utc>) -> bool {
        self.ring
            .front()
            .map(|oldest| oldest.timestamp <= start)
            .unwrap_or(false)
    }

    /// Points whose covered range intersects [start, end], in
    /// chronological order (the ring is inherently ordered)
    fn points_in(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<SummaryPoint> {
        self.ring
            .iter()
            .filter(|p| {
                let point_end = p.timestamp + chrono::Duration::seconds(p.sample_duration as i64);
                p.timestamp <= end && point_end >= start
            })
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.ring.len()
    }
}

/// One historical series: the ordered list of tiers for a single scope,
/// finest first
#[derive(Debug)]
struct ScopeSeries {
    tiers: Vec<ResolutionTier>,
}

impl ScopeSeries {
    fn new(configs: &[TierConfig]) -> Self {
        Self {
            tiers: configs.iter().map(ResolutionTier::new).collect(),
        }
    }

    fn collate(&mut self, point: &SummaryPoint) {
        // The finest tier takes every snapshot verbatim; coarser tiers
        // merge within their span.
        let mut tiers = self.tiers.iter_mut();
        if let Some(finest) = tiers.next() {
            finest.push_direct(point.clone());
        }
        for tier in tiers {
            tier.insert(point.clone());
        }
    }

    fn stored_points(&self) -> usize {
        self.tiers.iter().map(|t| t.len()).sum()
    }
}

/// Fixed cumulative-distribution bucket boundaries: powers of two from
/// 1 KiB to 1 TiB. Fixed boundaries keep the report monotonic and
/// deterministic for identical input.
const CDF_MIN_BOUND: u64 = 1 << 10;
const CDF_MAX_BOUND: u64 = 1 << 40;

/// One cumulative-distribution bucket: the share of samples whose total
/// bytes were at or below the bound
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CdfBucket {
    pub upper_bound_bytes: u64,
    pub count: u64,
    pub cumulative_percent: f64,
}

/// Cumulative distribution of per-sample traffic volume for one scope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CdfReport {
    pub scope: Scope,
    pub tier: String,
    pub sample_count: u64,
    pub buckets: Vec<CdfBucket>,
}

/// Multi-resolution historical time series ("memory"), built by folding
/// successive interval snapshots.
///
/// Total storage never exceeds the sum of tier capacities per scope no
/// matter how long the process runs; that bound is the central design
/// property here and must never be violated.
pub struct RollupStore {
    hosts_v4: ScopeSeries,
    hosts_v6: ScopeSeries,
    pairs_v4: ScopeSeries,
    pairs_v6: ScopeSeries,
    interval_secs: u64,
}

impl RollupStore {
    pub fn new(tiers: &[TierConfig], interval_secs: u64) -> Self {
        Self {
            hosts_v4: ScopeSeries::new(tiers),
            hosts_v6: ScopeSeries::new(tiers),
            pairs_v4: ScopeSeries::new(tiers),
            pairs_v6: ScopeSeries::new(tiers),
            interval_secs,
        }
    }

    fn series(&self, scope: Scope) -> &ScopeSeries {
        match scope {
            Scope::HostsV4 => &self.hosts_v4,
            Scope::HostsV6 => &self.hosts_v6,
            Scope::PairsV4 => &self.pairs_v4,
            Scope::PairsV6 => &self.pairs_v6,
        }
    }

    fn series_mut(&mut self, scope: Scope) -> &mut ScopeSeries {
        match scope {
            Scope::HostsV4 => &mut self.hosts_v4,
            Scope::HostsV6 => &mut self.hosts_v6,
            Scope::PairsV4 => &mut self.pairs_v4,
            Scope::PairsV6 => &mut self.pairs_v6,
        }
    }

    /// Fold one interval's data into history. Every tier of every scope
    /// receives the snapshot as a fresh one-sample SummaryPoint.
    pub fn collate(&mut self, snapshot: &IntervalSnapshot, now: DateTime<Utc>) {
        let interval_secs = self.interval_secs;
        for scope in Scope::ALL {
            let point = SummaryPoint {
                timestamp: now,
                sample_duration: interval_secs,
                scope,
                stats: snapshot.aggregate(scope),
                sample_count: 1,
            };
            self.series_mut(scope).collate(&point);
        }
    }

    /// Ordered samples for graphing.
    ///
    /// Selects the coarsest tier whose stored points fully cover the
    /// requested range. If no tier covers it, the coarsest tier's points
    /// are supplemented by resampling the next-finer tier into
    /// coarse-spacing buckets for any span the coarsest lacks.
    pub fn render_series(
        &self,
        scope: Scope,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<SummaryPoint> {
        let series = self.series(scope);
        let mut chosen: Option<usize> = None;
        for (i, tier) in series.tiers.iter().enumerate() {
            if tier.covers(start) {
                chosen = Some(i);
            }
        }

        match chosen {
            Some(i) => series.tiers[i].points_in(start, end),
            None => {
                let coarsest = match series.tiers.last() {
                    Some(t) => t,
                    None => return Vec::new(),
                };
                let finer = series.tiers.len().checked_sub(2).map(|i| &series.tiers[i]);
                Self::resample_fill(coarsest, finer, start, end)
            }
        }
    }

    fn resample_fill(
        coarse: &ResolutionTier,
        finer: Option<&ResolutionTier>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<SummaryPoint> {
        let mut points = coarse.points_in(start, end);
        if let Some(finer) = finer {
            let have: std::collections::HashSet<i64> =
                points.iter().map(|p| coarse.span_index(p.timestamp)).collect();
            let mut fills: std::collections::BTreeMap<i64, SummaryPoint> =
                std::collections::BTreeMap::new();
            for p in finer.points_in(start, end) {
                let span = coarse.span_index(p.timestamp);
                if have.contains(&span) {
                    continue;
                }
                fills
                    .entry(span)
                    .and_modify(|merged| merged.absorb(&p))
                    .or_insert(p);
            }
            points.extend(fills.into_values());
            points.sort_by_key(|p| p.timestamp);
        }
        points
    }

    /// Cumulative distribution of per-sample total bytes, over the
    /// finest tier. Pure read-only projection; repeated calls on the
    /// same history give byte-identical output.
    pub fn cumulative_distribution(&self, scope: Scope) -> CdfReport {
        let series = self.series(scope);
        let tier = series.tiers.first();
        let (tier_name, samples): (String, Vec<u64>) = match tier {
            Some(t) => (
                t.name.clone(),
                t.ring.iter().map(|p| p.stats.total_bytes).collect(),
            ),
            None => (String::new(), Vec::new()),
        };

        let total = samples.len() as u64;
        let mut buckets = Vec::new();
        let mut bound = CDF_MIN_BOUND;
        loop {
            let count = samples.iter().filter(|&&b| b <= bound).count() as u64;
            buckets.push(CdfBucket {
                upper_bound_bytes: bound,
                count,
                cumulative_percent: percent(count, total),
            });
            if bound >= CDF_MAX_BOUND {
                break;
            }
            bound <<= 1;
        }
        // Terminal bucket so the distribution always reaches 100%
        buckets.push(CdfBucket {
            upper_bound_bytes: u64::MAX,
            count: total,
            cumulative_percent: percent(total, total),
        });

        CdfReport {
            scope,
            tier: tier_name,
            sample_count: total,
            buckets,
        }
    }

    /// Total SummaryPoints currently stored across all tiers and scopes
    pub fn stored_points(&self) -> usize {
        Scope::ALL
            .iter()
            .map(|&s| self.series(s).stored_points())
            .sum()
    }

    /// The memory budget: Σ tier.capacity per scope, times four scopes
    pub fn capacity_bound(&self) -> usize {
        Scope::ALL
            .iter()
            .map(|&s| {
                self.series(s)
                    .tiers
                    .iter()
                    .map(|t| t.capacity)
                    .sum::<usize>()
            })
            .sum()
    }
}

fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stats::{Category, Direction};
    use chrono::TimeZone;
    use std::net::IpAddr;

    fn epoch(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn tier(name: &str, spacing: u64, capacity: usize) -> TierConfig {
        TierConfig {
            name: name.to_string(),
            spacing_secs: spacing,
            capacity,
        }
    }

    /// A snapshot with one v4 host that saw `bytes` of http traffic
    fn snapshot(bytes: u64) -> IntervalSnapshot {
        let mut snap = IntervalSnapshot::default();
        let host: IpAddr = "10.0.0.5".parse().unwrap();
        snap.hosts_v4
            .entry(host)
            .or_default()
            .record_packet(bytes, Category::Http, Direction::Sent);
        snap
    }

    #[test]
    fn memory_bound_holds_under_arbitrary_collates() {
        let tiers = vec![tier("fine", 10, 4), tier("coarse", 100, 3)];
        let mut store = RollupStore::new(&tiers, 10);

        for i in 0..1000 {
            store.collate(&snapshot(100), epoch(1_000_000 + i * 10));
        }
        assert!(store.stored_points() <= store.capacity_bound());
        // The fine tier ring is actually full, not merely bounded
        assert_eq!(store.series(Scope::HostsV4).tiers[0].len(), 4);
        assert_eq!(store.series(Scope::HostsV4).tiers[1].len(), 3);
    }

    #[test]
    fn rollup_fidelity_one_coarse_span() {
        // 10 identical snapshots of 100 bytes each, all inside one
        // wall-aligned coarse span of 100 seconds.
        let tiers = vec![tier("fine", 10, 100), tier("coarse", 100, 10)];
        let mut store = RollupStore::new(&tiers, 10);

        for i in 0..10 {
            store.collate(&snapshot(100), epoch(1_000_000 + i * 10));
        }

        let coarse = &store.series(Scope::HostsV4).tiers[1];
        assert_eq!(coarse.len(), 1);
        let merged = coarse.ring.back().unwrap();
        assert_eq!(merged.stats.total_bytes, 100 * 10);
        assert_eq!(merged.sample_count, 10);
        assert_eq!(merged.sample_duration, 100);
        // Kept the earliest timestamp of the span
        assert_eq!(merged.timestamp, epoch(1_000_000));
    }

    #[test]
    fn coarse_tier_rotates_on_wall_clock_boundary() {
        let tiers = vec![tier("fine", 10, 100), tier("coarse", 100, 10)];
        let mut store = RollupStore::new(&tiers, 10);

        // Two samples either side of the 1_000_100 boundary
        store.collate(&snapshot(100), epoch(1_000_090));
        store.collate(&snapshot(100), epoch(1_000_100));

        let coarse = &store.series(Scope::HostsV4).tiers[1];
        assert_eq!(coarse.len(), 2);
    }

    #[test]
    fn finest_tier_insertion_is_direct() {
        // Even with a coarse spacing configured on the finest tier,
        // every snapshot lands as its own point.
        let tiers = vec![tier("only", 1000, 10)];
        let mut store = RollupStore::new(&tiers, 10);
        store.collate(&snapshot(100), epoch(1_000_000));
        store.collate(&snapshot(100), epoch(1_000_010));
        assert_eq!(store.series(Scope::HostsV4).tiers[0].len(), 2);
    }

    #[test]
    fn render_series_prefers_coarsest_covering_tier() {
        let tiers = vec![tier("fine", 10, 4), tier("coarse", 100, 100)];
        let mut store = RollupStore::new(&tiers, 10);
        for i in 0..100 {
            store.collate(&snapshot(100), epoch(1_000_000 + i * 10));
        }

        // Range longer than the fine tier's retention: only the coarse
        // tier covers it, so coarse points (sample_count > 1) come back.
        let points = store.render_series(Scope::HostsV4, epoch(1_000_000), epoch(1_001_000));
        assert!(!points.is_empty());
        assert!(points.iter().any(|p| p.sample_count > 1));
        // Chronological order
        assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn render_series_short_range_still_picks_coarsest_covering_tier() {
        let tiers = vec![tier("fine", 10, 100), tier("coarse", 1000, 100)];
        let mut store = RollupStore::new(&tiers, 10);
        for i in 0..10 {
            store.collate(&snapshot(100), epoch(1_000_000 + i * 10));
        }

        // Both tiers cover this range; the coarsest covering tier wins,
        // which here is the coarse tier holding one merged point.
        let points = store.render_series(Scope::HostsV4, epoch(1_000_000), epoch(1_000_100));
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].sample_count, 10);
    }

    #[test]
    fn render_series_outside_history_falls_back_gracefully() {
        let tiers = vec![tier("fine", 10, 4), tier("coarse", 100, 4)];
        let mut store = RollupStore::new(&tiers, 10);
        for i in 0..100 {
            store.collate(&snapshot(100), epoch(1_000_000 + i * 10));
        }

        // Start long before any retained history
        let points = store.render_series(Scope::HostsV4, epoch(0), epoch(1_001_000));
        assert!(!points.is_empty());
        assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn scopes_are_independent() {
        let tiers = vec![tier("fine", 10, 10)];
        let mut store = RollupStore::new(&tiers, 10);
        store.collate(&snapshot(100), epoch(1_000_000));

        let v4 = store.render_series(Scope::HostsV4, epoch(999_000), epoch(1_001_000));
        let v6 = store.render_series(Scope::HostsV6, epoch(999_000), epoch(1_001_000));
        assert_eq!(v4.len(), 1);
        assert_eq!(v4[0].stats.total_bytes, 100);
        // v6 saw no traffic; its point exists but is empty
        assert_eq!(v6.len(), 1);
        assert_eq!(v6[0].stats.total_bytes, 0);
    }

    #[test]
    fn cdf_is_deterministic_and_monotonic() {
        let tiers = vec![tier("fine", 10, 100)];
        let mut store = RollupStore::new(&tiers, 10);
        for i in 0..20 {
            store.collate(&snapshot(100 * (i + 1)), epoch(1_000_000 + i as i64 * 10));
        }

        let first = store.cumulative_distribution(Scope::HostsV4);
        let second = store.cumulative_distribution(Scope::HostsV4);
        assert_eq!(first, second);

        assert_eq!(first.sample_count, 20);
        assert!(first
            .buckets
            .windows(2)
            .all(|w| w[0].count <= w[1].count
                && w[0].upper_bound_bytes < w[1].upper_bound_bytes));
        assert_eq!(first.buckets.last().unwrap().cumulative_percent, 100.0);
    }

    #[test]
    fn cdf_on_empty_history_is_all_zero() {
        let tiers = vec![tier("fine", 10, 100)];
        let store = RollupStore::new(&tiers, 10);
        let report = store.cumulative_distribution(Scope::PairsV6);
        assert_eq!(report.sample_count, 0);
        assert!(report.buckets.iter().all(|b| b.count == 0));
        assert!(report
            .buckets
            .iter()
            .all(|b| b.cumulative_percent == 0.0));
    }
}
