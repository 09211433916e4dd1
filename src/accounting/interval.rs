use std::net::IpAddr;

use crate::accounting::subnet::SubnetMatcher;
use crate::models::stats::{Category, Direction, IntervalSnapshot, Statistics};

/// What became of one record() call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Counters were updated
    Recorded,

    /// No configured subnet of interest covered the packet
    Ignored,

    /// Zero-length packet or mismatched address families; skipped,
    /// never fatal
    Malformed,
}

/// Per-interval counter tables keyed by host and host-pair.
///
/// Owned exclusively by the sensor loop; `record` mutates only the
/// current snapshot and performs no I/O, so nothing on the packet-intake
/// path can block. Key cardinality is bounded by the include rules: a
/// packet neither end of which is accounted never touches the maps.
pub struct IntervalAccumulator {
    matcher: SubnetMatcher,
    current: IntervalSnapshot,
}

impl IntervalAccumulator {
    pub fn new(matcher: SubnetMatcher) -> Self {
        Self {
            matcher,
            current: IntervalSnapshot::default(),
        }
    }

    /// Account one observed packet.
    ///
    /// Each accounted address gets the packet added to its host entry —
    /// the source as sent, the destination as received. When both ends
    /// match a track rule the ordered (src, dst) pair entry is updated as
    /// well. IPv4 and IPv6 go to separate maps.
    pub fn record(
        &mut self,
        length: u32,
        src: IpAddr,
        dst: IpAddr,
        category: Category,
    ) -> RecordOutcome {
        if length == 0 || src.is_ipv4() != dst.is_ipv4() {
            return RecordOutcome::Malformed;
        }

        let src_class = self.matcher.classify(src);
        let dst_class = self.matcher.classify(dst);

        // Both ends excluded, or neither end included: nothing of
        // interest, no counters touched. This is what bounds map
        // cardinality to the configured subnets.
        if (src_class.excluded && dst_class.excluded)
            || (!src_class.included && !dst_class.included)
        {
            return RecordOutcome::Ignored;
        }

        let src_accounted = src_class.accounted();
        let dst_accounted = dst_class.accounted();
        let pair_tracked = src_class.tracked && dst_class.tracked;

        // An end can pass the gate yet still be unaccountable, e.g. the
        // only included address is also excluded. If no host or pair
        // entry would be touched the packet was effectively ignored.
        if !src_accounted && !dst_accounted && !pair_tracked {
            return RecordOutcome::Ignored;
        }

        let bytes = u64::from(length);
        let is_v4 = src.is_ipv4();

        if src_accounted {
            Self::host_entry(&mut self.current, src, is_v4)
                .record_packet(bytes, category, Direction::Sent);
        }
        if dst_accounted {
            Self::host_entry(&mut self.current, dst, is_v4)
                .record_packet(bytes, category, Direction::Received);
        }
        if pair_tracked {
            let pairs = if is_v4 {
                &mut self.current.pairs_v4
            } else {
                &mut self.current.pairs_v6
            };
            pairs
                .entry((src, dst))
                .or_default()
                .record_packet(bytes, category, Direction::Sent);
        }

        RecordOutcome::Recorded
    }

    /// Hand the caller the just-completed snapshot and install a fresh,
    /// empty one. This is the single handoff point to the rollup store
    /// and the persistence sinks; the accumulator is owned by one task,
    /// so the swap is indivisible with respect to record() calls.
    pub fn snapshot_and_reset(&mut self) -> IntervalSnapshot {
        std::mem::take(&mut self.current)
    }

    fn host_entry<'a>(
        snapshot: &'a mut IntervalSnapshot,
        addr: IpAddr,
        is_v4: bool,
    ) -> &'a mut Statistics {
        let hosts = if is_v4 {
            &mut snapshot.hosts_v4
        } else {
            &mut snapshot.hosts_v6
        };
        hosts.entry(addr).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn subnets(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn accumulator(include: &[&str], exclude: &[&str], track: &[&str]) -> IntervalAccumulator {
        let matcher =
            SubnetMatcher::new(&subnets(include), &subnets(exclude), &subnets(track)).unwrap();
        IntervalAccumulator::new(matcher)
    }

    #[test]
    fn end_to_end_scenario_single_http_packet() {
        // One include rule 10.0.0.0/24; 1000 bytes of http from 10.0.0.5
        // to an outside address.
        let mut acc = accumulator(&["10.0.0.0/24"], &[], &[]);
        let outcome = acc.record(1000, ip("10.0.0.5"), ip("93.184.216.34"), Category::Http);
        assert_eq!(outcome, RecordOutcome::Recorded);

        let snapshot = acc.snapshot_and_reset();
        let host = snapshot.hosts_v4.get(&ip("10.0.0.5")).unwrap();
        assert_eq!(host.total_bytes, 1000);
        assert_eq!(host.http_bytes, 1000);
        assert_eq!(host.sent_bytes, 1000);
        assert_eq!(host.received_bytes, 0);

        // Destination is not included, so it never enters the map
        assert!(!snapshot.hosts_v4.contains_key(&ip("93.184.216.34")));
        // Neither end is tracked, so there is no pair entry
        assert!(snapshot.pairs_v4.is_empty());
    }

    #[test]
    fn both_included_hosts_get_sent_and_received() {
        let mut acc = accumulator(&["10.0.0.0/24"], &[], &[]);
        acc.record(500, ip("10.0.0.1"), ip("10.0.0.2"), Category::Tcp);

        let snapshot = acc.snapshot_and_reset();
        let src = snapshot.hosts_v4.get(&ip("10.0.0.1")).unwrap();
        let dst = snapshot.hosts_v4.get(&ip("10.0.0.2")).unwrap();
        assert_eq!(src.sent_bytes, 500);
        assert_eq!(src.received_bytes, 0);
        assert_eq!(dst.received_bytes, 500);
        assert_eq!(dst.sent_bytes, 0);
    }

    #[test]
    fn uninteresting_packets_are_ignored_without_touching_counters() {
        let mut acc = accumulator(&["10.0.0.0/24"], &[], &[]);
        let outcome = acc.record(100, ip("8.8.8.8"), ip("9.9.9.9"), Category::Udp);
        assert_eq!(outcome, RecordOutcome::Ignored);
        assert!(acc.snapshot_and_reset().is_empty());
    }

    #[test]
    fn excluded_addresses_are_not_accounted() {
        let mut acc = accumulator(&["10.0.0.0/8"], &["10.9.0.0/16"], &[]);
        acc.record(100, ip("10.9.0.1"), ip("10.1.0.1"), Category::Tcp);

        let snapshot = acc.snapshot_and_reset();
        assert!(!snapshot.hosts_v4.contains_key(&ip("10.9.0.1")));
        assert_eq!(
            snapshot.hosts_v4.get(&ip("10.1.0.1")).unwrap().received_bytes,
            100
        );
    }

    #[test]
    fn excluded_only_match_reports_ignored_not_recorded() {
        // Source is both included and excluded; destination matches no
        // rule at all. The packet passes the coarse gate but touches no
        // counters, so the caller must see it as ignored.
        let mut acc = accumulator(&["10.0.0.0/24"], &["10.0.0.0/24"], &[]);
        let outcome = acc.record(100, ip("10.0.0.1"), ip("8.8.8.8"), Category::Tcp);
        assert_eq!(outcome, RecordOutcome::Ignored);
        assert!(acc.snapshot_and_reset().is_empty());
    }

    #[test]
    fn pair_entry_requires_both_ends_tracked() {
        let mut acc = accumulator(&["10.0.0.0/8"], &[], &["10.0.1.0/24"]);

        // Only one end tracked: no pair entry
        acc.record(100, ip("10.0.1.1"), ip("10.2.0.1"), Category::Tcp);
        // Both ends tracked: ordered pair entry
        acc.record(200, ip("10.0.1.1"), ip("10.0.1.2"), Category::Http);

        let snapshot = acc.snapshot_and_reset();
        assert_eq!(snapshot.pairs_v4.len(), 1);
        let pair = snapshot
            .pairs_v4
            .get(&(ip("10.0.1.1"), ip("10.0.1.2")))
            .unwrap();
        assert_eq!(pair.total_bytes, 200);
        assert_eq!(pair.http_bytes, 200);
    }

    #[test]
    fn pair_direction_is_preserved() {
        let mut acc = accumulator(&[], &[], &["10.0.0.0/24"]);
        acc.record(100, ip("10.0.0.1"), ip("10.0.0.2"), Category::Tcp);
        acc.record(300, ip("10.0.0.2"), ip("10.0.0.1"), Category::Tcp);

        let snapshot = acc.snapshot_and_reset();
        assert_eq!(snapshot.pairs_v4.len(), 2);
        let forward = snapshot.pairs_v4[&(ip("10.0.0.1"), ip("10.0.0.2"))];
        let reverse = snapshot.pairs_v4[&(ip("10.0.0.2"), ip("10.0.0.1"))];
        assert_eq!(forward.total_bytes, 100);
        assert_eq!(reverse.total_bytes, 300);
    }

    #[test]
    fn v4_and_v6_traffic_stay_in_separate_maps() {
        let mut acc = accumulator(&[], &[], &[]);
        acc.record(100, ip("10.0.0.1"), ip("10.0.0.2"), Category::Tcp);
        acc.record(200, ip("2001:db8::1"), ip("2001:db8::2"), Category::Udp);

        let snapshot = acc.snapshot_and_reset();
        assert_eq!(snapshot.hosts_v4.len(), 2);
        assert_eq!(snapshot.hosts_v6.len(), 2);
        assert_eq!(
            snapshot.hosts_v6.get(&ip("2001:db8::1")).unwrap().udp_bytes,
            200
        );
    }

    #[test]
    fn malformed_records_are_skipped() {
        let mut acc = accumulator(&[], &[], &[]);
        assert_eq!(
            acc.record(0, ip("10.0.0.1"), ip("10.0.0.2"), Category::Tcp),
            RecordOutcome::Malformed
        );
        assert_eq!(
            acc.record(100, ip("10.0.0.1"), ip("2001:db8::1"), Category::Tcp),
            RecordOutcome::Malformed
        );
        assert!(acc.snapshot_and_reset().is_empty());
    }

    #[test]
    fn snapshot_isolation_across_reset() {
        let mut acc = accumulator(&[], &[], &[]);
        acc.record(100, ip("10.0.0.1"), ip("10.0.0.2"), Category::Tcp);

        let first = acc.snapshot_and_reset();
        assert_eq!(first.hosts_v4[&ip("10.0.0.1")].sent_bytes, 100);

        // Nothing recorded before the reset leaks into the next interval
        acc.record(700, ip("10.0.0.3"), ip("10.0.0.4"), Category::Udp);
        let second = acc.snapshot_and_reset();
        assert!(!second.hosts_v4.contains_key(&ip("10.0.0.1")));
        assert_eq!(second.hosts_v4[&ip("10.0.0.3")].sent_bytes, 700);
    }
}
