use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Coarse traffic category assigned to each packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Icmp,
    Udp,
    Tcp,
    Ftp,
    Http,
    Mail,
    P2p,
    Other,
}

/// Whether a host saw a packet as its sender or its receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// Per-entity traffic counters.
///
/// Sent and received bytes are sub-fields of the same value rather than
/// separate maps, so merging two Statistics stays a single pointwise
/// saturating addition: commutative and associative, which the rollup
/// store relies on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub packet_count: u64,
    pub total_bytes: u64,
    pub sent_bytes: u64,
    pub received_bytes: u64,
    pub icmp_bytes: u64,
    pub udp_bytes: u64,
    pub tcp_bytes: u64,
    pub ftp_bytes: u64,
    pub http_bytes: u64,
    pub mail_bytes: u64,
    pub p2p_bytes: u64,
}

impl Statistics {
    /// Account one packet of `bytes` length against these counters
    pub fn record_packet(&mut self, bytes: u64, category: Category, direction: Direction) {
        self.packet_count = self.packet_count.saturating_add(1);
        self.total_bytes = self.total_bytes.saturating_add(bytes);
        match direction {
            Direction::Sent => self.sent_bytes = self.sent_bytes.saturating_add(bytes),
            Direction::Received => {
                self.received_bytes = self.received_bytes.saturating_add(bytes)
            }
        }
        let bucket = match category {
            Category::Icmp => &mut self.icmp_bytes,
            Category::Udp => &mut self.udp_bytes,
            Category::Tcp => &mut self.tcp_bytes,
            Category::Ftp => &mut self.ftp_bytes,
            Category::Http => &mut self.http_bytes,
            Category::Mail => &mut self.mail_bytes,
            Category::P2p => &mut self.p2p_bytes,
            // Uncategorized transports only count towards the totals
            Category::Other => return,
        };
        *bucket = bucket.saturating_add(bytes);
    }

    /// Pointwise saturating addition of another set of counters
    pub fn merge(&mut self, other: &Statistics) {
        self.packet_count = self.packet_count.saturating_add(other.packet_count);
        self.total_bytes = self.total_bytes.saturating_add(other.total_bytes);
        self.sent_bytes = self.sent_bytes.saturating_add(other.sent_bytes);
        self.received_bytes = self.received_bytes.saturating_add(other.received_bytes);
        self.icmp_bytes = self.icmp_bytes.saturating_add(other.icmp_bytes);
        self.udp_bytes = self.udp_bytes.saturating_add(other.udp_bytes);
        self.tcp_bytes = self.tcp_bytes.saturating_add(other.tcp_bytes);
        self.ftp_bytes = self.ftp_bytes.saturating_add(other.ftp_bytes);
        self.http_bytes = self.http_bytes.saturating_add(other.http_bytes);
        self.mail_bytes = self.mail_bytes.saturating_add(other.mail_bytes);
        self.p2p_bytes = self.p2p_bytes.saturating_add(other.p2p_bytes);
    }
}

/// A canonicalized endpoint address; the family is explicit in the value
pub type HostKey = IpAddr;

/// A directional (source, destination) flow. Direction matters because
/// sent and received traffic are attributed asymmetrically.
pub type PairKey = (HostKey, HostKey);

/// Counter tables accumulated over one sampling interval.
///
/// IPv4 and IPv6 traffic are kept in separate maps end to end; address
/// width and downstream reporting differ, so they are never merged.
#[derive(Debug, Clone, Default)]
pub struct IntervalSnapshot {
    pub hosts_v4: HashMap<HostKey, Statistics>,
    pub hosts_v6: HashMap<HostKey, Statistics>,
    pub pairs_v4: HashMap<PairKey, Statistics>,
    pub pairs_v6: HashMap<PairKey, Statistics>,
}

impl IntervalSnapshot {
    pub fn is_empty(&self) -> bool {
        self.hosts_v4.is_empty()
            && self.hosts_v6.is_empty()
            && self.pairs_v4.is_empty()
            && self.pairs_v6.is_empty()
    }

    /// Fold every entry under the given scope into one aggregate
    pub fn aggregate(&self, scope: Scope) -> Statistics {
        let mut total = Statistics::default();
        match scope {
            Scope::HostsV4 => self.hosts_v4.values().for_each(|s| total.merge(s)),
            Scope::HostsV6 => self.hosts_v6.values().for_each(|s| total.merge(s)),
            Scope::PairsV4 => self.pairs_v4.values().for_each(|s| total.merge(s)),
            Scope::PairsV6 => self.pairs_v6.values().for_each(|s| total.merge(s)),
        }
        total
    }
}

/// Which counter table a historical sample summarizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    HostsV4,
    HostsV6,
    PairsV4,
    PairsV6,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::HostsV4, Scope::HostsV6, Scope::PairsV4, Scope::PairsV6];

    /// Parse a query-string scope name
    pub fn parse(name: &str) -> Option<Scope> {
        match name {
            "hosts_v4" => Some(Scope::HostsV4),
            "hosts_v6" => Some(Scope::HostsV6),
            "pairs_v4" => Some(Scope::PairsV4),
            "pairs_v6" => Some(Scope::PairsV6),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scope::HostsV4 => "hosts_v4",
            Scope::HostsV6 => "hosts_v6",
            Scope::PairsV4 => "pairs_v4",
            Scope::PairsV6 => "pairs_v6",
        }
    }
}

/// One historical sample held by a resolution tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPoint {
    /// Start of the covered time range
    pub timestamp: DateTime<Utc>,

    /// Seconds of traffic this sample covers; always positive
    pub sample_duration: u64,

    /// Counter table this sample was derived from
    pub scope: Scope,

    /// Merged counters for the covered range
    pub stats: Statistics,

    /// How many interval snapshots were folded into this sample;
    /// lets later consumers compute weighted averages
    pub sample_count: u64,
}

impl SummaryPoint {
    /// Merge an adjacent/overlapping sample into this one without
    /// double-counting: counters are sums, so absorbing is a saturating
    /// add of the stats plus an add of duration and sample_count.
    pub fn absorb(&mut self, other: &SummaryPoint) {
        self.stats.merge(&other.stats);
        self.sample_duration = self.sample_duration.saturating_add(other.sample_duration);
        self.sample_count = self.sample_count.saturating_add(other.sample_count);
        if other.timestamp < self.timestamp {
            self.timestamp = other.timestamp;
        }
    }
}
