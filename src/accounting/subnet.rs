use ip_network::IpNetwork;
use ip_network_table::IpNetworkTable;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::utils::error::ConfigError;

/// What the configured subnet rules say about one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedAddress {
    /// Matches at least one include rule, or no include rules exist
    pub included: bool,

    /// Matches at least one exclude rule; overrides inclusion
    pub excluded: bool,

    /// Matches at least one track rule; enables pair accounting
    pub tracked: bool,
}

impl ClassifiedAddress {
    /// Included and not overridden by an exclude rule
    pub fn accounted(&self) -> bool {
        self.included && !self.excluded
    }
}

/// Classifies addresses against the configured include/exclude/track
/// subnet lists. One LPM table per role; a table lookup succeeding means
/// some rule of that role covers the address, which is all that matters —
/// there is no precedence among same-role rules. Family mismatches never
/// match because v4 and v6 prefixes live in disjoint parts of the tables.
pub struct SubnetMatcher {
    include: IpNetworkTable<()>,
    exclude: IpNetworkTable<()>,
    track: IpNetworkTable<()>,
    /// Permissive default: with no include rules, everything is included
    has_include_rules: bool,
}

impl SubnetMatcher {
    pub fn new(
        include: &[String],
        exclude: &[String],
        track: &[String],
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            include: Self::build_table(include)?,
            exclude: Self::build_table(exclude)?,
            track: Self::build_table(track)?,
            has_include_rules: !include.is_empty(),
        })
    }

    /// Classify one address against all three rule lists
    pub fn classify(&self, addr: IpAddr) -> ClassifiedAddress {
        ClassifiedAddress {
            included: !self.has_include_rules || self.include.longest_match(addr).is_some(),
            excluded: self.exclude.longest_match(addr).is_some(),
            tracked: self.track.longest_match(addr).is_some(),
        }
    }

    fn build_table(cidrs: &[String]) -> Result<IpNetworkTable<()>, ConfigError> {
        let mut table = IpNetworkTable::new();
        for cidr in cidrs {
            table.insert(Self::parse_network(cidr)?, ());
        }
        Ok(table)
    }

    /// Parse `addr/prefix` (or a bare address as a host route). The
    /// IpNetwork constructor rejects prefixes with host bits set, which
    /// enforces the `network & mask == network` invariant.
    fn parse_network(cidr: &str) -> Result<IpNetwork, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSubnet(cidr.to_string(), reason.into());

        let (addr_part, prefix_part) = match cidr.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (cidr, None),
        };

        if addr_part.contains(':') {
            let addr: Ipv6Addr = addr_part
                .parse()
                .map_err(|_| invalid("not a valid IPv6 address"))?;
            let prefix: u8 = match prefix_part {
                Some(p) => p.parse().map_err(|_| invalid("bad prefix length"))?,
                None => 128,
            };
            IpNetwork::new(addr, prefix).map_err(|e| invalid(&e.to_string()))
        } else {
            let addr: Ipv4Addr = addr_part
                .parse()
                .map_err(|_| invalid("not a valid IPv4 address"))?;
            let prefix: u8 = match prefix_part {
                Some(p) => p.parse().map_err(|_| invalid("bad prefix length"))?,
                None => 32,
            };
            IpNetwork::new(addr, prefix).map_err(|e| invalid(&e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(include: &[&str], exclude: &[&str], track: &[&str]) -> SubnetMatcher {
        let to_vec = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        SubnetMatcher::new(&to_vec(include), &to_vec(exclude), &to_vec(track)).unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn include_rule_covers_its_network() {
        let m = matcher(&["10.0.0.0/24"], &[], &[]);
        assert!(m.classify(ip("10.0.0.1")).included);
        assert!(m.classify(ip("10.0.0.255")).included);
        assert!(!m.classify(ip("10.0.1.1")).included);
    }

    #[test]
    fn no_include_rules_means_permissive_default() {
        let m = matcher(&[], &[], &[]);
        assert!(m.classify(ip("203.0.113.9")).included);
        assert!(m.classify(ip("2001:db8::1")).included);
    }

    #[test]
    fn exclusion_overrides_inclusion() {
        let m = matcher(&["10.0.0.0/8"], &["10.1.0.0/16"], &[]);
        let c = m.classify(ip("10.1.2.3"));
        assert!(c.included);
        assert!(c.excluded);
        assert!(!c.accounted());
        assert!(m.classify(ip("10.2.0.1")).accounted());
    }

    #[test]
    fn tracking_is_independent_of_inclusion() {
        let m = matcher(&["10.0.0.0/8"], &[], &["192.168.0.0/16"]);
        let c = m.classify(ip("192.168.1.1"));
        assert!(c.tracked);
        assert!(!c.included);
        assert!(!m.classify(ip("10.0.0.1")).tracked);
    }

    #[test]
    fn overlapping_same_role_rules_any_match_suffices() {
        let m = matcher(&["10.0.0.0/8", "10.0.0.0/24"], &[], &[]);
        assert!(m.classify(ip("10.0.0.5")).included);
        assert!(m.classify(ip("10.200.0.5")).included);
    }

    #[test]
    fn family_mismatch_never_matches() {
        let m = matcher(&["10.0.0.0/8"], &[], &[]);
        // v4 rules only, so a v6 address fails inclusion
        assert!(!m.classify(ip("2001:db8::1")).included);

        let m6 = matcher(&["2001:db8::/32"], &[], &[]);
        assert!(!m6.classify(ip("10.0.0.1")).included);
        assert!(m6.classify(ip("2001:db8::42")).included);
    }

    #[test]
    fn bare_address_becomes_host_route() {
        let m = matcher(&["10.0.0.5"], &[], &[]);
        assert!(m.classify(ip("10.0.0.5")).included);
        assert!(!m.classify(ip("10.0.0.6")).included);
    }

    #[test]
    fn host_bits_set_is_rejected() {
        let err = SubnetMatcher::new(&["10.0.0.1/24".to_string()], &[], &[]);
        assert!(err.is_err());
    }

    #[test]
    fn garbage_cidr_is_rejected() {
        assert!(SubnetMatcher::new(&["not-a-subnet".to_string()], &[], &[]).is_err());
        assert!(SubnetMatcher::new(&["10.0.0.0/xx".to_string()], &[], &[]).is_err());
    }
}
