use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Transport-layer protocol of a decoded packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    Tcp,
    Udp,
    /// ICMP and ICMPv6 both map here; neither carries ports
    Icmp,
    /// Any other IP protocol, identified by its protocol number
    Other(u8),
}

/// One decoded, filter-scoped packet handed to the accounting engine.
///
/// The capture side has already discarded non-IP and truncated frames;
/// the address family is explicit in the addresses.
#[derive(Debug, Clone, Copy)]
pub struct PacketRecord {
    /// IP-layer length in bytes
    pub length: u32,

    /// Source address
    pub src_addr: IpAddr,

    /// Destination address
    pub dst_addr: IpAddr,

    /// Transport protocol from the IP header
    pub transport: Transport,

    /// Source port, for TCP/UDP
    pub src_port: Option<u16>,

    /// Destination port, for TCP/UDP
    pub dst_port: Option<u16>,
}
