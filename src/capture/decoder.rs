use log::trace;
use pnet::packet::{
    ethernet::{EtherTypes, EthernetPacket},
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    tcp::TcpPacket,
    udp::UdpPacket,
    Packet as PnetPacket,
};
use std::net::IpAddr;

use crate::models::record::{PacketRecord, Transport};

/// Decodes raw frames into the header records the accounting engine
/// consumes. Non-IP frames (ARP and friends) and truncated headers are
/// discarded here; the engine never sees them.
pub struct PacketDecoder {}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Decode one raw ethernet frame. Returns None for anything that is
    /// not a well-formed IPv4/IPv6 packet.
    pub fn decode(&self, data: &[u8]) -> Option<PacketRecord> {
        let eth = EthernetPacket::new(data)?;
        match eth.get_ethertype() {
            EtherTypes::Ipv4 => self.decode_ipv4(eth.payload()),
            EtherTypes::Ipv6 => self.decode_ipv6(eth.payload()),
            other => {
                trace!("Skipping non-IP frame: {:?}", other);
                None
            }
        }
    }

    fn decode_ipv4(&self, data: &[u8]) -> Option<PacketRecord> {
        let ip = Ipv4Packet::new(data)?;
        let (transport, src_port, dst_port) =
            self.decode_transport(ip.get_next_level_protocol(), ip.payload());
        Some(PacketRecord {
            // IP-layer length, not the frame length: matches what the
            // counters mean downstream
            length: u32::from(ip.get_total_length()),
            src_addr: IpAddr::V4(ip.get_source()),
            dst_addr: IpAddr::V4(ip.get_destination()),
            transport,
            src_port,
            dst_port,
        })
    }

    fn decode_ipv6(&self, data: &[u8]) -> Option<PacketRecord> {
        let ip = Ipv6Packet::new(data)?;
        let (transport, src_port, dst_port) =
            self.decode_transport(ip.get_next_header(), ip.payload());
        Some(PacketRecord {
            // Fixed v6 header plus payload
            length: u32::from(ip.get_payload_length()) + 40,
            src_addr: IpAddr::V6(ip.get_source()),
            dst_addr: IpAddr::V6(ip.get_destination()),
            transport,
            src_port,
            dst_port,
        })
    }

    /// Extract the transport protocol and ports. A transport header too
    /// short to parse still yields the bare protocol with no ports.
    fn decode_transport(
        &self,
        proto: IpNextHeaderProtocol,
        payload: &[u8],
    ) -> (Transport, Option<u16>, Option<u16>) {
        match proto {
            IpNextHeaderProtocols::Tcp => match TcpPacket::new(payload) {
                Some(tcp) => (
                    Transport::Tcp,
                    Some(tcp.get_source()),
                    Some(tcp.get_destination()),
                ),
                None => (Transport::Tcp, None, None),
            },
            IpNextHeaderProtocols::Udp => match UdpPacket::new(payload) {
                Some(udp) => (
                    Transport::Udp,
                    Some(udp.get_source()),
                    Some(udp.get_destination()),
                ),
                None => (Transport::Udp, None, None),
            },
            IpNextHeaderProtocols::Icmp | IpNextHeaderProtocols::Icmpv6 => {
                (Transport::Icmp, None, None)
            }
            other => (Transport::Other(other.0), None, None),
        }
    }
}
