use crate::models::record::Transport;
use crate::models::stats::Category;

// Well-known port heuristics. Either side of the conversation may be the
// well-known port, so both are checked. When ports match more than one
// service the fixed priority order is: ftp > http > mail > p2p. This is a
// policy decision applied consistently, not a correctness property.

const FTP_PORTS: [u16; 2] = [20, 21];
const HTTP_PORTS: [u16; 4] = [80, 443, 8080, 8443];
const MAIL_PORTS: [u16; 7] = [25, 110, 143, 465, 587, 993, 995];
const P2P_PORTS: [u16; 4] = [4662, 6346, 6347, 51413];
const P2P_RANGE: std::ops::RangeInclusive<u16> = 6881..=6889;

/// Map a decoded transport header to a coarse traffic category.
///
/// Pure function with no state. ICMP is identified directly from the
/// IP-layer protocol field and bypasses port inspection; TCP and UDP are
/// refined by the port heuristics above and fall back to the bare
/// tcp/udp categories when nothing matches.
pub fn classify(transport: Transport, src_port: Option<u16>, dst_port: Option<u16>) -> Category {
    let fallback = match transport {
        Transport::Icmp => return Category::Icmp,
        Transport::Tcp => Category::Tcp,
        Transport::Udp => Category::Udp,
        Transport::Other(_) => return Category::Other,
    };

    let either = |pred: &dyn Fn(u16) -> bool| {
        src_port.map(pred).unwrap_or(false) || dst_port.map(pred).unwrap_or(false)
    };

    if either(&|p| FTP_PORTS.contains(&p)) {
        Category::Ftp
    } else if either(&|p| HTTP_PORTS.contains(&p)) {
        Category::Http
    } else if either(&|p| MAIL_PORTS.contains(&p)) {
        Category::Mail
    } else if either(&|p| P2P_PORTS.contains(&p) || P2P_RANGE.contains(&p)) {
        Category::P2p
    } else {
        fallback
    }
}
