use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;
use std::net::Ipv4Addr;

use crate::probe::udp::{UDP_HEADER_SIZE, extract_sequence_from_udp_payload};
use crate::state::{ProbeKey, ReplyKind};

// IP protocol numbers
const IPPROTO_ICMP: u8 = 1;
const IPPROTO_UDP: u8 = 17;

// ICMP header size (type, code, checksum, 4 bytes rest-of-header)
const ICMP_HEADER_SIZE: usize = 8;
// Minimum IPv4 header size
const IPV4_MIN_HEADER: usize = 20;
// ICMP Destination Unreachable code 3
const CODE_PORT_UNREACHABLE: u8 = 3;

/// ICMP reply correlated back to the UDP probe it quotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Source address of the ICMP message
    pub responder: Ipv4Addr,
    pub kind: ReplyKind,
    /// Destination of the quoted original datagram
    pub original_dest: Ipv4Addr,
    /// UDP source port of the quoted datagram (identifies the trace)
    pub src_port: u16,
    /// UDP destination port of the quoted datagram (identifies the TTL)
    pub dst_port: u16,
    /// Probe sequence id from the quoted payload, when the router quoted it
    pub sequence: Option<u16>,
    /// TTL left in the quoted IP header
    pub quoted_ttl: u8,
}

impl ParsedResponse {
    /// Key used to look up the pending probe this reply answers
    pub fn probe_key(&self) -> ProbeKey {
        ProbeKey::new(self.original_dest, self.src_port, self.dst_port)
    }
}

/// Parse a packet read from the raw ICMPv4 socket (IPv4 header included)
///
/// Returns None if:
/// - Packet is malformed or truncated
/// - Packet is not ICMP Time Exceeded / Destination Unreachable
/// - The quoted datagram is not UDP
pub fn parse_icmp_response(data: &[u8], responder: Ipv4Addr) -> Option<ParsedResponse> {
    if data.len() < IPV4_MIN_HEADER {
        return None;
    }

    let ip_packet = Ipv4Packet::new(data)?;
    if ip_packet.get_version() != 4 || ip_packet.get_next_level_protocol().0 != IPPROTO_ICMP {
        return None;
    }

    let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
    if ip_header_len < IPV4_MIN_HEADER || data.len() < ip_header_len + ICMP_HEADER_SIZE {
        return None;
    }

    parse_icmp_message(&data[ip_header_len..], responder)
}

/// Parse an ICMP message (starting at the ICMP header)
pub fn parse_icmp_message(icmp_data: &[u8], responder: Ipv4Addr) -> Option<ParsedResponse> {
    if icmp_data.len() < ICMP_HEADER_SIZE {
        return None;
    }

    let icmp_packet = IcmpPacket::new(icmp_data)?;
    let code = icmp_packet.get_icmp_code().0;

    let kind = match icmp_packet.get_icmp_type() {
        IcmpTypes::TimeExceeded => ReplyKind::TimeExceeded,
        IcmpTypes::DestinationUnreachable if code == CODE_PORT_UNREACHABLE => {
            ReplyKind::PortUnreachable
        }
        IcmpTypes::DestinationUnreachable => ReplyKind::Unreachable(code),
        _ => return None,
    };

    parse_quoted_udp(&icmp_data[ICMP_HEADER_SIZE..], responder, kind)
}

/// Parse the original datagram quoted in an ICMP error
///
/// ICMP error format:
/// [0-7]  ICMP header
/// [8..]  Original IP header + at least 8 bytes of original payload
fn parse_quoted_udp(
    quoted: &[u8],
    responder: Ipv4Addr,
    kind: ReplyKind,
) -> Option<ParsedResponse> {
    if quoted.len() < IPV4_MIN_HEADER + UDP_HEADER_SIZE {
        return None;
    }

    let original_ip = Ipv4Packet::new(quoted)?;
    if original_ip.get_version() != 4 {
        return None;
    }
    if original_ip.get_next_level_protocol().0 != IPPROTO_UDP {
        return None;
    }

    let orig_ihl = (original_ip.get_header_length() as usize) * 4;
    if orig_ihl < IPV4_MIN_HEADER || quoted.len() < orig_ihl + UDP_HEADER_SIZE {
        return None;
    }

    let udp_data = &quoted[orig_ihl..];
    let udp = UdpPacket::new(udp_data)?;
    let sequence = extract_sequence_from_udp_payload(&udp_data[UDP_HEADER_SIZE..]);

    Some(ParsedResponse {
        responder,
        kind,
        original_dest: original_ip.get_destination(),
        src_port: udp.get_source(),
        dst_port: udp.get_destination(),
        sequence,
        quoted_ttl: original_ip.get_ttl(),
    })
}
