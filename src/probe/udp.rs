use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::{TraceError, TraceResult};

/// UDP header size (fixed)
pub const UDP_HEADER_SIZE: usize = 8;
/// Default UDP payload size
pub const DEFAULT_UDP_PAYLOAD: usize = 16;
/// Minimum payload size (magic + sequence)
pub const MIN_UDP_PAYLOAD: usize = 6;
/// Magic prefix identifying our probes in quoted payloads
pub const PROBE_MAGIC: [u8; 4] = *b"TOPO";

/// Build a UDP probe payload carrying the probe sequence id
///
/// Layout:
/// - Bytes 0-3: magic `TOPO`
/// - Bytes 4-5: sequence id (big endian)
/// - Bytes 6+: pattern fill
pub fn build_udp_payload(sequence_id: u16, size: usize) -> Vec<u8> {
    let size = size.max(MIN_UDP_PAYLOAD);
    let mut payload = vec![0u8; size];

    payload[0..4].copy_from_slice(&PROBE_MAGIC);
    payload[4..6].copy_from_slice(&sequence_id.to_be_bytes());

    for (i, byte) in payload[6..].iter_mut().enumerate() {
        *byte = (i & 0xFF) as u8;
    }

    payload
}

/// Extract the sequence id from a quoted UDP payload
///
/// Routers are only required to quote 8 bytes past the IP header (the UDP
/// header), so the payload is frequently absent. Returns None in that case
/// or when the magic does not match.
pub fn extract_sequence_from_udp_payload(udp_payload: &[u8]) -> Option<u16> {
    if udp_payload.len() < MIN_UDP_PAYLOAD {
        return None;
    }

    if udp_payload[0..4] != PROBE_MAGIC {
        return None;
    }

    Some(u16::from_be_bytes([udp_payload[4], udp_payload[5]]))
}

/// Create a DGRAM UDP socket bound to an ephemeral source port
///
/// The kernel-assigned port is unique among open sockets, which makes it the
/// per-trace identifier in quoted ICMP payloads.
pub fn create_udp_send_socket() -> TraceResult<(Socket, u16)> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(TraceError::from_socket_setup)?;

    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    socket
        .bind(&SockAddr::from(bind_addr))
        .map_err(TraceError::from_socket_setup)?;

    let local = socket.local_addr().map_err(TraceError::from_socket_setup)?;
    let src_port = local
        .as_socket()
        .map(|addr| addr.port())
        .ok_or_else(|| {
            TraceError::SocketCreation(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "UDP socket has no local port",
            ))
        })?;

    Ok((socket, src_port))
}

/// Send a UDP probe to target
pub fn send_udp_probe(
    socket: &Socket,
    payload: &[u8],
    target: Ipv4Addr,
    port: u16,
) -> std::io::Result<usize> {
    let addr = SocketAddr::V4(SocketAddrV4::new(target, port));
    socket.send_to(payload, &SockAddr::from(addr))
}

/// Destination port for a probe at the given TTL (classic traceroute port stepping)
pub fn probe_port(base_port: u16, ttl: u8) -> u16 {
    base_port.wrapping_add(ttl as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_payload_roundtrip() {
        let payload = build_udp_payload(0xBEEF, DEFAULT_UDP_PAYLOAD);
        assert_eq!(payload.len(), DEFAULT_UDP_PAYLOAD);
        assert_eq!(extract_sequence_from_udp_payload(&payload), Some(0xBEEF));
    }

    #[test]
    fn test_udp_payload_minimum_size() {
        let payload = build_udp_payload(7, 0);
        assert_eq!(payload.len(), MIN_UDP_PAYLOAD);
        assert_eq!(extract_sequence_from_udp_payload(&payload), Some(7));
    }

    #[test]
    fn test_udp_payload_magic_validation() {
        let payload = vec![b'T', b'T', b'L', 0x00, 0x00, 0x01];
        assert!(extract_sequence_from_udp_payload(&payload).is_none());
    }

    #[test]
    fn test_udp_payload_too_short() {
        let payload = vec![b'T', b'O', b'P'];
        assert!(extract_sequence_from_udp_payload(&payload).is_none());
    }

    #[test]
    fn test_probe_port_steps_with_ttl() {
        assert_eq!(probe_port(33434, 1), 33435);
        assert_eq!(probe_port(33434, 30), 33464);
        assert_eq!(probe_port(u16::MAX, 1), 0);
    }

    #[test]
    fn test_udp_send_socket_has_port() {
        // Unprivileged DGRAM sockets should always be available
        if let Ok((_socket, port)) = create_udp_send_socket() {
            assert_ne!(port, 0);
        }
    }
}
