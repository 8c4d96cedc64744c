use pnet::packet::ipv4::Ipv4Packet;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::Read;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{TraceError, TraceResult};

/// Receive buffer requested for the shared ICMP socket
const RECV_BUFFER_SIZE: usize = 1024 * 1024;

/// Poll interval for the blocking receive loop
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Create the raw ICMPv4 socket used to receive Time Exceeded / Unreachable replies
///
/// Raw sockets need root or CAP_NET_RAW; a denied creation surfaces as
/// `TraceError::SocketPermission` so the run can abort before probing.
pub fn create_raw_icmp_socket() -> TraceResult<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .map_err(TraceError::from_socket_setup)?;

    socket
        .set_nonblocking(false)
        .map_err(TraceError::from_socket_setup)?;
    socket
        .set_read_timeout(Some(RECV_POLL_INTERVAL))
        .map_err(TraceError::from_socket_setup)?;

    // Best effort: a larger buffer keeps bursts from many parallel traces
    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        tracing::debug!(error = %e, "Could not enlarge ICMP receive buffer");
    }

    Ok(socket)
}

/// Set TTL on a socket
pub fn set_ttl(socket: &Socket, ttl: u8) -> std::io::Result<()> {
    socket.set_ttl(ttl as u32)
}

/// Result of receiving one datagram from the raw ICMP socket
#[derive(Debug)]
pub struct RecvResult {
    pub len: usize,
    /// Source address taken from the IPv4 header of the reply
    pub source: Ipv4Addr,
}

/// Receive one packet (IPv4 header included) from the raw socket
///
/// Returns `WouldBlock`/`TimedOut` errors when nothing arrived within the
/// socket read timeout; callers treat those as an empty poll.
pub fn recv_icmp(socket: &Socket, buffer: &mut [u8]) -> std::io::Result<RecvResult> {
    let mut reader = socket;
    let len = reader.read(buffer)?;

    let source = Ipv4Packet::new(&buffer[..len])
        .map(|ip| ip.get_source())
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "truncated IPv4 header")
        })?;

    Ok(RecvResult { len, source })
}

/// Returns true for receive errors that only mean "no packet yet"
pub fn is_poll_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
    )
}
