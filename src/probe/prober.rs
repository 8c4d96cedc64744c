//! Single-probe contract and the UDP/ICMP implementation behind it.

use async_trait::async_trait;
use socket2::Socket;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{TraceError, TraceResult};
use crate::probe::socket::set_ttl;
use crate::probe::udp::{
    DEFAULT_UDP_PAYLOAD, build_udp_payload, create_udp_send_socket, probe_port, send_udp_probe,
};
use crate::state::{HopRecord, Probe, ProbeKey, ReplyKind};
use crate::trace::pending::{PendingMap, PendingProbe, ProbeReply};

/// Sends one TTL-limited probe and waits for its reply or a timeout.
///
/// A timeout is a valid outcome and yields a silent `HopRecord`; `Err` is
/// reserved for failures that make further probing of this destination pointless.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(
        &self,
        destination: Ipv4Addr,
        ttl: u8,
        timeout: Duration,
    ) -> TraceResult<HopRecord>;
}

/// Opens one prober per destination trace, all sharing the receive side
pub trait ProberFactory: Send + Sync + 'static {
    type Prober: Prober + 'static;

    fn open(&self, port: u16) -> TraceResult<Self::Prober>;
}

/// UDP send socket for one trace, correlated through the shared pending map
pub struct ProbeSocket {
    socket: Socket,
    src_port: u16,
    base_port: u16,
    pending: PendingMap,
    sequence: Arc<AtomicU16>,
}

impl ProbeSocket {
    pub fn open(base_port: u16, pending: PendingMap, sequence: Arc<AtomicU16>) -> TraceResult<Self> {
        let (socket, src_port) = create_udp_send_socket()?;
        trace!(src_port, base_port, "Opened probe socket");

        Ok(Self {
            socket,
            src_port,
            base_port,
            pending,
            sequence,
        })
    }

    /// Ephemeral source port identifying this socket's probes
    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    fn send(&self, probe: &Probe, key: ProbeKey) -> TraceResult<oneshot::Receiver<ProbeReply>> {
        let send_err = |source| TraceError::ProbeSend {
            destination: probe.destination,
            ttl: probe.ttl,
            source,
        };

        set_ttl(&self.socket, probe.ttl).map_err(send_err)?;

        let payload = build_udp_payload(probe.sequence_id, DEFAULT_UDP_PAYLOAD);
        let (reply_tx, reply_rx) = oneshot::channel();

        // Register pending BEFORE sending to prevent race with fast responses
        self.pending.write().insert(
            key,
            PendingProbe {
                probe: *probe,
                reply_tx,
            },
        );

        if let Err(e) = send_udp_probe(&self.socket, &payload, probe.destination, key.dst_port) {
            self.pending.write().remove(&key);
            return Err(send_err(e));
        }

        Ok(reply_rx)
    }
}

#[async_trait]
impl Prober for ProbeSocket {
    async fn probe(
        &self,
        destination: Ipv4Addr,
        ttl: u8,
        timeout: Duration,
    ) -> TraceResult<HopRecord> {
        let sequence_id = self.sequence.fetch_add(1, Ordering::Relaxed);
        let key = ProbeKey::new(destination, self.src_port, probe_port(self.base_port, ttl));
        let probe = Probe::new(destination, ttl, sequence_id);

        let reply_rx = self.send(&probe, key)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(match reply.kind {
                ReplyKind::TimeExceeded => HopRecord::intermediate(ttl, reply.responder, reply.rtt),
                ReplyKind::PortUnreachable => HopRecord::destination(ttl, destination, reply.rtt),
                ReplyKind::Unreachable(code) => {
                    HopRecord::unreachable(ttl, reply.responder, reply.rtt, code)
                }
            }),
            // Sender dropped: the receiver thread exited
            Ok(Err(_)) => Err(TraceError::ReceiverStopped),
            Err(_) => {
                self.pending.write().remove(&key);
                Ok(HopRecord::silent(ttl))
            }
        }
    }
}
