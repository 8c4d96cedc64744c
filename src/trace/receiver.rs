use parking_lot::Mutex;
use socket2::Socket;
use std::sync::Arc;
use std::sync::atomic::AtomicU16;
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::{TraceError, TraceResult};
use crate::probe::{
    ProbeSocket, ProberFactory, create_raw_icmp_socket, is_poll_timeout, parse_icmp_response,
    recv_icmp,
};
use crate::trace::pending::{PendingMap, new_pending_map, resolve_pending};

/// Maximum consecutive errors before stopping the receiver
const MAX_CONSECUTIVE_ERRORS: u32 = 50;

/// The receiver listens for ICMP replies and routes them to waiting probes
pub struct Receiver {
    socket: Socket,
    pending: PendingMap,
    cancel: CancellationToken,
    consecutive_errors: u32,
}

impl Receiver {
    pub fn new(socket: Socket, pending: PendingMap, cancel: CancellationToken) -> Self {
        Self {
            socket,
            pending,
            cancel,
            consecutive_errors: 0,
        }
    }

    /// Run the receiver on a dedicated thread (blocking I/O)
    pub fn run_blocking(mut self) -> TraceResult<()> {
        let mut buffer = [0u8; 1500];
        let result = self.receive_loop(&mut buffer);

        // Dropping the reply senders wakes every waiting probe
        self.pending.write().clear();
        result
    }

    fn receive_loop(&mut self, buffer: &mut [u8]) -> TraceResult<()> {
        while !self.cancel.is_cancelled() {
            match recv_icmp(&self.socket, buffer) {
                Ok(recv) => {
                    self.consecutive_errors = 0;

                    let Some(parsed) = parse_icmp_response(&buffer[..recv.len], recv.source)
                    else {
                        continue;
                    };

                    let key = parsed.probe_key();
                    if resolve_pending(
                        &self.pending,
                        &key,
                        parsed.sequence,
                        parsed.responder,
                        parsed.kind,
                    ) {
                        trace!(
                            responder = %parsed.responder,
                            destination = %key.destination,
                            dst_port = key.dst_port,
                            kind = ?parsed.kind,
                            "Matched ICMP reply"
                        );
                    } else {
                        // Late arrival after timeout, or traffic from another process
                        trace!(
                            responder = %parsed.responder,
                            destination = %key.destination,
                            src_port = key.src_port,
                            "Unmatched ICMP reply"
                        );
                    }
                }
                Err(e) if is_poll_timeout(&e) => {
                    self.consecutive_errors = 0;
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    warn!(
                        error = %e,
                        count = self.consecutive_errors,
                        max = MAX_CONSECUTIVE_ERRORS,
                        "ICMP receive error"
                    );

                    if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!(last_error = %e, "Receiver stopped after consecutive errors");
                        return Err(TraceError::ReceiverStopped);
                    }
                }
            }
        }

        debug!("Receiver cancelled");
        Ok(())
    }
}

/// Spawn the receiver on a dedicated OS thread
pub fn spawn_receiver(
    socket: Socket,
    pending: PendingMap,
    cancel: CancellationToken,
) -> JoinHandle<TraceResult<()>> {
    std::thread::spawn(move || {
        let receiver = Receiver::new(socket, pending.clone(), cancel);

        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| receiver.run_blocking())) {
            Ok(result) => result,
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                error!(panic = %msg, "Receiver panicked");
                pending.write().clear();
                Err(TraceError::ReceiverStopped)
            }
        }
    })
}

/// Shared ICMP receive side: one raw socket serving every open probe socket
///
/// Creating a listener opens the raw socket, so privilege problems surface
/// here, before any probe is sent.
pub struct ProbeListener {
    pending: PendingMap,
    sequence: Arc<AtomicU16>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<TraceResult<()>>>>,
}

impl ProbeListener {
    pub fn start(cancel: CancellationToken) -> TraceResult<Self> {
        let socket = create_raw_icmp_socket()?;
        let pending = new_pending_map();
        let handle = spawn_receiver(socket, pending.clone(), cancel.clone());
        debug!("ICMP receiver started");

        Ok(Self {
            pending,
            sequence: Arc::new(AtomicU16::new(0)),
            cancel,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Number of probes currently awaiting a reply
    pub fn in_flight(&self) -> usize {
        self.pending.read().len()
    }

    /// Stop the receiver thread and wait for it to exit
    pub fn shutdown(&self) -> TraceResult<()> {
        debug!(in_flight = self.in_flight(), "Stopping ICMP receiver");
        self.cancel.cancel();
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };
        handle.join().unwrap_or(Err(TraceError::ReceiverStopped))
    }
}

impl ProberFactory for ProbeListener {
    type Prober = ProbeSocket;

    fn open(&self, port: u16) -> TraceResult<ProbeSocket> {
        if self.cancel.is_cancelled() {
            return Err(TraceError::ReceiverStopped);
        }
        ProbeSocket::open(port, self.pending.clone(), self.sequence.clone())
    }
}

impl Drop for ProbeListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
