//! Shared pending probe tracking.
//!
//! Every open probe socket inserts an entry before sending a probe, and the
//! receiver thread removes it when the matching ICMP reply arrives, handing the
//! reply to the waiting trace through a oneshot channel.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::state::{Probe, ProbeKey, ReplyKind};

/// Reply delivered by the receiver to the probe that is waiting for it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReply {
    pub responder: Ipv4Addr,
    pub kind: ReplyKind,
    pub rtt: Duration,
}

/// A probe that has been sent and is awaiting a response
#[derive(Debug)]
pub struct PendingProbe {
    pub probe: Probe,
    pub reply_tx: oneshot::Sender<ProbeReply>,
}

/// Thread-safe map of pending probes keyed by (destination, src port, dst port)
pub type PendingMap = Arc<RwLock<HashMap<ProbeKey, PendingProbe>>>;

/// Create a new empty pending map
pub fn new_pending_map() -> PendingMap {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Hand a parsed reply to the probe waiting on `key`
///
/// The entry is only consumed when the quoted payload token (if the router
/// quoted one) matches the pending probe. Returns true if a probe was resolved.
pub fn resolve_pending(
    pending: &PendingMap,
    key: &ProbeKey,
    sequence: Option<u16>,
    responder: Ipv4Addr,
    kind: ReplyKind,
) -> bool {
    let entry = {
        let mut pending = pending.write();
        match pending.get(key) {
            Some(entry) if sequence.is_none_or(|s| s == entry.probe.sequence_id) => {
                pending.remove(key)
            }
            _ => None,
        }
    };

    match entry {
        Some(entry) => {
            let reply = ProbeReply {
                responder,
                kind,
                rtt: entry.probe.elapsed(),
            };
            // Receiver side may have already given up (timeout raced the reply)
            entry.reply_tx.send(reply).is_ok()
        }
        None => false,
    }
}
