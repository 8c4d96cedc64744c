use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Identifies an in-flight probe for correlation against quoted ICMP payloads
///
/// The UDP source port is unique per open probe socket (one per trace) and the
/// destination port encodes the TTL, so the triple is unique per in-flight probe.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct ProbeKey {
    pub destination: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl ProbeKey {
    pub fn new(destination: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        Self {
            destination,
            src_port,
            dst_port,
        }
    }
}

/// A single probe attempt, discarded once a reply or timeout is recorded
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub destination: Ipv4Addr,
    pub ttl: u8,
    pub sequence_id: u16,
    pub sent_at: Instant,
}

impl Probe {
    pub fn new(destination: Ipv4Addr, ttl: u8, sequence_id: u16) -> Self {
        Self {
            destination,
            ttl,
            sequence_id,
            sent_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.sent_at.elapsed()
    }
}

/// Kind of ICMP reply that produced a hop record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum ReplyKind {
    /// Type 11: TTL expired at an intermediate router
    TimeExceeded,
    /// Type 3 code 3: the probe reached the destination host
    PortUnreachable,
    /// Type 3 with any other code (net/host unreachable, admin prohibited...)
    Unreachable(u8),
}

/// Outcome of one probe at one TTL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopRecord {
    pub ttl: u8,
    /// `None` encodes a silent hop (no reply before timeout)
    pub responder: Option<Ipv4Addr>,
    pub rtt_ms: Option<f64>,
    pub reached_destination: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyKind>,
}

impl HopRecord {
    /// A hop that did not answer before the probe timeout
    pub fn silent(ttl: u8) -> Self {
        Self {
            ttl,
            responder: None,
            rtt_ms: None,
            reached_destination: false,
            reply: None,
        }
    }

    /// A router answered with Time Exceeded
    pub fn intermediate(ttl: u8, responder: Ipv4Addr, rtt: Duration) -> Self {
        Self {
            ttl,
            responder: Some(responder),
            rtt_ms: Some(duration_ms(rtt)),
            reached_destination: false,
            reply: Some(ReplyKind::TimeExceeded),
        }
    }

    /// The destination answered with Port Unreachable
    pub fn destination(ttl: u8, destination: Ipv4Addr, rtt: Duration) -> Self {
        Self {
            ttl,
            responder: Some(destination),
            rtt_ms: Some(duration_ms(rtt)),
            reached_destination: true,
            reply: Some(ReplyKind::PortUnreachable),
        }
    }

    /// A router reported the destination as unreachable for another reason
    pub fn unreachable(ttl: u8, responder: Ipv4Addr, rtt: Duration, code: u8) -> Self {
        Self {
            ttl,
            responder: Some(responder),
            rtt_ms: Some(duration_ms(rtt)),
            reached_destination: false,
            reply: Some(ReplyKind::Unreachable(code)),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.responder.is_none()
    }

    /// True if this record ends the path without reaching the destination
    pub fn is_dead_end(&self) -> bool {
        matches!(self.reply, Some(ReplyKind::Unreachable(_)))
    }
}

/// Ordered hop records for exactly one destination, ascending by TTL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopSequence {
    pub destination: Ipv4Addr,
    pub hops: Vec<HopRecord>,
}

impl HopSequence {
    pub fn new(destination: Ipv4Addr) -> Self {
        Self {
            destination,
            hops: Vec::new(),
        }
    }

    pub fn with_hops(destination: Ipv4Addr, hops: Vec<HopRecord>) -> Self {
        Self { destination, hops }
    }

    pub fn push(&mut self, record: HopRecord) {
        self.hops.push(record);
    }

    pub fn last(&self) -> Option<&HopRecord> {
        self.hops.last()
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Whether the terminal record reached the destination
    pub fn reached(&self) -> bool {
        self.hops.last().is_some_and(|h| h.reached_destination)
    }

    /// TTL at which the destination answered, if it did
    pub fn dest_ttl(&self) -> Option<u8> {
        self.hops
            .iter()
            .find(|h| h.reached_destination)
            .map(|h| h.ttl)
    }

    /// Hops that produced a reply
    pub fn responding(&self) -> impl Iterator<Item = &HopRecord> {
        self.hops.iter().filter(|h| !h.is_silent())
    }

    pub fn silent_count(&self) -> usize {
        self.hops.iter().filter(|h| h.is_silent()).count()
    }

    pub fn outcome(&self) -> TraceOutcome {
        match self.dest_ttl() {
            Some(hops) => TraceOutcome::Reached { hops },
            None => TraceOutcome::Unresolved,
        }
    }
}

/// How a completed trace ended
///
/// A failed trace never produces a `HopSequence`; it is reported as a
/// `TraceError::TraceFailure` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TraceOutcome {
    Reached { hops: u8 },
    /// Destination not reached within the hop bound
    Unresolved,
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
