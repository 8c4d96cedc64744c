//! Per-destination TTL loop.
//!
//! One probe per TTL, strictly sequential: ttl N+1 is never sent before the
//! probe at ttl N has produced a reply or timed out.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::TraceResult;
use crate::probe::{Prober, ProberFactory};
use crate::state::HopSequence;

/// Drives the TTL loop for a single destination
pub struct HopTracer<F: ProberFactory> {
    factory: Arc<F>,
    /// Stop after this many consecutive silent hops (None = explore the full bound)
    silent_limit: Option<u8>,
}

impl<F: ProberFactory> Clone for HopTracer<F> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            silent_limit: self.silent_limit,
        }
    }
}

impl<F: ProberFactory> HopTracer<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            silent_limit: None,
        }
    }

    pub fn with_silent_limit(mut self, limit: Option<u8>) -> Self {
        self.silent_limit = limit.filter(|&n| n > 0);
        self
    }

    /// Trace the path to `destination`
    ///
    /// Returns a sequence that either ends with the destination's record or
    /// stops at `max_hops` (or earlier on a dead end or the silent-hop limit).
    /// Any error is tagged with the destination.
    pub async fn trace(
        &self,
        destination: Ipv4Addr,
        max_hops: u8,
        timeout: Duration,
        port: u16,
    ) -> TraceResult<HopSequence> {
        self.run(destination, max_hops, timeout, port)
            .await
            .map_err(|e| e.for_destination(destination))
    }

    async fn run(
        &self,
        destination: Ipv4Addr,
        max_hops: u8,
        timeout: Duration,
        port: u16,
    ) -> TraceResult<HopSequence> {
        let prober = self.factory.open(port)?;
        let mut sequence = HopSequence::new(destination);
        let mut silent_streak: u8 = 0;

        debug!(destination = %destination, max_hops, "Starting trace");

        for ttl in 1..=max_hops {
            let record = prober.probe(destination, ttl, timeout).await?;

            trace!(
                destination = %destination,
                ttl,
                responder = ?record.responder,
                rtt_ms = ?record.rtt_ms,
                "Hop recorded"
            );

            let silent = record.is_silent();
            let reached = record.reached_destination;
            let dead_end = record.is_dead_end();
            sequence.push(record);

            if reached {
                debug!(destination = %destination, ttl, "Reached destination");
                break;
            }
            if dead_end {
                debug!(destination = %destination, ttl, "Destination unreachable, stopping");
                break;
            }

            silent_streak = if silent { silent_streak + 1 } else { 0 };
            if let Some(limit) = self.silent_limit
                && silent_streak >= limit
            {
                debug!(destination = %destination, ttl, limit, "Silent hop limit hit, stopping");
                break;
            }
        }

        Ok(sequence)
    }
}
