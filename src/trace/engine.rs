//! Fan-out of hop traces over many destinations into one topology graph.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_MAX_HOPS};
use crate::error::{TraceError, TraceResult};
use crate::probe::ProberFactory;
use crate::state::{DestinationTrace, HopSequence, TraceReport};
use crate::topology::TopologyGraph;
use crate::trace::tracer::HopTracer;

/// Runs a `HopTracer` per destination and folds every sequence into one graph
pub struct TraceOrchestrator<F: ProberFactory> {
    tracer: HopTracer<F>,
    max_hops: u8,
}

impl<F: ProberFactory> TraceOrchestrator<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            tracer: HopTracer::new(factory),
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    pub fn from_config(factory: Arc<F>, config: &Config) -> Self {
        Self::new(factory)
            .with_max_hops(config.max_hops)
            .with_silent_limit(config.silent_limit)
    }

    pub fn with_max_hops(mut self, max_hops: u8) -> Self {
        self.max_hops = max_hops.max(1);
        self
    }

    pub fn with_silent_limit(mut self, limit: Option<u8>) -> Self {
        self.tracer = self.tracer.with_silent_limit(limit);
        self
    }

    /// Trace every destination and merge the results
    ///
    /// Duplicate destinations are traced once. In parallel mode at most
    /// `worker_limit` traces run at a time and the rest queue for a free slot.
    /// A failed trace is collected in `failures` and never cancels the others.
    pub async fn run(
        &self,
        destinations: &[Ipv4Addr],
        parallel: bool,
        worker_limit: usize,
        timeout: Duration,
        port: u16,
    ) -> TraceReport {
        let started_at = Utc::now();
        let targets = dedup_destinations(destinations);

        info!(
            destinations = targets.len(),
            parallel,
            worker_limit,
            max_hops = self.max_hops,
            "Starting topology run"
        );

        let (mut graph, results) = if parallel {
            self.run_parallel(&targets, worker_limit, timeout, port).await
        } else {
            self.run_sequential(&targets, timeout, port).await
        };

        let mut traces = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(sequence) => {
                    if !sequence.reached() {
                        graph.register_target(sequence.destination);
                    }
                    traces.push(DestinationTrace::new(sequence));
                }
                Err(e) => failures.push(e),
            }
        }

        let stats = graph.stats();
        info!(
            nodes = stats.node_count,
            edges = stats.edge_count,
            completed = traces.len(),
            failed = failures.len(),
            "Topology run finished"
        );

        TraceReport {
            started_at,
            finished_at: Utc::now(),
            stats,
            graph,
            traces,
            failures,
        }
    }

    async fn run_sequential(
        &self,
        targets: &[Ipv4Addr],
        timeout: Duration,
        port: u16,
    ) -> (TopologyGraph, Vec<TraceResult<HopSequence>>) {
        let mut graph = TopologyGraph::new();
        let mut results = Vec::with_capacity(targets.len());

        for &destination in targets {
            let result = self
                .tracer
                .trace(destination, self.max_hops, timeout, port)
                .await;
            log_result(destination, &result);
            if let Ok(sequence) = &result {
                graph.merge(sequence);
            }
            results.push(result);
        }

        (graph, results)
    }

    async fn run_parallel(
        &self,
        targets: &[Ipv4Addr],
        worker_limit: usize,
        timeout: Duration,
        port: u16,
    ) -> (TopologyGraph, Vec<TraceResult<HopSequence>>) {
        let graph = Arc::new(Mutex::new(TopologyGraph::new()));
        let semaphore = Arc::new(Semaphore::new(worker_limit.max(1)));
        let mut workers = JoinSet::new();
        let mut slots = HashMap::with_capacity(targets.len());

        for (index, &destination) in targets.iter().enumerate() {
            let tracer = self.tracer.clone();
            let graph = graph.clone();
            let semaphore = semaphore.clone();
            let max_hops = self.max_hops;

            let handle = workers.spawn(async move {
                // The semaphore is never closed, so a permit always arrives
                let _permit = semaphore.acquire_owned().await.ok();
                debug!(destination = %destination, "Worker picked up destination");

                let result = tracer.trace(destination, max_hops, timeout, port).await;
                log_result(destination, &result);
                if let Ok(sequence) = &result {
                    graph.lock().merge(sequence);
                }
                (index, result)
            });
            slots.insert(handle.id(), (index, destination));
        }

        let mut results: Vec<Option<TraceResult<HopSequence>>> =
            (0..targets.len()).map(|_| None).collect();

        while let Some(joined) = workers.join_next_with_id().await {
            match joined {
                Ok((_, (index, result))) => results[index] = Some(result),
                Err(e) => {
                    let Some(&(index, destination)) = slots.get(&e.id()) else {
                        continue;
                    };
                    warn!(destination = %destination, error = %e, "Trace worker aborted");
                    results[index] =
                        Some(Err(TraceError::WorkerAborted(e.to_string()).for_destination(destination)));
                }
            }
        }

        let graph = Arc::try_unwrap(graph)
            .map(Mutex::into_inner)
            .unwrap_or_else(|shared| shared.lock().clone());

        (graph, results.into_iter().flatten().collect())
    }
}

/// Remove repeated destinations, keeping first-seen order
pub fn dedup_destinations(destinations: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let mut seen = HashSet::with_capacity(destinations.len());
    destinations
        .iter()
        .copied()
        .filter(|d| seen.insert(*d))
        .collect()
}

fn log_result(destination: Ipv4Addr, result: &TraceResult<HopSequence>) {
    match result {
        Ok(sequence) => info!(
            destination = %destination,
            hops = sequence.len(),
            silent = sequence.silent_count(),
            outcome = ?sequence.outcome(),
            "Trace complete"
        ),
        Err(e) => warn!(destination = %destination, error = %e, "Trace failed"),
    }
}
