// Public API - data types, topology and export functions
pub mod config;
pub mod error;
pub mod export;
pub mod state;
pub mod targets;
pub mod topology;

// Probing and orchestration
pub mod cli;
pub mod probe;
pub mod trace;

pub use error::{TraceError, TraceResult};
pub use probe::{ProbeSocket, Prober, ProberFactory};
pub use state::{DestinationTrace, HopRecord, HopSequence, TraceOutcome, TraceReport};
pub use topology::{GraphStats, NodeId, NodeRole, TopologyEdge, TopologyGraph, TopologyNode};
pub use trace::{HopTracer, ProbeListener, TraceOrchestrator};
