use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Multi-destination UDP traceroute that merges every path into one topology graph
#[derive(Parser, Debug, Clone)]
#[command(name = "topologer")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Destinations to trace (IPv4 address or hostname)
    pub destinations: Vec<String>,

    /// Generate COUNT random public IPv4 addresses to trace
    #[arg(short = 'r', long = "random", value_name = "COUNT")]
    pub random: Option<usize>,

    /// Base destination UDP port (probe at TTL n goes to port + n)
    #[arg(long = "port", default_value = "33434")]
    pub port: u16,

    /// Per-probe timeout in seconds
    #[arg(short = 't', long = "timeout", default_value = "2")]
    pub timeout: f64,

    /// Maximum TTL (hops)
    #[arg(short = 'm', long = "max-hops", default_value = "30")]
    pub max_hops: u8,

    /// Trace destinations concurrently
    #[arg(long = "parallel")]
    pub parallel: bool,

    /// Maximum concurrent traces with --parallel (default: min(destinations, 32))
    #[arg(long = "workers", requires = "parallel")]
    pub workers: Option<usize>,

    /// Stop a trace after this many consecutive silent hops
    #[arg(long = "silent-limit", value_name = "HOPS")]
    pub silent_limit: Option<u8>,

    /// Output the full report as JSON
    #[arg(long = "json", conflicts_with_all = ["csv", "dot"])]
    pub json: bool,

    /// Output topology edges as CSV
    #[arg(long = "csv", conflicts_with = "dot")]
    pub csv: bool,

    /// Output the topology as a Graphviz DOT graph
    #[arg(long = "dot")]
    pub dot: bool,

    /// Write output to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.destinations.is_empty() && self.random.is_none() {
            return Err("Provide destination addresses or use --random COUNT".into());
        }

        if self.random == Some(0) {
            return Err("--random COUNT must be a positive integer".into());
        }

        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err("Timeout must be positive".into());
        }

        if self.max_hops == 0 {
            return Err("Max hops must be at least 1".into());
        }

        // Destination ports for every TTL must fit in u16
        if self.port as u32 + self.max_hops as u32 > u16::MAX as u32 {
            return Err(format!(
                "Port {} leaves no room for {} hops (port + max hops must not exceed {})",
                self.port,
                self.max_hops,
                u16::MAX
            ));
        }

        if self.workers == Some(0) {
            return Err("Workers must be at least 1".into());
        }

        if self.silent_limit == Some(0) {
            return Err("Silent hop limit must be at least 1".into());
        }

        Ok(())
    }
}
