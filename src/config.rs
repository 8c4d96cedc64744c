use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Args;

pub const DEFAULT_PORT: u16 = 33434;
pub const DEFAULT_MAX_HOPS: u8 = 30;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
/// Upper bound on the default worker count
pub const MAX_DEFAULT_WORKERS: usize = 32;

/// How the finished report is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Hop-by-hop text report
    #[default]
    Report,
    Json,
    Csv,
    Dot,
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base destination port
    pub port: u16,
    /// Per-probe timeout
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Maximum TTL
    pub max_hops: u8,
    pub parallel: bool,
    /// Concurrent trace limit (None = min(destinations, 32))
    pub workers: Option<usize>,
    /// Consecutive silent hops before giving up (None = disabled)
    pub silent_limit: Option<u8>,
    pub output: OutputFormat,
    /// Output file (None = stdout)
    pub output_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            max_hops: DEFAULT_MAX_HOPS,
            parallel: false,
            workers: None,
            silent_limit: None,
            output: OutputFormat::Report,
            output_path: None,
        }
    }
}

impl Config {
    /// Effective worker limit for a run over `destinations` targets
    pub fn worker_limit(&self, destinations: usize) -> usize {
        self.workers
            .unwrap_or_else(|| destinations.min(MAX_DEFAULT_WORKERS))
            .max(1)
    }
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        let output = if args.json {
            OutputFormat::Json
        } else if args.csv {
            OutputFormat::Csv
        } else if args.dot {
            OutputFormat::Dot
        } else {
            OutputFormat::Report
        };

        Self {
            port: args.port,
            timeout: args.timeout_duration(),
            max_hops: args.max_hops,
            parallel: args.parallel,
            workers: args.workers,
            silent_limit: args.silent_limit,
            output,
            output_path: args.output.clone(),
        }
    }
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
