use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use topologer::cli::Args;
use topologer::config::{Config, OutputFormat};
use topologer::export::{export_csv, export_dot, export_json, generate_report};
use topologer::state::TraceReport;
use topologer::targets::{random_public_ips, resolve_destinations};
use topologer::trace::{ProbeListener, TraceOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_logging(args.verbose);
    let config = Config::from(&args);

    // Collect destinations from the command line and the random generator
    let mut inputs = args.destinations.clone();
    if let Some(count) = args.random {
        let generated = random_public_ips(count, &mut rand::thread_rng());
        info!(count, destinations = ?generated, "Generated random public destinations");
        inputs.extend(generated.iter().map(ToString::to_string));
    }

    let resolved = resolve_destinations(&inputs);
    for rejected in &resolved.rejected {
        warn!(error = %rejected, "Skipping destination");
    }
    if resolved.addrs.is_empty() {
        eprintln!("Error: No valid destinations specified");
        std::process::exit(1);
    }

    // Opening the ICMP receiver checks privileges before any probe is sent
    let cancel = CancellationToken::new();
    let listener = match ProbeListener::start(cancel.clone()) {
        Ok(listener) => Arc::new(listener),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        destinations = resolved.addrs.len(),
        port = config.port,
        timeout_secs = config.timeout.as_secs_f64(),
        max_hops = config.max_hops,
        parallel = config.parallel,
        "Tracing"
    );

    let orchestrator = TraceOrchestrator::from_config(listener.clone(), &config);
    let mut report = orchestrator
        .run(
            &resolved.addrs,
            config.parallel,
            config.worker_limit(resolved.addrs.len()),
            config.timeout,
            config.port,
        )
        .await;

    if let Err(e) = listener.shutdown() {
        warn!(error = %e, "ICMP receiver exited with error");
    }

    report.add_failures(resolved.rejected);
    write_output(&report, &config)
}

/// Log to stderr: info by default, debug with --verbose, RUST_LOG wins
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn write_output(report: &TraceReport, config: &Config) -> Result<()> {
    let mut out: Box<dyn Write> = match &config.output_path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    match config.output {
        OutputFormat::Report => generate_report(report, &mut out)?,
        OutputFormat::Json => export_json(report, &mut out)?,
        OutputFormat::Csv => export_csv(&report.graph, &mut out)?,
        OutputFormat::Dot => export_dot(&report.graph, &mut out)?,
    }

    out.flush().context("Failed to write output")?;
    Ok(())
}
