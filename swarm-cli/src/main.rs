mod cli;
mod error;
mod launch;
mod output;

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use swarm_supervisor::{Aggregator, ClientSupervisor, SwarmConfig};
use swarm_telemetry::{SegmentSizeLookup, StaticSizeTable};

use crate::cli::Args;
use crate::error::{CliError, Result};
use crate::launch::FfmpegFactory;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("application error: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    let size_lookup: Option<Arc<dyn SegmentSizeLookup>> = match &args.segment_sizes {
        Some(path) => Some(Arc::new(load_size_table(path)?)),
        None => None,
    };

    let config = SwarmConfig {
        clients: args.clients,
        seed: args.seed,
        socket_dir: args.socket_dir.clone(),
        ..SwarmConfig::default()
    };

    info!(
        url = %args.url,
        clients = config.clients,
        progress_sockets = config.socket_dir.is_some(),
        "starting swarm"
    );

    let factory = Arc::new(FfmpegFactory::new(&args.ffmpeg, &args.url));
    let mut supervisors = Vec::with_capacity(config.clients);
    let mut handles = Vec::with_capacity(config.clients);
    for id in 0..config.clients {
        let supervisor =
            ClientSupervisor::new(id as u64, config.clone(), factory.clone(), size_lookup.clone());
        handles.push(supervisor.handle());
        supervisors.push(supervisor);
    }

    let aggregator = Arc::new(Aggregator::new(handles));
    let token = CancellationToken::new();

    let mut runners = Vec::with_capacity(supervisors.len());
    for supervisor in &supervisors {
        runners.push(tokio::spawn(supervisor.clone().run()));
    }
    let reporter = tokio::spawn({
        let aggregator = aggregator.clone();
        let token = token.clone();
        let interval = Duration::from_secs(args.interval.max(1));
        async move {
            aggregator
                .run(interval, token, |stats| output::log_aggregate(stats))
                .await;
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    for supervisor in &supervisors {
        supervisor.stop();
    }
    token.cancel();
    for runner in runners {
        let _ = runner.await;
    }
    let _ = reporter.await;

    output::log_final_summary(&aggregator.get_debug_stats());
    Ok(())
}

/// Load `filename bytes` pairs, one per line; `#` starts a comment.
fn load_size_table(path: &Path) -> Result<StaticSizeTable> {
    let mut table = StaticSizeTable::new();
    for line in std::fs::read_to_string(path)?.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = || CliError::InvalidSizeEntry {
            path: path.to_path_buf(),
            line: line.to_string(),
        };
        let mut parts = line.split_whitespace();
        let (Some(filename), Some(bytes)) = (parts.next(), parts.next()) else {
            return Err(entry());
        };
        let bytes: u64 = bytes.parse().map_err(|_| entry())?;
        table.insert(filename, bytes);
    }
    info!(entries = table.len(), path = %path.display(), "loaded segment size table");
    Ok(table)
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
