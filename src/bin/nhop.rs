use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nhop::config::ConfigError;
use nhop::{io, Coordinator, HopConfig, HopError, StatusCode};

#[derive(Parser)]
#[command(name = "nhop")]
#[command(about = "Count bounded-length walks between vertex pairs of a partitioned CSR graph", long_about = None)]
struct Cli {
    /// JSON configuration descriptor
    #[arg(long)]
    config: PathBuf,

    /// CSR offsets file (count, then NV + 1 values)
    #[arg(long)]
    offsets: PathBuf,

    /// CSR index file (count, then NE values)
    #[arg(long)]
    index: PathBuf,

    /// Query pairs file (count, then `src des` lines)
    #[arg(long)]
    pairs: PathBuf,

    /// Maximum walk length
    #[arg(long, default_value_t = 3)]
    hops: u32,

    /// Result path, overriding the configuration
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long, default_value_t = false)]
    summary: bool,
}

fn run(cli: Cli) -> Result<()> {
    let mut config = HopConfig::from_path(&cli.config)?;
    config.validate()?;
    config.check_binary()?;
    if cli.output.is_some() {
        config.output = cli.output;
    }

    let graph = io::load_csr::<u32>(&cli.offsets, &cli.index).context("loading CSR graph")?;
    let pairs = io::load_pairs::<u32>(&cli.pairs).context("loading query pairs")?;

    let mut coordinator = Coordinator::new(Arc::new(graph), config)?;
    let summary = coordinator.run(&pairs, cli.hops)?;

    if cli.summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for ((src, des), count) in coordinator.merge().iter() {
            println!("{src} {des} {count}");
        }
    }
    Ok(())
}

fn status_of(err: &anyhow::Error) -> StatusCode {
    if let Some(e) = err.downcast_ref::<HopError>() {
        e.status_code()
    } else if let Some(e) = err.downcast_ref::<ConfigError>() {
        e.status_code()
    } else {
        StatusCode::Failure
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let status = status_of(&err);
            error!(status = status.code(), "{err:#}");
            // Exit statuses are 0..=255; negative codes wrap like a C `exit`.
            ExitCode::from(status.code().to_le_bytes()[0])
        }
    }
}
