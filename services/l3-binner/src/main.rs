//! Level-3 binner.
//!
//! Bins a set of Zarr source products onto a global equal-area grid and
//! writes one sparse or dense bin file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use bin_writer::BinFileFormat;
use binning_common::{MeanAggregator, SeaGrid};
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use l3_binner::{find_products, BinningRun, BinningRunConfig, ZarrProduct};

#[derive(Parser, Debug)]
#[command(name = "l3-binner")]
#[command(about = "Spatial and temporal binning of satellite products into a Level-3 bin file")]
struct Args {
    /// Run configuration file
    #[arg(short, long, env = "L3_CONFIG")]
    config: PathBuf,

    /// Output bin file (overrides the configuration)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: sparse or dense (overrides the configuration)
    #[arg(short, long)]
    format: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;
    bin_store::install_cleanup_hook();

    info!(config = %args.config.display(), "Starting L3 binner");

    let mut config = BinningRunConfig::load(&args.config)?;
    if let Some(output) = &args.output {
        config.output.path = output.clone();
    }
    if let Some(format) = &args.format {
        config.output.format = BinFileFormat::from_str(format)
            .with_context(|| format!("Unknown output format '{}'", format))?;
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current product");
                cancelled.store(true, Ordering::SeqCst);
            }
        });
    }

    let result = tokio::task::spawn_blocking(move || {
        let grid = SeaGrid::new(config.num_rows);
        let aggregator = MeanAggregator::new(config.variables.clone());
        let paths = find_products(&config.sources);
        info!(products = paths.len(), num_rows = config.num_rows, "Found source products");

        let products = paths.iter().map(|path| {
            ZarrProduct::open(path).with_context(|| format!("Failed to read product {:?}", path))
        });
        BinningRun::new(&config, &grid, &aggregator)
            .with_cancel_flag(&cancelled)
            .run(products)
    })
    .await?;

    match result {
        Ok(summary) => {
            for (product, reason) in &summary.rejected {
                info!(product = %product, reason = %reason, "Rejected product");
            }
            match &summary.output {
                Some(path) => info!(
                    path = %path.display(),
                    bins = summary.bins_written,
                    accepted = summary.accepted,
                    "Bin file written"
                ),
                None => warn!(accepted = summary.accepted, "No bin file written"),
            }
            Ok(())
        }
        Err(e) => {
            let removed = bin_store::cleanup_registered();
            error!(error = %format!("{:#}", e), scratch_dirs_removed = removed, "Binning run failed");
            Err(e)
        }
    }
}
