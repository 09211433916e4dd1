mod accounting;
mod api;
mod capture;
mod models;
mod sensor;
mod sink;
mod utils;

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use crate::accounting::interval::IntervalAccumulator;
use crate::accounting::rollup::RollupStore;
use crate::accounting::subnet::SubnetMatcher;
use crate::api::handlers::stats::AppState;
use crate::api::routes;
use crate::capture::source::CaptureSource;
use crate::models::config::AppConfig;
use crate::sensor::{IntakeCounters, SensorLoop};
use crate::utils::logging;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Passive per-subnet traffic accounting daemon")]
struct Args {
    /// Network interface to capture from
    #[clap(short, long)]
    interface: Option<String>,

    /// Path of a TOML configuration file; command-line flags override it
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Port for the REST reporting API
    #[clap(short, long)]
    port: Option<u16>,

    /// Enable promiscuous mode
    #[clap(short = 'P', long)]
    promiscuous: bool,

    /// BPF filter expression
    #[clap(long)]
    filter: Option<String>,

    /// Sampling interval in seconds
    #[clap(long)]
    interval: Option<u64>,

    /// Intervals to skip between report generations
    #[clap(long)]
    skip_intervals: Option<u64>,

    /// Include subnet (CIDR); may be given multiple times
    #[clap(long = "subnet")]
    subnets: Vec<String>,

    /// Exclude subnet (CIDR); may be given multiple times
    #[clap(long = "not-subnet")]
    not_subnets: Vec<String>,

    /// Pair-tracked subnet (CIDR); may be given multiple times
    #[clap(long = "txrx-subnet")]
    txrx_subnets: Vec<String>,

    /// SQLite database to persist interval snapshots to
    #[clap(long)]
    sqlite: Option<PathBuf>,

    /// Directory to write per-day CSV snapshot files to
    #[clap(long)]
    csv_dir: Option<PathBuf>,

    /// File the plain-text distribution report is written to
    #[clap(long)]
    cdf_file: Option<PathBuf>,

    /// List capture-capable interfaces and exit
    #[clap(long)]
    list_interfaces: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info")]
    log_level: String,
}

/// Command-line flags win over the configuration file
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if args.interface.is_some() {
        config.interface = args.interface.clone();
    }
    if args.filter.is_some() {
        config.filter = args.filter.clone();
    }
    if args.promiscuous {
        config.promiscuous = true;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }
    if let Some(skip) = args.skip_intervals {
        config.skip_intervals = skip;
    }
    if !args.subnets.is_empty() {
        config.subnets = args.subnets.clone();
    }
    if !args.not_subnets.is_empty() {
        config.not_subnets = args.not_subnets.clone();
    }
    if !args.txrx_subnets.is_empty() {
        config.txrx_subnets = args.txrx_subnets.clone();
    }
    if args.sqlite.is_some() {
        config.sqlite_path = args.sqlite.clone();
    }
    if args.csv_dir.is_some() {
        config.csv_dir = args.csv_dir.clone();
    }
    if args.cdf_file.is_some() {
        config.cdf_path = args.cdf_file.clone();
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger with specified level
    logging::init_logger(logging::get_log_level(&args.log_level));

    info!("Starting rustband v{}", env!("CARGO_PKG_VERSION"));

    if args.list_interfaces {
        for name in CaptureSource::list_interfaces() {
            println!("{}", name);
        }
        return Ok(());
    }

    // Load configuration file if given, then layer CLI flags on top
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            AppConfig::from_file(path)?
        }
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    if config.interface.is_none() {
        warn!("Available interfaces:");
        for name in CaptureSource::list_interfaces() {
            warn!("  {}", name);
        }
        anyhow::bail!("No capture interface specified (use --interface)");
    }

    // Build the accounting pipeline
    let matcher = SubnetMatcher::new(&config.subnets, &config.not_subnets, &config.txrx_subnets)?;
    let accumulator = IntervalAccumulator::new(matcher);
    let rollup = Arc::new(RwLock::new(RollupStore::new(
        &config.effective_tiers(),
        config.interval_secs,
    )));
    let counters = Arc::new(IntakeCounters::default());
    let sinks = sink::build_sinks(&config)?;

    // Start capture before the API so startup failures surface early
    let (rx, capture_handle) = CaptureSource::start(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sensor = SensorLoop::new(&config, accumulator, rollup.clone(), sinks, counters.clone());
    let sensor_handle = tokio::spawn(sensor.run(rx, shutdown_rx));

    let state = web::Data::new(AppState {
        rollup,
        counters,
        started_at: Utc::now(),
        interface: config.interface.clone().unwrap_or_default(),
        interval_secs: config.interval_secs,
    });

    info!("Starting reporting API server on port {}", config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(("127.0.0.1", config.port))?
    .run()
    .await?;

    // Server exited; stop accounting and let the final interval flush
    info!("API server stopped, shutting down accounting pipeline");
    let _ = shutdown_tx.send(true);
    if let Err(e) = sensor_handle.await {
        error!("Sensor loop task failed: {}", e);
    }
    // The capture loop notices the closed channel on its next read
    // timeout and exits on its own.
    if let Err(e) = capture_handle.await {
        error!("Capture task failed: {}", e);
    }

    Ok(())
}
