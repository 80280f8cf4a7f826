//! adssrv service binary
//!
//! Loads and validates the YAML config, initializes logging, assembles the
//! worker group and runs it until ctrl-c / SIGTERM. Device links are backed
//! by the in-process simulator; a wire-level ADS provider slots in by
//! replacing the transport factory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use adssrv::{
    build_group, AppConfig, GroupBuildOptions, LinkMetrics, PlcValue, SimulatedPlc,
    TransportFactory, WorkerRole,
};

#[derive(Parser)]
#[command(name = "adssrv", about = "Resilient cyclic ADS client service", version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/adssrv.yml", env = "ADSSRV_CONFIG")]
    config: PathBuf,

    /// Log level override (takes precedence over the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.service.log_level);
    init_logging(level);

    if args.validate {
        info!(
            "Configuration OK: {} workers, {} buffers",
            config.workers.len(),
            config.buffers.len()
        );
        return Ok(());
    }

    info!(
        "Starting {} with {} workers",
        config.service.name,
        config.workers.len()
    );

    let metrics = LinkMetrics::new();
    let factory = simulator_factory(&config);

    let group = build_group(&config, &metrics, &factory, GroupBuildOptions::default())?;
    group.run_until_shutdown().await?;

    info!("{} stopped", config.service.name);
    Ok(())
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

/// One simulated device per configured AMS net id, seeded with every
/// polled variable so readers find their symbols
fn simulator_factory(config: &AppConfig) -> TransportFactory {
    let mut devices: HashMap<String, SimulatedPlc> = HashMap::new();
    let all_names: Vec<String> = config
        .workers
        .values()
        .filter(|w| w.role == WorkerRole::Reader)
        .flat_map(|w| w.data_names.iter().cloned())
        .collect();

    for worker in config.workers.values() {
        let device = devices
            .entry(worker.ams_net_id.clone())
            .or_insert_with(SimulatedPlc::new);
        for name in &all_names {
            device.seed(name, PlcValue::Int(0));
        }
    }

    Arc::new(move |_name, worker| {
        let device = devices
            .get(&worker.ams_net_id)
            .expect("factory built from the same config")
            .clone();
        Box::new(device.link())
    })
}
