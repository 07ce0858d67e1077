// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PLC cycle monitor daemon entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use plc_cycle_monitor::config::{Config, CONFIG_SCHEMA};
use plc_cycle_monitor::daemon::Daemon;

/// Continuous cycle monitoring for Mitsubishi PLC workstations
#[derive(Parser, Debug)]
#[command(name = "plc_cycle_monitor", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the embedded configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.show_config_schema {
        println!("{}", CONFIG_SCHEMA);
        return Ok(());
    }

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Cannot load configuration from {:?}", args.config))?;
    info!(
        "Loaded configuration with {} device(s)",
        config.devices.len()
    );

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    info!("Shutdown signal received");

    daemon.shutdown();
    daemon.join().await?;
    info!("Daemon stopped");
    Ok(())
}
