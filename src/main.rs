//! apc-mux - APC mini multiplexer
//!
//! Shares one Akai APC mini between the plugins listed in the configuration.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apc_mux::apc::{discovery, ApcMini};
use apc_mux::config::AppConfig;
use apc_mux::device::{DeviceDriver, MemoryDevice};
use apc_mux::multiplexer::Multiplexer;
use apc_mux::plugins::PluginRegistry;

/// APC mux - share an Akai APC mini between several plugins
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "APC_MUX_CONFIG", default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Run against an in-memory device instead of the APC mini
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting apc-mux v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        list_ports_formatted();
        return Ok(());
    }

    info!("Configuration file: {}", args.config);
    let config = AppConfig::load(&args.config).await?;
    info!("Configuration loaded: {} plugin(s)", config.plugins.len());

    let driver = open_driver(&config, args.dry_run)?;
    let mux = Multiplexer::new(driver, config.mux_options()).context("Failed to attach to device")?;

    if let Err(e) = register_plugins(&mux, &config) {
        shutdown(&mux);
        return Err(e);
    }

    run(&mux, &config, args.dry_run).await?;

    shutdown(&mux);
    info!("apc-mux shutdown complete");
    Ok(())
}

fn open_driver(config: &AppConfig, dry_run: bool) -> Result<Arc<dyn DeviceDriver>> {
    if dry_run {
        info!("Dry run: using in-memory device");
        return Ok(Arc::new(MemoryDevice::new()));
    }
    let apc = ApcMini::connect(&config.device)?;
    Ok(Arc::new(apc))
}

fn register_plugins(mux: &Multiplexer, config: &AppConfig) -> Result<()> {
    let registry = PluginRegistry::with_builtins();

    for entry in &config.plugins {
        let plugin = registry.build(entry)?;
        let areas = entry.area_set()?;
        mux.register(areas, plugin)
            .with_context(|| format!("Failed to register plugin '{}'", entry.name))?;
        info!("🔌 Plugin '{}' ({}) registered on {}", entry.name, entry.kind, areas);
    }

    Ok(())
}

/// Wait for Ctrl-C, reconnecting the device on SIGHUP
async fn run(mux: &Multiplexer, config: &AppConfig, dry_run: bool) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                    break;
                }
                _ = hangup.recv() => {
                    info!("SIGHUP received, reconnecting device");
                    reconnect(mux, config, dry_run);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (config, dry_run);
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    }

    info!("Shutdown signal received");
    Ok(())
}

#[cfg(unix)]
fn reconnect(mux: &Multiplexer, config: &AppConfig, dry_run: bool) {
    if dry_run {
        if let Err(e) = mux.resync() {
            warn!("Resync failed: {}", e);
        }
        return;
    }

    match ApcMini::connect(&config.device) {
        Ok(apc) => {
            if let Err(e) = mux.reattach(Arc::new(apc)) {
                warn!("Reattach failed: {}", e);
            }
        }
        Err(e) => warn!("Could not reopen APC mini: {:#}", e),
    }
}

fn shutdown(mux: &Multiplexer) {
    if let Err(e) = mux.shutdown() {
        warn!("Plugin shutdown failed: {}", e);
    }
    mux.driver().reset();
}

fn list_ports_formatted() {
    use colored::*;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    for (title, ports) in [
        ("Input Ports:", discovery::discover_input_ports()),
        ("Output Ports:", discovery::discover_output_ports()),
    ] {
        let Ok(ports) = ports else { continue };
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "No ports found".dimmed());
        }
        for port in ports {
            let marker = if port.is_virtual {
                "[VIRTUAL]".yellow()
            } else {
                "[PHYSICAL]".green()
            };
            println!("  {} {}", marker, port.name);
        }
    }

    if let Some((input, output)) = discovery::find_apc_ports() {
        println!("\n{}", "Auto-detected APC mini:".bold().bright_green());
        println!("  Input:  {}", input.bright_white());
        println!("  Output: {}", output.bright_white());
    }

    println!();
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
