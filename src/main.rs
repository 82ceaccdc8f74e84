mod config;
mod logging;
mod monitor;
mod reboot;
mod registry;
mod staleness;
mod status_client;

use clap::Parser;
use config::MonitorConfig;
use monitor::Monitor;
use reboot::RebootTrigger;
use registry::DeviceRegistry;
use status_client::StatusClient;
use std::fmt::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Poll a device status endpoint and reboot devices that stopped sending
/// data: fetch status, measure staleness, trigger the recovery command,
/// cool down, and repeat.
#[derive(Parser, Debug)]
#[command(name = "madwatch", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "madwatch.toml")]
    config: PathBuf,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Run a single pass over all devices, then exit
    #[arg(long)]
    once: bool,

    /// Debug logging (state transitions, fetch attempts)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging needs the config, so config errors go straight to stderr.
    let config = match MonitorConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("madwatch: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        print!("{}", settings_summary(&cli, &config));
        return ExitCode::SUCCESS;
    }

    if let Err(e) = logging::init(&config.logging, cli.verbose) {
        eprintln!("madwatch: {e}");
        return ExitCode::FAILURE;
    }

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "madwatch failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, config: &MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = DeviceRegistry::from_config(config)?;
    let client = StatusClient::from_config(config)?;
    let trigger = RebootTrigger::from_config(config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        devices = registry.len(),
        status_url = %client.url(),
        recovery_command = %trigger.command(),
        "check and reboot daemon started"
    );
    tracing::debug!(?cli, "parsed CLI arguments");

    let mut monitor = Monitor::new(config, registry, client, trigger);

    if cli.once {
        monitor.run_cycle().await;
        return Ok(());
    }

    let interrupted = tokio::select! {
        () = monitor.run() => false,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            true
        }
    };
    if interrupted {
        tracing::info!(
            cycles = monitor.cycles(),
            state = ?monitor.state(),
            "interrupted, shutting down"
        );
    }
    Ok(())
}

/// Resolved settings shown by `--dry-run`.
fn settings_summary(cli: &Cli, config: &MonitorConfig) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_settings(&mut out, cli, config);
    out
}

fn write_settings(out: &mut String, cli: &Cli, config: &MonitorConfig) -> std::fmt::Result {
    writeln!(out, "madwatch v{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "Config file: {}", cli.config.display())?;
    writeln!(out, "Status URL: {}", config.status_url())?;
    writeln!(
        out,
        "Retry delay: {}s (request timeout {}s)",
        config.receiver.retry_delay_secs, config.receiver.request_timeout_secs
    )?;
    writeln!(
        out,
        "Recovery command: {} (cooldown {}s)",
        config.reboot.command, config.reboot.cooldown_secs
    )?;
    writeln!(
        out,
        "Stale threshold: >{} min, cycle delay {}s",
        config.monitor.stale_threshold_mins, config.monitor.cycle_delay_secs
    )?;
    match DeviceRegistry::from_config(config) {
        Ok(registry) => {
            writeln!(out, "Devices ({}):", registry.len())?;
            for device in registry.devices() {
                writeln!(out, "  {} -> {} ({})", device.name, device.origin, device.raw)?;
            }
        }
        Err(e) => writeln!(out, "Devices: {e}")?,
    }
    writeln!(out, "Dry run: config is valid, not running.")
}
