use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use termfleet_core::FleetConfig;
use termfleet_pool::SlotPool;
use termfleet_remote::SshExecutor;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "termfleet")]
#[command(about = "Terminal fleet manager — allocate and reclaim remote trading terminal instances")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to a TOML fleet configuration file
    #[arg(short, long, env = "FLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Fleet host address (overrides the config file)
    #[arg(long, env = "FLEET_HOST")]
    fleet_host: Option<String>,

    /// SSH user on the fleet host (overrides the config file)
    #[arg(long, env = "FLEET_USER")]
    fleet_user: Option<String>,

    /// SSH private key path (overrides the config file)
    #[arg(long, env = "FLEET_SSH_KEY")]
    ssh_key: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server with the periodic reconciliation sweep
    Serve {
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0:3000")]
        bind: String,
    },

    /// Report live occupancy of the terminal pool
    Capacity,

    /// Stop and remove one slot's workload
    Reclaim {
        /// Slot number to reclaim
        #[arg(short, long)]
        slot: u32,
    },

    /// Run one reconciliation sweep against the fleet host
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt().with_env_filter(filter).with_target(false).init();

    let config = load_config(&cli)?;
    let pool = Arc::new(SlotPool::new(config.clone(), Arc::new(SshExecutor::new(config.clone()))));

    match cli.command {
        Commands::Serve { bind } => {
            spawn_reconciler(pool.clone(), config.reconcile_interval_secs);
            termfleet_api::start_server(pool, &bind).await?;
        }
        Commands::Capacity => {
            let active = pool
                .count_active()
                .await
                .map_err(|e| anyhow::anyhow!("Capacity query failed: {}", e))?;
            println!("{} of {} instances active", active, config.max_instances);
        }
        Commands::Reclaim { slot } => {
            let clean = pool
                .reclaim(slot)
                .await
                .map_err(|e| anyhow::anyhow!("Reclaim failed: {}", e))?;
            if clean {
                println!("Slot {} reclaimed", slot);
            } else {
                println!("Slot {} freed, but remote cleanup reported errors", slot);
            }
        }
        Commands::Reconcile => {
            let report = pool
                .reconcile()
                .await
                .map_err(|e| anyhow::anyhow!("Reconcile failed: {}", e))?;
            if report.is_clean() {
                println!("Registry and fleet host are in sync");
            } else {
                println!("Freed slots:      {:?}", report.freed_slots);
                println!("Removed orphans:  {:?}", report.removed_orphans);
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<FleetConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
            toml::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?
        }
        None => FleetConfig::default(),
    };

    if let Some(host) = &cli.fleet_host {
        config.host = host.clone();
    }
    if let Some(user) = &cli.fleet_user {
        config.user = user.clone();
    }
    if let Some(key) = &cli.ssh_key {
        config.key_path = Some(key.clone());
    }

    Ok(config)
}

/// Periodic sweep comparing the registry against live fleet-host state.
fn spawn_reconciler(pool: Arc<SlotPool>, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::info!("Reconciliation sweep disabled");
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup traffic
        // settles before the first sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match pool.reconcile().await {
                Ok(report) if !report.is_clean() => {
                    tracing::info!(
                        freed = ?report.freed_slots,
                        orphans = ?report.removed_orphans,
                        "Reconciliation sweep applied changes"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Reconciliation sweep failed"),
            }
        }
    });
}
