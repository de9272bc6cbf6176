//! Sshtun - SOCKS5 proxy over one SSH session
//!
//! This is the main entry point for the Sshtun application.

use anyhow::{Context, Result};
use clap::Parser;
use sshtun::config::{load_config, ConnectionState};
use sshtun::TunnelManager;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Sshtun - SOCKS5 proxy tunnelled through SSH direct-tcpip channels
#[derive(Parser, Debug)]
#[command(name = "sshtun")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Profile id to use instead of `tunnel.selected_profile_id`
    #[arg(short, long)]
    profile: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = load_config(&args.config)?;

    info!("Sshtun v{}", sshtun::VERSION);
    info!("Configuration loaded from: {:?}", args.config);

    let profile_id = args
        .profile
        .as_deref()
        .unwrap_or(&config.tunnel.selected_profile_id);
    let profile = config
        .profile(profile_id)
        .with_context(|| format!("No profile with id '{}'", profile_id))?
        .clone();
    info!("Using profile: {} ({})", profile.id, profile.server_addr());

    let manager = TunnelManager::from_config(&config);
    let mut state = manager.subscribe_state();

    tokio::select! {
        started = manager.start_tunnel(&profile, &config.tunnel) => {
            if !started {
                anyhow::bail!("Tunnel failed to start, see log above");
            }
        }
        _ = shutdown_signal() => {
            manager.stop_tunnel().await;
            return Ok(());
        }
    }

    if let Some(addr) = manager.local_addr() {
        info!("SOCKS5 proxy ready on {}", addr);
    }

    let failed = async {
        let _ = state.wait_for(|s| *s == ConnectionState::Failed).await;
    };

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = failed => warn!("SSH session could not be restored"),
    }

    manager.stop_tunnel().await;
    let stats = manager.stats();
    info!(
        accepted = stats.accepted,
        bytes = stats.bytes_relayed,
        "Tunnel closed"
    );
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
            }
            Err(e) => {
                warn!("Failed to setup SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On Windows, only handle Ctrl+C
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }
}

/// Setup logging based on configuration
///
/// `RUST_LOG` takes precedence over `--log-level` when set.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
