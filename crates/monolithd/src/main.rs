//! monolithd — the Monolith daemon.
//!
//! Watches a Jellyfin media server and any number of Minecraft servers:
//! availability transitions, recently added content, random library
//! suggestions, and player joins.
//!
//! # Usage
//!
//! ```text
//! monolithd run --config monolith.toml
//! monolithd run --once jf-announce
//! monolithd check-config --config monolith.toml
//! monolithd init --jellyfin-url http://jellyfin:8096 > monolith.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use monolith_core::{MonitorConfig, Settings};
use monolithd::{App, Capabilities, LogNotifier, OnceTarget};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,monolithd=debug,monolith=debug";
const DEFAULT_CONFIG: &str = "monolith.toml";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "monolithd", about = "Monolith server monitor", version)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor until interrupted.
    Run {
        /// Configuration file. Environment variables override its values.
        #[arg(long, short, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Run the selected jobs once and exit instead of scheduling.
        #[arg(long, value_enum)]
        once: Option<OnceTarget>,
    },
    /// Validate the configuration and print the enabled services.
    CheckConfig {
        #[arg(long, short, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Print a starter configuration file.
    Init {
        #[arg(long, default_value = "http://localhost:8096")]
        jellyfin_url: String,

        #[arg(long, default_value = "localhost:25565")]
        minecraft_address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Command::Run { config, once } => run(&config, once).await,
        Command::CheckConfig { config } => check_config(&config),
        Command::Init {
            jellyfin_url,
            minecraft_address,
        } => {
            let scaffold = MonitorConfig::scaffold(&jellyfin_url, &minecraft_address);
            print!("{}", scaffold.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Read the file (or start from defaults when the default file is absent),
/// apply environment overrides, and validate.
fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut config = if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        info!(path = %path.display(), "no config file, using defaults and environment");
        MonitorConfig::default()
    } else {
        MonitorConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?
    };
    config
        .apply_env(std::env::vars())
        .context("applying environment overrides")?;
    config.validate().context("invalid configuration")
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let settings = load_settings(path)?;
    println!("configuration OK (timezone {})", settings.timezone);
    if let Some(jf) = &settings.jellyfin {
        println!(
            "  jellyfin: {} endpoint(s), health every {:?}, announcements at {:?}",
            jf.endpoints.len(),
            jf.health_check_interval,
            jf.announcement_times
        );
    }
    if let Some(mc) = &settings.minecraft {
        for server in &mc.servers {
            println!(
                "  minecraft '{}': {}",
                server.service_id(),
                server.addresses().join(", ")
            );
        }
    }
    Ok(())
}

async fn run(path: &Path, once: Option<OnceTarget>) -> anyhow::Result<()> {
    let settings = load_settings(path)?;
    info!(services = ?settings.service_ids(), "monolith daemon starting");

    let caps = Capabilities::live(&settings)?;
    let app = App::build(&settings, caps, Arc::new(LogNotifier)).await?;

    app.baseline().await;

    if let Some(target) = once {
        let outcomes = app.run_once(target).await?;
        app.shutdown(SHUTDOWN_GRACE).await;
        let failed = outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, monolith_scheduler::RunOutcome::Failed(_)))
            .count();
        if failed > 0 {
            anyhow::bail!("{failed} of {} one-shot job(s) failed", outcomes.len());
        }
        return Ok(());
    }

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    app.start().await;
    info!("monolith daemon running");

    let _ = shutdown_rx.changed().await;
    info!("shutdown signal received");
    app.shutdown(SHUTDOWN_GRACE).await;

    info!("monolith daemon stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
