//! Painel CLI
//!
//! Terminal dashboard for the Árvore Pão analytics API:
//! - Watch the dashboard with periodic refresh
//! - Run a single refresh
//! - Generate a default config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use painel::{build_controller, generate_default_config, Config, LoggingConfig, Screen};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "painel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Terminal dashboard for the Árvore Pão analytics API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/painel/config.toml, /etc/painel/config.toml, ./painel.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Analytics API URL (overrides the config file)
    #[arg(long, global = true)]
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh the dashboard periodically; press Enter to refresh now
    Watch {
        /// Refresh interval in seconds (overrides the config file)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Run a single refresh and exit
    Once,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("failed to write {:?}", path))?;
                eprintln!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }

    init_logging(&config.logging);
    tracing::info!("Painel v{} -> {}", env!("CARGO_PKG_VERSION"), config.api.base_url);

    match cli.command {
        Commands::Watch { interval } => {
            if let Some(secs) = interval {
                config.refresh.interval_ms = interval_ms(secs)?;
            }
            watch(&config).await
        }
        Commands::Once => once(&config).await,
        Commands::Config { .. } => Ok(()),
    }
}

async fn watch(config: &Config) -> anyhow::Result<()> {
    let controller = build_controller(config, Screen::stdout())?;
    controller.start()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        if !controller.trigger_now() {
                            tracing::info!("Refresh already in progress");
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin, manual refresh disabled");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    controller.stop();
    controller.join().await;
    tracing::info!("Painel shutdown complete");
    Ok(())
}

async fn once(config: &Config) -> anyhow::Result<()> {
    let controller = build_controller(config, Screen::new(Box::new(std::io::stdout())))?;
    let report = controller.run_once().await?;

    anyhow::ensure!(
        report.sources == 0 || report.any_success(),
        "all {} data sources failed",
        report.sources
    );
    Ok(())
}

/// Convert the `--interval` seconds into milliseconds
fn interval_ms(secs: u64) -> anyhow::Result<u64> {
    anyhow::ensure!(secs > 0, "interval must be greater than zero");
    secs.checked_mul(1000)
        .with_context(|| format!("interval of {} seconds is too large", secs))
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("painel={}", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so they never interleave with the rendered screen.
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
