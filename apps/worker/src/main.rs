use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use uptime_worker::audit::{AuditLog, LogName};
use uptime_worker::build_scheduler;
use uptime_worker::config::Config;

#[derive(Debug, Parser)]
#[command(version, about = "Probe HTTP checks, alert on state changes and rotate the audit log")]
struct Cli {
    /// Path to the config file (defaults to $XDG_CONFIG_HOME/uptime-worker/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the probe and rotation workers until interrupted
    Run,
    /// Print the effective configuration
    Config,
    /// List audit logs
    Logs {
        /// Include compressed archives
        #[arg(short, long)]
        all: bool,
    },
    /// Print the contents of a compressed archive
    Decompress {
        /// Archive id, e.g. <check id>-<epoch ms>
        archive_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let mut config = Config::from_config(cli.config.as_ref()).context("failed to load configuration")?;
    config.apply_env();

    logger::init(
        logger::parse_level(&config.logging.level),
        config.logging.format.parse().unwrap_or_default(),
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await,
        Command::Config => {
            print!("{config}");
            Ok(())
        }
        Command::Logs { all } => {
            let logs = AuditLog::new(&config.storage.logs_dir);
            for name in logs.list(all).await? {
                match name {
                    LogName::Live(id) => println!("{id}"),
                    LogName::Archive(id) => println!("{id} (compressed)"),
                }
            }
            Ok(())
        }
        Command::Decompress { archive_id } => {
            let logs = AuditLog::new(&config.storage.logs_dir);
            let contents =
                logs.decompress(&archive_id).await.with_context(|| format!("failed to decompress {archive_id}"))?;
            print!("{contents}");
            Ok(())
        }
    }
}

async fn run(config: &Config) -> Result<()> {
    let mut scheduler = build_scheduler(config).context("failed to build HTTP client")?;
    scheduler.start();
    info!("Background workers are running");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    scheduler.stop();
    Ok(())
}
