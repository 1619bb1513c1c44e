mod client;
mod settings;

use crate::client::Client;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use copy_core::RunContext;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "copy", version, about = "Copy – run file transfer tasks between storage backends")]
struct Cli {
    /// Path to config file (YAML / JSON)
    #[arg(short, long, default_value = "config.yaml", env = "COPY_CONFIG")]
    config: PathBuf,

    /// Log at debug level, same as `debug: true` in the config
    #[arg(long)]
    debug: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write a sample config covering every backend kind
    Init {
        /// Defaults to the --config path
        path: Option<PathBuf>,
    },
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Init { path }) = &cli.command {
        init_logging(cli.debug, cli.log_file.as_deref())?;
        let path = path.as_deref().unwrap_or(&cli.config);
        settings::write_sample(path)?;
        info!("sample config written to {}", path.display());
        return Ok(());
    }

    // the config may raise the log level, so it is read first
    let config = settings::load(&cli.config);
    let debug = cli.debug || config.as_ref().is_ok_and(|c| c.debug);
    init_logging(debug, cli.log_file.as_deref())?;
    let config = config?;
    info!(
        "loaded {} with {} clients and {} tasks",
        cli.config.display(),
        config.clients.len(),
        config.tasks.len()
    );

    let context = RunContext::from_config(config, Client::connect).await?;
    let report = context.execute().await?;
    info!(
        "run finished: {} listed, {} copied, {} moved, {} deleted",
        report.listed, report.copied, report.moved, report.deleted
    );
    Ok(())
}
