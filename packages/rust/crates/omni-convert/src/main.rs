//! omni-convert CLI: scheduled sweeper service plus one-shot job commands.
//!
//! Job records only outlive a single command with the valkey backend
//! (`VALKEY_URL` or `state_store.backend: valkey`).
//!
//! Logging: set `RUST_LOG=omni_convert=debug` (or `info`, `warn`) to see logs on stderr.

mod cli;
mod commands;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use omni_convert::{ConvertConfig, ConvertRuntime, FreecadConverter, set_config_home_override};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(conf_dir) = cli.conf.clone() {
        set_config_home_override(conf_dir);
    }

    // RUST_LOG overrides; --verbose => debug; else info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "omni_convert=debug"
        } else {
            "omni_convert=info"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config = ConvertConfig::load()?;
    let converter = Arc::new(FreecadConverter::new(config.converter.clone()));
    let runtime = ConvertRuntime::connect(config, converter).await?;

    let outcome = match cli.command {
        Command::Serve => return commands::serve(runtime).await,
        Command::Convert { file } => commands::convert(&runtime, &file).await,
        Command::Status { job_id } => commands::status(&runtime, &job_id).await,
        Command::Fetch { job_id, dest } => commands::fetch(&runtime, &job_id, dest).await,
        Command::Sweep => commands::sweep(&runtime).await,
    };
    runtime.shutdown().await?;
    outcome
}
