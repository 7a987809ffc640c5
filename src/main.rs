//! video-processor CLI entry point.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use video_processor::cli::{commands, Cli, Output};
use video_processor::config::Settings;
use video_processor::naming::RunStamp;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let stamp = RunStamp::now();

    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            format!("video_processor={}", cli.log_level())
        })))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    Output::banner(env!("CARGO_PKG_VERSION"));

    if cli.init_config {
        commands::run_init_config()?;
        return Ok(ExitCode::SUCCESS);
    }
    if cli.symlink_cli {
        commands::run_symlink_cli()?;
        return Ok(ExitCode::SUCCESS);
    }

    let settings = Settings::load(cli.config.as_deref().map(PathBuf::from).as_deref())?;
    commands::run_summarize(&cli, settings, stamp).await
}
