use std::path::Path;

use anyhow::{Context, Result};
use tracing::{metadata::LevelFilter, *};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

use crate::cli;

fn console_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(LevelFilter::DEBUG.to_string())
        } else {
            EnvFilter::new(LevelFilter::INFO.to_string())
        }
    })
}

// Start logger, should be done inside main
pub fn init() -> Result<()> {
    init_with(cli::manager::is_verbose(), &cli::manager::log_path())
}

pub fn init_with(verbose: bool, log_path: &Path) -> Result<()> {
    // Redirect all logs from libs using "Log"
    LogTracer::init_with_filter(tracing::log::LevelFilter::Trace)
        .context("Failed to set logger")?;

    // Configure the console log, kept on stderr so results can go to stdout
    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(fmt::format::FmtSpan::NONE)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(console_filter(verbose));

    // Configure the file log
    let file_appender = tracing_appender::rolling::hourly(log_path, "timeline-metrics.log");
    let file_layer = fmt::Layer::new()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_filter(EnvFilter::new(LevelFilter::DEBUG.to_string()));

    let subscriber = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Unable to set a global subscriber")?;

    info!(
        "{}, version: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
    info!(
        "Starting at {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
    );
    debug!("Logging to {log_path:?}");

    Ok(())
}
