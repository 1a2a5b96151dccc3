use anyhow::{Context, Result};
use serde_json::Value;
use tracing::*;

use timeline_metrics::{
    cli, logger,
    metrics::ResultSet,
    power::{CpuUsageMonitor, NoPowerMonitor},
    replay::ReplayBrowser,
    session::{MeasurementDefinition, MeasurementSession, PowerMonitor, Timeouts},
    settings,
};

async fn measure<P: PowerMonitor>(
    browser: ReplayBrowser,
    power: P,
    definition: MeasurementDefinition,
    timeouts: Timeouts,
) -> ResultSet {
    let pages = browser.pages();
    let mut session = MeasurementSession::new(browser, power, definition, timeouts);
    session.run(&pages).await
}

fn write_results(result_set: &ResultSet) -> Result<()> {
    let content = serde_json::to_string_pretty(result_set)?;

    match cli::manager::output_path() {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write results to {path:?}"))?;
            info!("Results written to {path:?}");
        }
        None => println!("{content}"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // CLI should be started before logger to allow control over verbosity
    cli::manager::init();
    logger::manager::init()?;
    settings::manager::init(
        Some(&cli::manager::settings_file()),
        cli::manager::is_reset(),
    )?;

    debug!("Command line call: {}", cli::manager::command_line_string());
    debug!(
        "Command line input struct call: {}",
        cli::manager::command_line()
    );

    let header = settings::manager::header();
    info!("Using settings {:?}, version {}", header.name, header.version);

    let definition = settings::manager::measurement();
    let timeouts = settings::manager::timeouts();

    // Captures are only ever recorded from instrumented browsers.
    let browser = ReplayBrowser::load(&cli::manager::captures_path())?
        .with_browser_evaluation(&definition.hook_probe_expression, Value::Bool(true));

    let result_set = if cli::manager::is_cpu_usage_enabled() {
        measure(browser, CpuUsageMonitor::default(), definition, timeouts).await
    } else {
        measure(browser, NoPowerMonitor, definition, timeouts).await
    };

    let failures = result_set.failures().count();
    if failures > 0 {
        warn!("{failures} of {} page(s) failed", result_set.pages.len());
    }

    write_results(&result_set)
}
