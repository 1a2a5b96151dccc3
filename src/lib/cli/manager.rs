use std::{path::PathBuf, sync::Arc};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION")
)]
struct Args {
    /// Directory with one recorded capture (JSON) per page to measure.
    #[arg(long, value_name = "DIR", env = "TIMELINE_METRICS_CAPTURES")]
    captures: PathBuf,

    /// Settings file. Relative names are placed in the user configuration directory.
    #[arg(long, value_name = "FILE", default_value = "settings.json")]
    settings: String,

    /// Ignore the stored settings and start over from the defaults.
    #[arg(long)]
    reset: bool,

    /// Write the results to this file instead of stdout.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Directory of the rolling log files.
    #[arg(long, value_name = "DIR", default_value = "./logs")]
    log_path: PathBuf,

    /// Sample CPU utilisation while tracing, reported next to the trace metrics.
    #[arg(long)]
    cpu_usage: bool,

    /// Turn all log categories up to Debug, for more information check RUST_LOG env variable.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct Manager {
    clap_matches: Args,
}

lazy_static! {
    static ref MANAGER: Arc<Manager> = Arc::new(Manager::new());
}

impl Manager {
    fn new() -> Self {
        Self {
            clap_matches: Args::parse(),
        }
    }
}

// Construct our manager, should be done inside main
pub fn init() {
    MANAGER.as_ref();
}

// Check if the verbosity parameter was used
pub fn is_verbose() -> bool {
    MANAGER.clap_matches.verbose
}

pub fn is_reset() -> bool {
    MANAGER.clap_matches.reset
}

pub fn captures_path() -> PathBuf {
    MANAGER.clap_matches.captures.clone()
}

pub fn settings_file() -> String {
    MANAGER.clap_matches.settings.clone()
}

pub fn output_path() -> Option<PathBuf> {
    MANAGER.clap_matches.output.clone()
}

pub fn log_path() -> PathBuf {
    MANAGER.clap_matches.log_path.clone()
}

pub fn is_cpu_usage_enabled() -> bool {
    MANAGER.clap_matches.cpu_usage
}

// Return the command line used to start this application
pub fn command_line_string() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}

// Return the parsed arguments
pub fn command_line() -> String {
    format!("{:?}", MANAGER.clap_matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_arguments() {
        let args = Args::try_parse_from(["timeline-metrics", "--captures", "/tmp/captures"]).unwrap();

        assert_eq!(args.captures, PathBuf::from("/tmp/captures"));
        assert_eq!(args.settings, "settings.json");
        assert_eq!(args.log_path, PathBuf::from("./logs"));
        assert!(args.output.is_none());
        assert!(!args.verbose);
        assert!(!args.reset);
        assert!(!args.cpu_usage);
    }

    #[test]
    fn captures_are_required() {
        std::env::remove_var("TIMELINE_METRICS_CAPTURES");
        assert!(Args::try_parse_from(["timeline-metrics"]).is_err());
    }
}
