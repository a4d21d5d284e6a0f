//! CLI argument definitions using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Volley: load-test an interactive web app by replaying a recorded session
#[derive(Parser, Debug)]
#[command(name = "volley")]
#[command(author, version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Recording to replay
    pub recording: PathBuf,

    /// URL of the app under test
    pub app_url: String,

    /// Number of concurrent simulated users
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// Minutes to hold full load after warm-up
    #[arg(long, default_value_t = 5.0, value_name = "MINUTES")]
    pub loaded_duration_minutes: f64,

    /// Directory for session logs [default: test-logs-<timestamp>]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Replace the output directory if it already exists
    #[arg(long)]
    pub overwrite_output: bool,

    /// Write every debug event to <output-dir>/debug.log
    #[arg(long)]
    pub debug_log: bool,

    /// Milliseconds between worker starts [default: recording length / workers]
    #[arg(long, value_name = "MS")]
    pub start_interval: Option<u64>,

    /// Console log level for everything outside volley's own milestones
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    pub log_level: String,

    /// Extra header for every request, as 'name: value' (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// RStudio Connect API key
    #[arg(short = 'K', long = "key", env = "CONNECT_API_KEY", hide_env_values = true)]
    pub connect_api_key: Option<String>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors and the final summary only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorArg,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
