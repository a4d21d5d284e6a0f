//! Volley CLI: load-test an interactive web app by replaying a recording
//!
//! ## Usage
//!
//! ```bash
//! volley recording.log https://apps.example.com/app/ --workers 20
//! volley recording.log http://localhost:3838/ -w 5 --loaded-duration-minutes 1 --debug-log
//! ```

use clap::Parser;
use std::process::ExitCode;
use tracing::info;
use volley::{LoadTest, Recording};
use volley_cli::{
    load_test_config, logging, output, Cli, CliConfig, CliResult, ColorChoice, Verbosity,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);

    // Reject a bad recording before anything is written to disk
    let recording = Recording::load(&cli.recording)?;
    recording.validate()?;

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| output::default_output_dir(chrono::Local::now()));
    let settings = load_test_config(&cli, &output_dir, |name| std::env::var(name).ok())?;

    output::prepare_output_dir(&output_dir, cli.overwrite_output, &cli.recording)?;
    let debug_log = cli
        .debug_log
        .then(|| output_dir.join(logging::DEBUG_LOG_FILE));
    logging::init(&cli.log_level, config.verbosity, debug_log.as_deref())?;
    logging::install_panic_hook();

    info!(
        "Replaying {} against {} with {} workers",
        cli.recording.display(),
        settings.app_url,
        settings.workers
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(LoadTest::new(settings, recording).run())?;

    output::print_summary(&summary, &output_dir, &config)
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.clone().into();

    CliConfig::new().with_verbosity(verbosity).with_color(color)
}
