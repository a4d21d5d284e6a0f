//! Output directory preparation and summary rendering

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use chrono::{DateTime, Local};
use console::{style, Term};
use std::fs;
use std::path::{Path, PathBuf};
use volley::LoadTestSummary;

/// Copy of the replayed recording inside the output directory
pub const RECORDING_COPY: &str = "recording.log";
/// Version stamp inside the output directory
pub const VERSION_FILE: &str = "volley-version.txt";

/// `test-logs-<timestamp>` in the working directory
#[must_use]
pub fn default_output_dir(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("test-logs-{}", now.format("%Y-%m-%dT%H_%M_%S")))
}

/// Create the output directory layout for a run
///
/// Refuses an existing directory unless `overwrite` is set, in which case the
/// old contents are removed first.
pub fn prepare_output_dir(dir: &Path, overwrite: bool, recording: &Path) -> CliResult<()> {
    if dir.exists() {
        if !overwrite {
            return Err(CliError::config(format!(
                "output directory {} already exists; pass --overwrite-output to replace it",
                dir.display()
            )));
        }
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir.join("sessions"))?;
    fs::write(dir.join(VERSION_FILE), format!("{}\n", env!("CARGO_PKG_VERSION")))?;
    fs::copy(recording, dir.join(RECORDING_COPY))?;
    Ok(())
}

/// Final summary text
#[must_use]
pub fn render_summary(summary: &LoadTestSummary, use_color: bool) -> String {
    let counts = &summary.counts;
    let failed = format!("Failed: {}", counts.failed);
    let done = format!("Done: {}", counts.done);
    if !use_color {
        return format!("Complete. {failed}, {done}");
    }
    let failed = if counts.failed > 0 {
        style(failed).red().bold()
    } else {
        style(failed).dim()
    };
    format!(
        "{} {}, {}",
        style("Complete.").bold().force_styling(true),
        failed.force_styling(true),
        style(done).green().bold().force_styling(true)
    )
}

/// Print the summary and where the logs went
pub fn print_summary(
    summary: &LoadTestSummary,
    output_dir: &Path,
    config: &CliConfig,
) -> CliResult<()> {
    let term = Term::stdout();
    let use_color = config.color.should_color();
    term.write_line(&render_summary(summary, use_color))?;
    if !config.verbosity.is_quiet() {
        term.write_line(&format!(
            "Elapsed {:.1}s, session logs in {}",
            summary.elapsed.as_secs_f64(),
            output_dir.join("sessions").display()
        ))?;
    }
    Ok(())
}
