//! Tracing subscriber setup
//!
//! Two layers: the console, filtered by `--log-level` but always showing
//! volley's own INFO milestones, and an optional DEBUG file under the output
//! directory.

use crate::config::Verbosity;
use crate::error::{CliError, CliResult};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Name of the debug log inside the output directory
pub const DEBUG_LOG_FILE: &str = "debug.log";

/// Console filter directives
///
/// Other crates log at `level`; the volley crates never log below INFO unless
/// quiet.
pub fn console_directives(level: &str, verbosity: Verbosity) -> CliResult<String> {
    let base = LevelFilter::from_str(level).map_err(|_| {
        CliError::invalid_argument(format!(
            "--log-level must be one of off, error, warn, info, debug, trace; got '{level}'"
        ))
    })?;
    if verbosity.is_quiet() {
        let base = base.min(LevelFilter::ERROR);
        return Ok(format!("{base},volley=error,volley_cli=error").to_lowercase());
    }
    let own = if verbosity.is_debug() {
        LevelFilter::TRACE
    } else if verbosity.is_verbose() {
        base.max(LevelFilter::DEBUG)
    } else {
        base.max(LevelFilter::INFO)
    };
    Ok(format!("{base},volley={own},volley_cli={own}").to_lowercase())
}

/// Install the global subscriber
pub fn init(level: &str, verbosity: Verbosity, debug_log: Option<&Path>) -> CliResult<()> {
    let console_filter = EnvFilter::try_new(console_directives(level, verbosity)?)
        .map_err(|e| CliError::invalid_argument(format!("--log-level: {e}")))?;
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let file = match debug_log {
        Some(path) => {
            let writer = File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(writer))
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| CliError::config(format!("could not install logger: {e}")))
}

/// Log panics through tracing before the default hook prints them
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("panic: {info}");
        default_hook(info);
    }));
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_keep_milestones() {
        assert_eq!(
            console_directives("warn", Verbosity::Normal).unwrap(),
            "warn,volley=info,volley_cli=info"
        );
    }

    #[test]
    fn test_verbose_level_applies_everywhere() {
        assert_eq!(
            console_directives("debug", Verbosity::Normal).unwrap(),
            "debug,volley=debug,volley_cli=debug"
        );
        assert_eq!(
            console_directives("warn", Verbosity::Verbose).unwrap(),
            "warn,volley=debug,volley_cli=debug"
        );
    }

    #[test]
    fn test_quiet_caps_everything_at_error() {
        assert_eq!(
            console_directives("info", Verbosity::Quiet).unwrap(),
            "error,volley=error,volley_cli=error"
        );
    }

    #[test]
    fn test_debug_verbosity_traces_own_crates() {
        assert_eq!(
            console_directives("warn", Verbosity::Debug).unwrap(),
            "warn,volley=trace,volley_cli=trace"
        );
    }

    #[test]
    fn test_bad_level_rejected() {
        assert!(console_directives("loud", Verbosity::Normal).is_err());
    }
}
