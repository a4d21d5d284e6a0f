//! CLI configuration

use crate::commands::Cli;
use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use volley::LoadTestConfig;

/// Environment variable holding the login user name
pub const USER_ENV: &str = "VOLLEY_USER";
/// Environment variable holding the login password
pub const PASS_ENV: &str = "VOLLEY_PASS";

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - errors and the final summary
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Check if debug mode
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stdout()),
        }
    }
}

/// Console rendering configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }
}

/// Split a `name: value` header argument
pub fn parse_header(arg: &str) -> CliResult<(String, String)> {
    let (name, value) = arg.split_once(':').ok_or_else(|| {
        CliError::invalid_argument(format!("header '{arg}' must look like 'name: value'"))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "header '{arg}' has an empty name"
        )));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Convert fractional minutes to a duration
pub fn loaded_duration(minutes: f64) -> CliResult<Duration> {
    if !minutes.is_finite() || minutes < 0.0 {
        return Err(CliError::invalid_argument(format!(
            "--loaded-duration-minutes must be a non-negative number, got {minutes}"
        )));
    }
    Duration::try_from_secs_f64(minutes * 60.0)
        .map_err(|e| CliError::invalid_argument(format!("--loaded-duration-minutes: {e}")))
}

/// Login credentials, when both variables are set
pub fn credentials(lookup: impl Fn(&str) -> Option<String>) -> Option<(String, String)> {
    match (lookup(USER_ENV), lookup(PASS_ENV)) {
        (Some(user), Some(pass)) if !user.is_empty() => Some((user, pass)),
        _ => None,
    }
}

/// Build the library configuration from parsed arguments
pub fn load_test_config(
    cli: &Cli,
    output_dir: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> CliResult<LoadTestConfig> {
    if cli.workers == 0 {
        return Err(CliError::invalid_argument("--workers must be at least 1"));
    }

    let mut config = LoadTestConfig::new(cli.app_url.clone())
        .with_workers(cli.workers)
        .with_loaded_duration(loaded_duration(cli.loaded_duration_minutes)?)
        .with_output_dir(output_dir);

    if let Some(ms) = cli.start_interval {
        config = config.with_start_interval(Duration::from_millis(ms));
    }
    for arg in &cli.headers {
        let (name, value) = parse_header(arg)?;
        config = config.with_header(name, value);
    }
    if let Some(key) = cli.connect_api_key.as_deref().filter(|k| !k.is_empty()) {
        config = config.with_connect_api_key(key);
    } else if let Some((user, pass)) = credentials(lookup) {
        config = config.with_credentials(user, pass);
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::Parser;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["volley", "rec.log", "http://localhost:3838/"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn test_verbosity() {
        assert!(Verbosity::Quiet.is_quiet());
        assert!(!Verbosity::Normal.is_verbose());
        assert!(Verbosity::Verbose.is_verbose());
        assert!(Verbosity::Debug.is_verbose());
        assert!(Verbosity::Debug.is_debug());
    }

    #[test]
    fn test_color_choice() {
        assert!(ColorChoice::Always.should_color());
        assert!(!ColorChoice::Never.should_color());
    }

    #[test]
    fn test_cli_config_builder() {
        let config = CliConfig::new()
            .with_verbosity(Verbosity::Quiet)
            .with_color(ColorChoice::Never);
        assert_eq!(config.verbosity, Verbosity::Quiet);
        assert_eq!(config.color, ColorChoice::Never);
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("X-Forwarded-For: 10.0.0.1").unwrap(),
            ("X-Forwarded-For".to_string(), "10.0.0.1".to_string())
        );
        assert_eq!(
            parse_header("X-Url:http://a:b").unwrap(),
            ("X-Url".to_string(), "http://a:b".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_loaded_duration() {
        assert_eq!(loaded_duration(0.5).unwrap(), Duration::from_secs(30));
        assert_eq!(loaded_duration(0.0).unwrap(), Duration::ZERO);
        assert!(loaded_duration(-1.0).is_err());
        assert!(loaded_duration(f64::NAN).is_err());
    }

    #[test]
    fn test_credentials_need_both_variables() {
        let both = |name: &str| match name {
            USER_ENV => Some("alice".to_string()),
            PASS_ENV => Some("pw".to_string()),
            _ => None,
        };
        assert_eq!(
            credentials(both),
            Some(("alice".to_string(), "pw".to_string()))
        );
        let user_only = |name: &str| (name == USER_ENV).then(|| "alice".to_string());
        assert!(credentials(user_only).is_none());
        assert!(credentials(no_env).is_none());
    }

    #[test]
    fn test_load_test_config() {
        let cli = cli(&["--workers", "3", "--start-interval", "100", "-H", "X-A: 1"]);
        let config = load_test_config(&cli, Path::new("out"), no_env).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.start_interval, Some(Duration::from_millis(100)));
        assert_eq!(config.headers, vec![("X-A".to_string(), "1".to_string())]);
        assert_eq!(config.output_dir.as_deref(), Some(Path::new("out")));
        assert!(config.max_iterations.is_none());
        assert!(config.pre_session.is_none());
    }

    #[test]
    fn test_api_key_takes_precedence_over_credentials() {
        let both = |name: &str| match name {
            USER_ENV => Some("alice".to_string()),
            PASS_ENV => Some("pw".to_string()),
            _ => None,
        };
        let cli = cli(&["-K", "k3y"]);
        let config = load_test_config(&cli, Path::new("out"), both).unwrap();
        assert!(config.connect_api_key.is_some());
        assert!(config.pre_session.is_none());
        // Sent only once the target is known to be Connect
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = cli(&["--workers", "0"]);
        assert!(load_test_config(&cli, Path::new("out"), no_env).is_err());
    }
}
