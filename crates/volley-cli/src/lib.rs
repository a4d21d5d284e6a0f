//! Volley CLI Library
//!
//! Argument parsing, logging setup, output directory handling and summary
//! rendering for the `volley` binary. The load test itself lives in the
//! `volley` crate.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod logging;
pub mod output;

pub use commands::{Cli, ColorArg};
pub use config::{
    credentials, load_test_config, loaded_duration, parse_header, CliConfig, ColorChoice,
    Verbosity, PASS_ENV, USER_ENV,
};
pub use error::{CliError, CliResult};
