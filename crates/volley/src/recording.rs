//! Recording file loading
//!
//! A recording is a line-oriented text file: a leading block of `# key: value`
//! property lines followed by one JSON event per line.
//!
//! ```text
//! # version: 1
//! # target_url: http://127.0.0.1:3838/app/
//! # target_type: R/Shiny
//! {"type":"REQ_HOME","begin":"2018-08-30T18:11:10.281Z","url":"/","status":200}
//! {"type":"WS_OPEN","begin":"2018-08-30T18:11:10.599Z","url":"/websocket/"}
//! {"type":"WS_CLOSE","begin":"2018-08-30T18:11:20.104Z"}
//! ```

use crate::event::Event;
use crate::result::{VolleyError, VolleyResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// Newest recording format this crate can replay
pub const RECORDING_VERSION: u32 = 1;

// =============================================================================
// Server Type
// =============================================================================

/// Kind of server hosting the target application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerType {
    /// RStudio Server Connect
    Rsc,
    /// Shiny Server or Shiny Server Pro
    Ssp,
    /// shinyapps.io
    Sai,
    /// R/Shiny development server
    Shn,
    /// Not recorded (legacy recordings)
    Unknown,
}

impl ServerType {
    /// All server types
    pub const ALL: [Self; 5] = [Self::Rsc, Self::Ssp, Self::Sai, Self::Shn, Self::Unknown];

    /// Three-letter code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Rsc => "RSC",
            Self::Ssp => "SSP",
            Self::Sai => "SAI",
            Self::Shn => "SHN",
            Self::Unknown => "UNK",
        }
    }

    /// Descriptive name, as written in `target_type`
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rsc => "RStudio Server Connect",
            Self::Ssp => "Shiny Server or Shiny Server Pro",
            Self::Sai => "shinyapps.io",
            Self::Shn => "R/Shiny",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this server type fronts apps with a login page
    #[must_use]
    pub const fn supports_login(self) -> bool {
        matches!(self, Self::Rsc | Self::Ssp)
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServerType {
    type Err = VolleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.code().eq_ignore_ascii_case(s) || t.name() == s)
            .ok_or_else(|| VolleyError::malformed(format!("Unknown server type: {s}")))
    }
}

// =============================================================================
// Properties
// =============================================================================

/// Header properties of a recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingProps {
    /// Recording format version
    pub version: u32,
    /// URL the recording was captured against
    pub target_url: String,
    /// Server type the recording was captured against
    pub target_type: ServerType,
}

#[allow(clippy::expect_used)]
fn prop_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^# (\w+): (.*)$").expect("prop line regex is valid"))
}

/// Parse the leading `#` block of a recording
fn parse_props(lines: &[&str]) -> VolleyResult<RecordingProps> {
    let mut props = HashMap::new();
    for (idx, line) in lines.iter().enumerate() {
        if !line.starts_with('#') {
            break;
        }
        let caps = prop_line_regex()
            .captures(line)
            .ok_or_else(|| VolleyError::malformed_at(idx + 1, format!("Malformed prop line: {line}")))?;
        props.insert(caps[1].to_string(), caps[2].trim_end().to_string());
    }

    // Pre-versioned recordings only carried the target URL
    if !props.contains_key("version") {
        if let Some(url) = props.get("target") {
            return Ok(RecordingProps {
                version: 1,
                target_url: url.clone(),
                target_type: ServerType::Unknown,
            });
        }
    }

    let require = |key: &str| {
        props.get(key).ok_or_else(|| {
            VolleyError::malformed(format!(
                "Recording file is missing required property '{key}', make a new recording"
            ))
        })
    };

    let version_str = require("version")?;
    let version: u32 = version_str
        .parse()
        .map_err(|_| VolleyError::malformed(format!("Invalid recording version: {version_str}")))?;
    let target_url = require("target_url")?.clone();
    let target_type = require("target_type")?.parse()?;

    Ok(RecordingProps {
        version,
        target_url,
        target_type,
    })
}

// =============================================================================
// Recording
// =============================================================================

/// A parsed recording: properties plus the ordered event script
#[derive(Debug, Clone)]
pub struct Recording {
    props: RecordingProps,
    events: Vec<Event>,
    path: Option<PathBuf>,
}

impl Recording {
    /// Load and parse a recording file
    ///
    /// Data files referenced by `REQ_POST` events are resolved against the
    /// recording's directory.
    pub fn load(path: impl AsRef<Path>) -> VolleyResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut recording = Self::parse(&contents, base_dir)?;
        recording.path = Some(path.to_path_buf());
        Ok(recording)
    }

    /// Parse recording text
    ///
    /// Event line numbers are physical lines in `contents`, so they point
    /// straight at the offending line in an editor.
    pub fn parse(contents: &str, base_dir: &Path) -> VolleyResult<Self> {
        let lines: Vec<&str> = contents.lines().collect();
        let props = parse_props(&lines)?;

        if props.version > RECORDING_VERSION {
            return Err(VolleyError::malformed(format!(
                "Recording version {} is newer than this version supports ({RECORDING_VERSION}); please upgrade",
                props.version
            )));
        }

        let events = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.starts_with('#') && !line.trim().is_empty())
            .map(|(idx, line)| Event::parse(line, idx + 1, base_dir))
            .collect::<VolleyResult<Vec<_>>>()?;

        Ok(Self {
            props,
            events,
            path: None,
        })
    }

    /// Check that the script can be replayed
    ///
    /// The script must be non-empty and end with the socket being closed.
    pub fn validate(&self) -> VolleyResult<()> {
        let last = self
            .events
            .last()
            .ok_or_else(|| VolleyError::malformed("input log must not be empty"))?;
        if !matches!(last, Event::WsClose { .. }) {
            return Err(VolleyError::malformed_at(
                last.line_number(),
                "last event in log not a WS_CLOSE (did you close the tab after recording?)",
            ));
        }
        Ok(())
    }

    /// Header properties
    #[must_use]
    pub const fn props(&self) -> &RecordingProps {
        &self.props
    }

    /// Ordered event script
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// File the recording was loaded from
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Wall-clock span of the captured session
    #[must_use]
    pub fn duration(&self) -> Duration {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => {
                Duration::from_millis(last.begin().saturating_sub(first.begin()).max(0) as u64)
            }
            _ => Duration::ZERO,
        }
    }
}
