//! Result and error types for Volley.

use thiserror::Error;

/// Result type for Volley operations
pub type VolleyResult<T> = Result<T, VolleyError>;

/// Errors that can occur while loading a recording or replaying a session
#[derive(Debug, Error)]
pub enum VolleyError {
    /// Recording could not be parsed or does not describe a playable script
    #[error("Malformed recording{}: {message}", .line.map(|l| format!(" (line {l})")).unwrap_or_default())]
    MalformedRecording {
        /// Line in the recording file, if the problem is local to one line
        line: Option<usize>,
        /// Error message
        message: String,
    },

    /// A placeholder names a token outside the allowed vocabulary
    #[error("{names:?} are illegal tokens")]
    IllegalToken {
        /// Offending placeholder names
        names: Vec<String>,
    },

    /// A placeholder names an allowed token that has not been bound yet
    #[error("{name} is an allowed token, but it isn't present in the dictionary")]
    UnboundToken {
        /// Token name
        name: String,
    },

    /// HTTP response status differs from the recorded one
    #[error("Status {actual} received, expected {expected}, URL: {url}, Response body: {body}")]
    UnexpectedStatus {
        /// Recorded status
        expected: u16,
        /// Status returned by the target
        actual: u16,
        /// Requested URL
        url: String,
        /// Response body, for diagnostics
        body: String,
    },

    /// A received WebSocket message does not match the recorded one
    #[error("Message mismatch: expected {expected}, received {actual}")]
    MessageMismatch {
        /// Expected message (tokens substituted)
        expected: String,
        /// Received message
        actual: String,
    },

    /// The inbound stream can no longer be reasoned about
    #[error("Protocol desync: {message}")]
    ProtocolDesync {
        /// Error message
        message: String,
    },

    /// WebSocket transport failure or unexpected close
    #[error("WebSocket error: {message}")]
    WebSocket {
        /// Error message
        message: String,
    },

    /// WebSocket handshake did not complete in time
    #[error("WebSocket connect to {url} timed out after {ms}ms")]
    ConnectTimeout {
        /// Target URL
        url: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Pre-session login failed
    #[error("Login failed: {message}")]
    Login {
        /// Error message
        message: String,
    },

    /// Invalid load test configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session log write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl VolleyError {
    /// Create a malformed recording error tied to a line
    #[must_use]
    pub fn malformed_at(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedRecording {
            line: Some(line),
            message: message.into(),
        }
    }

    /// Create a malformed recording error for the whole file
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecording {
            line: None,
            message: message.into(),
        }
    }

    /// Create a protocol desync error
    #[must_use]
    pub fn desync(message: impl Into<String>) -> Self {
        Self::ProtocolDesync {
            message: message.into(),
        }
    }

    /// Create a WebSocket error
    #[must_use]
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Create a login error
    #[must_use]
    pub fn login(message: impl Into<String>) -> Self {
        Self::Login {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VolleyError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::websocket(err.to_string())
    }
}
