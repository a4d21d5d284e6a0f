//! Volley: Session Replay Load Testing for Interactive Web Apps
//!
//! Volley replays a recorded user session (HTTP requests plus a SockJS-style
//! WebSocket conversation) against a live app, many times over, from many
//! concurrent simulated users.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     VOLLEY Architecture                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Recording  │    │ LoadTest   │    │ Session    │            │
//! │   │ (events)   │───►│ (workers)  │───►│ (replay)   │──► target  │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │                           │                 │                    │
//! │                           ▼                 ▼                    │
//! │                     ┌────────────┐    ┌────────────┐            │
//! │                     │ Stats      │    │ Tokens +   │            │
//! │                     │            │    │ Codec      │            │
//! │                     └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use volley::{LoadTest, LoadTestConfig, Recording};
//!
//! # async fn run() -> volley::VolleyResult<()> {
//! let recording = Recording::load("recording.log")?;
//! let config = LoadTestConfig::new("http://localhost:3838/app/")
//!     .with_workers(10)
//!     .with_loaded_duration(Duration::from_secs(600))
//!     .with_output_dir("test-logs");
//! let summary = LoadTest::new(config, recording).run().await?;
//! println!("Failed: {}, Done: {}", summary.counts.failed, summary.counts.done);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Pre-session login and server detection
pub mod auth;
/// Protocol message codec
pub mod codec;
mod config;
mod event;
/// Bounded inbound message queue
pub mod queue;
mod recording;
mod result;
mod session;
mod session_log;
mod socket;
mod stats;
/// Target addressing and HTTP client
pub mod target;
mod token;

pub use auth::{detect_server_type, ConnectApiKey, CredentialLogin, PreSession};
pub use config::LoadTestConfig;
pub use event::{status_matches, Event, HttpMethod, RequestKind};
pub use load_test::{LoadTest, LoadTestSummary};
pub use recording::{Recording, RecordingProps, ServerType, RECORDING_VERSION};
pub use result::{VolleyError, VolleyResult};
pub use session::{Session, SessionOutcome};
pub use session_log::{SessionIds, SessionLog, COLUMNS};
pub use socket::{SessionSocket, SocketOptions};
pub use stats::{StatCounts, Stats, Transition};
pub use target::{join_paths, SessionHttp, USER_AGENT};
pub use token::{extract_placeholders, Token, TokenDictionary};
