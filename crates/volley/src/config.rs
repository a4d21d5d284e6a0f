//! Load test configuration

use crate::auth::{ConnectApiKey, CredentialLogin, PreSession};
use crate::queue::DEFAULT_CAPACITY;
use crate::recording::ServerType;
use crate::result::{VolleyError, VolleyResult};
use crate::socket::SocketOptions;
use crate::target::parse_app_url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Load test configuration
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    /// App to test
    pub app_url: String,
    /// Concurrent simulated users
    pub workers: usize,
    /// Steady-state hold after warm-up
    pub loaded_duration: Duration,
    /// Where session logs go; `None` discards them
    pub output_dir: Option<PathBuf>,
    /// Delay between worker starts; defaults to recording duration / workers
    pub start_interval: Option<Duration>,
    /// Extra headers for every request and handshake
    pub headers: Vec<(String, String)>,
    /// Unread messages a session may fall behind the server
    pub receive_queue_capacity: usize,
    /// WebSocket handshake timeout
    pub connect_timeout: Duration,
    /// Interval between "still waiting" warnings while receiving
    pub receive_warn_interval: Duration,
    /// Interval between stats reports
    pub report_interval: Duration,
    /// Iterations per worker; unlimited when `None`
    pub max_iterations: Option<u64>,
    /// Probe the target and warn when it differs from the recording
    pub detect_server_type: bool,
    /// Step run before each session's script
    pub pre_session: Option<Arc<dyn PreSession>>,
    /// Connect API key, sent only to targets served by RStudio Connect
    pub connect_api_key: Option<ConnectApiKey>,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            app_url: String::new(),
            workers: 1,
            loaded_duration: Duration::from_secs(5 * 60),
            output_dir: None,
            start_interval: None,
            headers: Vec::new(),
            receive_queue_capacity: DEFAULT_CAPACITY,
            connect_timeout: Duration::from_secs(5),
            receive_warn_interval: Duration::from_secs(30),
            report_interval: Duration::from_secs(5),
            max_iterations: None,
            detect_server_type: true,
            pre_session: None,
            connect_api_key: None,
        }
    }
}

impl LoadTestConfig {
    /// Configuration for an app URL with defaults elsewhere
    #[must_use]
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into(),
            ..Self::default()
        }
    }

    /// Set worker count
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set steady-state hold duration
    #[must_use]
    pub const fn with_loaded_duration(mut self, duration: Duration) -> Self {
        self.loaded_duration = duration;
        self
    }

    /// Set output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Set explicit stagger between worker starts
    #[must_use]
    pub const fn with_start_interval(mut self, interval: Duration) -> Self {
        self.start_interval = Some(interval);
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set receive queue capacity
    #[must_use]
    pub const fn with_receive_queue_capacity(mut self, capacity: usize) -> Self {
        self.receive_queue_capacity = capacity;
        self
    }

    /// Set WebSocket handshake timeout
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set "still waiting" warning interval
    #[must_use]
    pub const fn with_receive_warn_interval(mut self, interval: Duration) -> Self {
        self.receive_warn_interval = interval;
        self
    }

    /// Set stats report interval
    #[must_use]
    pub const fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Cap iterations per worker
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    /// Enable or disable server type detection
    #[must_use]
    pub const fn with_detect_server_type(mut self, detect: bool) -> Self {
        self.detect_server_type = detect;
        self
    }

    /// Set the pre-session step
    #[must_use]
    pub fn with_pre_session(mut self, step: Arc<dyn PreSession>) -> Self {
        self.pre_session = Some(step);
        self
    }

    /// Log in with credentials before each session
    #[must_use]
    pub fn with_credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.with_pre_session(Arc::new(CredentialLogin::new(username, password)))
    }

    /// Authenticate with a Connect API key
    ///
    /// The key is only used when the target is RStudio Connect, or when
    /// detection is disabled. See [`LoadTestConfig::api_key_auth`].
    #[must_use]
    pub fn with_connect_api_key(mut self, key: impl Into<String>) -> Self {
        self.connect_api_key = Some(ConnectApiKey::new(key));
        self
    }

    /// Headers and pre-session step for a run against `server`
    ///
    /// `server` is the detected server type, `None` when detection is off or
    /// failed. The API key header and its cookie-priming step are added only
    /// when the key may be sent to this target.
    pub fn api_key_auth(
        &self,
        server: Option<ServerType>,
    ) -> (Vec<(String, String)>, Option<Arc<dyn PreSession>>) {
        let mut headers = self.headers.clone();
        let mut pre_session = self.pre_session.clone();
        let Some(key) = &self.connect_api_key else {
            return (headers, pre_session);
        };
        let allowed = match server {
            Some(server) => server == ServerType::Rsc,
            None => !self.detect_server_type,
        };
        if allowed {
            headers.push(key.header());
            pre_session = Some(Arc::new(key.clone()));
        } else {
            warn!(
                "Connect API key ignored: target is {}",
                server.map_or_else(|| "unknown".to_string(), |s| s.to_string())
            );
        }
        (headers, pre_session)
    }

    /// Check the configuration before a run
    pub fn validate(&self) -> VolleyResult<()> {
        if self.workers == 0 {
            return Err(VolleyError::config("workers must be at least 1"));
        }
        if self.receive_queue_capacity == 0 {
            return Err(VolleyError::config("receive queue capacity must be at least 1"));
        }
        if self.report_interval.is_zero() || self.receive_warn_interval.is_zero() {
            return Err(VolleyError::config("report and warning intervals must be non-zero"));
        }
        parse_app_url(&self.app_url)?;
        Ok(())
    }

    /// Socket parameters derived from this configuration
    #[must_use]
    pub const fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            connect_timeout: self.connect_timeout,
            queue_capacity: self.receive_queue_capacity,
            warn_interval: self.receive_warn_interval,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoadTestConfig::new("http://localhost:3838/");
        assert_eq!(config.workers, 1);
        assert_eq!(config.receive_queue_capacity, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.receive_warn_interval, Duration::from_secs(30));
        assert_eq!(config.report_interval, Duration::from_secs(5));
        assert_eq!(config.loaded_duration, Duration::from_secs(300));
        assert!(config.start_interval.is_none());
        assert!(config.max_iterations.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = LoadTestConfig::new("https://example.com/app/")
            .with_workers(4)
            .with_start_interval(Duration::from_millis(250))
            .with_max_iterations(2)
            .with_header("X-Test", "1")
            .with_output_dir("/tmp/out");
        assert_eq!(config.workers, 4);
        assert_eq!(config.start_interval, Some(Duration::from_millis(250)));
        assert_eq!(config.max_iterations, Some(2));
        assert_eq!(config.headers, vec![("X-Test".to_string(), "1".to_string())]);
        assert_eq!(config.output_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_workers = LoadTestConfig::new("http://localhost/").with_workers(0);
        assert!(zero_workers.validate().is_err());

        let zero_queue = LoadTestConfig::new("http://localhost/").with_receive_queue_capacity(0);
        assert!(zero_queue.validate().is_err());

        let zero_report = LoadTestConfig::new("http://localhost/").with_report_interval(Duration::ZERO);
        assert!(zero_report.validate().is_err());

        let bad_scheme = LoadTestConfig::new("ws://localhost/");
        assert!(bad_scheme.validate().is_err());
    }

    fn authorization() -> (String, String) {
        ("Authorization".to_string(), "Key abc".to_string())
    }

    #[test]
    fn test_connect_api_key_is_deferred_until_detection() {
        let config = LoadTestConfig::new("http://localhost/").with_connect_api_key("abc");
        assert!(config.connect_api_key.is_some());
        assert!(config.headers.is_empty());
        assert!(config.pre_session.is_none());
    }

    #[test]
    fn test_connect_api_key_sent_to_connect_only() {
        let config = LoadTestConfig::new("http://localhost/")
            .with_header("X-Test", "1")
            .with_connect_api_key("abc");

        let (headers, step) = config.api_key_auth(Some(ServerType::Rsc));
        assert!(headers.contains(&authorization()));
        assert!(headers.contains(&("X-Test".to_string(), "1".to_string())));
        assert!(step.is_some());

        for other in [ServerType::Ssp, ServerType::Sai, ServerType::Shn] {
            let (headers, step) = config.api_key_auth(Some(other));
            assert!(!headers.contains(&authorization()), "{other}");
            assert!(step.is_none(), "{other}");
        }

        // Detection ran but failed
        let (headers, _) = config.api_key_auth(None);
        assert!(!headers.contains(&authorization()));
    }

    #[test]
    fn test_connect_api_key_used_when_detection_disabled() {
        let config = LoadTestConfig::new("http://localhost/")
            .with_detect_server_type(false)
            .with_connect_api_key("abc");
        let (headers, step) = config.api_key_auth(None);
        assert!(headers.contains(&authorization()));
        assert!(step.is_some());
    }
}
