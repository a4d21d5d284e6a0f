//! Session Replay State Machine
//!
//! A [`Session`] is one simulated user replaying the recording once. It owns
//! its HTTP client and cookie jar, its WebSocket, its token dictionary and its
//! CSV log; nothing here is shared with other sessions except the [`Stats`]
//! passed into [`Session::run`].
//!
//! ```text
//! Created ──run──► Running ──last event──► Done
//!                     │
//!                     └──any failure──────► Failed
//! ```

use crate::auth::PreSession;
use crate::event::{status_matches, Event, HttpMethod};
use crate::result::{VolleyError, VolleyResult};
use crate::session_log::{SessionIds, SessionLog};
use crate::socket::{SessionSocket, SocketOptions};
use crate::stats::{Stats, Transition};
use crate::target::{websocket_url, SessionHttp};
use crate::token::{Token, TokenDictionary};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Terminal state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every event was replayed
    Done,
    /// Replay stopped at a failure
    Failed,
}

/// One simulated user
#[derive(Debug)]
pub struct Session {
    ids: SessionIds,
    http: SessionHttp,
    socket_options: SocketOptions,
    tokens: TokenDictionary,
    socket: Option<SessionSocket>,
    socket_opened: bool,
    last_event_end: Option<i64>,
    log: SessionLog,
}

impl Session {
    /// Create a session with freshly seeded tokens
    #[must_use]
    pub fn new(
        ids: SessionIds,
        http: SessionHttp,
        socket_options: SocketOptions,
        log: SessionLog,
    ) -> Self {
        let mut session = Self {
            ids,
            http,
            socket_options,
            tokens: TokenDictionary::new(),
            socket: None,
            socket_opened: false,
            last_event_end: None,
            log,
        };
        session.log_row("PLAYER_SESSION_CREATE", 0);
        session
    }

    /// Session identity
    #[must_use]
    pub const fn ids(&self) -> SessionIds {
        self.ids
    }

    /// `begin` of the last handled event
    #[must_use]
    pub const fn last_event_end(&self) -> Option<i64> {
        self.last_event_end
    }

    /// Whether the script has opened its WebSocket yet
    #[must_use]
    pub const fn socket_opened(&self) -> bool {
        self.socket_opened
    }

    /// Session token values
    #[must_use]
    pub const fn tokens(&self) -> &TokenDictionary {
        &self.tokens
    }

    /// Substitute this session's tokens into `template`
    pub fn render(&self, template: &str) -> VolleyResult<String> {
        self.tokens.substitute(template)
    }

    /// Bind a token value
    pub fn bind(&mut self, token: Token, value: impl Into<String>) {
        self.tokens.set(token, value);
    }

    // =========================================================================
    // Run loop
    // =========================================================================

    /// Replay `events` once
    ///
    /// Never returns an error: every failure ends this session only and is
    /// recorded in its log and in `stats`.
    pub async fn run(
        mut self,
        events: &[Event],
        start_delay: Duration,
        stats: &Stats,
        pre_session: Option<&dyn PreSession>,
    ) -> SessionOutcome {
        if let Some(step) = pre_session {
            if let Err(e) = step.prepare(&self.http).await {
                stats.transition(Transition::Running);
                return self.fail(stats, 0, &e);
            }
        }

        if !start_delay.is_zero() {
            self.log_row("PLAYBACK_START_INTERVAL_START", 0);
            tokio::time::sleep(start_delay).await;
            self.log_row("PLAYBACK_START_INTERVAL_END", 0);
        }

        stats.transition(Transition::Running);

        for event in events {
            let line = event.line_number();
            let pause = event.sleep_before(&self);
            if !pause.is_zero() {
                self.log_row("PLAYBACK_SLEEPBEFORE_START", line);
                tokio::time::sleep(pause).await;
                self.log_row("PLAYBACK_SLEEPBEFORE_END", line);
            }

            if let Err(e) = self.step(event).await {
                return self.fail(stats, line, &e);
            }
            self.last_event_end = Some(event.begin());

            if let Some(e) = self.pending_failure() {
                return self.fail(stats, line, &e);
            }
        }

        stats.transition(Transition::Done);
        self.log_row("PLAYBACK_DONE", 0);
        SessionOutcome::Done
    }

    async fn step(&mut self, event: &Event) -> VolleyResult<()> {
        // The socket may have failed while we slept
        if let Some(e) = self.pending_failure() {
            return Err(e);
        }
        let line = event.line_number();
        self.log_row(&format!("{}_START", event.name()), line);
        event.handle(self).await?;
        self.log_row(&format!("{}_END", event.name()), line);
        Ok(())
    }

    fn fail(mut self, stats: &Stats, line_number: usize, err: &VolleyError) -> SessionOutcome {
        stats.transition(Transition::Failed);
        if let Err(e) = self.log.fail(line_number, &err.to_string()) {
            warn!("session {}: log write failed: {e}", self.ids.session);
        }
        debug!(
            "session {} failed at line {line_number}: {err}",
            self.ids.session
        );
        self.socket = None;
        SessionOutcome::Failed
    }

    fn pending_failure(&self) -> Option<VolleyError> {
        self.socket.as_ref().and_then(|socket| socket.failure().take())
    }

    fn log_row(&mut self, event: &str, line_number: usize) {
        if let Err(e) = self.log.row(event, line_number, "") {
            warn!("session {}: log write failed: {e}", self.ids.session);
        }
    }

    // =========================================================================
    // Event primitives
    // =========================================================================

    pub(crate) async fn http_request(
        &self,
        method: HttpMethod,
        url: &str,
        expected_status: u16,
        body_file: Option<&Path>,
    ) -> VolleyResult<String> {
        let url = self.http.url_for(&self.render(url)?);
        let reply = match method {
            HttpMethod::Get => self.http.get(&url).await?,
            HttpMethod::Post => {
                let body = match body_file {
                    Some(path) => Some(tokio::fs::read(path).await?),
                    None => None,
                };
                self.http.post(&url, body).await?
            }
        };
        debug!("{method} {url} -> {}", reply.status);

        if !status_matches(expected_status, reply.status) {
            return Err(VolleyError::UnexpectedStatus {
                expected: expected_status,
                actual: reply.status,
                url,
                body: reply.body,
            });
        }
        Ok(reply.body)
    }

    pub(crate) async fn open_socket(&mut self, url: &str) -> VolleyResult<()> {
        if self.socket.is_some() {
            return Err(VolleyError::websocket(
                "Tried to WS_OPEN but already have a websocket",
            ));
        }
        let url = websocket_url(self.http.app_url(), &self.render(url)?)?;
        let cookie = self.http.cookie_header();
        let socket = SessionSocket::connect(
            &url,
            self.http.headers(),
            cookie.as_deref(),
            &self.socket_options,
        )
        .await?;
        debug!("WS_OPEN connected to {url}");
        self.socket = Some(socket);
        self.socket_opened = true;
        Ok(())
    }

    pub(crate) async fn send(&mut self, message: &str) -> VolleyResult<()> {
        let text = self.render(message)?;
        self.socket_mut("WS_SEND")?.send(text.clone()).await?;
        debug!("WS_SEND sent: {text}");
        Ok(())
    }

    pub(crate) async fn receive(&mut self, event: &str, line_number: usize) -> VolleyResult<String> {
        self.socket_mut(event)?.receive(event, line_number).await
    }

    pub(crate) async fn close_socket(&mut self) -> VolleyResult<()> {
        let socket = self
            .socket
            .take()
            .ok_or_else(|| VolleyError::websocket("Tried to WS_CLOSE without an open websocket"))?;
        socket.close().await?;
        debug!("WS_CLOSE sent");
        Ok(())
    }

    fn socket_mut(&mut self, event: &str) -> VolleyResult<&mut SessionSocket> {
        self.socket
            .as_mut()
            .ok_or_else(|| VolleyError::websocket(format!("{event} without an open websocket")))
    }
}
