//! Event Model
//!
//! One recorded action per variant. Events are parsed once from the recording
//! and shared read-only by every session; all per-session state lives in the
//! [`Session`] passed to [`Event::handle`].

use crate::codec;
use crate::result::{VolleyError, VolleyResult};
use crate::session::Session;
use crate::token::Token;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// HTTP method of a recorded request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST (file uploads)
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// What a recorded HTTP request was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Static asset or upload; only the status is checked
    Plain,
    /// The app's home page, which names the worker
    Home,
    /// SockJS `/info` request
    SockJsInfo,
    /// `__token__` request whose body is the token
    Token,
}

/// A single recorded action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// HTTP request with an expected status
    HttpRequest {
        /// Capture time, epoch milliseconds
        begin: i64,
        /// Line in the recording
        line_number: usize,
        /// Request purpose
        kind: RequestKind,
        /// Path relative to the app URL, may contain placeholders
        url: String,
        /// Recorded status
        expected_status: u16,
        /// Request method
        method: HttpMethod,
        /// Request body for uploads, resolved against the recording directory
        body_file: Option<PathBuf>,
    },
    /// Open the WebSocket
    WsOpen {
        /// Capture time, epoch milliseconds
        begin: i64,
        /// Line in the recording
        line_number: usize,
        /// Path relative to the app URL, may contain placeholders
        url: String,
    },
    /// Send a frame
    WsSend {
        /// Capture time, epoch milliseconds
        begin: i64,
        /// Line in the recording
        line_number: usize,
        /// Frame text, may contain placeholders
        message: String,
    },
    /// Receive a frame
    WsRecv {
        /// Capture time, epoch milliseconds
        begin: i64,
        /// Line in the recording
        line_number: usize,
        /// Recorded frame text
        expected_message: String,
    },
    /// Receive the init frame carrying the session id
    WsRecvInit {
        /// Capture time, epoch milliseconds
        begin: i64,
        /// Line in the recording
        line_number: usize,
        /// Recorded frame text
        expected_message: String,
    },
    /// Receive the reply to a begin-upload request
    WsRecvBeginUpload {
        /// Capture time, epoch milliseconds
        begin: i64,
        /// Line in the recording
        line_number: usize,
        /// Recorded frame text
        expected_message: String,
    },
    /// Close the WebSocket
    WsClose {
        /// Capture time, epoch milliseconds
        begin: i64,
        /// Line in the recording
        line_number: usize,
    },
}

/// Raw JSON shape of one recording line
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    begin: Begin,
    url: Option<String>,
    status: Option<u16>,
    message: Option<String>,
    datafile: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Begin {
    Millis(i64),
    Timestamp(String),
}

impl Begin {
    fn millis(&self, line_number: usize) -> VolleyResult<i64> {
        match self {
            Self::Millis(ms) => Ok(*ms),
            Self::Timestamp(ts) => chrono::DateTime::parse_from_rfc3339(ts)
                .map(|t| t.timestamp_millis())
                .map_err(|e| VolleyError::malformed_at(line_number, format!("bad begin {ts}: {e}"))),
        }
    }
}

impl Event {
    /// Parse one non-comment recording line
    pub fn parse(line: &str, line_number: usize, base_dir: &Path) -> VolleyResult<Self> {
        let raw: RawEvent = serde_json::from_str(line)
            .map_err(|e| VolleyError::malformed_at(line_number, e.to_string()))?;
        let begin = raw.begin.millis(line_number)?;

        let missing = |field: &str| {
            VolleyError::malformed_at(line_number, format!("{} event is missing '{field}'", raw.kind))
        };
        let url = || raw.url.clone().ok_or_else(|| missing("url"));
        let status = || raw.status.ok_or_else(|| missing("status"));
        let message = || raw.message.clone().ok_or_else(|| missing("message"));

        let http = |kind: RequestKind, method: HttpMethod| -> VolleyResult<Self> {
            Ok(Self::HttpRequest {
                begin,
                line_number,
                kind,
                url: url()?,
                expected_status: status()?,
                method,
                body_file: match method {
                    HttpMethod::Post => raw.datafile.as_ref().map(|f| base_dir.join(f)),
                    HttpMethod::Get => None,
                },
            })
        };

        match raw.kind.as_str() {
            "REQ_GET" => http(RequestKind::Plain, HttpMethod::Get),
            "REQ_HOME" => http(RequestKind::Home, HttpMethod::Get),
            "REQ_SINF" => http(RequestKind::SockJsInfo, HttpMethod::Get),
            "REQ_TOK" => http(RequestKind::Token, HttpMethod::Get),
            "REQ_POST" => http(RequestKind::Plain, HttpMethod::Post),
            "WS_OPEN" => Ok(Self::WsOpen {
                begin,
                line_number,
                url: url()?,
            }),
            "WS_SEND" => Ok(Self::WsSend {
                begin,
                line_number,
                message: message()?,
            }),
            "WS_RECV" => Ok(Self::WsRecv {
                begin,
                line_number,
                expected_message: message()?,
            }),
            "WS_RECV_INIT" => Ok(Self::WsRecvInit {
                begin,
                line_number,
                expected_message: message()?,
            }),
            "WS_RECV_BEGIN_UPLOAD" => Ok(Self::WsRecvBeginUpload {
                begin,
                line_number,
                expected_message: message()?,
            }),
            "WS_CLOSE" => Ok(Self::WsClose { begin, line_number }),
            other => Err(VolleyError::malformed_at(
                line_number,
                format!("Unknown event type: {other}"),
            )),
        }
    }

    /// Capture time, epoch milliseconds
    #[must_use]
    pub const fn begin(&self) -> i64 {
        match self {
            Self::HttpRequest { begin, .. }
            | Self::WsOpen { begin, .. }
            | Self::WsSend { begin, .. }
            | Self::WsRecv { begin, .. }
            | Self::WsRecvInit { begin, .. }
            | Self::WsRecvBeginUpload { begin, .. }
            | Self::WsClose { begin, .. } => *begin,
        }
    }

    /// Physical 1-based line of this event in the recording file
    ///
    /// Property and comment lines are counted, so the number can be used to
    /// jump straight to the line in an editor.
    #[must_use]
    pub const fn line_number(&self) -> usize {
        match self {
            Self::HttpRequest { line_number, .. }
            | Self::WsOpen { line_number, .. }
            | Self::WsSend { line_number, .. }
            | Self::WsRecv { line_number, .. }
            | Self::WsRecvInit { line_number, .. }
            | Self::WsRecvBeginUpload { line_number, .. }
            | Self::WsClose { line_number, .. } => *line_number,
        }
    }

    /// Type tag as written in recordings and session logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::HttpRequest {
                method: HttpMethod::Post,
                ..
            } => "REQ_POST",
            Self::HttpRequest { kind, .. } => match kind {
                RequestKind::Plain => "REQ_GET",
                RequestKind::Home => "REQ_HOME",
                RequestKind::SockJsInfo => "REQ_SINF",
                RequestKind::Token => "REQ_TOK",
            },
            Self::WsOpen { .. } => "WS_OPEN",
            Self::WsSend { .. } => "WS_SEND",
            Self::WsRecv { .. } => "WS_RECV",
            Self::WsRecvInit { .. } => "WS_RECV_INIT",
            Self::WsRecvBeginUpload { .. } => "WS_RECV_BEGIN_UPLOAD",
            Self::WsClose { .. } => "WS_CLOSE",
        }
    }

    /// How long to wait before handling this event
    ///
    /// Page-load requests before the socket opens fire back to back, and
    /// receives wait on the network rather than the clock.
    #[must_use]
    pub fn sleep_before(&self, session: &Session) -> Duration {
        let paced = |begin: i64| {
            let gap = session.last_event_end().map_or(0, |end| (begin - end).max(0));
            Duration::from_millis(gap as u64)
        };
        match self {
            Self::HttpRequest { begin, .. } if session.socket_opened() => paced(*begin),
            Self::WsSend { begin, .. } | Self::WsClose { begin, .. } => paced(*begin),
            Self::HttpRequest { .. }
            | Self::WsOpen { .. }
            | Self::WsRecv { .. }
            | Self::WsRecvInit { .. }
            | Self::WsRecvBeginUpload { .. } => Duration::ZERO,
        }
    }

    /// Perform this event against the session's target
    pub async fn handle(&self, session: &mut Session) -> VolleyResult<()> {
        match self {
            Self::HttpRequest {
                kind,
                url,
                expected_status,
                method,
                body_file,
                ..
            } => {
                let body = session
                    .http_request(*method, url, *expected_status, body_file.as_deref())
                    .await?;
                match kind {
                    RequestKind::Home => match codec::worker_id(&body) {
                        Some(worker) => session.bind(Token::Worker, worker),
                        None => debug!("{}: no worker id in home page", self.name()),
                    },
                    RequestKind::Token => session.bind(Token::Token, body),
                    RequestKind::Plain | RequestKind::SockJsInfo => {}
                }
                Ok(())
            }
            Self::WsOpen { url, .. } => session.open_socket(url).await,
            Self::WsSend { message, .. } => session.send(message).await,
            Self::WsRecv {
                expected_message, ..
            } => {
                self.receive_expected(session, expected_message).await?;
                Ok(())
            }
            Self::WsRecvInit {
                expected_message, ..
            } => {
                let received = self.receive_expected(session, expected_message).await?;
                let payload = codec::parse_envelope(&received)?;
                let id = payload
                    .as_ref()
                    .and_then(codec::session_id)
                    .ok_or_else(|| {
                        VolleyError::desync(format!(
                            "Expected sessionId from WS_RECV_INIT message. Message: {received}"
                        ))
                    })?;
                debug!("WS_RECV_INIT got SESSION: {id}");
                session.bind(Token::Session, id);
                Ok(())
            }
            Self::WsRecvBeginUpload {
                expected_message, ..
            } => {
                let received = self.receive_expected(session, expected_message).await?;
                let payload = codec::parse_envelope(&received)?;
                let job = payload
                    .as_ref()
                    .and_then(codec::upload_job_id)
                    .ok_or_else(|| {
                        VolleyError::desync(format!(
                            "Expected jobId from WS_RECV_BEGIN_UPLOAD message. Message: {received}"
                        ))
                    })?;
                debug!("WS_RECV_BEGIN_UPLOAD got jobId: {job}");
                session.bind(Token::UploadJobId, job);
                if let Some(upload_url) = payload.as_ref().and_then(codec::upload_url) {
                    session.bind(Token::UploadUrl, upload_url);
                }
                Ok(())
            }
            Self::WsClose { .. } => session.close_socket().await,
        }
    }

    /// Take the next frame and check it against the recorded one
    async fn receive_expected(&self, session: &mut Session, expected: &str) -> VolleyResult<String> {
        let received = session.receive(self.name(), self.line_number()).await?;
        let received = session.render(&received)?;
        debug!("{} received: {received}", self.name());

        let expected = session.render(expected)?;
        if codec::messages_match(&expected, &received)? {
            Ok(received)
        } else {
            Err(VolleyError::MessageMismatch {
                expected,
                actual: received,
            })
        }
    }
}

/// Status comparison with 200 and 304 treated as the same outcome
#[must_use]
pub const fn status_matches(expected: u16, actual: u16) -> bool {
    expected == actual || matches!((expected, actual), (200, 304) | (304, 200))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(line: &str) -> VolleyResult<Event> {
        Event::parse(line, 3, Path::new("/rec"))
    }

    #[test]
    fn test_parse_http_kinds() {
        let cases = [
            ("REQ_GET", RequestKind::Plain),
            ("REQ_HOME", RequestKind::Home),
            ("REQ_SINF", RequestKind::SockJsInfo),
            ("REQ_TOK", RequestKind::Token),
        ];
        for (tag, expected_kind) in cases {
            let line = format!(r#"{{"type":"{tag}","begin":10,"url":"/x","status":200}}"#);
            let event = parse(&line).unwrap();
            assert_eq!(event.name(), tag);
            match event {
                Event::HttpRequest { kind, method, .. } => {
                    assert_eq!(kind, expected_kind);
                    assert_eq!(method, HttpMethod::Get);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_post_with_datafile() {
        let event =
            parse(r#"{"type":"REQ_POST","begin":1,"url":"/upload","status":200,"datafile":"f.bin"}"#)
                .unwrap();
        assert_eq!(event.name(), "REQ_POST");
        match event {
            Event::HttpRequest {
                method, body_file, ..
            } => {
                assert_eq!(method, HttpMethod::Post);
                assert_eq!(body_file, Some(PathBuf::from("/rec/f.bin")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_rfc3339_begin() {
        let event = parse(r#"{"type":"WS_CLOSE","begin":"1970-01-01T00:00:01.250Z"}"#).unwrap();
        assert_eq!(event.begin(), 1250);
        assert_eq!(event.line_number(), 3);
    }

    #[test]
    fn test_parse_ws_variants() {
        let recv = parse(r#"{"type":"WS_RECV_INIT","begin":0,"message":"a[\"x\"]"}"#).unwrap();
        assert!(matches!(recv, Event::WsRecvInit { ref expected_message, .. } if expected_message == "a[\"x\"]"));

        let open = parse(r#"{"type":"WS_OPEN","begin":0,"url":"/websocket/"}"#).unwrap();
        assert_eq!(open.name(), "WS_OPEN");
    }

    #[test]
    fn test_parse_missing_field() {
        let err = parse(r#"{"type":"WS_SEND","begin":0}"#).unwrap_err();
        assert!(err.to_string().contains("message"));
        assert!(matches!(
            err,
            VolleyError::MalformedRecording { line: Some(3), .. }
        ));
    }

    #[test]
    fn test_parse_unknown_type() {
        let err = parse(r#"{"type":"REQ_PUT","begin":0,"url":"/"}"#).unwrap_err();
        assert!(err.to_string().contains("Unknown event type: REQ_PUT"));
    }

    #[test]
    fn test_parse_not_json() {
        assert!(parse("REQ_GET /").is_err());
    }

    #[test]
    fn test_status_matches() {
        assert!(status_matches(200, 200));
        assert!(status_matches(200, 304));
        assert!(status_matches(304, 200));
        assert!(!status_matches(200, 404));
        assert!(!status_matches(302, 304));
    }
}
