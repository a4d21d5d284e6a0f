//! Protocol Message Codec
//!
//! The target speaks SockJS framing around its own JSON protocol. A typical
//! server frame looks like
//!
//! ```text
//! a["1#0|m|{\"config\":{\"sessionId\":\"...\",\"user\":null}}"]
//! ```
//!
//! where `1#` is a message id added by reconnect-enabled servers, `0|m|`
//! marks a data message and the remainder is a JSON object encoded as a JSON
//! string. `o` opens a SockJS session and `h` is a heartbeat.

use crate::result::{VolleyError, VolleyResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Decoded message payload: the inner JSON object
pub type Payload = Map<String, Value>;

/// The SockJS open frame
pub const OPEN_FRAME: &str = "o";

/// Top-level keys whose messages only report server busy/progress state
const IGNORABLE_KEYS: [&str; 3] = ["busy", "progress", "recalculating"];

struct Patterns {
    message_id: Regex,
    envelope: Regex,
    ignorable: Vec<Regex>,
    worker_base_href: Regex,
}

#[allow(clippy::expect_used)]
fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        message_id: Regex::new(r#"^a\["[0-9A-F]+#"#).expect("message id regex is valid"),
        envelope: Regex::new(r#"(?s)^a\["(\*#)?0\|m\|(.*)"\]$"#).expect("envelope regex is valid"),
        ignorable: [r#"^a\["ACK"#, r#"^\["ACK"#, r"^h$"]
            .iter()
            .map(|re| Regex::new(re).expect("ignorable regex is valid"))
            .collect(),
        worker_base_href: Regex::new(r#"(?s)<base href="_w_([0-9a-z]+)/"#)
            .expect("worker regex is valid"),
    })
}

/// How unrecognised frames are treated by [`parse_envelope_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeMode {
    /// Fall back to parsing the raw frame as JSON (dev servers and SSO
    /// proxies deliver unwrapped messages)
    #[default]
    Lenient,
    /// Only SockJS-wrapped data messages yield a payload
    Strict,
}

/// Replace the variable message id prefix with `*`
///
/// Ids shift whenever ignorable messages sneak into the stream, so they are
/// normalised away before any comparison.
#[must_use]
pub fn normalize(raw: &str) -> Cow<'_, str> {
    patterns().message_id.replace(raw, r#"a["*#"#)
}

/// Decode a frame into its inner JSON object, falling back to plain JSON
///
/// Returns `Ok(None)` for the SockJS open frame.
pub fn parse_envelope(raw: &str) -> VolleyResult<Option<Payload>> {
    parse_envelope_with(raw, EnvelopeMode::Lenient)
}

/// Decode a frame into its inner JSON object
pub fn parse_envelope_with(raw: &str, mode: EnvelopeMode) -> VolleyResult<Option<Payload>> {
    let normalized = normalize(raw);
    if let Some(caps) = patterns().envelope.captures(&normalized) {
        let escaped = caps.get(2).map_or("", |m| m.as_str());
        let inner: String = serde_json::from_str(&format!("\"{escaped}\""))
            .map_err(|e| VolleyError::desync(format!("bad message envelope {raw}: {e}")))?;
        return as_object(&inner, raw).map(Some);
    }
    if raw == OPEN_FRAME {
        return Ok(None);
    }
    match mode {
        EnvelopeMode::Lenient => as_object(raw, raw).map(Some),
        EnvelopeMode::Strict => Ok(None),
    }
}

fn as_object(json: &str, raw: &str) -> VolleyResult<Payload> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(VolleyError::desync(format!(
            "expected a JSON object in message: {raw}"
        ))),
        Err(e) => Err(VolleyError::desync(format!(
            "expected to be able to parse message {raw}: {e}"
        ))),
    }
}

/// Whether a server frame is protocol noise the replay should not see
///
/// Fails with [`VolleyError::ProtocolDesync`] when a frame that does not look
/// ignorable cannot be parsed.
pub fn can_ignore(raw: &str) -> VolleyResult<bool> {
    if patterns().ignorable.iter().any(|re| re.is_match(raw)) {
        return Ok(true);
    }
    if raw == OPEN_FRAME {
        return Ok(false);
    }

    let Some(payload) = parse_envelope(raw)? else {
        return Ok(false);
    };

    if !payload.is_empty() && payload.keys().all(|k| IGNORABLE_KEYS.contains(&k.as_str())) {
        return Ok(true);
    }

    if is_reactlog_only(&payload) {
        return Ok(true);
    }

    Ok(is_empty_update(&payload))
}

/// `{"custom":{"reactlog":...}}` and nothing else
fn is_reactlog_only(payload: &Payload) -> bool {
    payload.len() == 1
        && payload
            .get("custom")
            .and_then(Value::as_object)
            .is_some_and(|custom| custom.len() == 1 && custom.contains_key("reactlog"))
}

/// `{"errors":[],"values":[],"inputMessages":[]}`
fn is_empty_update(payload: &Payload) -> bool {
    let empty = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_array)
            .is_some_and(Vec::is_empty)
    };
    payload.len() == 3 && empty("errors") && empty("values") && empty("inputMessages")
}

/// Top-level key set of a payload
#[must_use]
pub fn key_set(payload: &Payload) -> BTreeSet<&str> {
    payload.keys().map(String::as_str).collect()
}

/// Compare a received frame with the expected one
///
/// Structured messages match when their top-level key sets are equal; the
/// values are regenerated by the server on every run. Unstructured messages
/// (the open frame) must match exactly.
pub fn messages_match(expected: &str, received: &str) -> VolleyResult<bool> {
    match parse_envelope(expected)? {
        None => Ok(expected == received),
        Some(expected_obj) => {
            let received_obj = if received == OPEN_FRAME {
                None
            } else {
                parse_envelope(received)?
            };
            Ok(received_obj.is_some_and(|obj| key_set(&expected_obj) == key_set(&obj)))
        }
    }
}

/// `config.sessionId` from the init message
#[must_use]
pub fn session_id(payload: &Payload) -> Option<&str> {
    payload.get("config")?.get("sessionId")?.as_str()
}

/// `response.value.jobId` from the begin-upload reply
#[must_use]
pub fn upload_job_id(payload: &Payload) -> Option<&str> {
    payload.get("response")?.get("value")?.get("jobId")?.as_str()
}

/// `response.value.uploadUrl` from the begin-upload reply
#[must_use]
pub fn upload_url(payload: &Payload) -> Option<&str> {
    payload.get("response")?.get("value")?.get("uploadUrl")?.as_str()
}

/// Worker id from `<base href="_w_<id>/">` in the app's home page
///
/// Dev servers and SSO fronts do not emit the tag.
#[must_use]
pub fn worker_id(html: &str) -> Option<&str> {
    patterns()
        .worker_base_href
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
