//! Pre-session step: server detection and login
//!
//! Protected apps need cookies before the first recorded request. A
//! [`PreSession`] runs once per session against that session's own
//! [`SessionHttp`], so whatever it stores in the cookie jar is carried by every
//! later request and by the WebSocket handshake.

use crate::recording::ServerType;
use crate::result::{VolleyError, VolleyResult};
use crate::target::{join_paths, HttpReply, SessionHttp};
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Work done before a session's script starts
#[async_trait]
pub trait PreSession: Send + Sync + fmt::Debug {
    /// Prepare the session's HTTP state
    async fn prepare(&self, http: &SessionHttp) -> VolleyResult<()>;
}

// =============================================================================
// Server detection
// =============================================================================

/// Guess which kind of server hosts the app
pub async fn detect_server_type(http: &SessionHttp) -> VolleyResult<ServerType> {
    if http
        .app_url()
        .host_str()
        .is_some_and(|host| host.ends_with(".shinyapps.io"))
    {
        return Ok(ServerType::Sai);
    }
    let reply = http.get(http.app_url().as_str()).await?;
    Ok(server_type_from_reply(&reply))
}

fn server_type_from_reply(reply: &HttpReply) -> ServerType {
    let header_or_cookie = |name: &str| {
        reply.headers.contains_key(name)
            || set_cookie_names(reply)
                .iter()
                .any(|cookie| cookie.eq_ignore_ascii_case(name))
    };

    let express = reply
        .headers
        .get("x-powered-by")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("Express"));

    if express || header_or_cookie("ssp-xsrf") {
        ServerType::Ssp
    } else if header_or_cookie("rscid") {
        ServerType::Rsc
    } else {
        ServerType::Shn
    }
}

fn set_cookie_names(reply: &HttpReply) -> Vec<String> {
    reply
        .headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split_once('=').map(|(name, _)| name.trim().to_string()))
        .collect()
}

// =============================================================================
// Credential login
// =============================================================================

struct InputPatterns {
    hidden_input: Regex,
    name: Regex,
    value: Regex,
}

#[allow(clippy::expect_used)]
fn input_patterns() -> &'static InputPatterns {
    static PATTERNS: OnceLock<InputPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| InputPatterns {
        hidden_input: Regex::new(r#"(?is)<input\b[^>]*\btype\s*=\s*["']hidden["'][^>]*>"#)
            .expect("hidden input regex is valid"),
        name: Regex::new(r#"(?i)\bname\s*=\s*["']([^"']*)["']"#).expect("name regex is valid"),
        value: Regex::new(r#"(?i)\bvalue\s*=\s*["']([^"']*)["']"#).expect("value regex is valid"),
    })
}

/// Hidden `<input>` fields of a login page
#[must_use]
pub fn hidden_inputs(html: &str) -> BTreeMap<String, String> {
    let patterns = input_patterns();
    patterns
        .hidden_input
        .find_iter(html)
        .filter_map(|tag| {
            let tag = tag.as_str();
            let name = patterns.name.captures(tag)?.get(1)?.as_str().to_string();
            let value = patterns
                .value
                .captures(tag)
                .and_then(|c| c.get(1))
                .map_or_else(String::new, |m| m.as_str().to_string());
            Some((name, value))
        })
        .collect()
}

/// Username/password login for RStudio Connect and Shiny Server Pro
#[derive(Clone)]
pub struct CredentialLogin {
    username: String,
    password: String,
    server_type: Option<ServerType>,
}

impl fmt::Debug for CredentialLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLogin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server_type", &self.server_type)
            .finish()
    }
}

impl CredentialLogin {
    /// Login with these credentials
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            server_type: None,
        }
    }

    /// Skip detection and assume this server type
    #[must_use]
    pub const fn with_server_type(mut self, server_type: ServerType) -> Self {
        self.server_type = Some(server_type);
        self
    }

    async fn login_rsc(&self, http: &SessionHttp, login_url: &str) -> VolleyResult<()> {
        let body = serde_json::json!({
            "username": self.username,
            "password": self.password,
        });
        let response = http.client().post(login_url).json(&body).send().await?;
        check_cookie_status(response.status().as_u16())?;
        if !http.has_cookie("rsconnect") {
            return Err(VolleyError::login("Couldn't find RSC auth cookie"));
        }
        Ok(())
    }

    async fn login_ssp(
        &self,
        http: &SessionHttp,
        login_url: &str,
        page: &HttpReply,
    ) -> VolleyResult<()> {
        let mut fields = BTreeMap::new();
        fields.insert("username".to_string(), self.username.clone());
        fields.insert("password".to_string(), self.password.clone());
        fields.extend(hidden_inputs(&page.body));

        let response = http.client().post(login_url).form(&fields).send().await?;
        check_cookie_status(response.status().as_u16())?;
        if !http.has_cookie("session_state") {
            return Err(VolleyError::login("Couldn't find SSP auth cookie"));
        }
        Ok(())
    }
}

#[async_trait]
impl PreSession for CredentialLogin {
    async fn prepare(&self, http: &SessionHttp) -> VolleyResult<()> {
        let page = http.get(http.app_url().as_str()).await?;
        if !matches!(page.status, 403 | 404) {
            info!("Credentials set, but target app doesn't require authentication");
            return Ok(());
        }

        let server = match self.server_type {
            Some(server) => server,
            None => detect_server_type(http).await?,
        };
        let login_url = join_paths(http.app_url().as_str(), "__login__");
        debug!("Logging in to {server} at {login_url}");

        match server {
            ServerType::Rsc => self.login_rsc(http, &login_url).await,
            ServerType::Ssp => self.login_ssp(http, &login_url, &page).await,
            other => Err(VolleyError::login(format!(
                "Can't log in to server type: '{other}'"
            ))),
        }
    }
}

// =============================================================================
// Connect API key
// =============================================================================

/// RStudio Connect API key authentication
///
/// The key itself travels as an `Authorization: Key ...` header on every
/// request; preparing only primes the cookie jar (load balancer affinity).
#[derive(Clone)]
pub struct ConnectApiKey {
    key: String,
}

impl fmt::Debug for ConnectApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectApiKey").finish_non_exhaustive()
    }
}

impl ConnectApiKey {
    /// Wrap an API key
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// `Authorization` header carrying the key
    #[must_use]
    pub fn header(&self) -> (String, String) {
        ("Authorization".to_string(), format!("Key {}", self.key))
    }
}

#[async_trait]
impl PreSession for ConnectApiKey {
    async fn prepare(&self, http: &SessionHttp) -> VolleyResult<()> {
        let response = http.client().get(http.app_url().as_str()).send().await?;
        check_cookie_status(response.status().as_u16())
    }
}

fn check_cookie_status(status: u16) -> VolleyResult<()> {
    if matches!(status, 200 | 302) {
        Ok(())
    } else {
        Err(VolleyError::login(format!(
            "Received status {status} attempting to get cookies"
        )))
    }
}
