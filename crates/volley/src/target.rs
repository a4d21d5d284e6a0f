//! Target addressing and the per-session HTTP client

use crate::result::{VolleyError, VolleyResult};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use std::sync::Arc;

/// User agent sent with every request and handshake
pub const USER_AGENT: &str = concat!("volley/", env!("CARGO_PKG_VERSION"));

/// Join two URL fragments with exactly one slash between them
#[must_use]
pub fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (true, false) | (false, true) => format!("{base}{path}"),
        (false, false) => format!("{base}/{path}"),
    }
}

/// Parse and check an app URL
pub fn parse_app_url(url: &str) -> VolleyResult<Url> {
    let parsed =
        Url::parse(url).map_err(|e| VolleyError::config(format!("invalid app URL {url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(VolleyError::config(format!(
            "unsupported scheme '{other}' in app URL {url}"
        ))),
    }
}

/// WebSocket URL for a rendered path under the app
///
/// Query parameters on the app URL (bookmarked state) are dropped.
pub fn websocket_url(app_url: &Url, path: &str) -> VolleyResult<String> {
    let scheme = match app_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(VolleyError::config(format!("Unknown scheme: {other}"))),
    };
    let mut base = app_url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.set_scheme(scheme)
        .map_err(|()| VolleyError::config(format!("cannot derive websocket URL from {app_url}")))?;
    Ok(join_paths(base.as_str(), path))
}

/// Parse `(name, value)` pairs into a header map
pub fn header_map(headers: &[(String, String)]) -> VolleyResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| VolleyError::config(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| VolleyError::config(format!("invalid value for header {name}: {e}")))?;
        map.append(name, value);
    }
    Ok(map)
}

/// Response status, headers and body
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Body text
    pub body: String,
}

/// One session's HTTP client and cookie jar
#[derive(Debug, Clone)]
pub struct SessionHttp {
    client: Client,
    jar: Arc<Jar>,
    app_url: Url,
    headers: HeaderMap,
}

impl SessionHttp {
    /// Client with a fresh cookie jar
    pub fn new(app_url: Url, headers: HeaderMap) -> VolleyResult<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers.clone())
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        Ok(Self {
            client,
            jar,
            app_url,
            headers,
        })
    }

    /// Underlying client, carrying the session's cookies and headers
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// App URL every event path is relative to
    #[must_use]
    pub const fn app_url(&self) -> &Url {
        &self.app_url
    }

    /// Custom headers sent with every request
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Absolute URL for a rendered event path
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        join_paths(self.app_url.as_str(), path)
    }

    /// `Cookie` header value for the app, if any cookies are stored
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.app_url)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    /// Whether a cookie with this name is stored for the app
    #[must_use]
    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookie_header().is_some_and(|header| {
            header
                .split(';')
                .filter_map(|pair| pair.trim().split_once('='))
                .any(|(n, _)| n == name)
        })
    }

    /// Store a cookie for the app
    pub fn add_cookie(&self, cookie: &str) {
        self.jar.add_cookie_str(cookie, &self.app_url);
    }

    /// GET an absolute URL
    pub async fn get(&self, url: &str) -> VolleyResult<HttpReply> {
        let response = self.client.get(url).send().await?;
        Self::reply(response).await
    }

    /// POST an absolute URL with an optional raw body
    pub async fn post(&self, url: &str, body: Option<Vec<u8>>) -> VolleyResult<HttpReply> {
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = request.send().await?;
        Self::reply(response).await
    }

    async fn reply(response: reqwest::Response) -> VolleyResult<HttpReply> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(HttpReply {
            status,
            headers,
            body,
        })
    }
}
