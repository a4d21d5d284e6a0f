//! Token Dictionary
//!
//! A restricted templating engine for server-assigned identifiers. Recorded
//! URLs and messages carry `${NAME}` placeholders where the capture phase saw
//! values that only the live server can supply (session ids, worker ids, upload
//! jobs). Each replay session owns one [`TokenDictionary`]; values are bound as
//! the matching responses arrive and substituted into everything that crosses
//! the wire.

use crate::result::{VolleyError, VolleyResult};
use regex::{NoExpand, Regex, RegexBuilder};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Placeholder syntax: `${NAME}` with `NAME` in `[A-Z_]+`
#[allow(clippy::expect_used)]
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Z_]+)\}").expect("placeholder regex is valid"))
}

/// The fixed token vocabulary understood by the replay engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    /// Worker id embedded in the app's home page
    Worker,
    /// Raw body of the `__token__` response
    Token,
    /// Session-local random id used by reconnect-enabled servers
    RobustId,
    /// Session-local SockJS server/session path segment
    SockJsId,
    /// Session id announced by the first structured message
    Session,
    /// Upload endpoint returned when a file upload begins
    UploadUrl,
    /// Upload job id returned when a file upload begins
    UploadJobId,
}

impl Token {
    /// Every token in the vocabulary
    pub const ALL: [Self; 7] = [
        Self::Worker,
        Self::Token,
        Self::RobustId,
        Self::SockJsId,
        Self::Session,
        Self::UploadUrl,
        Self::UploadJobId,
    ];

    /// Placeholder name as it appears in recordings
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Worker => "WORKER",
            Self::Token => "TOKEN",
            Self::RobustId => "ROBUST_ID",
            Self::SockJsId => "SOCKJSID",
            Self::Session => "SESSION",
            Self::UploadUrl => "UPLOAD_URL",
            Self::UploadJobId => "UPLOAD_JOB_ID",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Token {
    type Err = VolleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|token| token.name() == s)
            .ok_or_else(|| VolleyError::IllegalToken {
                names: vec![s.to_string()],
            })
    }
}

/// Names of every `${NAME}` placeholder in `s`
#[must_use]
pub fn extract_placeholders(s: &str) -> BTreeSet<String> {
    placeholder_regex()
        .captures_iter(s)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Per-session token values over an allowed vocabulary
#[derive(Debug, Clone)]
pub struct TokenDictionary {
    allowed: BTreeSet<String>,
    values: HashMap<String, String>,
}

impl Default for TokenDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenDictionary {
    /// Dictionary over the fixed vocabulary, seeded with fresh `ROBUST_ID`
    /// and `SOCKJSID` values
    #[must_use]
    pub fn new() -> Self {
        let mut dict = Self::empty();
        dict.set(Token::RobustId, random_hex(18));
        dict.set(Token::SockJsId, format!("000/{}", random_hex(8)));
        dict
    }

    /// Dictionary over the fixed vocabulary with nothing bound
    #[must_use]
    pub fn empty() -> Self {
        Self::with_vocabulary(Token::ALL.iter().map(|t| t.name()))
    }

    /// Dictionary over a caller-supplied vocabulary
    pub fn with_vocabulary<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: names.into_iter().map(Into::into).collect(),
            values: HashMap::new(),
        }
    }

    /// Bind a vocabulary token
    pub fn set(&mut self, token: Token, value: impl Into<String>) {
        self.values.insert(token.name().to_string(), value.into());
    }

    /// Bind a token by name, rejecting names outside the vocabulary
    pub fn register(&mut self, name: &str, value: impl Into<String>) -> VolleyResult<()> {
        if !self.allowed.contains(name) {
            return Err(VolleyError::IllegalToken {
                names: vec![name.to_string()],
            });
        }
        self.values.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Value bound to a vocabulary token
    #[must_use]
    pub fn get(&self, token: Token) -> Option<&str> {
        self.lookup(token.name())
    }

    /// Value bound to a token name
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Replace every placeholder in `s` with its bound value
    ///
    /// Fails with [`VolleyError::IllegalToken`] when a placeholder is outside
    /// the vocabulary and with [`VolleyError::UnboundToken`] when it is
    /// allowed but not yet bound. Replacement ignores case, so `${worker}` is
    /// rewritten alongside `${WORKER}` once `WORKER` appears in `s`.
    pub fn substitute(&self, s: &str) -> VolleyResult<String> {
        let names = extract_placeholders(s);

        let illegal: Vec<String> = names
            .iter()
            .filter(|name| !self.allowed.contains(*name))
            .cloned()
            .collect();
        if !illegal.is_empty() {
            return Err(VolleyError::IllegalToken { names: illegal });
        }

        let mut rendered = s.to_string();
        for name in &names {
            let value = self
                .lookup(name)
                .ok_or_else(|| VolleyError::UnboundToken { name: name.clone() })?;
            let pattern = RegexBuilder::new(&regex::escape(&format!("${{{name}}}")))
                .case_insensitive(true)
                .build()
                .map_err(|e| VolleyError::desync(format!("bad token pattern for {name}: {e}")))?;
            rendered = pattern.replace_all(&rendered, NoExpand(value)).into_owned();
        }
        Ok(rendered)
    }
}

/// Lowercase hex string of exactly `len` random characters
fn random_hex(len: usize) -> String {
    let mut out = String::with_capacity(len);
    while out.len() < len {
        out.push_str(&uuid::Uuid::new_v4().simple().to_string());
    }
    out.truncate(len);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "foo${LOL}bar${LMAO}";

    fn funny_dictionary() -> TokenDictionary {
        let mut dict = TokenDictionary::with_vocabulary(["LOL", "DUCK", "LMAO"]);
        dict.register("LOL", " funny! ").unwrap();
        dict.register("LMAO", " very funny!!! ").unwrap();
        dict
    }

    #[test]
    fn test_extract_placeholders() {
        let names = extract_placeholders(TEMPLATE);
        let expected: BTreeSet<String> = ["LOL", "LMAO"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_extract_ignores_lowercase_names() {
        assert!(extract_placeholders("${lower} and $PLAIN").is_empty());
    }

    #[test]
    fn test_substitute_replaces_all() {
        let rendered = funny_dictionary().substitute(TEMPLATE).unwrap();
        assert_eq!(rendered, "foo funny! bar very funny!!! ");
    }

    #[test]
    fn test_substitute_repeated_placeholder() {
        let rendered = funny_dictionary().substitute("${LOL}|${LOL}").unwrap();
        assert_eq!(rendered, " funny! | funny! ");
    }

    #[test]
    fn test_substitute_is_case_insensitive() {
        let rendered = funny_dictionary().substitute("${LOL}/${lol}").unwrap();
        assert_eq!(rendered, " funny! / funny! ");
    }

    #[test]
    fn test_substitute_illegal_token() {
        let err = funny_dictionary().substitute("${NOPE}").unwrap_err();
        assert!(matches!(err, VolleyError::IllegalToken { ref names } if names == &["NOPE".to_string()]));
    }

    #[test]
    fn test_substitute_unbound_token() {
        let err = funny_dictionary().substitute("${DUCK}").unwrap_err();
        assert!(matches!(err, VolleyError::UnboundToken { ref name } if name == "DUCK"));
    }

    #[test]
    fn test_substitute_value_with_dollar_is_literal() {
        let mut dict = TokenDictionary::empty();
        dict.set(Token::Session, "$1abc");
        assert_eq!(dict.substitute("s=${SESSION}").unwrap(), "s=$1abc");
    }

    #[test]
    fn test_register_rejects_unknown_name() {
        let mut dict = TokenDictionary::empty();
        assert!(dict.register("NOT_A_TOKEN", "x").is_err());
        assert!(dict.register("SESSION", "abc").is_ok());
        assert_eq!(dict.get(Token::Session), Some("abc"));
    }

    #[test]
    fn test_new_seeds_random_tokens() {
        let dict = TokenDictionary::new();
        let robust = dict.get(Token::RobustId).unwrap();
        assert_eq!(robust.len(), 18);
        assert!(robust.chars().all(|c| c.is_ascii_hexdigit()));

        let sockjs = dict.get(Token::SockJsId).unwrap();
        assert!(sockjs.starts_with("000/"));
        assert_eq!(sockjs.len(), 12);

        assert!(dict.get(Token::Session).is_none());
    }

    #[test]
    fn test_seeded_values_differ_between_sessions() {
        let a = TokenDictionary::new();
        let b = TokenDictionary::new();
        assert_ne!(a.get(Token::RobustId), b.get(Token::RobustId));
    }

    #[test]
    fn test_token_from_str() {
        assert_eq!("UPLOAD_JOB_ID".parse::<Token>().unwrap(), Token::UploadJobId);
        assert!("upload_job_id".parse::<Token>().is_err());
        for token in Token::ALL {
            assert_eq!(token.name().parse::<Token>().unwrap(), token);
        }
    }

    #[test]
    fn test_substitute_without_placeholders_is_identity() {
        let dict = TokenDictionary::empty();
        let s = r#"a["0#0|m|{\"method\":\"init\"}"]"#;
        assert_eq!(dict.substitute(s).unwrap(), s);
    }
}
