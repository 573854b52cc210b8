//! HTTP Digest challenge handling (RFC 2617 subset).

use std::fmt;

use lazy_static::lazy_static;
use md5::{Digest, Md5};
use regex::Regex;

use super::AuthError;

/// Largest nonce count before the counter wraps back to 1.
pub const NONCE_COUNT_MAX: u32 = 99_999_999;

lazy_static! {
    /// `key=value` or `key="quoted, value"` auth-params.
    static ref AUTH_PARAM: Regex =
        Regex::new(r#"([A-Za-z][A-Za-z0-9_-]*)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^\s,"]+))"#)
            .expect("auth-param pattern is valid");
}

/// Hex-encoded MD5 of a string.
pub(crate) fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Split an auth-param list into `(lowercased key, unquoted value)` pairs.
pub(crate) fn parse_auth_params(params: &str) -> Vec<(String, String)> {
    AUTH_PARAM
        .captures_iter(params)
        .map(|caps| {
            let key = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().replace("\\\"", "\""))
                .unwrap_or_default();
            (key, value)
        })
        .collect()
}

/// Digest hash algorithm named by the challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// Plain MD5 (the default when the challenge names none)
    Md5,
    /// Session variant: HA1 is re-hashed with nonce and cnonce
    Md5Sess,
}

impl DigestAlgorithm {
    /// Name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "md5-sess" => Ok(Self::Md5Sess),
            _ => Err(AuthError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Parameters of a `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Protection space
    pub realm: String,
    /// Server nonce, echoed verbatim
    pub nonce: String,
    /// Opaque token, echoed verbatim when present
    pub opaque: Option<String>,
    /// Selected quality of protection (`auth`), `None` for RFC 2069 servers
    pub qop: Option<String>,
    /// Algorithm explicitly named by the server
    pub algorithm: Option<DigestAlgorithm>,
    /// Server flagged the previous nonce as stale
    pub stale: bool,
}

impl Challenge {
    /// Parse a `WWW-Authenticate` header value.
    ///
    /// A missing header or unknown scheme is a [`AuthError::MalformedChallenge`];
    /// `Basic` is recognized but reported as [`AuthError::UnsupportedScheme`].
    pub fn parse(header: Option<&str>) -> Result<Self, AuthError> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AuthError::MalformedChallenge("missing WWW-Authenticate".to_string()))?;

        let (scheme, params) = header.split_once(char::is_whitespace).unwrap_or((header, ""));

        if scheme.eq_ignore_ascii_case("basic") {
            return Err(AuthError::UnsupportedScheme("Basic".to_string()));
        }
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(AuthError::MalformedChallenge(format!(
                "expected Digest scheme, got '{scheme}'"
            )));
        }

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop_offered = None;
        let mut algorithm = None;
        let mut stale = false;

        for (key, value) in parse_auth_params(params) {
            match key.as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => qop_offered = Some(value),
                "algorithm" => algorithm = Some(value.parse::<DigestAlgorithm>()?),
                "stale" => stale = value.eq_ignore_ascii_case("true"),
                _ => {},
            }
        }

        let realm =
            realm.ok_or_else(|| AuthError::MalformedChallenge("missing realm".to_string()))?;
        let nonce = nonce
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AuthError::MalformedChallenge("missing nonce".to_string()))?;

        let qop = match qop_offered {
            None => None,
            Some(offered) => {
                if offered.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")) {
                    Some("auth".to_string())
                } else {
                    return Err(AuthError::UnsupportedQop(offered));
                }
            },
        };

        Ok(Self {
            realm,
            nonce,
            opaque,
            qop,
            algorithm,
            stale,
        })
    }

    /// Algorithm used for hashing (MD5 unless the server said otherwise).
    pub fn effective_algorithm(&self) -> DigestAlgorithm {
        self.algorithm.unwrap_or(DigestAlgorithm::Md5)
    }

    /// Compute the `response` field for a request.
    pub fn response(
        &self,
        credentials: &Credentials,
        method: &str,
        uri: &str,
        nc: &str,
        cnonce: &str,
    ) -> String {
        let mut ha1 = md5_hex(&format!(
            "{}:{}:{}",
            credentials.username, self.realm, credentials.password
        ));
        if self.effective_algorithm() == DigestAlgorithm::Md5Sess {
            ha1 = md5_hex(&format!("{}:{}:{}", ha1, self.nonce, cnonce));
        }
        let ha2 = md5_hex(&format!("{method}:{uri}"));

        match &self.qop {
            Some(qop) => md5_hex(&format!(
                "{}:{}:{}:{}:{}:{}",
                ha1, self.nonce, nc, cnonce, qop, ha2
            )),
            None => md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2)),
        }
    }
}

/// Username and password for the protected RETS endpoints.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Render the `Authorization` header for one request.
pub fn compose_authorization(
    challenge: &Challenge,
    credentials: &Credentials,
    method: &str,
    uri: &str,
    nc: &str,
    cnonce: &str,
) -> String {
    let response = challenge.response(credentials, method, uri, nc, cnonce);

    let mut header = format!(
        r#"Digest username="{}", realm="{}", nonce="{}", uri="{}""#,
        credentials.username, challenge.realm, challenge.nonce, uri
    );
    if let Some(algorithm) = challenge.algorithm {
        header.push_str(&format!(", algorithm={algorithm}"));
    }
    if let Some(qop) = &challenge.qop {
        header.push_str(&format!(r#", qop={qop}, nc={nc}, cnonce="{cnonce}""#));
    }
    header.push_str(&format!(r#", response="{response}""#));
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(r#", opaque="{opaque}""#));
    }
    header
}

/// Fresh client nonce.
pub fn generate_cnonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Per-session nonce-count (`nc`) generator.
///
/// Emits `00000001` through `99999999`, then wraps to `00000001`;
/// `00000000` is never produced.
#[derive(Debug, Clone, Default)]
pub struct NonceCounter {
    value: u32,
}

impl NonceCounter {
    /// Counter that has not issued anything yet.
    pub fn new() -> Self {
        Self { value: 0 }
    }

    /// Advance and render the next count, zero-padded to width 8.
    pub fn next_nonce_count(&mut self) -> String {
        self.value = if self.value >= NONCE_COUNT_MAX {
            1
        } else {
            self.value + 1
        };
        format!("{:08}", self.value)
    }

    /// Last issued value (0 before the first call).
    pub fn current(&self) -> u32 {
        self.value
    }
}
