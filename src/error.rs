//! RETS client error types.
//!
//! # Error Classification
//!
//! Errors are layered the same way the protocol is:
//!
//! - **Transport**: network, TLS and non-200 HTTP failures ([`TransportError`]).
//!   Always fatal to the current operation; a 401 mid-session triggers one
//!   re-authentication attempt before surfacing.
//! - **Protocol**: malformed XML, missing `RETS` root, fatal reply codes
//!   ([`ParseError`]) and rejected logins ([`RetsError::LoginRejected`]).
//! - **Session**: unknown capability, session not authenticated or already closed.
//!
//! Recoverable query errors (unknown field, invalid query syntax, ...) are not
//! errors at all; they come back as structured data inside
//! [`ResponseBody::Error`](crate::response::ResponseBody::Error).

use thiserror::Error;

use crate::auth::AuthError;
use crate::response::ParseError;
use crate::transport::TransportError;

/// RETS client errors.
#[derive(Error, Debug)]
pub enum RetsError {
    /// Digest challenge could not be used.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// HTTP exchange failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Response body could not be classified.
    ///
    /// Preserves the reply code and text when the parser got that far.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Login banner carried a non-zero reply code.
    #[error("Login rejected by server: {code} {text}")]
    LoginRejected {
        /// RETS reply code.
        code: u32,
        /// RETS reply text.
        text: String,
    },

    /// The server never advertised the requested capability.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// Operation requires an authenticated session.
    #[error("Session not authenticated (state: {0})")]
    NotAuthenticated(String),

    /// Session was closed; no further requests are permitted.
    #[error("Session closed")]
    SessionClosed,

    /// Response parsed but was not the shape the operation expects.
    #[error("Unexpected {found} response (expected {expected}): {code} {text}")]
    UnexpectedResponse {
        /// What the operation expected.
        expected: &'static str,
        /// What the classifier produced.
        found: &'static str,
        /// RETS reply code.
        code: u32,
        /// RETS reply text.
        text: String,
    },

    /// Caller stopped waiting for an in-flight request.
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for RETS operations
pub type Result<T> = std::result::Result<T, RetsError>;

impl RetsError {
    /// RETS reply code carried by this error, if any.
    pub fn reply_code(&self) -> Option<u32> {
        match self {
            RetsError::Parse(err) => err.code,
            RetsError::LoginRejected { code, .. } | RetsError::UnexpectedResponse { code, .. } => {
                Some(*code)
            },
            _ => None,
        }
    }

    /// HTTP status carried by this error, if the server answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            RetsError::Transport(TransportError::Connection { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for RetsError {
    fn from(err: toml::de::Error) -> Self {
        RetsError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for RetsError {
    fn from(err: reqwest::Error) -> Self {
        RetsError::Transport(TransportError::from(err))
    }
}
