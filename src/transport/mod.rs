//! Transport layer abstraction for RETS sessions.
//!
//! The session never talks to the network directly; it hands a fully built
//! [`HttpRequest`] to an [`HttpTransport`] and gets back either an
//! [`HttpResponse`] or a [`TransportError`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            RETS Session                  │
//! │   (digest state, cookies, capability)    │
//! └──────────────────┬──────────────────────┘
//!                    │ HttpRequest
//!          ┌────────┴────────┐
//!          ▼                 ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │ ReqwestTransport│ │  test doubles   │
//! │  (HTTP/1.1+TLS) │ │                 │
//! └─────────────────┘ └─────────────────┘
//! ```
//!
//! # Contract
//!
//! - One request per [`HttpTransport::send`] call, no automatic retries.
//! - Any status other than 200 is a [`TransportError::Connection`] carrying the
//!   status, headers and raw body (proxies wrap RETS banners in 5xx pages).
//! - `Set-Cookie` values are kept as an ordered sequence in [`HeaderList`].
//! - Timeouts surface as [`NetworkErrorKind::Timeout`] and are handled exactly
//!   like any other network failure.
//!
//! The cookie jar lives with the session ([`CookieJar`]) so that it is
//! updated together with the nonce count for the request that produced it.

mod client;
mod config;
mod cookie;

pub use client::ReqwestTransport;
pub use config::TransportConfig;
pub use cookie::CookieJar;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// Ordered, case-preserving header multimap.
///
/// Names are kept as delivered; lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing values.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Every value for `name`, in delivery order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All `Set-Cookie` values.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.get_all("set-cookie").collect()
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of header lines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// One outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method (RETS uses GET)
    pub method: http::Method,
    /// Absolute URL including the query string
    pub url: String,
    /// Request headers, including `Cookie` and `Authorization`
    pub headers: HeaderList,
}

impl HttpRequest {
    /// GET request with no headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            headers: HeaderList::new(),
        }
    }

    /// Replace the header set.
    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.headers = headers;
        self
    }
}

/// A successful (HTTP 200) response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers as delivered
    pub headers: HeaderList,
    /// Raw body
    pub body: Bytes,
}

impl HttpResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Classification of network-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// DNS or TCP/TLS connect failure
    Connect,
    /// Peer reset or closed the connection mid-exchange
    Reset,
    /// Transport-configured timeout elapsed
    Timeout,
    /// Anything else
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Reset => "reset",
            Self::Timeout => "timeout",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server answered with a status other than 200.
    #[error("HTTP {status} from server")]
    Connection {
        /// HTTP status code
        status: u16,
        /// Response headers (carries `WWW-Authenticate` on 401)
        headers: HeaderList,
        /// Raw response body, often an HTML error page
        body: String,
    },

    /// Network-level failure (DNS, connect, reset, timeout).
    #[error("Network error ({kind}): {message}")]
    Network {
        /// Failure class
        kind: NetworkErrorKind,
        /// Underlying error message
        message: String,
    },

    /// Request could not be built (bad URL or header value).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// HTTP 401 from the server.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Connection { status: 401, .. })
    }

    /// Peer terminated the connection.
    pub fn is_reset(&self) -> bool {
        matches!(
            self,
            Self::Network {
                kind: NetworkErrorKind::Reset,
                ..
            }
        )
    }
}

/// Apply the "anything but 200 is an error" rule to a raw exchange.
pub fn check_status(response: HttpResponse) -> Result<HttpResponse, TransportError> {
    if response.status == 200 {
        Ok(response)
    } else {
        Err(TransportError::Connection {
            status: response.status,
            body: response.body_text(),
            headers: response.headers,
        })
    }
}

/// Future returned by [`HttpTransport::send`].
pub type SendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// Transport trait for pluggable HTTP backends.
///
/// Implementations perform exactly one exchange per call and must map any
/// non-200 status to [`TransportError::Connection`] (see [`check_status`]).
pub trait HttpTransport: Send + Sync {
    /// Perform one HTTP exchange.
    fn send(&self, request: HttpRequest) -> SendFuture<'_>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn send(&self, request: HttpRequest) -> SendFuture<'_> {
        (**self).send(request)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
