//! reqwest-backed HTTP transport.
//!
//! HTTP/1.1 (or HTTP/2 when the server offers it) over TCP with optional TLS.
//! This is the default transport for sessions created with
//! [`connect`](crate::connect).

use std::error::Error as _;
use std::io;

use super::{
    check_status, HeaderList, HttpRequest, HttpResponse, HttpTransport, NetworkErrorKind,
    SendFuture, TransportConfig, TransportError,
};

/// HTTP transport using a shared `reqwest::Client`.
///
/// reqwest's own cookie store is not enabled; cookies are managed by the
/// session's [`CookieJar`](super::CookieJar).
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport from configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: config.build_client()?,
        })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method.clone(), request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        tracing::debug!(method = %request.method, url = %request.url, "RETS request");

        let response = builder.send().await?;
        let status = response.status().as_u16();

        let headers: HeaderList = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response.bytes().await?;

        tracing::debug!(status, bytes = body.len(), "RETS response");

        check_status(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> SendFuture<'_> {
        Box::pin(self.exchange(request))
    }

    fn name(&self) -> &'static str {
        "reqwest/HTTP"
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return TransportError::InvalidRequest(err.to_string());
        }
        TransportError::Network {
            kind: classify(&err),
            message: err.to_string(),
        }
    }
}

/// Map a reqwest failure onto [`NetworkErrorKind`].
fn classify(err: &reqwest::Error) -> NetworkErrorKind {
    if err.is_timeout() {
        return NetworkErrorKind::Timeout;
    }

    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => return NetworkErrorKind::Reset,
                io::ErrorKind::TimedOut => return NetworkErrorKind::Timeout,
                _ => {},
            }
        }
        // hyper reports a peer hang-up as a plain error, not an io::Error
        if inner
            .to_string()
            .to_ascii_lowercase()
            .contains("connection closed before message completed")
        {
            return NetworkErrorKind::Reset;
        }
        source = inner.source();
    }

    if err.is_connect() {
        NetworkErrorKind::Connect
    } else {
        NetworkErrorKind::Other
    }
}
