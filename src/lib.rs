//! # rets - Real Estate Transaction Standard client
//!
//! Asynchronous client for RETS servers: HTTP Digest login, capability
//! discovery, metadata retrieval and Search / GetObject requests, with every
//! XML reply normalized into a typed [`ParsedResponse`].
//!
//! ## Features
//!
//! - **Digest authentication**: MD5 / MD5-sess, `qop=auth` and RFC 2069 servers
//! - **User-Agent digest**: `RETS-UA-Authorization` in the standard or legacy form
//! - **Session tracking**: cookies, nonce-count, request id and server version per session
//! - **Response classification**: login banners, metadata tables, COMPACT and
//!   STANDARD-XML result sets, status and reply-code errors
//! - **Stale-session recovery**: one transparent re-login on HTTP 401
//!
//! ## Architecture
//!
//! ```text
//!  caller ──> Session ──> auth (Digest / UA headers)
//!               │
//!               ├──> HttpTransport (reqwest) ──> RETS server
//!               │
//!               └──> response::parse ──> ParsedResponse
//! ```
//!
//! ## Reply Codes
//!
//! | Code    | Result                                           |
//! |---------|--------------------------------------------------|
//! | `0`     | success, classified by body shape                |
//! | `20201` | `data` with no rows                              |
//! | `20200` | `error` (unknown field), session unaffected      |
//! | `20203` | `error` (miscellaneous search error)             |
//! | `20206` | `error` (invalid query syntax)                   |
//! | `20036` | [`ParseError`]: authentication required          |
//! | `20037` | [`ParseError`]: user agent not registered        |
//! | `20513` | [`ParseError`]: missing User-Agent header        |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rets::{connect, SearchQuery, Settings};
//!
//! let settings = Settings::from_file("rets.toml")?.with_env_overrides();
//! let mut session = connect(settings).await?;
//!
//! println!("Logged in as {:?}", session.provider().name);
//!
//! let classes = session.get_classifications(Some("Property")).await?;
//! for name in classes.entries.keys() {
//!     println!("class {name}");
//! }
//!
//! let result = session.search(SearchQuery::new("Property", "RES", "(Status=A)")).await?;
//! for record in &result.data.records {
//!     println!("{}", serde_json::to_string(record)?);
//! }
//! ```
//!
//! ### Classifying a Body Directly
//!
//! ```rust
//! use rets::{parse, ResponseBody};
//!
//! let body = r#"<RETS ReplyCode="20201" ReplyText="No Records Found"/>"#;
//! let parsed = parse(body).unwrap();
//! assert!(matches!(parsed.body, ResponseBody::Data(ref d) if d.is_empty()));
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: HTTP Digest and User-Agent digest
//! - [`transport`]: HTTP transport trait, reqwest backend, cookie jar
//! - [`response`]: XML reply classifier
//! - [`protocol`]: Session state machine and query builders
//! - [`config`]: Connection settings
//! - [`error`]: Error types and result aliases

pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod response;
pub mod transport;

use std::sync::Arc;

// Re-exports for convenience
pub use auth::{AuthError, Challenge, Credentials, NonceCounter, UaDigestScheme};
pub use config::{AgentSettings, Protocol, Settings};
pub use error::{Result, RetsError};
pub use protocol::{
    Capability, CountMode, MetadataType, ObjectRequest, ObjectResponse, QueryArgs, SearchFormat,
    SearchQuery, SearchResult, Session, SessionEvent, SessionState,
};
pub use response::{
    parse, DataFormat, DataSet, MetadataSet, ParseError, ParseErrorKind, ParsedResponse, Record,
    ReplyError, ResponseBody,
};
pub use transport::{HttpTransport, ReqwestTransport, TransportConfig, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// RETS protocol version sent when none is configured
pub const DEFAULT_RETS_VERSION: &str = "1.7";

/// Session shared between tasks; the mutex keeps one exchange in flight.
pub type SharedSession<T = ReqwestTransport> = Arc<tokio::sync::Mutex<Session<T>>>;

/// Validate `settings`, open a session and log in.
pub async fn connect(settings: Settings) -> Result<Session> {
    settings.validate()?;
    let mut session = Session::new(settings)?;
    session.login().await?;
    Ok(session)
}

/// [`connect`], wrapped for sharing between tasks.
pub async fn connect_shared(settings: Settings) -> Result<SharedSession> {
    Ok(Arc::new(tokio::sync::Mutex::new(connect(settings).await?)))
}
