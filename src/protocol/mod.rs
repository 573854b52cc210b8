//! RETS session management.
//!
//! A [`Session`] drives the login handshake, keeps the per-session
//! authentication state, and sequences Search / GetMetadata / GetObject
//! requests against the capability URLs the server advertised.
//!
//! # Login Handshake
//!
//! ```text
//! Client                                    Server
//!    |-------- GET Login (probe) ------------>|
//!    |<------- 401 WWW-Authenticate ----------|  Digest challenge
//!    |-------- GET Login + Authorization ---->|
//!    |<------- 200 RETS-RESPONSE banner ------|  capability URLs, Set-Cookie
//!    |                                         |
//!    |-------- GET Search?... --------------->|  Cookie, nc=00000002
//!    |<------- 200 COMPACT / REData ----------|
//!    |                                         |
//!    |-------- GET Logout ------------------->|
//! ```
//!
//! ## State Machine
//!
//! | State             | Description                     | Valid Transitions                 |
//! |-------------------|---------------------------------|-----------------------------------|
//! | `Unauthenticated` | Created, no login yet           | → Authenticating, Closed          |
//! | `Authenticating`  | Handshake in progress           | → Authenticated, Failed           |
//! | `Authenticated`   | Ready for requests              | → Requesting, Authenticating, Closed |
//! | `Requesting`      | One request in flight           | → Authenticated, Authenticating   |
//! | `Failed`          | Login or re-login failed        | → Authenticating, Closed          |
//! | `Closed`          | Terminated                      | (terminal)                        |
//!
//! A request that gets HTTP 401 logs in again once and retries; a second
//! 401 is returned to the caller. Other request failures leave the session
//! authenticated.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rets::{connect, Settings, SearchQuery, SearchFormat};
//!
//! let settings = Settings::from_login_url("https://rets.example.com/rets/login", "user", "pass")?;
//! let mut session = connect(settings).await?;
//!
//! let result = session
//!     .search(SearchQuery::new("Property", "RES", "(ListPrice=300000+)").format(SearchFormat::Compact))
//!     .await?;
//! println!("{} rows", result.data.len());
//!
//! session.logout().await?;
//! ```

mod capabilities;
mod events;
mod query;
mod session;

pub use capabilities::{Capability, CapabilityUrls, MetadataInfo, ProviderInfo, ServerInfo};
pub use events::SessionEvent;
pub use query::{CountMode, MetadataType, ObjectRequest, QueryArgs, SearchFormat, SearchQuery};
pub use session::{ObjectResponse, SearchResult, Session, SessionState};

/// Cookie carrying the server-side session id
pub const SESSION_COOKIE: &str = "RETS-Session-ID";
