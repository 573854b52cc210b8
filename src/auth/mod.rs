//! Authentication for RETS sessions.
//!
//! RETS servers protect every capability URL with HTTP Digest authentication
//! and may additionally require a vendor "User-Agent digest" proving that the
//! client software itself is registered with the provider.
//!
//! ## HTTP Digest
//!
//! ```text
//! Client                                   Server
//!    |-------- GET /Login (no auth) --------->|
//!    |<------- 401 WWW-Authenticate ----------|  realm, nonce, opaque, qop
//!    |                                         |
//!    |-- GET /Login  Authorization: Digest --->|  nc=00000001, cnonce, response
//!    |<------- 200 + Set-Cookie --------------|
//!    |                                         |
//!    |-- GET /Search Authorization: Digest --->|  nc=00000002, same nonce
//! ```
//!
//! [`Challenge::parse`] extracts the server parameters, [`NonceCounter`]
//! produces the monotonically increasing `nc` values and
//! [`compose_authorization`] renders the `Authorization` header.
//!
//! ## User-Agent digest
//!
//! Sent as `RETS-UA-Authorization: Digest <hex>`. Deployed servers disagree on
//! the exact formula, so it is selected with [`UaDigestScheme`].
//!
//! Only the subset of RFC 2617 needed to drive a RETS session is implemented;
//! this is not a general purpose Digest library.

mod digest;
mod user_agent;

pub use digest::{
    compose_authorization, generate_cnonce, Challenge, Credentials, DigestAlgorithm, NonceCounter,
    NONCE_COUNT_MAX,
};
pub use user_agent::{compute_vendor_digest, ua_authorization_header, UaDigestScheme};

pub(crate) use digest::{md5_hex, parse_auth_params};

use thiserror::Error;

/// Errors from interpreting server authentication challenges.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// `WWW-Authenticate` header absent, not a known scheme, or missing required fields.
    #[error("Malformed challenge: {0}")]
    MalformedChallenge(String),

    /// Server offered a scheme that cannot drive protected RETS calls.
    #[error("Unsupported authentication scheme: {0}")]
    UnsupportedScheme(String),

    /// Digest algorithm other than MD5 / MD5-sess.
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Quality of protection other than `auth`.
    #[error("Unsupported qop: {0}")]
    UnsupportedQop(String),
}
