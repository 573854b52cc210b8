//! Session lifecycle notifications.

use serde::Serialize;

use super::Capability;

/// Event broadcast to [`Session::subscribe`](super::Session::subscribe) receivers.
///
/// Request results are returned from each call; these events are for
/// observers that track the session as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Login banner accepted.
    Connected {
        /// `MemberName` from the banner
        member_name: Option<String>,
    },
    /// Login failed at the transport level or was rejected.
    ConnectionError {
        /// Human-readable reason
        message: String,
        /// HTTP status, when the server answered
        http_status: Option<u16>,
        /// RETS reply code, when one was read
        reply_code: Option<u32>,
    },
    /// Login response could not be classified.
    ConnectionParseError {
        /// Human-readable reason
        message: String,
    },
    /// Peer closed the connection during login.
    ConnectionClosed {
        /// Human-readable reason
        message: String,
    },
    /// A request failed at the transport level.
    RequestError {
        /// Transaction that failed
        capability: Capability,
        /// Human-readable reason
        message: String,
    },
    /// A response could not be classified.
    RequestParseError {
        /// Transaction that failed
        capability: Capability,
        /// Human-readable reason
        message: String,
    },
    /// A request completed.
    RequestComplete {
        /// Transaction
        capability: Capability,
        /// Body variant of the result
        kind: &'static str,
    },
    /// Session closed.
    Closed,
}
