//! RETS User-Agent digest (`RETS-UA-Authorization`).

use serde::{Deserialize, Serialize};

use super::md5_hex;

/// Formula used for the User-Agent digest.
///
/// Both forms are deployed in the wild and servers accept only one of them,
/// so the scheme is a per-session setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UaDigestScheme {
    /// `md5(A1:request-id:session-id:version)` (RETS 1.7+)
    #[default]
    Standard,
    /// `md5(A1:request-id:session-id)`
    Legacy,
}

impl UaDigestScheme {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for UaDigestScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for UaDigestScheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "four-field" | "rets17" => Ok(Self::Standard),
            "legacy" | "three-field" => Ok(Self::Legacy),
            _ => Err(format!("Unknown UA digest scheme: {}", s)),
        }
    }
}

/// Compute the hex User-Agent digest.
///
/// `A1 = md5(agent_user:agent_password)`; the remaining components are
/// trimmed and always joined, empty or not.
pub fn compute_vendor_digest(
    scheme: UaDigestScheme,
    agent_user: &str,
    agent_password: &str,
    request_id: &str,
    session_id: &str,
    version: &str,
) -> String {
    let a1 = md5_hex(&format!("{agent_user}:{agent_password}"));

    let joined = match scheme {
        UaDigestScheme::Standard => format!(
            "{}:{}:{}:{}",
            a1.trim(),
            request_id.trim(),
            session_id.trim(),
            version.trim()
        ),
        UaDigestScheme::Legacy => {
            format!("{}:{}:{}", a1.trim(), request_id.trim(), session_id.trim())
        },
    };

    md5_hex(&joined)
}

/// Value for the `RETS-UA-Authorization` header.
pub fn ua_authorization_header(digest: &str) -> String {
    format!("Digest {digest}")
}
