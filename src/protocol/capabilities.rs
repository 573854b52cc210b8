//! Capability URLs and the identity data advertised in the login banner.
//!
//! A successful login returns a `RETS-RESPONSE` banner of `key=value` lines.
//! Some keys name capability endpoints, the rest describe the member and the
//! provider's metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RetsError;
use crate::transport::HeaderList;

/// Named RETS transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Login (re-authentication)
    Login,
    /// Logout
    Logout,
    /// Search
    Search,
    /// GetMetadata
    GetMetadata,
    /// GetObject
    GetObject,
    /// ChangePassword
    ChangePassword,
    /// ServerInformation
    ServerInformation,
}

impl Capability {
    /// All capabilities, in banner order.
    pub const ALL: [Capability; 7] = [
        Capability::Login,
        Capability::Logout,
        Capability::Search,
        Capability::GetMetadata,
        Capability::GetObject,
        Capability::ChangePassword,
        Capability::ServerInformation,
    ];

    /// Banner key.
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Login => "Login",
            Capability::Logout => "Logout",
            Capability::Search => "Search",
            Capability::GetMetadata => "GetMetadata",
            Capability::GetObject => "GetObject",
            Capability::ChangePassword => "ChangePassword",
            Capability::ServerInformation => "ServerInformation",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = RetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RetsError::UnknownCapability(s.to_string()))
    }
}

/// Capability URLs the server advertised; absent entries were not offered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityUrls {
    urls: BTreeMap<Capability, String>,
}

impl CapabilityUrls {
    /// Pick capability keys out of a login banner.
    pub fn from_banner(banner: &BTreeMap<String, String>) -> Self {
        let urls = Capability::ALL
            .into_iter()
            .filter_map(|cap| {
                banner
                    .get(cap.name())
                    .filter(|url| !url.is_empty())
                    .map(|url| (cap, url.clone()))
            })
            .collect();
        Self { urls }
    }

    /// URL for a capability.
    pub fn get(&self, capability: Capability) -> Option<&str> {
        self.urls.get(&capability).map(String::as_str)
    }

    /// Check if the capability was advertised.
    pub fn contains(&self, capability: Capability) -> bool {
        self.urls.contains_key(&capability)
    }

    /// Advertised capabilities in order.
    pub fn iter(&self) -> impl Iterator<Item = (Capability, &str)> {
        self.urls.iter().map(|(cap, url)| (*cap, url.as_str()))
    }

    /// Number of advertised capabilities.
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Check if nothing was advertised.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Member identity from the banner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    /// `MemberName`
    pub name: Option<String>,
    /// `User` (user id, level, class, agent code)
    pub user: Option<String>,
    /// `Broker`
    pub broker: Option<String>,
}

impl ProviderInfo {
    /// Read identity keys from a banner.
    pub fn from_banner(banner: &BTreeMap<String, String>) -> Self {
        Self {
            name: banner.get("MemberName").cloned(),
            user: banner.get("User").cloned(),
            broker: banner.get("Broker").cloned(),
        }
    }

    /// First comma-separated field of `User`.
    pub fn user_id(&self) -> Option<&str> {
        self.user
            .as_deref()
            .and_then(|u| u.split(',').next())
            .map(str::trim)
    }
}

/// Metadata descriptors from the banner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataInfo {
    /// `MetadataVersion`
    pub version: Option<String>,
    /// `MinMetadataVersion`
    pub min_version: Option<String>,
    /// `MetadataTimestamp`
    pub timestamp: Option<String>,
    /// `MinMetadataTimestamp`
    pub min_timestamp: Option<String>,
    /// `TimeoutSeconds`
    pub timeout_seconds: Option<u64>,
}

impl MetadataInfo {
    /// Read metadata keys from a banner.
    pub fn from_banner(banner: &BTreeMap<String, String>) -> Self {
        Self {
            version: banner.get("MetadataVersion").cloned(),
            min_version: banner.get("MinMetadataVersion").cloned(),
            timestamp: banner.get("MetadataTimestamp").cloned(),
            min_timestamp: banner.get("MinMetadataTimestamp").cloned(),
            timeout_seconds: banner
                .get("TimeoutSeconds")
                .and_then(|t| t.trim().parse().ok()),
        }
    }
}

/// Software identification from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// `Server`
    pub server: Option<String>,
    /// `RETS-Server`
    pub rets_server: Option<String>,
    /// `X-Powered-By`
    pub powered_by: Option<String>,
    /// `Content-Type` of the last response
    pub content_type: Option<String>,
    /// `RETS-Version` of the last response
    pub rets_version: Option<String>,
}

impl ServerInfo {
    /// Record whichever identification headers are present.
    pub fn update(&mut self, headers: &HeaderList) {
        let fields = [
            ("Server", &mut self.server),
            ("RETS-Server", &mut self.rets_server),
            ("X-Powered-By", &mut self.powered_by),
            ("Content-Type", &mut self.content_type),
            ("RETS-Version", &mut self.rets_version),
        ];
        for (name, slot) in fields {
            if let Some(value) = headers.get(name) {
                *slot = Some(value.to_string());
            }
        }
    }
}
