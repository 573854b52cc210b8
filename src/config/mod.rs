//! Connection settings.
//!
//! Supports configuration from:
//! - TOML config files
//! - `RETS_*` environment variables
//! - CLI arguments (for the `rets` binary)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::auth::UaDigestScheme;
use crate::error::{Result, RetsError};
use crate::transport::TransportConfig;
use crate::DEFAULT_RETS_VERSION;

/// Default User-Agent identity.
pub const DEFAULT_AGENT: &str = "RETS-Rust-Client/1.0";

/// URL scheme of the RETS server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTP over TLS
    Https,
}

impl Protocol {
    /// Scheme name without the colon.
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Port implied by the scheme.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme())
    }
}

impl FromStr for Protocol {
    type Err = RetsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_end_matches(':').to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(RetsError::Config(format!("Unsupported protocol: {other}"))),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = RetsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.to_string()
    }
}

/// User-Agent identity sent with every request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// `User-Agent` header value
    pub user: String,
    /// Password registered with the provider; enables `RETS-UA-Authorization`
    pub password: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            user: DEFAULT_AGENT.to_string(),
            password: None,
        }
    }
}

impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSettings")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything needed to open a RETS session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `http:` or `https:`
    pub protocol: Protocol,
    /// Server host name
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login path, e.g. `/rets/login`
    pub path: String,
    /// Login user
    pub user: String,
    /// Login password
    pub pass: String,
    /// RETS version, without the `RETS/` prefix
    pub version: String,
    /// User-Agent identity
    pub agent: AgentSettings,
    /// `RETS-UA-Authorization` formula
    pub ua_digest: UaDigestScheme,
    /// Initial `RETS-Request-ID`
    pub request_id: Option<String>,
    /// Echo the session id in a `RETS-Session-ID` request header
    pub send_session_header: bool,
    /// HTTP client settings
    pub transport: TransportConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            host: String::new(),
            port: 80,
            path: String::new(),
            user: String::new(),
            pass: String::new(),
            version: DEFAULT_RETS_VERSION.to_string(),
            agent: AgentSettings::default(),
            ua_digest: UaDigestScheme::default(),
            request_id: None,
            send_session_header: false,
            transport: TransportConfig::default(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .field("version", &self.version)
            .field("agent", &self.agent)
            .field("ua_digest", &self.ua_digest)
            .field("request_id", &self.request_id)
            .field("send_session_header", &self.send_session_header)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Settings {
    /// Settings for a login URL such as `https://rets.example.com:6103/rets/login`.
    pub fn from_login_url(url: &str, user: &str, pass: &str) -> Result<Self> {
        let parsed =
            Url::parse(url).map_err(|e| RetsError::Config(format!("Invalid login URL: {e}")))?;
        let protocol: Protocol = parsed.scheme().parse()?;
        Ok(Self {
            protocol,
            host: parsed.host_str().unwrap_or_default().to_string(),
            port: parsed.port().unwrap_or_else(|| protocol.default_port()),
            path: match parsed.query() {
                Some(query) => format!("{}?{}", parsed.path(), query),
                None => parsed.path().to_string(),
            },
            user: user.to_string(),
            pass: pass.to_string(),
            ..Self::default()
        })
    }

    /// Load settings from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| RetsError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| RetsError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load settings from `RETS_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Layer `RETS_*` environment variables over these settings
    pub fn with_env_overrides(self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(protocol) = var("RETS_PROTOCOL") {
            match protocol.parse() {
                Ok(protocol) => self.protocol = protocol,
                Err(e) => tracing::warn!("Ignoring RETS_PROTOCOL: {e}"),
            }
        }
        if let Some(host) = var("RETS_HOST") {
            self.host = host;
        }
        if let Some(path) = var("RETS_PATH") {
            self.path = path;
        }
        if let Some(user) = var("RETS_USER") {
            self.user = user;
        }
        if let Some(pass) = var("RETS_PASS") {
            self.pass = pass;
        }
        if let Some(port) = var("RETS_PORT") {
            match port.trim().parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring non-numeric RETS_PORT"),
            }
        }
        if let Some(version) = var("RETS_VERSION") {
            self.version = version;
        }
        if let Some(agent) = var("RETS_AGENT") {
            self.agent.user = agent;
        }
        if let Some(password) = var("RETS_AGENT_PASSWORD") {
            self.agent.password = Some(password);
        }
        self
    }

    /// Default config file location (`<config dir>/rets/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rets").join("config.toml"))
    }

    /// Check that the settings are usable for a login.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("host", &self.host),
            ("path", &self.path),
            ("user", &self.user),
            ("version", &self.version),
        ] {
            if value.trim().is_empty() {
                return Err(RetsError::Config(format!("Missing required setting: {name}")));
            }
        }
        self.base_url().map(|_| ())
    }

    /// `RETS/<version>` as sent in the `RETS-Version` header.
    pub fn version_header(&self) -> String {
        if self.version.starts_with("RETS/") {
            self.version.clone()
        } else {
            format!("RETS/{}", self.version)
        }
    }

    /// Scheme, host and port of the server.
    pub fn base_url(&self) -> Result<Url> {
        let url = if self.port == self.protocol.default_port() {
            format!("{}://{}/", self.protocol.scheme(), self.host)
        } else {
            format!("{}://{}:{}/", self.protocol.scheme(), self.host, self.port)
        };
        Url::parse(&url).map_err(|e| RetsError::Config(format!("Invalid server address: {e}")))
    }

    /// Full login URL.
    pub fn login_url(&self) -> Result<Url> {
        self.resolve(&self.path)
    }

    /// Resolve a capability URL advertised by the server.
    ///
    /// Absolute `http(s)` URLs are used verbatim; anything else is joined to
    /// [`base_url`](Self::base_url).
    pub fn resolve(&self, location: &str) -> Result<Url> {
        let location = location.trim();
        if let Ok(url) = Url::parse(location) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(url);
            }
        }
        self.base_url()?
            .join(location)
            .map_err(|e| RetsError::Config(format!("Invalid capability URL {location:?}: {e}")))
    }
}
