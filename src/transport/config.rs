//! HTTP client configuration.
//!
//! Handles TLS verification policy and timeouts for [`ReqwestTransport`](super::ReqwestTransport).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::TransportError;

/// Transport configuration.
///
/// # TLS verification
///
/// `accept_invalid_certs` defaults to `true`: a large share of RETS servers
/// run with expired or self-signed certificates and refuse to work
/// otherwise. This is a compatibility trade-off, not a recommendation; turn it
/// off for providers with valid certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Skip certificate verification.
    pub accept_invalid_certs: bool,
    /// Whole-request timeout in seconds (none = wait indefinitely).
    pub timeout_secs: Option<u64>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
            timeout_secs: None,
            connect_timeout_secs: Some(30),
        }
    }
}

impl TransportConfig {
    /// Require valid certificates.
    pub fn strict_tls(mut self) -> Self {
        self.accept_invalid_certs = false;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Build the underlying reqwest client.
    pub fn build_client(&self) -> Result<reqwest::Client, TransportError> {
        if self.accept_invalid_certs {
            tracing::warn!("TLS certificate verification disabled for RETS transport");
        }

        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(self.accept_invalid_certs);

        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }

        builder
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("Failed to create HTTP client: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_accepts_invalid_certs() {
        let config = TransportConfig::default();
        assert!(config.accept_invalid_certs);
        assert_eq!(config.timeout_secs, None);
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = TransportConfig::default()
            .strict_tls()
            .with_timeout(Duration::from_secs(45));
        assert!(!config.accept_invalid_certs);
        assert_eq!(config.timeout_secs, Some(45));
    }

    #[test]
    fn test_config_from_toml() {
        let config: TransportConfig = toml::from_str("timeout_secs = 10").unwrap();
        assert_eq!(config.timeout_secs, Some(10));
        assert!(config.accept_invalid_certs);
        assert_eq!(config.connect_timeout_secs, Some(30));
    }
}
