//! Runtime configuration for the proxy.

use crate::error::{ProxyError, Result};

/// Redirect hops followed after the initial forward before giving up.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Address and port to listen on.
    pub listen: String,

    /// Maximum number of 301 hops followed for one client request.
    pub max_redirects: usize,

    /// Upper bound on bytes read for a single client message.
    pub max_request_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7713".to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_request_bytes: 8192,
        }
    }
}

impl ProxyConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        let (host, port) = self.listen.rsplit_once(':').ok_or_else(|| {
            ProxyError::config(format!(
                "listen address {:?} must be host:port",
                self.listen
            ))
        })?;
        if host.is_empty() {
            return Err(ProxyError::config("listen host cannot be empty"));
        }
        port.parse::<u16>().map_err(|_| {
            ProxyError::config(format!("invalid listen port: {:?}", port))
        })?;

        if self.max_request_bytes < 16 {
            return Err(ProxyError::config(format!(
                "max_request_bytes must be at least 16, got {}",
                self.max_request_bytes
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen, "127.0.0.1:7713");
        assert_eq!(config.max_redirects, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_listen_validation() {
        for listen in ["127.0.0.1", ":7713", "127.0.0.1:http", "127.0.0.1:70000"] {
            let config = ProxyConfig {
                listen: listen.to_string(),
                ..ProxyConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ProxyError::Config { .. }), "{}", listen);
        }

        let config = ProxyConfig {
            listen: "localhost:0".to_string(),
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_request_size_validation() {
        let config = ProxyConfig {
            max_request_bytes: 4,
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
