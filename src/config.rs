//! ZDBKV - Connection Configuration
//! Defines how the adapter reaches and authenticates against the store.

use std::time::Duration;

use crate::error::{Result, ZdbError};

/// Configuration for a connection to the store.
#[derive(Debug, Clone)]
pub struct Config {
    /// `host:port` of the store.
    pub address: String,

    /// Socket read timeout. `None` blocks forever.
    pub read_timeout: Option<Duration>,

    /// Socket write timeout. `None` blocks forever.
    pub write_timeout: Option<Duration>,

    /// Namespace to `SELECT` right after connecting.
    pub namespace: Option<String>,

    /// Password sent with `AUTH` (and with `SELECT .. SECURE` when a namespace is set).
    pub password: Option<String>,

    /// Initial size of the reply buffer in bytes.
    pub buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9900".to_string(),
            read_timeout: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(30)),
            namespace: None,
            password: None,
            buffer_size: 64 * 1024, // 64 KB
        }
    }
}

impl Config {
    /// Create a new Config pointing at a custom address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Select a namespace after connecting.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Authenticate after connecting.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set both socket timeouts.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self.write_timeout = timeout;
        self
    }

    /// Check the configuration before dialing.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(ZdbError::Config("address cannot be empty".into()));
        }
        if self.buffer_size == 0 {
            return Err(ZdbError::Config("buffer size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert_eq!(config.address, "127.0.0.1:9900");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = Config::new("10.0.0.1:9900")
            .with_namespace("ledger")
            .with_password("secret")
            .with_timeout(None);
        assert_eq!(config.namespace.as_deref(), Some("ledger"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert!(config.read_timeout.is_none());
        assert!(config.write_timeout.is_none());
    }

    #[test]
    fn test_rejects_empty_address() {
        let config = Config::new("  ");
        assert!(matches!(config.validate(), Err(ZdbError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_buffer() {
        let config = Config {
            buffer_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ZdbError::Config(_))));
    }
}
