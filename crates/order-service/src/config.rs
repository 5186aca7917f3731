//! Service Configuration
//!
//! Settings loaded from environment variables (after `.env`, if present).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `ORDER_HTTP_ADDR` | `0.0.0.0:8082`, or `0.0.0.0:$PORT` if only `PORT` is set |
//! | `ORDER_DATABASE_URL` | unset: in-memory store |
//! | `ORDER_FULFILLMENT_DELAY_MS` | `2000` |
//! | `ORDER_SHUTDOWN_TIMEOUT_SECS` | `30` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::order_engine::DEFAULT_FULFILLMENT_DELAY;

const DEFAULT_PORT: u16 = 8082;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Where orders are kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub http_addr: SocketAddr,
    pub store: StoreBackend,
    pub fulfillment_delay: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            store: StoreBackend::Memory,
            fulfillment_delay: DEFAULT_FULFILLMENT_DELAY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("ORDER_HTTP_ADDR") {
            config.http_addr = parse("ORDER_HTTP_ADDR", &addr)?;
        } else if let Some(port) = get("PORT") {
            let port: u16 = parse("PORT", &port)?;
            config.http_addr.set_port(port);
        }

        if let Some(url) = get("ORDER_DATABASE_URL") {
            config.store = StoreBackend::Sqlite(url);
        }

        if let Some(ms) = get("ORDER_FULFILLMENT_DELAY_MS") {
            config.fulfillment_delay = Duration::from_millis(parse("ORDER_FULFILLMENT_DELAY_MS", &ms)?);
        }

        if let Some(secs) = get("ORDER_SHUTDOWN_TIMEOUT_SECS") {
            let secs: u64 = parse("ORDER_SHUTDOWN_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var: "ORDER_SHUTDOWN_TIMEOUT_SECS",
                    value: secs.to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
            config.shutdown_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.http_addr.port(), 8082);
        assert_eq!(config.fulfillment_delay, Duration::from_secs(2));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.store, StoreBackend::Memory);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("ORDER_HTTP_ADDR", "127.0.0.1:9000"),
            ("PORT", "1234"),
            ("ORDER_DATABASE_URL", "sqlite://orders.db"),
            ("ORDER_FULFILLMENT_DELAY_MS", "150"),
            ("ORDER_SHUTDOWN_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.http_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.store, StoreBackend::Sqlite("sqlite://orders.db".to_string()));
        assert_eq!(config.fulfillment_delay, Duration::from_millis(150));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_port_alone_keeps_default_host() {
        let config = config(&[("PORT", "9090")]).unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:9090".parse().unwrap());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("ORDER_FULFILLMENT_DELAY_MS", "soon")]),
            Err(ConfigError::Invalid { var: "ORDER_FULFILLMENT_DELAY_MS", .. })
        ));
        assert!(matches!(
            config(&[("ORDER_SHUTDOWN_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Invalid { var: "ORDER_SHUTDOWN_TIMEOUT_SECS", .. })
        ));
        assert!(config(&[("ORDER_HTTP_ADDR", "not-an-addr")]).is_err());
    }
}
