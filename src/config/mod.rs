//! Bridge configuration
//!
//! Configuration is assembled from CLI arguments, environment variables and
//! an optional TOML file, with CLI taking precedence. `ServerConfig` is the
//! validated, resolved form that the rest of the bridge consumes.

mod args;
mod file;

pub use args::ServerArgs;
pub use file::{merge_config_with_args, ConfigFile};

use crate::error::{BridgeError, Result};
use std::net::SocketAddr;
use std::time::Duration;

/// Default HTTP listen address
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
/// Default Kafka bootstrap servers
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:9092";
/// Default prefix for generated consumer instance names
pub const DEFAULT_BRIDGE_ID: &str = "bridge";
/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Default acks for the metadata-returning producer
pub const DEFAULT_PRODUCER_ACKS: &str = "all";
/// Default `auto.offset.reset` for new consumer instances
pub const DEFAULT_AUTO_OFFSET_RESET: &str = "latest";
/// Default `enable.auto.commit` for new consumer instances
pub const DEFAULT_ENABLE_AUTO_COMMIT: bool = true;
/// Default idle timeout before a consumer instance is expired (seconds)
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
/// Default timeout for a single poll (milliseconds)
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;
/// Default cap on records drained by a single poll
pub const DEFAULT_MAX_POLL_RECORDS: usize = 100;
/// Default cap on the encoded size of a poll response (bytes)
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Kafka connection configuration shared by producers and consumers
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Bootstrap servers, comma separated
    pub bootstrap_servers: String,
}

/// Defaults applied to every new consumer instance
#[derive(Debug, Clone)]
pub struct ConsumerDefaults {
    /// `auto.offset.reset` when the creation body does not set it
    pub auto_offset_reset: String,
    /// `enable.auto.commit` when the creation body does not set it
    pub enable_auto_commit: bool,
    /// Consumer instances idle longer than this are closed and removed.
    /// Zero disables idle expiry.
    pub idle_timeout_secs: u64,
    /// Poll timeout when the request does not pass `timeout`
    pub poll_timeout_ms: u64,
    /// Records drained per poll at most
    pub max_poll_records: usize,
    /// Response size limit when the request does not pass `max_bytes`
    pub max_bytes: u64,
}

impl Default for ConsumerDefaults {
    fn default() -> Self {
        Self {
            auto_offset_reset: DEFAULT_AUTO_OFFSET_RESET.to_string(),
            enable_auto_commit: DEFAULT_ENABLE_AUTO_COMMIT,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            max_poll_records: DEFAULT_MAX_POLL_RECORDS,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl ConsumerDefaults {
    /// Idle timeout as a `Duration`, `None` when expiry is disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Default poll timeout as a `Duration`
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Defaults applied to the per-connection producers
#[derive(Debug, Clone)]
pub struct ProducerDefaults {
    /// acks for the producer that reports per-record metadata.
    /// The fire-and-forget producer always runs with acks=0.
    pub acks: String,
}

impl Default for ProducerDefaults {
    fn default() -> Self {
        Self {
            acks: DEFAULT_PRODUCER_ACKS.to_string(),
        }
    }
}

/// Complete, validated bridge configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP API listen address
    pub http_addr: SocketAddr,
    /// Prefix for generated consumer instance names
    pub bridge_id: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Kafka connection settings
    pub kafka: KafkaConfig,
    /// Consumer instance defaults
    pub consumer: ConsumerDefaults,
    /// Producer defaults
    pub producer: ProducerDefaults,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.parse().unwrap_or_else(|_| {
                // the literal above always parses
                SocketAddr::from(([0, 0, 0, 0], 8080))
            }),
            bridge_id: DEFAULT_BRIDGE_ID.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            kafka: KafkaConfig {
                bootstrap_servers: DEFAULT_BOOTSTRAP_SERVERS.to_string(),
            },
            consumer: ConsumerDefaults::default(),
            producer: ProducerDefaults::default(),
        }
    }
}

impl ServerConfig {
    /// Build a `ServerConfig` from parsed CLI arguments
    pub fn from_args(args: ServerArgs) -> Result<Self> {
        let http_addr: SocketAddr = args
            .http_addr
            .parse()
            .map_err(|e| BridgeError::config("http_addr", format!("{}: {}", args.http_addr, e)))?;

        Ok(Self {
            http_addr,
            bridge_id: args.bridge_id,
            log_level: args.log_level,
            kafka: KafkaConfig {
                bootstrap_servers: args.bootstrap_servers,
            },
            consumer: ConsumerDefaults {
                auto_offset_reset: args.consumer_auto_offset_reset,
                enable_auto_commit: args.consumer_enable_auto_commit,
                idle_timeout_secs: args.consumer_idle_timeout_secs,
                poll_timeout_ms: args.consumer_poll_timeout_ms,
                max_poll_records: args.consumer_max_poll_records,
                max_bytes: args.consumer_max_bytes,
            },
            producer: ProducerDefaults {
                acks: args.producer_acks,
            },
        })
    }

    /// Validate the configuration before starting the server
    pub fn validate(&self) -> Result<()> {
        if self.kafka.bootstrap_servers.trim().is_empty() {
            return Err(BridgeError::config(
                "bootstrap_servers",
                "must not be empty",
            ));
        }

        if self.bridge_id.trim().is_empty() {
            return Err(BridgeError::config("bridge_id", "must not be empty"));
        }

        match self.producer.acks.as_str() {
            "all" | "-1" | "0" | "1" => {}
            other => {
                return Err(BridgeError::config(
                    "producer.acks",
                    format!("invalid value '{}', expected all, -1, 0 or 1", other),
                ));
            }
        }

        match self.consumer.auto_offset_reset.as_str() {
            "latest" | "earliest" | "none" => {}
            other => {
                return Err(BridgeError::config(
                    "consumer.auto_offset_reset",
                    format!("invalid value '{}', expected latest, earliest or none", other),
                ));
            }
        }

        if self.consumer.poll_timeout_ms == 0 {
            return Err(BridgeError::config(
                "consumer.poll_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.consumer.max_poll_records == 0 {
            return Err(BridgeError::config(
                "consumer.max_poll_records",
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.bridge_id, "bridge");
    }

    #[test]
    fn test_from_args_defaults() {
        let args = ServerArgs::parse_from(["streambridge"]);
        let config = ServerConfig::from_args(args).unwrap();
        assert_eq!(config.kafka.bootstrap_servers, DEFAULT_BOOTSTRAP_SERVERS);
        assert_eq!(config.consumer.poll_timeout_ms, DEFAULT_POLL_TIMEOUT_MS);
        assert_eq!(config.producer.acks, "all");
    }

    #[test]
    fn test_from_args_bad_addr() {
        let args = ServerArgs::parse_from(["streambridge", "--http-addr", "not-an-addr"]);
        let err = ServerConfig::from_args(args).unwrap_err();
        assert!(err.to_string().contains("http_addr"));
    }

    #[test]
    fn test_validate_rejects_empty_bootstrap() {
        let mut config = ServerConfig::default();
        config.kafka.bootstrap_servers = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_acks() {
        let mut config = ServerConfig::default();
        config.producer.acks = "2".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_offset_reset() {
        let mut config = ServerConfig::default();
        config.consumer.auto_offset_reset = "oldest".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_timeout() {
        let mut config = ServerConfig::default();
        config.consumer.poll_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_idle_timeout_zero_disables_expiry() {
        let mut defaults = ConsumerDefaults::default();
        defaults.idle_timeout_secs = 0;
        assert!(defaults.idle_timeout().is_none());

        defaults.idle_timeout_secs = 5;
        assert_eq!(defaults.idle_timeout(), Some(Duration::from_secs(5)));
    }
}
