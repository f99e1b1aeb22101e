//! Configuration file support for the bridge
//!
//! This module provides TOML configuration file parsing and merging with CLI
//! arguments.
//!
//! ## Priority Order
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{
    ServerArgs, DEFAULT_AUTO_OFFSET_RESET, DEFAULT_BOOTSTRAP_SERVERS, DEFAULT_BRIDGE_ID,
    DEFAULT_ENABLE_AUTO_COMMIT, DEFAULT_HTTP_ADDR, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LOG_LEVEL,
    DEFAULT_MAX_BYTES, DEFAULT_MAX_POLL_RECORDS, DEFAULT_POLL_TIMEOUT_MS, DEFAULT_PRODUCER_ACKS,
};
use crate::error::{BridgeError, Result};

/// Root configuration structure for the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// HTTP server configuration
    pub server: ServerSection,
    /// Kafka connection configuration
    pub kafka: KafkaSection,
    /// Producer defaults
    pub producer: ProducerSection,
    /// Consumer instance defaults
    pub consumer: ConsumerSection,
}

/// `[server]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub http_addr: Option<String>,
    pub bridge_id: Option<String>,
    pub log_level: Option<String>,
}

/// `[kafka]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaSection {
    pub bootstrap_servers: Option<String>,
}

/// `[producer]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSection {
    pub acks: Option<String>,
}

/// `[consumer]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSection {
    pub auto_offset_reset: Option<String>,
    pub enable_auto_commit: Option<bool>,
    pub idle_timeout_secs: Option<u64>,
    pub poll_timeout_ms: Option<u64>,
    pub max_poll_records: Option<usize>,
    pub max_bytes: Option<u64>,
}

/// Default search locations for the configuration file
const DEFAULT_CONFIG_PATHS: &[&str] = &["streambridge.toml", "/etc/streambridge/streambridge.toml"];

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| BridgeError::config("config file", format!("{}: {}", path.display(), e)))
    }

    /// Look for a configuration file in the default locations.
    /// Returns `None` when no file is found; a malformed file is reported
    /// on stderr and skipped.
    pub fn load_default() -> Option<Self> {
        for candidate in DEFAULT_CONFIG_PATHS {
            let path = PathBuf::from(candidate);
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => {
                        eprintln!("Loaded configuration from {:?}", path);
                        return Some(config);
                    }
                    Err(e) => {
                        eprintln!("Ignoring configuration file {:?}: {}", path, e);
                    }
                }
            }
        }
        None
    }

    /// Generate an example configuration file
    pub fn generate_example() -> String {
        format!(
            r#"# streambridge.toml - example configuration
#
# Every value is optional; CLI arguments and STREAMBRIDGE_* environment
# variables take precedence over this file.

[server]
http_addr = "{http_addr}"
bridge_id = "{bridge_id}"
log_level = "{log_level}"

[kafka]
bootstrap_servers = "{bootstrap}"

[producer]
# acks for the producer that reports per-record metadata ("all", "-1", "0", "1")
acks = "{acks}"

[consumer]
auto_offset_reset = "{offset_reset}"
enable_auto_commit = {auto_commit}
# seconds of inactivity before a consumer instance is expired; 0 disables
idle_timeout_secs = {idle}
poll_timeout_ms = {poll_timeout}
max_poll_records = {max_records}
max_bytes = {max_bytes}
"#,
            http_addr = DEFAULT_HTTP_ADDR,
            bridge_id = DEFAULT_BRIDGE_ID,
            log_level = DEFAULT_LOG_LEVEL,
            bootstrap = DEFAULT_BOOTSTRAP_SERVERS,
            acks = DEFAULT_PRODUCER_ACKS,
            offset_reset = DEFAULT_AUTO_OFFSET_RESET,
            auto_commit = DEFAULT_ENABLE_AUTO_COMMIT,
            idle = DEFAULT_IDLE_TIMEOUT_SECS,
            poll_timeout = DEFAULT_POLL_TIMEOUT_MS,
            max_records = DEFAULT_MAX_POLL_RECORDS,
            max_bytes = DEFAULT_MAX_BYTES,
        )
    }
}

/// Merge configuration file values into CLI args.
///
/// A file value is applied only when the corresponding argument still holds
/// its default, so explicit CLI flags and environment variables win.
pub fn merge_config_with_args(mut args: ServerArgs, config: &ConfigFile) -> ServerArgs {
    if args.http_addr == DEFAULT_HTTP_ADDR {
        if let Some(ref v) = config.server.http_addr {
            args.http_addr = v.clone();
        }
    }
    if args.bridge_id == DEFAULT_BRIDGE_ID {
        if let Some(ref v) = config.server.bridge_id {
            args.bridge_id = v.clone();
        }
    }
    if args.log_level == DEFAULT_LOG_LEVEL {
        if let Some(ref v) = config.server.log_level {
            args.log_level = v.clone();
        }
    }
    if args.bootstrap_servers == DEFAULT_BOOTSTRAP_SERVERS {
        if let Some(ref v) = config.kafka.bootstrap_servers {
            args.bootstrap_servers = v.clone();
        }
    }
    if args.producer_acks == DEFAULT_PRODUCER_ACKS {
        if let Some(ref v) = config.producer.acks {
            args.producer_acks = v.clone();
        }
    }
    if args.consumer_auto_offset_reset == DEFAULT_AUTO_OFFSET_RESET {
        if let Some(ref v) = config.consumer.auto_offset_reset {
            args.consumer_auto_offset_reset = v.clone();
        }
    }
    if args.consumer_enable_auto_commit == DEFAULT_ENABLE_AUTO_COMMIT {
        if let Some(v) = config.consumer.enable_auto_commit {
            args.consumer_enable_auto_commit = v;
        }
    }
    if args.consumer_idle_timeout_secs == DEFAULT_IDLE_TIMEOUT_SECS {
        if let Some(v) = config.consumer.idle_timeout_secs {
            args.consumer_idle_timeout_secs = v;
        }
    }
    if args.consumer_poll_timeout_ms == DEFAULT_POLL_TIMEOUT_MS {
        if let Some(v) = config.consumer.poll_timeout_ms {
            args.consumer_poll_timeout_ms = v;
        }
    }
    if args.consumer_max_poll_records == DEFAULT_MAX_POLL_RECORDS {
        if let Some(v) = config.consumer.max_poll_records {
            args.consumer_max_poll_records = v;
        }
    }
    if args.consumer_max_bytes == DEFAULT_MAX_BYTES {
        if let Some(v) = config.consumer.max_bytes {
            args.consumer_max_bytes = v;
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_example_config_parses() {
        let example = ConfigFile::generate_example();
        let parsed: ConfigFile = toml::from_str(&example).unwrap();
        assert_eq!(parsed.server.http_addr.as_deref(), Some(DEFAULT_HTTP_ADDR));
        assert_eq!(
            parsed.kafka.bootstrap_servers.as_deref(),
            Some(DEFAULT_BOOTSTRAP_SERVERS)
        );
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
http_addr = "127.0.0.1:9000"

[kafka]
bootstrap_servers = "broker:9092"

[consumer]
idle_timeout_secs = 42
"#
        )
        .unwrap();

        let config = ConfigFile::load(file.path()).unwrap();
        assert_eq!(config.server.http_addr.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(
            config.kafka.bootstrap_servers.as_deref(),
            Some("broker:9092")
        );
        assert_eq!(config.consumer.idle_timeout_secs, Some(42));
        assert!(config.producer.acks.is_none());
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml = [").unwrap();
        assert!(ConfigFile::load(file.path()).is_err());
    }

    #[test]
    fn test_merge_file_fills_defaults() {
        let args = ServerArgs::parse_from(["streambridge"]);
        let config = ConfigFile {
            server: ServerSection {
                http_addr: Some("127.0.0.1:9000".to_string()),
                bridge_id: Some("file-bridge".to_string()),
                log_level: None,
            },
            kafka: KafkaSection {
                bootstrap_servers: Some("broker:9092".to_string()),
            },
            ..Default::default()
        };

        let merged = merge_config_with_args(args, &config);
        assert_eq!(merged.http_addr, "127.0.0.1:9000");
        assert_eq!(merged.bridge_id, "file-bridge");
        assert_eq!(merged.bootstrap_servers, "broker:9092");
        assert_eq!(merged.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_merge_cli_wins_over_file() {
        let args = ServerArgs::parse_from(["streambridge", "--http-addr", "0.0.0.0:7070"]);
        let config = ConfigFile {
            server: ServerSection {
                http_addr: Some("127.0.0.1:9000".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = merge_config_with_args(args, &config);
        assert_eq!(merged.http_addr, "0.0.0.0:7070");
    }
}
