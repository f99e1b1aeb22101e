//! Command-line arguments for the bridge
//!
//! This module defines the CLI arguments structure using clap.

use clap::Parser;
use std::path::PathBuf;

use super::{
    DEFAULT_AUTO_OFFSET_RESET, DEFAULT_BOOTSTRAP_SERVERS, DEFAULT_BRIDGE_ID,
    DEFAULT_ENABLE_AUTO_COMMIT, DEFAULT_HTTP_ADDR, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LOG_LEVEL,
    DEFAULT_MAX_BYTES, DEFAULT_MAX_POLL_RECORDS, DEFAULT_POLL_TIMEOUT_MS, DEFAULT_PRODUCER_ACKS,
};

/// Command-line arguments for the bridge server
#[derive(Parser, Debug, Clone)]
#[command(name = "streambridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP to Apache Kafka protocol bridge")]
pub struct ServerArgs {
    /// Path to configuration file (TOML format).
    /// If not specified, looks for streambridge.toml in the current directory
    /// or /etc/streambridge/
    #[arg(short, long, env = "STREAMBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Generate example configuration file and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Address to listen on for the HTTP API
    #[arg(long, env = "STREAMBRIDGE_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: String,

    /// Bridge identifier, used as the prefix for generated consumer
    /// instance names
    #[arg(long, env = "STREAMBRIDGE_BRIDGE_ID", default_value = DEFAULT_BRIDGE_ID)]
    pub bridge_id: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STREAMBRIDGE_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Kafka bootstrap servers, comma separated
    #[arg(long, env = "STREAMBRIDGE_BOOTSTRAP_SERVERS", default_value = DEFAULT_BOOTSTRAP_SERVERS)]
    pub bootstrap_servers: String,

    /// acks setting for the producer that reports per-record metadata
    #[arg(long, env = "STREAMBRIDGE_PRODUCER_ACKS", default_value = DEFAULT_PRODUCER_ACKS)]
    pub producer_acks: String,

    /// Default auto.offset.reset for new consumer instances
    /// (latest, earliest, none)
    #[arg(long, env = "STREAMBRIDGE_CONSUMER_AUTO_OFFSET_RESET", default_value = DEFAULT_AUTO_OFFSET_RESET)]
    pub consumer_auto_offset_reset: String,

    /// Default enable.auto.commit for new consumer instances
    #[arg(long, env = "STREAMBRIDGE_CONSUMER_ENABLE_AUTO_COMMIT", default_value_t = DEFAULT_ENABLE_AUTO_COMMIT)]
    pub consumer_enable_auto_commit: bool,

    /// Seconds of inactivity after which a consumer instance is closed and
    /// removed. Zero disables idle expiry.
    #[arg(long, env = "STREAMBRIDGE_CONSUMER_IDLE_TIMEOUT_SECS", default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub consumer_idle_timeout_secs: u64,

    /// Default poll timeout in milliseconds, overridable per request with
    /// the `timeout` query parameter
    #[arg(long, env = "STREAMBRIDGE_CONSUMER_POLL_TIMEOUT_MS", default_value_t = DEFAULT_POLL_TIMEOUT_MS)]
    pub consumer_poll_timeout_ms: u64,

    /// Maximum number of records drained by a single poll
    #[arg(long, env = "STREAMBRIDGE_CONSUMER_MAX_POLL_RECORDS", default_value_t = DEFAULT_MAX_POLL_RECORDS)]
    pub consumer_max_poll_records: usize,

    /// Default maximum encoded response size in bytes for a poll,
    /// overridable per request with the `max_bytes` query parameter
    #[arg(long, env = "STREAMBRIDGE_CONSUMER_MAX_BYTES", default_value_t = DEFAULT_MAX_BYTES)]
    pub consumer_max_bytes: u64,
}
