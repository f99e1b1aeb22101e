//! Session registry
//!
//! Process-wide directory of consumer instances (keyed by instance name)
//! and producer sessions (keyed by the originating HTTP connection). The
//! registry enforces name uniqueness, serializes access per instance,
//! expires idle consumers and tears everything down on shutdown.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::consumer::ConsumerSession;
use super::format::EmbeddedFormat;
use super::producer::ProducerSession;
use crate::config::{ConsumerDefaults, ProducerDefaults};
use crate::error::{BridgeError, Result};
use crate::kafka::{ConsumerSpec, KafkaClientFactory};

/// Creating an instance whose name is already live
pub const MSG_DUPLICATE_INSTANCE: &str =
    "A consumer instance with the specified name already exists in the Kafka Bridge.";
/// Addressing an instance that does not exist (or has expired)
pub const MSG_INSTANCE_NOT_FOUND: &str = "The specified consumer instance was not found.";

/// The allowed values of `auto.offset.reset`
const AUTO_OFFSET_RESET_VALUES: &[&str] = &["latest", "earliest", "none"];

/// Creation-time options taken from the request body
#[derive(Debug, Default, Clone)]
pub struct ConsumerCreateOptions {
    pub name: Option<String>,
    pub format: Option<String>,
    pub auto_offset_reset: Option<String>,
    pub enable_auto_commit: Option<bool>,
    pub fetch_min_bytes: Option<i64>,
    pub request_timeout_ms: Option<i64>,
}

/// A live consumer instance: the serialized session plus the metadata that
/// can be read without taking the session lock
pub struct ConsumerEntry {
    group_id: String,
    name: String,
    format: EmbeddedFormat,
    session: AsyncMutex<ConsumerSession>,
    last_activity: Mutex<Instant>,
}

impl ConsumerEntry {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> EmbeddedFormat {
        self.format
    }

    /// Take the per-instance lock; one handler at a time per instance
    pub async fn lock(&self) -> MutexGuard<'_, ConsumerSession> {
        self.session.lock().await
    }

    /// Record activity; called after every successful operation
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// Process-wide session directory
pub struct SessionRegistry {
    consumers: DashMap<String, Arc<ConsumerEntry>>,
    producers: DashMap<SocketAddr, Arc<ProducerSession>>,
    factory: Arc<dyn KafkaClientFactory>,
    bridge_id: String,
    consumer_defaults: ConsumerDefaults,
    producer_defaults: ProducerDefaults,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn KafkaClientFactory>,
        bridge_id: String,
        consumer_defaults: ConsumerDefaults,
        producer_defaults: ProducerDefaults,
    ) -> Self {
        Self {
            consumers: DashMap::new(),
            producers: DashMap::new(),
            factory,
            bridge_id,
            consumer_defaults,
            producer_defaults,
        }
    }

    /// Create a consumer instance.
    ///
    /// `base_uri` is invoked with the resolved name after the uniqueness
    /// check but before the Kafka consumer is constructed, so a failing
    /// derivation leaves no session behind.
    pub fn create_consumer<F>(
        &self,
        group_id: &str,
        options: ConsumerCreateOptions,
        base_uri: F,
    ) -> Result<(Arc<ConsumerEntry>, String)>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let format = match options.format.as_deref() {
            Some(format) => EmbeddedFormat::from_str(format)?,
            None => EmbeddedFormat::Binary,
        };

        let auto_offset_reset = match options.auto_offset_reset {
            Some(value) => {
                if !AUTO_OFFSET_RESET_VALUES.contains(&value.as_str()) {
                    return Err(BridgeError::Semantic(format!(
                        "Invalid value {} for configuration auto.offset.reset: \
                         String must be one of: latest, earliest, none",
                        value
                    )));
                }
                value
            }
            None => self.consumer_defaults.auto_offset_reset.clone(),
        };

        // generated names carry the configured bridge id as prefix
        let name = options
            .name
            .unwrap_or_else(|| format!("{}-{}", self.bridge_id, Uuid::new_v4()));

        match self.consumers.entry(name.clone()) {
            Entry::Occupied(_) => Err(BridgeError::Conflict(MSG_DUPLICATE_INSTANCE.to_string())),
            Entry::Vacant(vacant) => {
                let uri = base_uri(&name)?;

                let spec = ConsumerSpec {
                    group_id: group_id.to_string(),
                    client_id: name.clone(),
                    auto_offset_reset,
                    enable_auto_commit: options
                        .enable_auto_commit
                        .unwrap_or(self.consumer_defaults.enable_auto_commit),
                    fetch_min_bytes: options.fetch_min_bytes,
                    request_timeout_ms: options.request_timeout_ms,
                };
                let handle = self.factory.create_consumer(&spec)?;

                let session = ConsumerSession::new(
                    group_id.to_string(),
                    name.clone(),
                    format,
                    handle,
                    &self.consumer_defaults,
                );
                let entry = Arc::new(ConsumerEntry {
                    group_id: group_id.to_string(),
                    name: name.clone(),
                    format,
                    session: AsyncMutex::new(session),
                    last_activity: Mutex::new(Instant::now()),
                });
                vacant.insert(entry.clone());

                info!(instance = %name, group = %group_id, format = %format, "Created consumer");
                Ok((entry, uri))
            }
        }
    }

    /// Look up a live instance
    pub fn get_consumer(&self, name: &str) -> Result<Arc<ConsumerEntry>> {
        self.consumers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BridgeError::NotFound(MSG_INSTANCE_NOT_FOUND.to_string()))
    }

    /// Remove an instance; dropping the entry closes its Kafka consumer
    pub fn delete_consumer(&self, name: &str) -> Result<()> {
        match self.consumers.remove(name) {
            Some((_, entry)) => {
                info!(instance = %name, group = %entry.group_id(), "Deleted consumer");
                Ok(())
            }
            None => Err(BridgeError::NotFound(MSG_INSTANCE_NOT_FOUND.to_string())),
        }
    }

    /// Number of live consumer instances
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// The producer session of an HTTP connection, created on first produce
    pub fn producer_session(&self, connection: SocketAddr) -> Arc<ProducerSession> {
        self.producers
            .entry(connection)
            .or_insert_with(|| {
                debug!(connection = %connection, "Opened producer session");
                Arc::new(ProducerSession::new(
                    self.factory.clone(),
                    self.producer_defaults.acks.clone(),
                ))
            })
            .value()
            .clone()
    }

    /// Tear down the producer session of a closed connection
    pub fn connection_closed(&self, connection: SocketAddr) {
        if self.producers.remove(&connection).is_some() {
            debug!(connection = %connection, "Closed producer session");
        }
    }

    /// Number of live producer sessions
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Close and remove consumers idle longer than `timeout`
    pub fn expire_idle(&self, timeout: Duration) {
        let expired: Vec<String> = self
            .consumers
            .iter()
            .filter(|entry| entry.idle_for() > timeout)
            .map(|entry| entry.key().clone())
            .collect();

        for name in expired {
            if self.consumers.remove(&name).is_some() {
                warn!(instance = %name, timeout_secs = timeout.as_secs(), "Expired idle consumer");
            }
        }
    }

    /// Periodically expire idle consumers until the registry is dropped.
    /// Returns `None` when idle expiry is disabled.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let timeout = self.consumer_defaults.idle_timeout()?;
        let registry = Arc::downgrade(self);
        let tick = Duration::from_secs((timeout.as_secs() / 2).clamp(1, 60));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.expire_idle(timeout);
            }
        }))
    }

    /// Close every live session and empty both maps
    pub fn shutdown(&self) {
        let consumers = self.consumers.len();
        let producers = self.producers.len();
        self.consumers.clear();
        self.producers.clear();
        if consumers > 0 || producers > 0 {
            info!(
                consumers = consumers,
                producers = producers,
                "Closed all bridge sessions"
            );
        }
    }
}
