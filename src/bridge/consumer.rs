//! Consumer session
//!
//! A `ConsumerSession` owns the Kafka consumer behind one named instance and
//! carries the per-instance state needed to serve follow-up requests:
//! embedded format, subscription state and the sticky poll parameters.
//!
//! Operations on one session are serialized by the registry; the methods
//! here can therefore take `&mut self` without further locking.

use futures::future::join_all;
use std::time::Duration;
use tracing::debug;

use super::codec;
use super::format::EmbeddedFormat;
use crate::config::ConsumerDefaults;
use crate::error::{BridgeError, Result};
use crate::kafka::{ConsumerHandle, PartitionAssignment, PartitionOffset, SeekTarget};
use std::sync::Arc;

/// Poll on an instance with no subscription or assignment
pub const MSG_NOT_SUBSCRIBED: &str =
    "Consumer is not subscribed to any topics or assigned any partitions";
/// Encoded poll response larger than the instance's byte limit
pub const MSG_MAX_BYTES_EXCEEDED: &str =
    "Response exceeds the maximum number of bytes the consumer can receive";
/// Subscribe body carrying both `topics` and `topic_pattern`
pub const MSG_SUBSCRIPTION_CONFLICT: &str =
    "Subscriptions to topics, partitions, and patterns are mutually exclusive.";
/// Subscribe body carrying neither `topics` nor `topic_pattern`
pub const MSG_SUBSCRIPTION_REQUIRED: &str =
    "A list (of Topics type) or a topic_pattern must be specified.";

/// How the instance currently selects partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    None,
    TopicList,
    TopicPattern,
    ManualAssign,
}

/// Per-instance consumer state plus the Kafka handle it owns
pub struct ConsumerSession {
    group_id: String,
    name: String,
    format: EmbeddedFormat,
    handle: Arc<dyn ConsumerHandle>,
    subscription: SubscriptionState,
    // sticky: the latest observed query params survive across polls
    poll_timeout: Duration,
    max_response_bytes: u64,
    max_poll_records: usize,
}

impl ConsumerSession {
    pub fn new(
        group_id: String,
        name: String,
        format: EmbeddedFormat,
        handle: Arc<dyn ConsumerHandle>,
        defaults: &ConsumerDefaults,
    ) -> Self {
        Self {
            group_id,
            name,
            format,
            handle,
            subscription: SubscriptionState::None,
            poll_timeout: defaults.poll_timeout(),
            max_response_bytes: defaults.max_bytes,
            max_poll_records: defaults.max_poll_records,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> EmbeddedFormat {
        self.format
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        self.subscription
    }

    /// Subscribe to an explicit topic list. Replaces any manual assignment.
    pub fn subscribe_topics(&mut self, topics: &[String]) -> Result<()> {
        if topics.is_empty() {
            return Err(BridgeError::Semantic(MSG_SUBSCRIPTION_REQUIRED.to_string()));
        }
        self.clear_manual_assignment()?;
        self.handle.subscribe(topics)?;
        self.subscription = SubscriptionState::TopicList;
        debug!(instance = %self.name, topics = ?topics, "Subscribed to topics");
        Ok(())
    }

    /// Subscribe to a topic regex. Replaces any manual assignment.
    pub fn subscribe_pattern(&mut self, pattern: &str) -> Result<()> {
        if regex::Regex::new(pattern).is_err() {
            return Err(BridgeError::Semantic(format!(
                "topic_pattern {} is not a valid regular expression.",
                pattern
            )));
        }
        self.clear_manual_assignment()?;
        self.handle.subscribe_pattern(pattern)?;
        self.subscription = SubscriptionState::TopicPattern;
        debug!(instance = %self.name, pattern = %pattern, "Subscribed to topic pattern");
        Ok(())
    }

    /// Manually assign partitions, optionally with starting positions.
    /// Replaces any subscription; the most recent call wins.
    pub fn assign(&mut self, partitions: &[PartitionAssignment]) -> Result<()> {
        if matches!(
            self.subscription,
            SubscriptionState::TopicList | SubscriptionState::TopicPattern
        ) {
            self.handle.unsubscribe()?;
        }
        self.handle.assign(partitions)?;
        self.subscription = SubscriptionState::ManualAssign;
        debug!(instance = %self.name, count = partitions.len(), "Assigned partitions");
        Ok(())
    }

    /// Poll for records and encode them with the instance's format.
    ///
    /// `timeout` and `max_bytes` overwrite the session's remembered values
    /// before the poll when present. Returns the encoded response body.
    pub async fn poll(
        &mut self,
        timeout_ms: Option<u64>,
        max_bytes: Option<u64>,
    ) -> Result<Vec<u8>> {
        if let Some(timeout_ms) = timeout_ms {
            self.poll_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(max_bytes) = max_bytes {
            self.max_response_bytes = max_bytes;
        }

        if self.subscription == SubscriptionState::None {
            return Err(BridgeError::Kafka(MSG_NOT_SUBSCRIBED.to_string()));
        }

        let records = self
            .handle
            .poll(self.poll_timeout, self.max_poll_records)
            .await?;
        let body = codec::encode_records(self.format, &records)?;

        // size is checked after encoding; the poll may already have advanced
        // the consumer position
        if body.len() as u64 > self.max_response_bytes {
            return Err(BridgeError::Semantic(MSG_MAX_BYTES_EXCEEDED.to_string()));
        }

        Ok(body)
    }

    /// Commit the given offsets, or the last delivered positions when the
    /// request carried no body
    pub async fn commit(&mut self, offsets: Option<Vec<PartitionOffset>>) -> Result<()> {
        match offsets {
            Some(offsets) => self.handle.commit(&offsets).await,
            None => self.handle.commit_current().await,
        }
    }

    /// Seek each listed partition to its offset; the seeks run concurrently
    /// and the first failure wins
    pub async fn seek(&mut self, offsets: &[PartitionOffset]) -> Result<()> {
        let seeks = offsets.iter().map(|o| {
            self.handle
                .seek(&o.topic, o.partition, SeekTarget::Offset(o.offset))
        });
        join_all(seeks).await.into_iter().collect()
    }

    /// Seek the listed partitions to the beginning or end of their logs
    pub async fn seek_to(
        &mut self,
        target: SeekTarget,
        partitions: &[(String, i32)],
    ) -> Result<()> {
        let seeks = partitions
            .iter()
            .map(|(topic, partition)| self.handle.seek(topic, *partition, target));
        join_all(seeks).await.into_iter().collect()
    }

    /// Drop the subscription; subsequent polls fail until the instance
    /// subscribes or assigns again
    pub fn unsubscribe(&mut self) -> Result<()> {
        self.handle.unsubscribe()?;
        self.subscription = SubscriptionState::None;
        Ok(())
    }

    fn clear_manual_assignment(&mut self) -> Result<()> {
        if self.subscription == SubscriptionState::ManualAssign {
            self.handle.assign(&[])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use axum::http::StatusCode;
    use serde_json::Value;

    fn session(format: EmbeddedFormat) -> (Arc<FakeCluster>, ConsumerSession) {
        let cluster = FakeCluster::shared();
        let handle = cluster.consumer();
        let session = ConsumerSession::new(
            "my-group".to_string(),
            "c1".to_string(),
            format,
            handle,
            &ConsumerDefaults {
                poll_timeout_ms: 10,
                ..ConsumerDefaults::default()
            },
        );
        (cluster, session)
    }

    #[tokio::test]
    async fn test_poll_without_subscription_is_500() {
        let (_cluster, mut session) = session(EmbeddedFormat::Binary);
        let err = session.poll(None, None).await.unwrap_err();
        assert_eq!(err.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), MSG_NOT_SUBSCRIBED);
    }

    #[tokio::test]
    async fn test_subscribe_and_poll_round() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        cluster.seed("orders", 0, Some(b"k"), b"v");

        session.subscribe_topics(&["orders".to_string()]).unwrap();
        assert_eq!(session.subscription_state(), SubscriptionState::TopicList);

        let body = session.poll(None, None).await.unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["topic"], "orders");
        assert_eq!(parsed[0]["offset"], 0);
    }

    #[tokio::test]
    async fn test_second_poll_does_not_redeliver() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        cluster.seed("orders", 0, None, b"v");

        session.subscribe_topics(&["orders".to_string()]).unwrap();
        let first = session.poll(None, None).await.unwrap();
        assert_ne!(first, b"[]");
        let second = session.poll(None, None).await.unwrap();
        assert_eq!(second, b"[]");
    }

    #[tokio::test]
    async fn test_empty_topics_list_is_422() {
        let (_cluster, mut session) = session(EmbeddedFormat::Binary);
        let err = session.subscribe_topics(&[]).unwrap_err();
        assert_eq!(err.http_status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), MSG_SUBSCRIPTION_REQUIRED);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_422() {
        let (_cluster, mut session) = session(EmbeddedFormat::Binary);
        let err = session.subscribe_pattern("[").unwrap_err();
        assert_eq!(err.http_status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_pattern_subscription_matches_topics() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        cluster.seed("orders-eu", 0, None, b"v1");
        cluster.seed("billing", 0, None, b"v2");

        session.subscribe_pattern("orders-.*").unwrap();
        assert_eq!(session.subscription_state(), SubscriptionState::TopicPattern);

        let body = session.poll(None, None).await.unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["topic"], "orders-eu");
    }

    #[tokio::test]
    async fn test_assign_replaces_subscription() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        cluster.seed("orders", 1, None, b"v");

        session.subscribe_topics(&["billing".to_string()]).unwrap();
        session
            .assign(&[PartitionAssignment {
                topic: "orders".to_string(),
                partition: 1,
                offset: Some(0),
            }])
            .unwrap();
        assert_eq!(session.subscription_state(), SubscriptionState::ManualAssign);

        let body = session.poll(None, None).await.unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["partition"], 1);
    }

    #[tokio::test]
    async fn test_max_bytes_exceeded_is_422_without_body() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        cluster.seed("orders", 0, None, &[b'x'; 50]);

        session.subscribe_topics(&["orders".to_string()]).unwrap();
        let err = session.poll(None, Some(1)).await.unwrap_err();
        assert_eq!(err.http_status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), MSG_MAX_BYTES_EXCEEDED);
    }

    #[tokio::test]
    async fn test_max_bytes_is_sticky() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        cluster.seed("orders", 0, None, &[b'x'; 50]);
        cluster.seed("orders", 0, None, &[b'y'; 50]);

        session.subscribe_topics(&["orders".to_string()]).unwrap();
        assert!(session.poll(None, Some(1)).await.is_err());
        // the previous max_bytes is remembered
        assert!(session.poll(None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_then_poll_fails() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        cluster.seed("orders", 0, None, b"v");

        session.subscribe_topics(&["orders".to_string()]).unwrap();
        session.unsubscribe().unwrap();
        assert_eq!(session.subscription_state(), SubscriptionState::None);

        let err = session.poll(None, None).await.unwrap_err();
        assert_eq!(err.to_string(), MSG_NOT_SUBSCRIBED);
    }

    #[tokio::test]
    async fn test_commit_with_offsets() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        session.subscribe_topics(&["orders".to_string()]).unwrap();

        session
            .commit(Some(vec![PartitionOffset {
                topic: "orders".to_string(),
                partition: 0,
                offset: 5,
                metadata: None,
            }]))
            .await
            .unwrap();

        let committed = cluster.committed();
        assert_eq!(committed, vec![("orders".to_string(), 0, 5)]);
    }

    #[tokio::test]
    async fn test_commit_without_body_commits_positions() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        cluster.seed("orders", 0, None, b"v");

        session.subscribe_topics(&["orders".to_string()]).unwrap();
        session.poll(None, None).await.unwrap();
        session.commit(None).await.unwrap();

        let committed = cluster.committed();
        assert_eq!(committed, vec![("orders".to_string(), 0, 1)]);
    }

    #[tokio::test]
    async fn test_seek_unassigned_partition_is_404() {
        let (_cluster, mut session) = session(EmbeddedFormat::Binary);
        let err = session
            .seek(&[PartitionOffset {
                topic: "orders".to_string(),
                partition: 3,
                offset: 0,
                metadata: None,
            }])
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_seek_to_beginning_redelivers() {
        let (cluster, mut session) = session(EmbeddedFormat::Binary);
        cluster.seed("orders", 0, None, b"v");

        session.subscribe_topics(&["orders".to_string()]).unwrap();
        session.poll(None, None).await.unwrap();
        session
            .seek_to(SeekTarget::Beginning, &[("orders".to_string(), 0)])
            .await
            .unwrap();

        let body = session.poll(None, None).await.unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
