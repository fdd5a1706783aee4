//! NATS client abstraction for production and testing.
//!
//! Status-change events and media processing jobs both leave the process
//! over NATS. The trait lets tests swap the real connection for [`TestNats`].

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, RwLock};

use super::BaseProcessingQueue;

/// Subject the media pipeline consumes jobs from.
pub const PROCESSING_JOBS_SUBJECT: &str = "media.processing.jobs";

/// A published message.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

/// Trait for NATS publish operations.
///
/// This allows swapping between real NATS and test mocks.
#[async_trait]
pub trait NatsPublisher: Send + Sync {
    /// Publish a message to a subject.
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()>;
}

/// Real NATS client publisher.
pub struct NatsClientPublisher {
    client: async_nats::Client,
}

impl NatsClientPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NatsPublisher for NatsClientPublisher {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.client.publish(subject, payload).await?;
        Ok(())
    }
}

/// Processing queue that publishes job envelopes on a NATS subject.
pub struct NatsProcessingQueue {
    publisher: Arc<dyn NatsPublisher>,
    subject: String,
}

impl NatsProcessingQueue {
    pub fn new(publisher: Arc<dyn NatsPublisher>) -> Self {
        Self {
            publisher,
            subject: PROCESSING_JOBS_SUBJECT.to_string(),
        }
    }
}

#[async_trait]
impl BaseProcessingQueue for NatsProcessingQueue {
    async fn enqueue(&self, job_id: &str, payload: Bytes) -> Result<()> {
        tracing::debug!(job_id = %job_id, subject = %self.subject, "publishing processing job");
        self.publisher.publish(self.subject.clone(), payload).await
    }
}

/// Mock NATS client that tracks published messages for testing.
///
/// This allows tests to inspect what messages would have been published
/// to NATS without requiring a real connection.
#[derive(Default)]
pub struct TestNats {
    /// Messages published to subjects.
    published: RwLock<Vec<PublishedMessage>>,
}

impl TestNats {
    /// Create a new test NATS client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a published message.
    pub fn record_publish(&self, subject: String, payload: Bytes) {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage { subject, payload });
    }

    /// Get all published messages.
    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Get published messages for a specific subject.
    pub fn messages_for_subject(&self, subject: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Check if any message was published to a subject.
    pub fn was_published_to(&self, subject: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|m| m.subject == subject)
    }

    /// Get the count of messages published to a specific subject.
    pub fn publish_count_for(&self, subject: &str) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .count()
    }

    /// Clear all recorded messages.
    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Payloads on a subject decoded as JSON, in publish order.
    pub fn decode_all<T: serde::de::DeserializeOwned>(
        &self,
        subject: &str,
    ) -> std::result::Result<Vec<T>, serde_json::Error> {
        self.messages_for_subject(subject)
            .iter()
            .map(|m| serde_json::from_slice(&m.payload))
            .collect()
    }
}

#[async_trait]
impl NatsPublisher for TestNats {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.record_publish(subject, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_retrieve_messages() {
        let nats = TestNats::new();

        nats.record_publish(
            "listings.status_changed".to_string(),
            Bytes::from(r#"{"identityId":1024}"#),
        );

        assert_eq!(nats.publish_count_for("listings.status_changed"), 1);
        assert!(nats.was_published_to("listings.status_changed"));
        assert!(!nats.was_published_to(PROCESSING_JOBS_SUBJECT));

        let decoded: Vec<serde_json::Value> = nats.decode_all("listings.status_changed").unwrap();
        assert_eq!(decoded[0]["identityId"], 1024);
    }

    #[test]
    fn test_clear() {
        let nats = TestNats::new();
        nats.record_publish("test".to_string(), Bytes::new());
        nats.clear();
        assert!(nats.published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_processing_queue_publishes_on_jobs_subject() {
        let nats = Arc::new(TestNats::new());
        let queue = NatsProcessingQueue::new(nats.clone());

        queue
            .enqueue("17", Bytes::from_static(br#"{"jobId":"17"}"#))
            .await
            .unwrap();

        let messages = nats.messages_for_subject(PROCESSING_JOBS_SUBJECT);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, Bytes::from_static(br#"{"jobId":"17"}"#));
    }
}
