//! Processor behavior through the store/acknowledger seams: idempotent
//! re-processing, instance targeting, and failure recording.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use consumer_service::config::Identity;
use consumer_service::metrics::ConsumerMetrics;
use consumer_service::models::{ConsumerMessage, FailedMessage, ProcessedMessage};
use consumer_service::services::handler::{MessageHandler, NoopHandler};
use consumer_service::services::processor::{
    Acknowledger, MessageProcessor, OutcomeStore, ProcessOutcome,
};
use message_schema::{AcknowledgmentRequest, MessageEnvelope};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct InMemoryStore {
    processed: Mutex<Vec<ProcessedMessage>>,
    failed: Mutex<Vec<FailedMessage>>,
}

#[async_trait]
impl OutcomeStore for InMemoryStore {
    async fn is_processed(&self, message_id: Uuid, group: &str) -> anyhow::Result<bool> {
        Ok(self
            .processed
            .lock()
            .await
            .iter()
            .any(|m| m.message_id == message_id && m.consumer_group == group))
    }

    async fn record_processed(&self, message: &ProcessedMessage) -> anyhow::Result<bool> {
        let mut processed = self.processed.lock().await;
        // Composite-PK semantics: conflicting insert is a no-op
        if processed
            .iter()
            .any(|m| m.message_id == message.message_id && m.consumer_group == message.consumer_group)
        {
            return Ok(false);
        }
        processed.push(message.clone());
        Ok(true)
    }

    async fn record_failure(&self, failure: &FailedMessage) -> anyhow::Result<()> {
        self.failed.lock().await.push(failure.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingAcker {
    acks: Mutex<Vec<AcknowledgmentRequest>>,
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn acknowledge(&self, request: &AcknowledgmentRequest) -> anyhow::Result<()> {
        self.acks.lock().await.push(request.clone());
        Ok(())
    }
}

struct RejectingHandler;

#[async_trait]
impl MessageHandler for RejectingHandler {
    async fn handle(&self, _message: &ConsumerMessage) -> anyhow::Result<()> {
        anyhow::bail!("downstream rejected the payload")
    }
}

fn identity() -> Identity {
    Identity {
        service_id: "consumer-a".to_string(),
        instance_id: "consumer-a-1".to_string(),
    }
}

fn envelope() -> MessageEnvelope {
    MessageEnvelope {
        message_id: Uuid::new_v4(),
        topic: "orders".to_string(),
        payload: r#"{"order":1}"#.to_string(),
        consumer_group: "order-processor".to_string(),
        producer_service_id: "producer-a".to_string(),
        producer_instance_id: "producer-a-1".to_string(),
        is_retry: false,
        original_message_id: None,
        target_consumer_service_id: None,
        idempotency_key: "key-1".to_string(),
        retry_count: 0,
        sent_at: Utc::now(),
    }
}

fn processor(
    store: Arc<InMemoryStore>,
    acker: Arc<RecordingAcker>,
    handler: Arc<dyn MessageHandler>,
) -> MessageProcessor {
    MessageProcessor::new(
        store,
        acker,
        handler,
        identity(),
        ConsumerMetrics::new("consumer-test"),
    )
}

#[tokio::test]
async fn first_delivery_is_processed_and_acked() {
    let store = Arc::new(InMemoryStore::default());
    let acker = Arc::new(RecordingAcker::default());
    let processor = processor(store.clone(), acker.clone(), Arc::new(NoopHandler));

    let envelope = envelope();
    let outcome = processor.process_envelope(&envelope).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Processed);

    let processed = store.processed.lock().await;
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].message_id, envelope.message_id);
    assert_eq!(processed[0].consumer_service_id, "consumer-a");
    assert_eq!(processed[0].idempotency_key, "key-1");

    let acks = acker.acks.lock().await;
    assert_eq!(acks.len(), 1);
    assert!(acks[0].success);
    assert_eq!(acks[0].message_id, envelope.message_id);
}

#[tokio::test]
async fn duplicate_delivery_keeps_one_row_and_reacks() {
    let store = Arc::new(InMemoryStore::default());
    let acker = Arc::new(RecordingAcker::default());
    let processor = processor(store.clone(), acker.clone(), Arc::new(NoopHandler));

    let envelope = envelope();
    assert_eq!(
        processor.process_envelope(&envelope).await.unwrap(),
        ProcessOutcome::Processed
    );
    assert_eq!(
        processor.process_envelope(&envelope).await.unwrap(),
        ProcessOutcome::Duplicate
    );

    // Exactly one processed row survives
    assert_eq!(store.processed.lock().await.len(), 1);

    // But the producer was acked twice, both successes
    let acks = acker.acks.lock().await;
    assert_eq!(acks.len(), 2);
    assert!(acks.iter().all(|a| a.success));
}

#[tokio::test]
async fn same_message_different_group_processes_independently() {
    let store = Arc::new(InMemoryStore::default());
    let acker = Arc::new(RecordingAcker::default());
    let processor = processor(store.clone(), acker.clone(), Arc::new(NoopHandler));

    let first = envelope();
    let mut second = first.clone();
    second.consumer_group = "audit-log".to_string();

    assert_eq!(
        processor.process_envelope(&first).await.unwrap(),
        ProcessOutcome::Processed
    );
    assert_eq!(
        processor.process_envelope(&second).await.unwrap(),
        ProcessOutcome::Processed
    );

    // Dedup key is (messageId, consumerGroup), not messageId alone
    assert_eq!(store.processed.lock().await.len(), 2);
}

#[tokio::test]
async fn targeted_envelope_for_other_instance_is_untouched() {
    let store = Arc::new(InMemoryStore::default());
    let acker = Arc::new(RecordingAcker::default());
    let processor = processor(store.clone(), acker.clone(), Arc::new(NoopHandler));

    let mut targeted = envelope();
    targeted.is_retry = true;
    targeted.target_consumer_service_id = Some("consumer-b".to_string());

    let outcome = processor.process_envelope(&targeted).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::SkippedTarget);

    // No store writes, no producer ack: the producer re-targets via retry
    assert!(store.processed.lock().await.is_empty());
    assert!(store.failed.lock().await.is_empty());
    assert!(acker.acks.lock().await.is_empty());
}

#[tokio::test]
async fn targeted_envelope_for_this_instance_is_processed() {
    let store = Arc::new(InMemoryStore::default());
    let acker = Arc::new(RecordingAcker::default());
    let processor = processor(store.clone(), acker.clone(), Arc::new(NoopHandler));

    let mut targeted = envelope();
    targeted.is_retry = true;
    targeted.retry_count = 1;
    targeted.target_consumer_service_id = Some("consumer-a".to_string());

    let outcome = processor.process_envelope(&targeted).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Processed);
    assert_eq!(store.processed.lock().await.len(), 1);
}

#[tokio::test]
async fn handler_failure_records_row_and_nacks() {
    let store = Arc::new(InMemoryStore::default());
    let acker = Arc::new(RecordingAcker::default());
    let processor = processor(store.clone(), acker.clone(), Arc::new(RejectingHandler));

    let envelope = envelope();
    let outcome = processor.process_envelope(&envelope).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Failed);

    assert!(store.processed.lock().await.is_empty());
    let failed = store.failed.lock().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].message_id, envelope.message_id);
    assert_eq!(
        failed[0].error_message.as_deref(),
        Some("downstream rejected the payload")
    );

    let acks = acker.acks.lock().await;
    assert_eq!(acks.len(), 1);
    assert!(!acks[0].success);
    assert_eq!(
        acks[0].error_message.as_deref(),
        Some("downstream rejected the payload")
    );
}

#[tokio::test]
async fn repeated_failures_retain_distinct_rows() {
    let store = Arc::new(InMemoryStore::default());
    let acker = Arc::new(RecordingAcker::default());
    let processor = processor(store.clone(), acker.clone(), Arc::new(RejectingHandler));

    let envelope = envelope();
    processor.process_envelope(&envelope).await.unwrap();
    processor.process_envelope(&envelope).await.unwrap();

    // Failures never dedup: each attempt is its own audit row
    let failed = store.failed.lock().await;
    assert_eq!(failed.len(), 2);
    assert_ne!(failed[0].id, failed[1].id);
    assert_eq!(failed[0].message_id, failed[1].message_id);
}
