//! Consumer-side durable entities and the message DTO handed to processors.

use chrono::{DateTime, Utc};
use message_schema::MessageEnvelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Idempotency record: at most one row per (message, group), enforced by the
/// composite primary key.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedMessage {
    pub message_id: Uuid,
    pub consumer_group: String,
    pub topic: String,
    pub processed_at: DateTime<Utc>,
    pub payload: Option<String>,
    pub producer_service_id: String,
    pub producer_instance_id: String,
    pub consumer_service_id: String,
    pub consumer_instance_id: String,
    pub idempotency_key: String,
}

/// Failure record. Surrogate id, so repeated failures of one message keep
/// distinct rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FailedMessage {
    pub id: Uuid,
    pub message_id: Uuid,
    pub consumer_group: String,
    pub topic: String,
    pub payload: Option<String>,
    pub error_message: Option<String>,
    pub failed_at: DateTime<Utc>,
    pub retry_count: i32,
    pub producer_service_id: String,
    pub producer_instance_id: String,
    pub consumer_service_id: String,
    pub consumer_instance_id: String,
    pub idempotency_key: String,
}

/// What the processor callback sees: the envelope minus broker plumbing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerMessage {
    pub message_id: Uuid,
    pub topic: String,
    pub consumer_group: String,
    pub payload: String,
    pub is_retry: bool,
    pub retry_count: i32,
    pub producer_service_id: String,
    pub producer_instance_id: String,
    pub idempotency_key: String,
}

impl From<&MessageEnvelope> for ConsumerMessage {
    fn from(envelope: &MessageEnvelope) -> Self {
        ConsumerMessage {
            message_id: envelope.message_id,
            topic: envelope.topic.clone(),
            consumer_group: envelope.consumer_group.clone(),
            payload: envelope.payload.clone(),
            is_retry: envelope.is_retry,
            retry_count: envelope.retry_count,
            producer_service_id: envelope.producer_service_id.clone(),
            producer_instance_id: envelope.producer_instance_id.clone(),
            idempotency_key: envelope.idempotency_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_message_from_envelope() {
        let envelope = MessageEnvelope {
            message_id: Uuid::new_v4(),
            topic: "orders".to_string(),
            payload: r#"{"n":1}"#.to_string(),
            consumer_group: "order-processor".to_string(),
            producer_service_id: "producer-a".to_string(),
            producer_instance_id: "producer-a-1".to_string(),
            is_retry: true,
            original_message_id: Some(Uuid::new_v4()),
            target_consumer_service_id: None,
            idempotency_key: "retry-x-1".to_string(),
            retry_count: 1,
            sent_at: Utc::now(),
        };

        let message = ConsumerMessage::from(&envelope);
        assert_eq!(message.message_id, envelope.message_id);
        assert_eq!(message.payload, envelope.payload);
        assert!(message.is_retry);
        assert_eq!(message.idempotency_key, "retry-x-1");
    }
}
