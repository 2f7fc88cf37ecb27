use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope published to the broker for every outbox record.
///
/// Delivery is at-least-once: consumers may see the same envelope more than
/// once and deduplicate by `(message_id, consumer_group)`. The payload is an
/// opaque string owned by the submitting application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Outbox record id this envelope was produced from
    pub message_id: Uuid,
    /// Logical channel the record belongs to
    pub topic: String,
    /// Opaque application payload
    pub payload: String,
    /// Exact consumer group this copy is destined for
    pub consumer_group: String,
    /// Origin stamps of the producing instance
    pub producer_service_id: String,
    pub producer_instance_id: String,
    /// True when this envelope is a retry of an earlier record
    pub is_retry: bool,
    /// Predecessor record id when `is_retry` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message_id: Option<Uuid>,
    /// When set, only the named consumer instance should process this copy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_consumer_service_id: Option<String>,
    /// Stable duplicate-detection key
    pub idempotency_key: String,
    /// Number of retries accumulated so far
    pub retry_count: i32,
    /// Timestamp the envelope was handed to the broker
    pub sent_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Partition key for the broker; keyed by message id so duplicates of
    /// the same record land on the same partition.
    pub fn partition_key(&self) -> String {
        self.message_id.to_string()
    }

    /// Whether this envelope may be processed by the given consumer service.
    ///
    /// An unset target means any member of the group qualifies.
    pub fn accepts_consumer(&self, consumer_service_id: &str) -> bool {
        match &self.target_consumer_service_id {
            Some(target) => target == consumer_service_id,
            None => true,
        }
    }
}

/// Idempotency key stamped onto retry records: `retry-{originalId}-{retryCount}`.
pub fn retry_idempotency_key(original_id: Uuid, retry_count: i32) -> String {
    format!("retry-{}-{}", original_id, retry_count)
}

/// Consumer outcome posted back to the producer's acknowledgment intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgmentRequest {
    pub message_id: Uuid,
    pub consumer_group: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> MessageEnvelope {
        MessageEnvelope {
            message_id: Uuid::new_v4(),
            topic: "orders".to_string(),
            payload: r#"{"order":1}"#.to_string(),
            consumer_group: "order-processor".to_string(),
            producer_service_id: "producer-a".to_string(),
            producer_instance_id: "producer-a-abc123".to_string(),
            is_retry: false,
            original_message_id: None,
            target_consumer_service_id: None,
            idempotency_key: String::new(),
            retry_count: 0,
            sent_at: Utc::now(),
        }
    }

    #[test]
    fn test_envelope_wire_field_names() {
        let envelope = sample_envelope();
        let json = serde_json::to_value(&envelope).unwrap();

        assert!(json.get("messageId").is_some());
        assert!(json.get("consumerGroup").is_some());
        assert!(json.get("producerServiceId").is_some());
        assert!(json.get("isRetry").is_some());
        assert!(json.get("idempotencyKey").is_some());
        // Unset optionals are omitted entirely
        assert!(json.get("originalMessageId").is_none());
        assert!(json.get("targetConsumerServiceId").is_none());
    }

    #[test]
    fn test_envelope_round_trip() {
        let mut envelope = sample_envelope();
        envelope.is_retry = true;
        envelope.original_message_id = Some(Uuid::new_v4());
        envelope.target_consumer_service_id = Some("consumer-b".to_string());
        envelope.retry_count = 2;

        let json = serde_json::to_string(&envelope).unwrap();
        let decoded: MessageEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_accepts_consumer() {
        let mut envelope = sample_envelope();
        assert!(envelope.accepts_consumer("anyone"));

        envelope.target_consumer_service_id = Some("consumer-b".to_string());
        assert!(envelope.accepts_consumer("consumer-b"));
        assert!(!envelope.accepts_consumer("consumer-c"));
    }

    #[test]
    fn test_retry_idempotency_key_format() {
        let id = Uuid::parse_str("6f2b7a38-0000-4000-8000-000000000001").unwrap();
        assert_eq!(
            retry_idempotency_key(id, 3),
            format!("retry-{}-3", id)
        );
    }

    #[test]
    fn test_ack_request_wire_shape() {
        let ack = AcknowledgmentRequest {
            message_id: Uuid::new_v4(),
            consumer_group: "order-processor".to_string(),
            success: false,
            error_message: Some("handler exploded".to_string()),
        };

        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorMessage"], "handler exploded");
        assert!(json.get("consumerGroup").is_some());
    }
}
