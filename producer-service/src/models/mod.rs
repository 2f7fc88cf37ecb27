//! Durable entities of the outbox pipeline and the request/response DTOs of
//! the message API.

pub mod agent;

use chrono::{DateTime, Utc};
use message_schema::MessageEnvelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an outbox record.
///
/// `Acknowledged`, `Failed` and `Expired` are terminal: nothing but the
/// retention sweep touches a record after it reaches one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "outbox_status", rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Acknowledged,
    Failed,
    Expired,
}

impl OutboxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OutboxStatus::Acknowledged | OutboxStatus::Failed | OutboxStatus::Expired
        )
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Acknowledged => "acknowledged",
            OutboxStatus::Failed => "failed",
            OutboxStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// One durable copy of a submitted message, destined for exactly one
/// consumer group. Fan-out creates N of these per submit.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    pub id: Uuid,
    pub topic: String,
    pub consumer_group: String,
    pub payload: String,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub scheduled_retry_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub producer_service_id: String,
    pub producer_instance_id: String,
    pub is_retry: bool,
    pub original_message_id: Option<Uuid>,
    pub target_consumer_service_id: Option<String>,
    pub idempotency_key: String,
    pub topic_registration_id: Uuid,
}

impl OutboxRecord {
    /// Broker envelope for this record.
    pub fn envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            message_id: self.id,
            topic: self.topic.clone(),
            payload: self.payload.clone(),
            consumer_group: self.consumer_group.clone(),
            producer_service_id: self.producer_service_id.clone(),
            producer_instance_id: self.producer_instance_id.clone(),
            is_retry: self.is_retry,
            original_message_id: self.original_message_id,
            target_consumer_service_id: self.target_consumer_service_id.clone(),
            idempotency_key: self.idempotency_key.clone(),
            retry_count: self.retry_count,
            sent_at: Utc::now(),
        }
    }
}

/// Registered logical channel.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopicRegistration {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Subscription of a named consumer group to a topic, with its retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGroupRegistration {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub name: String,
    pub requires_ack: bool,
    pub active: bool,
    pub ack_timeout_minutes: i32,
    /// -1 means unbounded
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConsumerGroupRegistration {
    pub fn ack_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ack_timeout_minutes as i64)
    }

    /// Whether a record with the given retry count may still be retried.
    pub fn allows_retry(&self, retry_count: i32) -> bool {
        self.max_retries < 0 || retry_count < self.max_retries
    }
}

/// Topic with its group registrations resolved (one lookup per topic on the
/// bulk-create path).
#[derive(Debug, Clone)]
pub struct TopicWithGroups {
    pub topic: TopicRegistration,
    pub groups: Vec<ConsumerGroupRegistration>,
}

impl TopicWithGroups {
    pub fn active_groups(&self) -> impl Iterator<Item = &ConsumerGroupRegistration> {
        self.groups.iter().filter(|g| g.active)
    }
}

// ---------------------------------------------------------------------------
// API DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub topic: String,
    pub message: String,
    /// Restrict fan-out to this group instead of every active group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_group: Option<String>,
    #[serde(default = "default_use_batching")]
    pub use_batching: bool,
}

fn default_use_batching() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    pub status: String,
    pub topic: String,
    pub target_consumer_groups: Vec<String>,
    pub producer_service_id: String,
    pub producer_instance_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTopicRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub consumer_groups: Vec<RegisterConsumerGroupRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterConsumerGroupRequest {
    pub name: String,
    #[serde(default = "default_requires_ack")]
    pub requires_ack: bool,
    #[serde(default = "default_ack_timeout_minutes")]
    pub ack_timeout_minutes: i32,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

fn default_requires_ack() -> bool {
    true
}

fn default_ack_timeout_minutes() -> i32 {
    5
}

fn default_max_retries() -> i32 {
    5
}

/// Per-status counts plus queue age, for the tracking endpoint and health
/// snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxStats {
    pub pending: i64,
    pub sent: i64,
    pub acknowledged: i64,
    pub failed: i64,
    pub expired: i64,
    pub oldest_pending_age_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!OutboxStatus::Pending.is_terminal());
        assert!(!OutboxStatus::Sent.is_terminal());
        assert!(OutboxStatus::Acknowledged.is_terminal());
        assert!(OutboxStatus::Failed.is_terminal());
        assert!(OutboxStatus::Expired.is_terminal());
    }

    #[test]
    fn test_allows_retry_bounds() {
        let mut group = ConsumerGroupRegistration {
            id: Uuid::new_v4(),
            topic_id: Uuid::new_v4(),
            name: "g".to_string(),
            requires_ack: true,
            active: true,
            ack_timeout_minutes: 5,
            max_retries: 2,
            created_at: Utc::now(),
            updated_at: None,
        };

        assert!(group.allows_retry(0));
        assert!(group.allows_retry(1));
        assert!(!group.allows_retry(2));

        // -1 is unbounded
        group.max_retries = -1;
        assert!(group.allows_retry(1_000_000));
    }

    #[test]
    fn test_send_request_batching_default() {
        let req: SendMessageRequest =
            serde_json::from_str(r#"{"topic":"orders","message":"hi"}"#).unwrap();
        assert!(req.use_batching);
        assert!(req.consumer_group.is_none());
    }

    #[test]
    fn test_envelope_carries_record_fields() {
        let record = OutboxRecord {
            id: Uuid::new_v4(),
            topic: "orders".to_string(),
            consumer_group: "order-processor".to_string(),
            payload: "p".to_string(),
            status: OutboxStatus::Pending,
            created_at: Utc::now(),
            processed_at: None,
            last_retry_at: None,
            scheduled_retry_at: None,
            retry_count: 1,
            error_message: None,
            producer_service_id: "producer-a".to_string(),
            producer_instance_id: "producer-a-1".to_string(),
            is_retry: true,
            original_message_id: Some(Uuid::new_v4()),
            target_consumer_service_id: Some("consumer-b".to_string()),
            idempotency_key: "retry-x-1".to_string(),
            topic_registration_id: Uuid::new_v4(),
        };

        let envelope = record.envelope();
        assert_eq!(envelope.message_id, record.id);
        assert_eq!(envelope.retry_count, 1);
        assert!(envelope.is_retry);
        assert_eq!(envelope.original_message_id, record.original_message_id);
        assert_eq!(
            envelope.target_consumer_service_id.as_deref(),
            Some("consumer-b")
        );
    }
}
