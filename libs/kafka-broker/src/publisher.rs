use std::time::Duration;

use async_trait::async_trait;
use message_schema::MessageEnvelope;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{debug, info};

use crate::error::BrokerError;

/// Publisher seam used by the dispatch pipeline.
///
/// Implementations must tolerate re-publication of the same envelope; the
/// consumer side deduplicates by idempotency key.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, envelope: &MessageEnvelope) -> Result<(), BrokerError>;
}

/// Kafka-backed publisher.
///
/// The underlying producer runs with `enable.idempotence=true` and
/// `acks=all` so a confirmed delivery is durable across broker failover.
pub struct KafkaMessagePublisher {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl KafkaMessagePublisher {
    pub fn from_brokers(brokers: &str) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| BrokerError::Publish(format!("failed to create producer: {}", e)))?;

        Ok(Self {
            producer,
            delivery_timeout: Duration::from_secs(30),
        })
    }

    fn build_headers(envelope: &MessageEnvelope) -> OwnedHeaders {
        let message_id = envelope.message_id.to_string();
        let retry_count = envelope.retry_count.to_string();
        let is_retry = if envelope.is_retry { "true" } else { "false" };

        OwnedHeaders::new()
            .insert(Header {
                key: "message_id",
                value: Some(message_id.as_bytes()),
            })
            .insert(Header {
                key: "consumer_group",
                value: Some(envelope.consumer_group.as_bytes()),
            })
            .insert(Header {
                key: "idempotency_key",
                value: Some(envelope.idempotency_key.as_bytes()),
            })
            .insert(Header {
                key: "is_retry",
                value: Some(is_retry.as_bytes()),
            })
            .insert(Header {
                key: "retry_count",
                value: Some(retry_count.as_bytes()),
            })
    }
}

#[async_trait]
impl MessagePublisher for KafkaMessagePublisher {
    async fn publish(&self, envelope: &MessageEnvelope) -> Result<(), BrokerError> {
        let payload = serde_json::to_string(envelope)?;
        let key = envelope.partition_key();
        let headers = Self::build_headers(envelope);

        let record = FutureRecord::to(&envelope.topic)
            .key(&key)
            .payload(&payload)
            .headers(headers);

        self.producer
            .send(record, self.delivery_timeout)
            .await
            .map_err(|(err, _)| BrokerError::Publish(format!("kafka publish failed: {}", err)))?;

        if envelope.is_retry {
            info!(
                message_id = %envelope.message_id,
                topic = %envelope.topic,
                consumer_group = %envelope.consumer_group,
                retry_count = envelope.retry_count,
                "Retry envelope published"
            );
        } else {
            debug!(
                message_id = %envelope.message_id,
                topic = %envelope.topic,
                consumer_group = %envelope.consumer_group,
                "Envelope published"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rdkafka::message::Headers;
    use uuid::Uuid;

    fn envelope(is_retry: bool) -> MessageEnvelope {
        MessageEnvelope {
            message_id: Uuid::new_v4(),
            topic: "orders".to_string(),
            payload: "{}".to_string(),
            consumer_group: "order-processor".to_string(),
            producer_service_id: "producer-a".to_string(),
            producer_instance_id: "producer-a-1".to_string(),
            is_retry,
            original_message_id: None,
            target_consumer_service_id: None,
            idempotency_key: "key-9".to_string(),
            retry_count: if is_retry { 1 } else { 0 },
            sent_at: Utc::now(),
        }
    }

    fn header_value(headers: &OwnedHeaders, key: &str) -> Option<String> {
        headers
            .iter()
            .find(|h| h.key == key)
            .and_then(|h| h.value)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    #[test]
    fn test_headers_carry_routing_metadata() {
        let envelope = envelope(false);
        let headers = KafkaMessagePublisher::build_headers(&envelope);

        assert_eq!(
            header_value(&headers, "message_id").as_deref(),
            Some(envelope.message_id.to_string().as_str())
        );
        assert_eq!(
            header_value(&headers, "consumer_group").as_deref(),
            Some("order-processor")
        );
        assert_eq!(
            header_value(&headers, "idempotency_key").as_deref(),
            Some("key-9")
        );
        assert_eq!(header_value(&headers, "is_retry").as_deref(), Some("false"));
        assert_eq!(header_value(&headers, "retry_count").as_deref(), Some("0"));
    }

    #[test]
    fn test_retry_flag_reflected_in_headers() {
        let headers = KafkaMessagePublisher::build_headers(&envelope(true));
        assert_eq!(header_value(&headers, "is_retry").as_deref(), Some("true"));
        assert_eq!(header_value(&headers, "retry_count").as_deref(), Some("1"));
    }

    #[test]
    fn test_partition_key_is_message_id() {
        let envelope = envelope(false);
        assert_eq!(envelope.partition_key(), envelope.message_id.to_string());
    }
}
