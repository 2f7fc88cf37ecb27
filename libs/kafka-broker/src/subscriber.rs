use message_schema::MessageEnvelope;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use tracing::warn;

use crate::error::BrokerError;

/// Group subscription over a set of topics.
///
/// One `BrokerSubscriber` maps to one Kafka consumer group membership, so
/// partition assignment and per-group fan-out follow the broker's own group
/// coordination. Offsets are committed manually via [`BrokerSubscriber::ack`]
/// after the outcome of a message is durably recorded; a crash between
/// processing and commit re-delivers, which the processed store absorbs.
pub struct BrokerSubscriber {
    consumer: StreamConsumer,
}

impl BrokerSubscriber {
    pub fn subscribe(brokers: &str, group_id: &str, topics: &[String]) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .create()
            .map_err(|e| BrokerError::Subscribe(format!("failed to create consumer: {}", e)))?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| BrokerError::Subscribe(format!("failed to subscribe {:?}: {}", topics, e)))?;

        Ok(Self { consumer })
    }

    /// Block until the next envelope arrives.
    ///
    /// Records that are not valid envelopes are reported as
    /// [`BrokerError::Deserialize`] / [`BrokerError::Payload`]; callers
    /// should ack and move on so a poison message cannot wedge the
    /// partition.
    pub async fn recv(&self) -> Result<MessageEnvelope, BrokerError> {
        let message = self.consumer.recv().await?;

        let payload = match message.payload() {
            Some(bytes) => bytes,
            None => {
                warn!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    "Dropping record with empty payload"
                );
                return Err(BrokerError::Payload("empty payload".to_string()));
            }
        };

        let envelope: MessageEnvelope = serde_json::from_slice(payload)?;
        Ok(envelope)
    }

    /// Commit the current consumer position (broker-level acknowledgment).
    pub fn ack(&self) -> Result<(), BrokerError> {
        self.consumer
            .commit_consumer_state(CommitMode::Async)
            .map_err(BrokerError::from)
    }
}
