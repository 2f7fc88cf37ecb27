use thiserror::Error;

/// Errors surfaced by the broker adapter.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Producer could not be built or a record could not be delivered
    #[error("publish failed: {0}")]
    Publish(String),

    /// Consumer could not be built or subscribed
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// A received payload was not a valid envelope
    #[error("invalid envelope: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// A received record carried no usable payload at all
    #[error("invalid payload: {0}")]
    Payload(String),

    /// Transport-level failure reported by the client library
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}
