//! Kafka adapter for the courier platform.
//!
//! Wraps `rdkafka` behind two small surfaces: [`MessagePublisher`] for the
//! producer's dispatch pipeline and [`BrokerSubscriber`] for the consumer's
//! poll loops. Delivery semantics are at-least-once on both sides — the
//! publisher may re-send after an unconfirmed delivery and the subscriber
//! only commits offsets after the message outcome is durably recorded.

mod error;
mod publisher;
mod subscriber;

pub use error::BrokerError;
pub use publisher::{KafkaMessagePublisher, MessagePublisher};
pub use subscriber::BrokerSubscriber;
